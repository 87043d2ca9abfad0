//! Camera orientation from a device orientation sensor
//!
//! Readings follow the W3C device-orientation frame: `alpha` about the
//! device Z axis, `beta` about X, `gamma` about Y, all in degrees. The camera
//! looks out of the back of the device, so the device rotation is followed
//! by -90 degrees about X and then by the screen rotation about Z.

use crate::foundation::math::{utils, Quat, Vec3};
use crate::render::Camera;

/// One sensor sample in degrees; missing axes read as zero
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OrientationReading {
    /// Rotation about the device Z axis
    pub alpha: Option<f32>,
    /// Rotation about the device X axis
    pub beta: Option<f32>,
    /// Rotation about the device Y axis
    pub gamma: Option<f32>,
}

impl OrientationReading {
    /// Reading with all three angles present
    pub fn new(alpha: f32, beta: f32, gamma: f32) -> Self {
        Self {
            alpha: Some(alpha),
            beta: Some(beta),
            gamma: Some(gamma),
        }
    }
}

/// Camera rotation for a reading and a screen orientation (degrees)
pub fn orientation_quaternion(reading: &OrientationReading, screen_degrees: f32, alpha_offset: f32) -> Quat {
    let alpha = utils::deg_to_rad(reading.alpha.unwrap_or(0.0)) + alpha_offset;
    let beta = utils::deg_to_rad(reading.beta.unwrap_or(0.0));
    let gamma = utils::deg_to_rad(reading.gamma.unwrap_or(0.0));
    let orient = utils::deg_to_rad(screen_degrees);

    // intrinsic YXZ: yaw alpha, pitch beta, roll -gamma
    let device = Quat::from_axis_angle(&Vec3::y_axis(), alpha)
        * Quat::from_axis_angle(&Vec3::x_axis(), beta)
        * Quat::from_axis_angle(&Vec3::z_axis(), -gamma);
    let back_camera = Quat::from_axis_angle(&Vec3::x_axis(), -std::f32::consts::FRAC_PI_2);
    let screen = Quat::from_axis_angle(&Vec3::z_axis(), -orient);
    device * back_camera * screen
}

/// Sensor-driven camera adapter
#[derive(Debug, Clone, Default)]
pub struct DeviceOrientation {
    reading: Option<OrientationReading>,
    screen_degrees: f32,
    /// Yaw correction in radians added to alpha
    pub alpha_offset: f32,
    enabled: bool,
}

impl DeviceOrientation {
    /// An enabled adapter with no reading yet
    pub fn new() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    /// Record the latest sensor sample
    pub fn set_reading(&mut self, reading: OrientationReading) {
        self.reading = Some(reading);
    }

    /// Record the screen rotation in degrees (0, 90, -90, 180)
    pub fn set_screen_orientation(&mut self, degrees: f32) {
        self.screen_degrees = degrees;
    }

    /// Start or stop driving the camera
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Whether readings steer the camera
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Current camera rotation, if a reading has arrived
    pub fn orientation(&self) -> Option<Quat> {
        self.reading
            .as_ref()
            .map(|reading| orientation_quaternion(reading, self.screen_degrees, self.alpha_offset))
    }

    /// Aim the camera from the latest reading; `false` if nothing changed
    pub fn update(&self, camera: &mut Camera) -> bool {
        if !self.enabled {
            return false;
        }
        let Some(rotation) = self.orientation() else {
            return false;
        };
        camera.set_orientation(&rotation);
        true
    }
}
