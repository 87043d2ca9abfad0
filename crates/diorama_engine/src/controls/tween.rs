//! Eased camera transitions
//!
//! Position, look-at target and field of view move together over one
//! duration on a quadratic ease-out. The field of view only moves when the
//! destination names one.

use crate::foundation::math::Vec3;
use crate::render::Camera;
use crate::scene::{CameraState, Easing};

/// A running transition between two viewpoints
#[derive(Debug, Clone, PartialEq)]
pub struct CameraTween {
    from: CameraState,
    to: CameraState,
    duration_ms: f32,
    elapsed_ms: f32,
    ease: Easing,
}

impl CameraTween {
    /// Transition from the camera's current state to `to`
    pub fn new(camera: &Camera, to: CameraState, duration_ms: f32) -> Self {
        Self {
            from: CameraState {
                position: camera.position,
                target: camera.target,
                fov: Some(camera.fov_degrees()),
            },
            to,
            duration_ms: duration_ms.max(0.0),
            elapsed_ms: 0.0,
            ease: Easing::QUAD_OUT,
        }
    }

    /// Destination viewpoint
    pub fn destination(&self) -> &CameraState {
        &self.to
    }

    /// Linear progress in `[0, 1]`
    pub fn progress(&self) -> f32 {
        if self.duration_ms <= 0.0 {
            1.0
        } else {
            (self.elapsed_ms / self.duration_ms).min(1.0)
        }
    }

    /// Whether the destination has been reached
    pub fn is_finished(&self) -> bool {
        self.progress() >= 1.0
    }

    /// Interpolated state at the current time
    pub fn sample(&self) -> CameraState {
        let t = self.ease.apply(self.progress());
        let lerp = |a: Vec3, b: Vec3| a + (b - a) * t;
        let fov = match (self.from.fov, self.to.fov) {
            (Some(from), Some(to)) => Some(from + (to - from) * t),
            (from, _) => from,
        };
        CameraState {
            position: lerp(self.from.position, self.to.position),
            target: lerp(self.from.target, self.to.target),
            fov,
        }
    }

    /// Advance by `delta_ms` and write the sampled state to the camera
    ///
    /// Returns `true` once finished. A zero delta rewrites the current state
    /// without moving.
    pub fn advance(&mut self, delta_ms: f32, camera: &mut Camera) -> bool {
        self.elapsed_ms = (self.elapsed_ms + delta_ms.max(0.0)).min(self.duration_ms);
        let state = self.sample();
        camera.position = state.position;
        camera.target = state.target;
        if let Some(fov) = state.fov {
            camera.set_fov_degrees(fov);
        }
        self.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn camera() -> Camera {
        Camera::perspective(Vec3::new(0.0, 0.0, 10.0), 45.0, 1.0, 0.1, 100.0)
    }

    #[test]
    fn test_fov_midpoint_is_between_endpoints() {
        let mut cam = camera();
        let to = CameraState {
            position: Vec3::new(0.0, 0.0, 10.0),
            target: Vec3::zeros(),
            fov: Some(60.0),
        };
        let mut tween = CameraTween::new(&cam, to, 1000.0);
        assert!(!tween.advance(500.0, &mut cam));
        let fov = cam.fov_degrees();
        assert!(fov > 45.0 && fov < 60.0);
        // ease-out: past the linear midpoint
        assert_relative_eq!(fov, 56.25, epsilon = 1e-3);
        assert!(tween.advance(500.0, &mut cam));
        assert_relative_eq!(cam.fov_degrees(), 60.0, epsilon = 1e-3);
    }

    #[test]
    fn test_position_and_target_reach_destination() {
        let mut cam = camera();
        let to = CameraState {
            position: Vec3::new(4.0, 2.0, 0.0),
            target: Vec3::new(1.0, 1.0, 1.0),
            fov: None,
        };
        let mut tween = CameraTween::new(&cam, to, 300.0);
        for _ in 0..9 {
            tween.advance(40.0, &mut cam);
        }
        assert!(tween.advance(100.0, &mut cam));
        assert_relative_eq!(cam.position, Vec3::new(4.0, 2.0, 0.0), epsilon = 1e-5);
        assert_relative_eq!(cam.target, Vec3::new(1.0, 1.0, 1.0), epsilon = 1e-5);
        assert_relative_eq!(cam.fov_degrees(), 45.0, epsilon = 1e-4);
    }

    #[test]
    fn test_zero_duration_jumps_immediately() {
        let mut cam = camera();
        let to = CameraState {
            position: Vec3::new(1.0, 0.0, 0.0),
            target: Vec3::zeros(),
            fov: Some(30.0),
        };
        let mut tween = CameraTween::new(&cam, to, 0.0);
        assert!(tween.advance(0.0, &mut cam));
        assert_relative_eq!(cam.position.x, 1.0);
    }
}
