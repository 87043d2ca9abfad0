//! Orbit camera controls
//!
//! The camera sits on a sphere around `target`. Azimuth is measured about
//! +Y from +Z, polar from +Y. Dragging one viewport height turns the camera
//! a full circle.

use std::f32::consts::{PI, TAU};

use super::InputLocks;
use crate::foundation::math::Vec3;
use crate::render::Camera;
use crate::scene::ControlsLimits;

const POLAR_EPSILON: f32 = 1e-4;

/// Angle and distance limits
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitLimits {
    /// Minimum azimuth (radians), `-inf` for none
    pub min_azimuth: f32,
    /// Maximum azimuth (radians), `+inf` for none
    pub max_azimuth: f32,
    /// Minimum polar angle (radians)
    pub min_polar: f32,
    /// Maximum polar angle (radians)
    pub max_polar: f32,
    /// Closest zoom distance
    pub min_distance: f32,
    /// Farthest zoom distance
    pub max_distance: f32,
}

impl Default for OrbitLimits {
    fn default() -> Self {
        Self {
            min_azimuth: f32::NEG_INFINITY,
            max_azimuth: f32::INFINITY,
            min_polar: 0.0,
            max_polar: PI,
            min_distance: 0.0,
            max_distance: f32::INFINITY,
        }
    }
}

impl OrbitLimits {
    /// Apply document limits; absent fields leave the current value
    pub fn apply_document(&mut self, limits: &ControlsLimits) {
        if let Some(min) = limits.min_azimuth_angle {
            self.min_azimuth = min;
        }
        if let Some(max) = limits.max_azimuth_angle {
            self.max_azimuth = max;
        }
        if let Some(min) = limits.min_polar_angle {
            self.min_polar = min;
        }
        if let Some(max) = limits.max_polar_angle {
            self.max_polar = max;
        }
    }

    /// Document form; unlimited azimuth bounds are omitted
    pub fn to_document(&self) -> ControlsLimits {
        ControlsLimits {
            min_azimuth_angle: self.min_azimuth.is_finite().then_some(self.min_azimuth),
            max_azimuth_angle: self.max_azimuth.is_finite().then_some(self.max_azimuth),
            min_polar_angle: Some(self.min_polar),
            max_polar_angle: Some(self.max_polar),
        }
    }
}

/// Drag-to-orbit camera controls
#[derive(Debug, Clone)]
pub struct OrbitControls {
    /// Point the camera orbits and looks at
    pub target: Vec3,
    azimuth: f32,
    polar: f32,
    distance: f32,
    /// Angle and distance limits
    pub limits: OrbitLimits,
    /// Multiplier on drag rotation
    pub rotate_speed: f32,
    locks: InputLocks,
    drag_from: Option<(f32, f32)>,
}

impl OrbitControls {
    /// Controls matching the camera's current position and target
    pub fn from_camera(camera: &Camera) -> Self {
        let mut controls = Self {
            target: camera.target,
            azimuth: 0.0,
            polar: PI / 2.0,
            distance: 1.0,
            limits: OrbitLimits::default(),
            rotate_speed: 1.0,
            locks: InputLocks::empty(),
            drag_from: None,
        };
        controls.sync_from_camera(camera);
        controls
    }

    /// Re-derive the orbit from a camera moved by something else
    pub fn sync_from_camera(&mut self, camera: &Camera) {
        self.target = camera.target;
        let offset = camera.position - camera.target;
        self.distance = offset.norm().max(1e-6);
        self.azimuth = offset.x.atan2(offset.z);
        self.polar = (offset.y / self.distance).clamp(-1.0, 1.0).acos();
    }

    /// Azimuth in radians
    pub fn azimuth(&self) -> f32 {
        self.azimuth
    }

    /// Polar angle in radians
    pub fn polar(&self) -> f32 {
        self.polar
    }

    /// Distance from the target
    pub fn distance(&self) -> f32 {
        self.distance
    }

    /// Whether input is accepted (no lock held)
    pub fn is_enabled(&self) -> bool {
        self.locks.is_empty()
    }

    /// Locks currently held
    pub fn locks(&self) -> InputLocks {
        self.locks
    }

    /// Take a lock; an in-progress drag is dropped
    pub fn lock(&mut self, lock: InputLocks) {
        if !self.locks.contains(lock) {
            log::trace!("Orbit lock {:?} taken", lock);
        }
        self.locks.insert(lock);
        self.drag_from = None;
    }

    /// Release a lock
    pub fn unlock(&mut self, lock: InputLocks) {
        self.locks.remove(lock);
    }

    /// Start a rotate drag at a pointer position
    pub fn begin_drag(&mut self, x: f32, y: f32) {
        if self.is_enabled() {
            self.drag_from = Some((x, y));
        }
    }

    /// Whether a rotate drag is in progress
    pub fn is_dragging(&self) -> bool {
        self.drag_from.is_some()
    }

    /// Rotate by the pointer motion since the last call
    pub fn drag_to(&mut self, x: f32, y: f32, viewport_height: u32) -> bool {
        let Some((last_x, last_y)) = self.drag_from else {
            return false;
        };
        if !self.is_enabled() {
            self.drag_from = None;
            return false;
        }
        let scale = TAU / viewport_height.max(1) as f32 * self.rotate_speed;
        self.rotate((x - last_x) * scale, (y - last_y) * scale);
        self.drag_from = Some((x, y));
        true
    }

    /// Finish the rotate drag
    pub fn end_drag(&mut self) {
        self.drag_from = None;
    }

    /// Turn left by `left` and up by `up` radians, within limits
    pub fn rotate(&mut self, left: f32, up: f32) {
        self.azimuth -= left;
        self.polar -= up;
        self.clamp();
    }

    /// Scale the distance to the target; factors above 1 move away
    pub fn dolly(&mut self, factor: f32) {
        if factor > 0.0 && self.is_enabled() {
            self.distance *= factor;
            self.clamp();
        }
    }

    fn clamp(&mut self) {
        let limits = &self.limits;
        if limits.min_azimuth.is_finite() || limits.max_azimuth.is_finite() {
            self.azimuth = self.azimuth.clamp(limits.min_azimuth.min(limits.max_azimuth), limits.max_azimuth);
        }
        let min_polar = limits.min_polar.max(POLAR_EPSILON);
        let max_polar = limits.max_polar.min(PI - POLAR_EPSILON).max(min_polar);
        self.polar = self.polar.clamp(min_polar, max_polar);
        let max_distance = limits.max_distance.max(limits.min_distance);
        self.distance = self.distance.clamp(limits.min_distance.max(1e-6), max_distance);
    }

    /// Offset from the target to the camera
    pub fn offset(&self) -> Vec3 {
        let (sin_polar, cos_polar) = self.polar.sin_cos();
        let (sin_azimuth, cos_azimuth) = self.azimuth.sin_cos();
        Vec3::new(sin_polar * sin_azimuth, cos_polar, sin_polar * cos_azimuth) * self.distance
    }

    /// Place the camera; does nothing while locked
    pub fn update(&mut self, camera: &mut Camera) -> bool {
        if !self.is_enabled() {
            return false;
        }
        self.clamp();
        camera.position = self.target + self.offset();
        camera.target = self.target;
        true
    }
}
