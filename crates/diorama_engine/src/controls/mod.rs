//! Camera controls
//!
//! [`OrbitControls`] turns pointer drags into camera motion around a target.
//! [`CameraController`] owns the recorded tour and runs eased transitions
//! ([`CameraTween`]) between viewpoints. [`DeviceOrientation`] drives the
//! camera from a phone's orientation sensor in webcam AR.

pub mod orbit;
pub mod tween;
pub mod camera_controller;
pub mod device_orientation;

pub use orbit::{OrbitControls, OrbitLimits};
pub use tween::CameraTween;
pub use camera_controller::CameraController;
pub use device_orientation::{orientation_quaternion, DeviceOrientation, OrientationReading};

use bitflags::bitflags;

bitflags! {
    /// Reasons the orbit controls are currently ignoring input
    ///
    /// The controls accept input only while no lock is held, so each owner
    /// releases its own lock without re-enabling input another owner still
    /// needs disabled.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct InputLocks: u8 {
        /// A gizmo handle is being dragged
        const GIZMO = 1 << 0;
        /// A camera transition is running
        const TWEEN = 1 << 1;
        /// Webcam AR drives the camera from the orientation sensor
        const AR = 1 << 2;
        /// Disabled by the embedding application
        const USER = 1 << 3;
    }
}
