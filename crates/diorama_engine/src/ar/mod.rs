//! Augmented-reality placement
//!
//! [`ArManager`] picks a backend once per session start. With a native
//! [`XrPlatform`] a reticle follows the platform's surface hit-test and a
//! select input drops the content group onto it. Without one, the camera
//! feed from a [`CameraStream`] becomes the background, an
//! [`OrientationSensor`] steers the camera, and content is placed either in
//! front of the viewer or on a printed square marker found by a
//! [`MarkerDetector`].
//!
//! The platform services are traits so a host can plug in its own device
//! layer; tests drive them with scripted fakes.

pub mod marker;
pub mod session;

pub use marker::{estimate_marker_pose, MarkerCorners, MarkerPose, SquareMarkerDetector};
pub use session::{level_facing, ArBackend, ArManager, ArPlatforms, PlacementMode};

use std::sync::Arc;

use thiserror::Error;

use crate::controls::OrientationReading;
use crate::foundation::math::Transform;
use crate::render::Texture;

/// AR session errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArError {
    /// Neither a native session nor a camera stream is available
    #[error("AR is not supported on this device")]
    NotSupported,

    /// The native session request was refused
    #[error("AR session request failed: {0}")]
    SessionFailed(String),

    /// The camera could not be opened
    #[error("Camera unavailable: {0}")]
    CameraUnavailable(String),

    /// The orientation sensor request failed outright
    #[error("Orientation sensor unavailable: {0}")]
    SensorUnavailable(String),

    /// An operation needs a running session
    #[error("No AR session is running")]
    NotActive,
}

impl ArError {
    /// Short message suitable for showing to the user
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::NotSupported => "AR is not available on this device.",
            Self::SessionFailed(_) => "Could not start AR. Showing the normal view instead.",
            Self::CameraUnavailable(_) => "Camera access was denied or is unavailable.",
            Self::SensorUnavailable(_) => "Motion sensors are unavailable; the scene stays where it is.",
            Self::NotActive => "AR is not running.",
        }
    }
}

/// Native AR runtime with surface hit-testing
pub trait XrPlatform {
    /// Whether an immersive AR session can be requested
    fn is_supported(&self) -> bool;

    /// Start a session with the hit-test feature
    ///
    /// # Errors
    /// [`ArError::SessionFailed`] when the runtime refuses.
    fn request_session(&mut self) -> Result<(), ArError>;

    /// Best surface pose under the view centre for the current frame
    fn hit_pose(&mut self) -> Option<Transform>;

    /// Number of select inputs since the last call
    fn take_select_events(&mut self) -> usize;

    /// End the session
    fn end_session(&mut self);
}

/// Rear camera video feed
pub trait CameraStream {
    /// Open the stream
    ///
    /// # Errors
    /// [`ArError::CameraUnavailable`] when permission is denied or no camera exists.
    fn open(&mut self) -> Result<(), ArError>;

    /// Most recent RGBA frame, if one has arrived
    fn latest_frame(&mut self) -> Option<Arc<Texture>>;

    /// Stop the stream
    fn close(&mut self);
}

/// Device orientation sensor
pub trait OrientationSensor {
    /// Whether readings need an explicit user-granted permission
    fn needs_permission(&self) -> bool;

    /// Ask for permission; `Ok(false)` when the user declines
    ///
    /// # Errors
    /// [`ArError::SensorUnavailable`] when the request itself fails.
    fn request_permission(&mut self) -> Result<bool, ArError>;

    /// Most recent reading
    fn latest_reading(&mut self) -> Option<OrientationReading>;

    /// Screen rotation in degrees
    fn screen_orientation(&self) -> f32;
}

/// Finds a square fiducial marker in a video frame
pub trait MarkerDetector {
    /// Marker corners in frame pixels, if one is visible
    fn detect(&mut self, frame: &Texture) -> Option<MarkerCorners>;
}
