//! Pointer input and picking
//!
//! Raw pointer events are classified into clicks and drags by
//! [`ClickClassifier`]; clicks are resolved to scene nodes by the id-buffer
//! [`Picker`] and checked for double-clicks by [`ClickTracker`].

pub mod pointer;
pub mod picking;

pub use pointer::{ClickClassifier, ClickKind, ClickTracker, PointerGesture, PointerPhase, PointerState};
pub use picking::{PickHit, Picker};

/// A pointer event on the render surface, in pixels from the top-left corner
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    /// Primary button pressed
    Down {
        /// Horizontal position
        x: f32,
        /// Vertical position
        y: f32,
    },
    /// Pointer moved
    Move {
        /// Horizontal position
        x: f32,
        /// Vertical position
        y: f32,
    },
    /// Primary button released
    Up {
        /// Horizontal position
        x: f32,
        /// Vertical position
        y: f32,
    },
}

impl PointerEvent {
    /// Position carried by the event
    pub fn position(&self) -> (f32, f32) {
        match *self {
            Self::Down { x, y } | Self::Move { x, y } | Self::Up { x, y } => (x, y),
        }
    }
}
