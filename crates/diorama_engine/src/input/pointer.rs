//! Pointer state and click disambiguation
//!
//! A press that is released within a few pixels of where it started is a
//! click; anything else is a drag that belongs to the orbit camera. A second
//! click on the same node inside the double-click window is a double-click.

use crate::config::PickingConfig;
use crate::scene::NodeId;

/// Pointer position and the viewport it lives in
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerState {
    /// Horizontal position in pixels from the left
    pub x: f32,
    /// Vertical position in pixels from the top
    pub y: f32,
    /// Viewport width in pixels
    pub viewport_width: u32,
    /// Viewport height in pixels
    pub viewport_height: u32,
}

impl PointerState {
    /// Pointer at the top-left corner of a viewport
    pub fn new(viewport_width: u32, viewport_height: u32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            viewport_width,
            viewport_height,
        }
    }

    /// Record a new position
    pub fn update_position(&mut self, x: f32, y: f32) {
        self.x = x;
        self.y = y;
    }

    /// Track viewport resizes
    pub fn update_viewport(&mut self, width: u32, height: u32) {
        self.viewport_width = width;
        self.viewport_height = height;
    }

    /// Normalized device coordinates of the pointer
    ///
    /// x runs -1 (left) to 1 (right), y runs -1 (top) to 1 (bottom).
    pub fn to_ndc(&self) -> (f32, f32) {
        let width = self.viewport_width.max(1) as f32;
        let height = self.viewport_height.max(1) as f32;
        (self.x / width * 2.0 - 1.0, self.y / height * 2.0 - 1.0)
    }

    /// Pixel under the pointer, `None` outside the viewport
    pub fn pixel(&self) -> Option<(u32, u32)> {
        if self.x < 0.0 || self.y < 0.0 {
            return None;
        }
        let (px, py) = (self.x.floor() as u32, self.y.floor() as u32);
        (px < self.viewport_width && py < self.viewport_height).then_some((px, py))
    }
}

/// Where a press is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerPhase {
    /// No button held
    Idle,
    /// Button held since `(x, y)`
    Pressed {
        /// Press position
        x: f32,
        /// Press position
        y: f32,
    },
}

/// Classification of a completed press
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerGesture {
    /// Released near the press point
    Click {
        /// Release position
        x: f32,
        /// Release position
        y: f32,
    },
    /// Released away from the press point
    Drag,
    /// Release without a matching press
    None,
}

/// Splits presses into clicks and drags
#[derive(Debug, Clone)]
pub struct ClickClassifier {
    phase: PointerPhase,
    threshold_px: f32,
}

impl ClickClassifier {
    /// Classifier with a maximum click travel in pixels
    pub fn new(threshold_px: f32) -> Self {
        Self {
            phase: PointerPhase::Idle,
            threshold_px: threshold_px.max(0.0),
        }
    }

    /// Thresholds from configuration
    pub fn from_config(config: &PickingConfig) -> Self {
        Self::new(config.click_threshold_px)
    }

    /// Current phase
    pub fn phase(&self) -> PointerPhase {
        self.phase
    }

    /// Record a press
    pub fn pointer_down(&mut self, x: f32, y: f32) {
        self.phase = PointerPhase::Pressed { x, y };
    }

    /// Whether a held pointer has moved far enough to be a drag so far
    pub fn is_dragging(&self, x: f32, y: f32) -> bool {
        match self.phase {
            PointerPhase::Pressed { x: sx, y: sy } => (x - sx).hypot(y - sy) > self.threshold_px,
            PointerPhase::Idle => false,
        }
    }

    /// Classify the release and return to idle
    pub fn pointer_up(&mut self, x: f32, y: f32) -> PointerGesture {
        let gesture = match self.phase {
            PointerPhase::Idle => PointerGesture::None,
            PointerPhase::Pressed { x: sx, y: sy } => {
                if (x - sx).hypot(y - sy) <= self.threshold_px {
                    PointerGesture::Click { x, y }
                } else {
                    PointerGesture::Drag
                }
            }
        };
        self.phase = PointerPhase::Idle;
        gesture
    }

    /// Forget any press in progress
    pub fn reset(&mut self) {
        self.phase = PointerPhase::Idle;
    }
}

/// Outcome of registering a click with the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickKind {
    /// First click, or a click on something else
    Single,
    /// Second click on the same node within the window
    Double,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ClickMemory {
    Idle,
    Armed { target: NodeId, at_ms: f64 },
}

/// Detects double-clicks on the same picked node
#[derive(Debug, Clone)]
pub struct ClickTracker {
    memory: ClickMemory,
    window_ms: f64,
}

impl ClickTracker {
    /// Tracker with a double-click window in milliseconds
    pub fn new(window_ms: f64) -> Self {
        Self {
            memory: ClickMemory::Idle,
            window_ms,
        }
    }

    /// Thresholds from configuration
    pub fn from_config(config: &PickingConfig) -> Self {
        Self::new(config.double_click_ms)
    }

    /// Register a click on `target` (or on nothing) at `now_ms`
    pub fn register(&mut self, target: Option<NodeId>, now_ms: f64) -> ClickKind {
        let kind = match (self.memory, target) {
            (ClickMemory::Armed { target: last, at_ms }, Some(current))
                if last == current && now_ms - at_ms <= self.window_ms =>
            {
                ClickKind::Double
            }
            _ => ClickKind::Single,
        };
        self.memory = match (kind, target) {
            (ClickKind::Single, Some(target)) => ClickMemory::Armed { target, at_ms: now_ms },
            _ => ClickMemory::Idle,
        };
        kind
    }

    /// Forget the last click
    pub fn reset(&mut self) {
        self.memory = ClickMemory::Idle;
    }
}
