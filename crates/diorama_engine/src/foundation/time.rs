//! Frame timing

/// Frame clock driven by the deltas handed to the engine
///
/// The engine never samples wall time itself; hosts (a display refresh
/// callback, an AR session frame, a test) decide the delta.
#[derive(Debug, Clone, Default)]
pub struct FrameClock {
    delta_time: f32,
    total_time: f64,
    frame_count: u64,
}

impl FrameClock {
    /// Create a new clock at time zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance by `delta` seconds (negative deltas are treated as zero)
    pub fn advance(&mut self, delta: f32) {
        self.delta_time = delta.max(0.0);
        self.total_time += f64::from(self.delta_time);
        self.frame_count += 1;
    }

    /// Time since the last frame in seconds
    pub fn delta_time(&self) -> f32 {
        self.delta_time
    }

    /// Total elapsed time in seconds
    pub fn total_time(&self) -> f64 {
        self.total_time
    }

    /// Total elapsed time in milliseconds
    pub fn total_millis(&self) -> f64 {
        self.total_time * 1000.0
    }

    /// Number of frames advanced so far
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}
