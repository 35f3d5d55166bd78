/// Motion state change. At most one is produced per frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MotionEvent {
    Started,
    Stopped,
}

/// Pixel coordinate of a changed sample, used for the overlay.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SamplePoint {
    pub x: u32,
    pub y: u32,
}

/// Result of comparing one frame against its predecessor.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MotionAnalysis {
    /// Samples whose RGB difference exceeded the channel threshold.
    pub changed_samples: u32,
    /// Samples inspected.
    pub sampled: u32,
    /// Pixels in the frame. The trigger ratio is applied to this, not `sampled`.
    pub total_pixels: u64,
    /// Motion state after this frame.
    pub active: bool,
    /// Positions of the changed samples.
    pub marks: Vec<SamplePoint>,
}
