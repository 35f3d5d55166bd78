use crate::detect::result::{MotionAnalysis, MotionEvent, SamplePoint};
use crate::frame::{Frame, BYTES_PER_PIXEL};

/// Tuning for [`MotionDetector`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MotionConfig {
    /// Inspect every Nth pixel.
    pub sample_stride: usize,
    /// A sample changed when |dR| + |dG| + |dB| is strictly above this.
    pub channel_threshold: u32,
    /// Motion is active when changed samples strictly exceed this share of
    /// the total pixel count, in basis points (100 = 1%).
    pub trigger_basis_points: u32,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            sample_stride: 10,
            channel_threshold: 30,
            trigger_basis_points: 100,
        }
    }
}

/// Sliding-window motion detector.
///
/// Keeps exactly one baseline (the previous frame) and compares each new
/// frame against it. The current frame always replaces the baseline after
/// evaluation, so slow drift is absorbed instead of accumulating.
#[derive(Debug)]
pub struct MotionDetector {
    config: MotionConfig,
    baseline: Vec<u8>,
    baseline_dims: Option<(u32, u32)>,
    active: bool,
}

impl MotionDetector {
    pub fn new(config: MotionConfig) -> Self {
        Self {
            config: MotionConfig {
                sample_stride: config.sample_stride.max(1),
                ..config
            },
            baseline: Vec::new(),
            baseline_dims: None,
            active: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn has_baseline(&self) -> bool {
        self.baseline_dims.is_some()
    }

    /// Feed one frame. Returns the state change it caused, if any.
    pub fn process(&mut self, frame: &Frame) -> Option<MotionEvent> {
        self.analyze(frame).0
    }

    /// Feed one frame and also return the comparison details.
    ///
    /// The analysis is `None` when the frame only established a baseline
    /// (first frame, or first frame after a geometry change).
    pub fn analyze(&mut self, frame: &Frame) -> (Option<MotionEvent>, Option<MotionAnalysis>) {
        if self.baseline_dims != Some(frame.dimensions()) {
            if let Some((w, h)) = self.baseline_dims {
                log::debug!(
                    "motion baseline reset: {}x{} -> {}x{}",
                    w,
                    h,
                    frame.width(),
                    frame.height()
                );
            }
            self.rebaseline(frame);
            return (None, None);
        }

        let analysis = self.compare(frame);
        self.baseline.copy_from_slice(frame.pixels());

        let event = match (self.active, analysis.active) {
            (false, true) => Some(MotionEvent::Started),
            (true, false) => Some(MotionEvent::Stopped),
            _ => None,
        };
        self.active = analysis.active;
        if event.is_some() {
            log::debug!(
                "motion {:?}: {} of {} samples changed (frame {})",
                event,
                analysis.changed_samples,
                analysis.sampled,
                frame.sequence()
            );
        }
        (event, Some(analysis))
    }

    /// Drop the baseline. Reports `Stopped` when motion was active so the host
    /// never keeps a stale motion indicator.
    pub fn reset(&mut self) -> Option<MotionEvent> {
        self.baseline.clear();
        self.baseline.shrink_to_fit();
        self.baseline_dims = None;
        if std::mem::replace(&mut self.active, false) {
            Some(MotionEvent::Stopped)
        } else {
            None
        }
    }

    fn rebaseline(&mut self, frame: &Frame) {
        self.baseline.clear();
        self.baseline.extend_from_slice(frame.pixels());
        self.baseline_dims = Some(frame.dimensions());
    }

    fn compare(&self, frame: &Frame) -> MotionAnalysis {
        let current = frame.pixels();
        let width = frame.width() as usize;
        let step = self.config.sample_stride * BYTES_PER_PIXEL;
        let threshold = self.config.channel_threshold;

        let mut changed = 0u32;
        let mut sampled = 0u32;
        let mut marks = Vec::new();
        for offset in (0..current.len()).step_by(step) {
            sampled += 1;
            let diff: u32 = (0..3)
                .map(|c| current[offset + c].abs_diff(self.baseline[offset + c]) as u32)
                .sum();
            if diff > threshold {
                changed += 1;
                let pixel = offset / BYTES_PER_PIXEL;
                marks.push(SamplePoint {
                    x: (pixel % width) as u32,
                    y: (pixel / width) as u32,
                });
            }
        }

        let total_pixels = frame.pixel_count();
        let active = changed as u64 * 10_000 > total_pixels * self.config.trigger_basis_points as u64;
        MotionAnalysis {
            changed_samples: changed,
            sampled,
            total_pixels,
            active,
            marks,
        }
    }
}

impl Default for MotionDetector {
    fn default() -> Self {
        Self::new(MotionConfig::default())
    }
}
