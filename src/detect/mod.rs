//! Frame-differencing motion detection.

mod motion;
mod result;

pub use motion::{MotionConfig, MotionDetector};
pub use result::{MotionAnalysis, MotionEvent, SamplePoint};
