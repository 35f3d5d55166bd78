//! Rendering surface capability.
//!
//! The surface belongs to the session and only frames from the current
//! handler generation reach it. When the transport changes the surface is
//! cleared before the next handler is attached.

use crate::detect::SamplePoint;
use crate::frame::Frame;

/// Host-provided output for decoded frames.
pub trait RenderSurface: Send {
    fn present(&mut self, frame: &Frame);

    /// Highlight changed motion samples over the last presented frame.
    fn mark_motion(&mut self, marks: &[SamplePoint]);

    /// Remove any frame and overlay.
    fn clear(&mut self);

    fn set_fullscreen(&mut self, enabled: bool) -> Result<(), String>;
}

/// Surface that only logs what it would draw. Used by the CLI.
#[derive(Debug, Default)]
pub struct HeadlessSurface {
    presented: u64,
    last_dims: Option<(u32, u32)>,
    fullscreen: bool,
}

impl HeadlessSurface {
    pub fn presented(&self) -> u64 {
        self.presented
    }

    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }
}

impl RenderSurface for HeadlessSurface {
    fn present(&mut self, frame: &Frame) {
        self.presented += 1;
        if self.last_dims != Some(frame.dimensions()) {
            log::info!("resolution {}x{}", frame.width(), frame.height());
            self.last_dims = Some(frame.dimensions());
        }
    }

    fn mark_motion(&mut self, marks: &[SamplePoint]) {
        if !marks.is_empty() {
            log::trace!("{} motion marks", marks.len());
        }
    }

    fn clear(&mut self) {
        self.last_dims = None;
    }

    fn set_fullscreen(&mut self, enabled: bool) -> Result<(), String> {
        self.fullscreen = enabled;
        Ok(())
    }
}
