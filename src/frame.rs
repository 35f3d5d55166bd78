//! Decoded rasters and the decode capability.
//!
//! - `Frame`: RGBA pixels plus geometry and a per-session sequence number.
//! - `FrameDecoder`: host capability turning compressed bytes into a `Frame`.
//! - `JpegDecoder`: `image`-backed decoder (feature `jpeg-decode`).

use std::sync::Arc;

use crate::error::TransportError;

/// Bytes per pixel of every decoded frame (RGBA).
pub const BYTES_PER_PIXEL: usize = 4;

/// A decoded raster.
///
/// Pixels are tightly packed RGBA rows. The sequence number is assigned by the
/// session when the frame is accepted and increases monotonically for the
/// lifetime of the session.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    pixels: Arc<[u8]>,
    sequence: u64,
}

impl Frame {
    /// Wrap RGBA pixels. Fails when the buffer does not match the geometry.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, TransportError> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(BYTES_PER_PIXEL))
            .ok_or_else(|| TransportError::Decode(format!("{}x{} overflows", width, height)))?;
        if width == 0 || height == 0 {
            return Err(TransportError::Decode("empty frame".into()));
        }
        if pixels.len() != expected {
            return Err(TransportError::Decode(format!(
                "{}x{} RGBA frame needs {} bytes, got {}",
                width,
                height,
                expected,
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            pixels: pixels.into(),
            sequence: 0,
        })
    }

    /// Same raster with a session-assigned sequence number.
    pub(crate) fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("sequence", &self.sequence)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

/// Host decode capability for snapshot and multipart transports.
///
/// Implementations must not retain the input slice beyond the call.
pub trait FrameDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<Frame, TransportError>;
}

/// JPEG decoder backed by the `image` crate.
#[cfg(feature = "jpeg-decode")]
#[derive(Debug, Default, Clone, Copy)]
pub struct JpegDecoder;

#[cfg(feature = "jpeg-decode")]
impl FrameDecoder for JpegDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<Frame, TransportError> {
        use image::GenericImageView;

        if bytes.is_empty() {
            return Err(TransportError::Decode("empty jpeg".into()));
        }
        let image = image::load_from_memory_with_format(bytes, image::ImageFormat::Jpeg)
            .map_err(|e| TransportError::Decode(format!("decode jpeg: {}", e)))?;
        let (width, height) = image.dimensions();
        Frame::new(width, height, image.into_rgba8().into_raw())
    }
}
