//! MJPEG over a long-lived `multipart/x-mixed-replace` response.
//!
//! Part boundaries are not trusted: JPEG images are cut out of the body by
//! their SOI/EOI markers, which also tolerates cameras that send malformed
//! part headers.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{timeout, timeout_at, Instant};

use super::{FrameFetcher, HandlerContext, HandlerSignal};
use crate::endpoint::Transport;
use crate::error::TransportError;
use crate::frame::FrameDecoder;

const MAX_JPEG_BYTES: usize = 5 * 1024 * 1024;

/// Incremental JPEG extractor for multipart bodies.
#[derive(Debug, Default)]
pub struct MultipartParser {
    buffer: Vec<u8>,
}

impl MultipartParser {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(64 * 1024),
        }
    }

    /// Append a body chunk and return every JPEG it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.extend_from_slice(chunk);
        let mut images = Vec::new();
        while let Some((start, end)) = find_jpeg_bounds(&self.buffer) {
            images.push(self.buffer[start..end].to_vec());
            self.buffer.drain(..end);
        }
        if self.buffer.len() > MAX_JPEG_BYTES * 2 {
            // Keep the tail so a marker split across chunks survives.
            let drain_len = self.buffer.len() - 2;
            self.buffer.drain(..drain_len);
        }
        images
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

fn find_jpeg_bounds(buffer: &[u8]) -> Option<(usize, usize)> {
    let start = buffer.windows(2).position(|w| w == [0xFF, 0xD8])?;
    let end = buffer[start + 2..]
        .windows(2)
        .position(|w| w == [0xFF, 0xD9])?;
    Some((start, start + 2 + end + 2))
}

fn timed_out(liveness: Duration) -> TransportError {
    TransportError::ConnectTimeout {
        transport: Transport::Mjpeg,
        waited_ms: liveness.as_millis() as u64,
    }
}

/// Stream frames until the body ends, stalls past `liveness`, or fails.
pub(super) async fn run(
    fetcher: Arc<dyn FrameFetcher>,
    decoder: Arc<dyn FrameDecoder>,
    url: String,
    liveness: Duration,
    ctx: HandlerContext,
) {
    let mut chunks = match timeout(liveness, fetcher.open_multipart(&url)).await {
        Ok(Ok(chunks)) => chunks,
        Ok(Err(err)) => return ctx.fail(err),
        Err(_) => return ctx.fail(timed_out(liveness)),
    };

    let mut parser = MultipartParser::new();
    let mut deadline = Instant::now() + liveness;
    loop {
        let chunk = match timeout_at(deadline, chunks.recv()).await {
            Err(_) => return ctx.fail(timed_out(liveness)),
            Ok(None) => return ctx.fail(TransportError::Network("mjpeg stream ended".into())),
            Ok(Some(Err(err))) => return ctx.fail(err),
            Ok(Some(Ok(chunk))) => chunk,
        };
        for image in parser.push(&chunk) {
            let frame = match decoder.decode(&image) {
                Ok(frame) => frame,
                Err(err) => return ctx.fail(err),
            };
            if !ctx.send(HandlerSignal::Frame(frame)) {
                return;
            }
            deadline = Instant::now() + liveness;
        }
    }
}
