//! Transport handlers and the capabilities they consume.
//!
//! Each connect attempt runs exactly one handler task. Handlers never touch
//! session state: they report through a [`HandlerContext`] whose signals are
//! tagged with the generation the handler was started for. The session drops
//! anything tagged with an older generation.
//!
//! Handler responsibilities:
//! - Normalize every local failure into a [`TransportError`]
//! - Send `Ready` (or a first frame) once the stream is live
//! - Stop after reporting a failure
//!
//! Handlers MUST NOT:
//! - Retry after a fatal failure (retry policy lives in the session)
//! - Write to the render surface

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::JpegSettings;
use crate::endpoint::{CameraEndpoint, Transport};
use crate::error::TransportError;
use crate::frame::{Frame, FrameDecoder};

mod jpeg;
mod mjpeg;
mod pipeline;

pub use mjpeg::MultipartParser;

/// Receiving side of a multipart body, one raw chunk per message.
pub type ChunkStream = mpsc::Receiver<Result<Vec<u8>, TransportError>>;

/// One request issued through a [`FrameFetcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub transport: Transport,
    /// Cache-busting token already embedded in `url`, if any.
    pub cache_token: Option<u64>,
}

/// Host HTTP capability used by the MJPEG and JPEG transports.
#[async_trait]
pub trait FrameFetcher: Send + Sync {
    /// Fetch one complete body.
    async fn fetch(&self, request: FetchRequest) -> Result<Vec<u8>, TransportError>;

    /// Open a long-lived multipart response. Dropping the returned stream
    /// must release the underlying connection.
    async fn open_multipart(&self, url: &str) -> Result<ChunkStream, TransportError>;
}

/// Signals produced by the host media pipeline for HLS and RTSP playback.
#[derive(Debug, Clone)]
pub enum PipelineSignal {
    /// Playback started.
    Playing,
    /// Optional decoded frame, used for motion analysis.
    Frame(Frame),
    MediaError(String),
    NetworkError(String),
    /// The stream ended on the remote side.
    Ended,
}

/// Host media pipeline (HLS player, WebRTC bridge).
pub trait MediaPipeline: Send + Sync {
    fn supports(&self, transport: Transport) -> bool;

    /// Attach to `url`. Dropping the returned receiver detaches the pipeline.
    fn attach(
        &self,
        url: &str,
        transport: Transport,
    ) -> Result<mpsc::Receiver<PipelineSignal>, TransportError>;
}

/// Host capabilities injected at construction time.
#[derive(Clone, Default)]
pub struct Capabilities {
    pub fetcher: Option<Arc<dyn FrameFetcher>>,
    pub pipeline: Option<Arc<dyn MediaPipeline>>,
    pub decoder: Option<Arc<dyn FrameDecoder>>,
}

impl std::fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capabilities")
            .field("fetcher", &self.fetcher.is_some())
            .field("pipeline", &self.pipeline.is_some())
            .field("decoder", &self.decoder.is_some())
            .finish()
    }
}

#[derive(Debug)]
pub(crate) enum HandlerSignal {
    Ready,
    Frame(Frame),
    Failed(TransportError),
}

#[derive(Debug)]
pub(crate) enum SessionSignal {
    Handler(HandlerSignal),
    AttemptTimeout,
    ReconnectDue,
}

#[derive(Debug)]
pub(crate) struct Tagged {
    pub generation: u64,
    pub signal: SessionSignal,
}

/// Handle a handler uses to report back to its session.
#[derive(Debug, Clone)]
pub(crate) struct HandlerContext {
    generation: u64,
    tx: mpsc::UnboundedSender<Tagged>,
}

impl HandlerContext {
    pub(crate) fn new(generation: u64, tx: mpsc::UnboundedSender<Tagged>) -> Self {
        Self { generation, tx }
    }

    /// Returns false once the session is gone.
    pub(crate) fn send(&self, signal: HandlerSignal) -> bool {
        self.tx
            .send(Tagged {
                generation: self.generation,
                signal: SessionSignal::Handler(signal),
            })
            .is_ok()
    }

    pub(crate) fn fail(&self, err: TransportError) {
        self.send(HandlerSignal::Failed(err));
    }
}

/// Everything a handler needs besides its context.
#[derive(Clone)]
pub(crate) struct HandlerSpec {
    pub endpoint: CameraEndpoint,
    pub proxy: Option<String>,
    pub capabilities: Capabilities,
    pub jpeg: JpegSettings,
    pub mjpeg_liveness: Duration,
}

impl HandlerSpec {
    fn url(&self, transport: Transport, cache_token: Option<u64>) -> Result<String, TransportError> {
        self.endpoint
            .stream_url(transport, cache_token, self.proxy.as_deref())
            .map_err(|e| TransportError::Network(e.to_string()))
    }
}

/// Start the handler for `transport`.
///
/// Fails synchronously with `Unsupported` when the host lacks a capability
/// the transport needs.
pub(crate) fn spawn_handler(
    transport: Transport,
    spec: HandlerSpec,
    ctx: HandlerContext,
) -> Result<JoinHandle<()>, TransportError> {
    let caps = &spec.capabilities;
    match transport {
        Transport::Hls | Transport::RtspWebRtc => {
            let pipeline = caps
                .pipeline
                .clone()
                .filter(|p| p.supports(transport))
                .ok_or(TransportError::Unsupported(transport))?;
            let url = spec.url(transport, None)?;
            let signals = pipeline.attach(&url, transport)?;
            Ok(tokio::spawn(pipeline::run(signals, ctx)))
        }
        Transport::Mjpeg => {
            let (fetcher, decoder) = http_caps(caps, transport)?;
            let url = spec.url(transport, None)?;
            Ok(tokio::spawn(mjpeg::run(
                fetcher,
                decoder,
                url,
                spec.mjpeg_liveness,
                ctx,
            )))
        }
        Transport::JpegPoll => {
            let (fetcher, decoder) = http_caps(caps, transport)?;
            Ok(tokio::spawn(jpeg::run(fetcher, decoder, spec, ctx)))
        }
    }
}

fn http_caps(
    caps: &Capabilities,
    transport: Transport,
) -> Result<(Arc<dyn FrameFetcher>, Arc<dyn FrameDecoder>), TransportError> {
    match (caps.fetcher.clone(), caps.decoder.clone()) {
        (Some(fetcher), Some(decoder)) => Ok((fetcher, decoder)),
        _ => Err(TransportError::Unsupported(transport)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(capabilities: Capabilities) -> HandlerSpec {
        HandlerSpec {
            endpoint: CameraEndpoint::new("cam.local").unwrap(),
            proxy: None,
            capabilities,
            jpeg: crate::config::PlayerConfig::default().jpeg,
            mjpeg_liveness: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn missing_capabilities_are_unsupported() {
        let (tx, _rx) = mpsc::unbounded_channel();
        for transport in Transport::PRIORITY {
            let err = spawn_handler(
                transport,
                spec(Capabilities::default()),
                HandlerContext::new(1, tx.clone()),
            )
            .unwrap_err();
            assert_eq!(err, TransportError::Unsupported(transport));
        }
    }

    #[tokio::test]
    async fn context_tags_generation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ctx = HandlerContext::new(42, tx);
        assert!(ctx.send(HandlerSignal::Ready));
        let tagged = rx.recv().await.unwrap();
        assert_eq!(tagged.generation, 42);
        assert!(matches!(
            tagged.signal,
            SessionSignal::Handler(HandlerSignal::Ready)
        ));
        drop(rx);
        assert!(!ctx.send(HandlerSignal::Ready));
    }
}
