//! Camera viewer player core.
//!
//! This crate implements the part of an IP camera viewer that has to cope with
//! heterogeneous and unreliable camera transports.
//!
//! # Architecture
//!
//! 1. **TransportNegotiator**: tries transports in a configured order until one
//!    connects.
//! 2. **StreamSession**: owns one connection (handler task, timers, render
//!    surface) and its reconnect policy.
//! 3. **MotionDetector**: frame differencing against the previous frame,
//!    producing discrete start/stop events.
//! 4. **StatusReporter**: maps every internal transition to one host event.
//!
//! Codec decode, HTTP, media playback, rendering and camera control are host
//! capabilities injected through [`PlayerBuilder`].
//!
//! # Module Structure
//!
//! - `endpoint`: camera endpoints, transports and stream URLs
//! - `transport`: capability traits and the per-transport handlers
//! - `session`: the connection state machine
//! - `negotiate`: transport negotiation
//! - `detect`: motion detection
//! - `status`: host events
//! - `control`: PTZ and recording
//! - `player`: host-facing facade

pub mod config;
pub mod control;
pub mod detect;
pub mod endpoint;
pub mod error;
pub mod frame;
#[cfg(feature = "http")]
pub mod http;
pub mod negotiate;
pub mod player;
pub mod session;
pub mod status;
pub mod surface;
pub mod transport;

pub use config::PlayerConfig;
pub use control::{
    ControlChannel, ControlCommand, PtzAction, PtzDirection, RecordAction, Recorder,
};
pub use detect::{MotionAnalysis, MotionConfig, MotionDetector, MotionEvent, SamplePoint};
pub use endpoint::{CameraEndpoint, Credentials, Transport, TransportPreference};
pub use error::{PlayerError, TransportError};
#[cfg(feature = "jpeg-decode")]
pub use frame::JpegDecoder;
pub use frame::{Frame, FrameDecoder};
#[cfg(feature = "http")]
pub use http::HttpFetcher;
pub use negotiate::TransportNegotiator;
pub use player::{Player, PlayerBuilder};
pub use session::{SessionState, StreamSession, StreamStats};
pub use status::{EventStream, PlayerEvent, StatusReporter};
pub use surface::{HeadlessSurface, RenderSurface};
pub use transport::{
    Capabilities, ChunkStream, FetchRequest, FrameFetcher, MediaPipeline, PipelineSignal,
};
