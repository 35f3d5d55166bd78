//! Error types for the viewer core.
//!
//! Transport handlers normalize every local failure into a [`TransportError`]
//! before it reaches the session. The session never returns these to its
//! caller; they surface as `Error` events plus a state transition.
//! [`PlayerError`] covers failures the host sees directly from the facade.

use crate::endpoint::Transport;

/// Failure of a single transport attempt.
///
/// - **Recoverable**: [`ConnectTimeout`](Self::ConnectTimeout),
///   [`Network`](Self::Network), [`Decode`](Self::Decode). These drive
///   auto-reconnect when a reconnect interval is configured.
/// - **Fatal to the attempt**: [`Unsupported`](Self::Unsupported). Reported to
///   the negotiator, never retried by the session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("{transport} connect timed out after {waited_ms} ms")]
    ConnectTimeout { transport: Transport, waited_ms: u64 },

    #[error("network error: {0}")]
    Network(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("transport {0} is not supported by this host")]
    Unsupported(Transport),
}

impl TransportError {
    /// Whether the session may retry after this failure.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Unsupported(_))
    }
}

/// Errors returned across the player facade.
#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    /// A required host resource (the render surface) was not provided.
    #[error("resource unavailable: {0}")]
    ResourceUnavailable(&'static str),

    #[error("invalid camera endpoint: {0}")]
    InvalidEndpoint(String),

    /// Every candidate transport failed during one negotiation.
    #[error("no compatible transport (tried {})", format_attempts(.attempts))]
    NoCompatibleTransport { attempts: Vec<Transport> },

    /// The operation needs a connected stream.
    #[error("not connected")]
    NotConnected,

    #[error("camera control failed: {0}")]
    Control(String),

    #[error("recording {action} failed: {message}")]
    Recording {
        action: &'static str,
        message: String,
    },

    #[error("render surface error: {0}")]
    Surface(String),
}

fn format_attempts(attempts: &[Transport]) -> String {
    if attempts.is_empty() {
        return "nothing".to_string();
    }
    attempts
        .iter()
        .map(|t| t.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Convenience alias for `Result<T, PlayerError>`.
pub type Result<T> = std::result::Result<T, PlayerError>;
