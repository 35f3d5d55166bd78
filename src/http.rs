//! Blocking HTTP fetcher backed by `ureq`.
//!
//! Requests run on tokio's blocking pool. Multipart bodies are read by a
//! blocking task that forwards chunks until the receiver is dropped, the body
//! ends, or a read fails.

use std::io::Read;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::transport::{ChunkStream, FetchRequest, FrameFetcher};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const READ_TIMEOUT: Duration = Duration::from_secs(10);
const CHUNK_BYTES: usize = 8192;
const CHUNK_QUEUE: usize = 8;

#[derive(Clone)]
pub struct HttpFetcher {
    agent: ureq::Agent,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout_connect(CONNECT_TIMEOUT)
                .timeout_read(READ_TIMEOUT)
                .build(),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Built from the error kind and cause only. `Display` on a transport error
/// prints the request URL, which carries the camera password.
fn network_error(err: ureq::Error) -> TransportError {
    match err {
        ureq::Error::Status(code, _) => TransportError::Network(format!("http status {}", code)),
        ureq::Error::Transport(transport) => {
            let mut message = transport.kind().to_string();
            if let Some(detail) = transport.message() {
                message.push_str(": ");
                message.push_str(detail);
            }
            if let Some(cause) = std::error::Error::source(&transport) {
                message.push_str(": ");
                message.push_str(&cause.to_string());
            }
            TransportError::Network(message)
        }
    }
}

fn join_error(err: tokio::task::JoinError) -> TransportError {
    TransportError::Network(format!("http task failed: {}", err))
}

fn fetch_blocking(agent: &ureq::Agent, url: &str) -> Result<Vec<u8>, TransportError> {
    let response = agent.get(url).call().map_err(network_error)?;
    let mut bytes = Vec::new();
    response
        .into_reader()
        .read_to_end(&mut bytes)
        .map_err(|e| TransportError::Network(format!("read body: {}", e)))?;
    if bytes.is_empty() {
        return Err(TransportError::Network("empty response body".into()));
    }
    Ok(bytes)
}

fn pump(reader: &mut dyn Read, tx: mpsc::Sender<Result<Vec<u8>, TransportError>>) {
    let mut chunk = vec![0u8; CHUNK_BYTES];
    loop {
        let message = match reader.read(&mut chunk) {
            Ok(0) => return,
            Ok(read) => Ok(chunk[..read].to_vec()),
            Err(e) => Err(TransportError::Network(format!("read multipart body: {}", e))),
        };
        let failed = message.is_err();
        if tx.blocking_send(message).is_err() || failed {
            return;
        }
    }
}

#[async_trait]
impl FrameFetcher for HttpFetcher {
    async fn fetch(&self, request: FetchRequest) -> Result<Vec<u8>, TransportError> {
        let agent = self.agent.clone();
        tokio::task::spawn_blocking(move || fetch_blocking(&agent, &request.url))
            .await
            .map_err(join_error)?
    }

    async fn open_multipart(&self, url: &str) -> Result<ChunkStream, TransportError> {
        let agent = self.agent.clone();
        let url = url.to_string();
        let response = tokio::task::spawn_blocking(move || agent.get(&url).call())
            .await
            .map_err(join_error)?
            .map_err(network_error)?;

        let content_type = response.content_type().to_ascii_lowercase();
        if !content_type.starts_with("multipart/") {
            return Err(TransportError::Network(format!(
                "expected a multipart response, got {}",
                content_type
            )));
        }

        let (tx, rx) = mpsc::channel(CHUNK_QUEUE);
        tokio::task::spawn_blocking(move || {
            let mut reader = response.into_reader();
            pump(&mut reader, tx);
        });
        Ok(rx)
    }
}
