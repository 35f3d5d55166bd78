//! In-process fakes for the host capabilities.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use camview::{
    ChunkStream, FetchRequest, Frame, FrameDecoder, FrameFetcher, MediaPipeline, PipelineSignal,
    RecordAction, Recorder, Transport, TransportError,
};

/// Order in which transports were attempted, shared by all fakes.
#[derive(Clone, Default)]
pub struct AttemptLog(Arc<Mutex<Vec<Transport>>>);

impl AttemptLog {
    pub fn record(&self, transport: Transport) {
        self.0.lock().unwrap().push(transport);
    }

    pub fn attempts(&self) -> Vec<Transport> {
        self.0.lock().unwrap().clone()
    }
}

/// A minimal JPEG-shaped payload. [`ByteDecoder`] turns it into a flat frame.
pub fn jpeg(value: u8) -> Vec<u8> {
    vec![0xFF, 0xD8, value, 0xFF, 0xD9]
}

/// Decodes any payload into a 4x4 frame filled with the byte after SOI.
pub struct ByteDecoder;

impl FrameDecoder for ByteDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<Frame, TransportError> {
        let value = *bytes
            .get(2)
            .ok_or_else(|| TransportError::Decode("truncated".into()))?;
        Frame::new(4, 4, vec![value; 4 * 4 * 4])
    }
}

pub struct FakeFetcher {
    log: AttemptLog,
    mjpeg_online: AtomicBool,
    snapshots: Mutex<VecDeque<Result<Vec<u8>, TransportError>>>,
    snapshot_fallback: Result<Vec<u8>, TransportError>,
    streams: Mutex<Vec<mpsc::Sender<Result<Vec<u8>, TransportError>>>>,
    fetches: AtomicUsize,
}

impl FakeFetcher {
    pub fn new(log: AttemptLog) -> Self {
        Self {
            log,
            mjpeg_online: AtomicBool::new(true),
            snapshots: Mutex::new(VecDeque::new()),
            snapshot_fallback: Err(TransportError::Network("connection refused".into())),
            streams: Mutex::new(Vec::new()),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn with_mjpeg_online(self, online: bool) -> Self {
        self.set_mjpeg_online(online);
        self
    }

    pub fn set_mjpeg_online(&self, online: bool) {
        self.mjpeg_online.store(online, Ordering::SeqCst);
    }

    /// Snapshot results served in order before the fallback applies.
    pub fn with_snapshots(
        mut self,
        script: Vec<Result<Vec<u8>, TransportError>>,
        fallback: Result<Vec<u8>, TransportError>,
    ) -> Self {
        self.snapshots = Mutex::new(script.into());
        self.snapshot_fallback = fallback;
        self
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn streams_opened(&self) -> usize {
        self.streams.lock().unwrap().len()
    }

    pub fn stream(&self, index: usize) -> mpsc::Sender<Result<Vec<u8>, TransportError>> {
        self.streams.lock().unwrap()[index].clone()
    }

    /// Drop the fake's handle so the stream ends once the test's clones go.
    pub fn end_stream(&self, index: usize) {
        let (closed, _) = mpsc::channel(1);
        self.streams.lock().unwrap()[index] = closed;
    }

    pub fn stream_closed(&self, index: usize) -> bool {
        self.streams.lock().unwrap()[index].is_closed()
    }
}

#[async_trait]
impl FrameFetcher for FakeFetcher {
    async fn fetch(&self, request: FetchRequest) -> Result<Vec<u8>, TransportError> {
        assert!(request.url.contains("snapshot.jpg?t="));
        if self.fetches.fetch_add(1, Ordering::SeqCst) == 0 {
            self.log.record(request.transport);
        }
        let scripted = self.snapshots.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| self.snapshot_fallback.clone())
    }

    async fn open_multipart(&self, url: &str) -> Result<ChunkStream, TransportError> {
        assert!(url.ends_with("/mjpeg"));
        self.log.record(Transport::Mjpeg);
        if !self.mjpeg_online.load(Ordering::SeqCst) {
            return Err(TransportError::Network("connection refused".into()));
        }
        let (tx, rx) = mpsc::channel(8);
        let mut first = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n".to_vec();
        first.extend(jpeg(10));
        tx.send(Ok(first))
            .await
            .map_err(|_| TransportError::Network("stream closed".into()))?;
        self.streams.lock().unwrap().push(tx);
        Ok(rx)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum PipelineMode {
    /// Reports a network error right after attaching.
    Unreachable,
    /// Attaches and never reports anything.
    Silent,
    /// Reports `Playing` right after attaching.
    Playing,
}

pub struct FakePipeline {
    log: AttemptLog,
    mode: PipelineMode,
    attached: Mutex<Vec<mpsc::Sender<PipelineSignal>>>,
}

impl FakePipeline {
    pub fn new(log: AttemptLog, mode: PipelineMode) -> Self {
        Self {
            log,
            mode,
            attached: Mutex::new(Vec::new()),
        }
    }
}

impl MediaPipeline for FakePipeline {
    fn supports(&self, transport: Transport) -> bool {
        transport.uses_media_pipeline()
    }

    fn attach(
        &self,
        _url: &str,
        transport: Transport,
    ) -> Result<mpsc::Receiver<PipelineSignal>, TransportError> {
        self.log.record(transport);
        let (tx, rx) = mpsc::channel(8);
        let signal = match self.mode {
            PipelineMode::Unreachable => Some(PipelineSignal::NetworkError("unreachable".into())),
            PipelineMode::Playing => Some(PipelineSignal::Playing),
            PipelineMode::Silent => None,
        };
        if let Some(signal) = signal {
            tx.try_send(signal)
                .map_err(|_| TransportError::Network("pipeline closed".into()))?;
        }
        self.attached.lock().unwrap().push(tx);
        Ok(rx)
    }
}

/// Accepts every recording request and remembers the actions.
#[derive(Default)]
pub struct FakeRecorder {
    actions: Mutex<Vec<RecordAction>>,
}

impl FakeRecorder {
    pub fn actions(&self) -> Vec<RecordAction> {
        self.actions.lock().unwrap().clone()
    }
}

#[async_trait]
impl Recorder for FakeRecorder {
    async fn toggle(&self, action: RecordAction) -> Result<Option<String>, String> {
        self.actions.lock().unwrap().push(action);
        Ok((action == RecordAction::Start).then(|| "cam.mp4".to_string()))
    }
}
