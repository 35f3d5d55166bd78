//! Lifecycle of one camera connection.
//!
//! `StreamSession` owns the transport handler, the per-attempt and reconnect
//! timers, the render surface and the motion detector. All of them are driven
//! from a single signal channel: handlers and timers send generation-tagged
//! signals, [`StreamSession::step`] applies them one at a time and drops any
//! signal whose generation is no longer current.
//!
//! The generation advances whenever a handler is detached, so a `disconnect()`
//! followed by a new `start()` can never see output from the old handler.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::PlayerConfig;
use crate::detect::{MotionDetector, MotionEvent};
use crate::endpoint::{CameraEndpoint, Transport};
use crate::error::TransportError;
use crate::frame::Frame;
use crate::status::{StatusReporter, Transition};
use crate::surface::RenderSurface;
use crate::transport::{
    spawn_handler, Capabilities, HandlerContext, HandlerSignal, HandlerSpec, SessionSignal, Tagged,
};

/// Connection state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Negotiating,
    Connecting(Transport),
    Connected(Transport),
    Disconnected,
    Reconnecting(Transport),
}

impl SessionState {
    /// Whether `next` is a defined edge from this state.
    pub fn can_move_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        match (*self, next) {
            (_, Idle) => true,
            (Idle, Negotiating) => true,
            (Idle | Negotiating | Disconnected | Reconnecting(_), Connecting(_)) => true,
            (Connecting(a), Connected(b)) => a == b,
            (Connecting(_) | Connected(_), Disconnected) => true,
            (Disconnected, Reconnecting(_)) => true,
            _ => false,
        }
    }

    pub fn transport(&self) -> Option<Transport> {
        match self {
            Self::Connecting(t) | Self::Connected(t) | Self::Reconnecting(t) => Some(*t),
            _ => None,
        }
    }
}

/// Counters for the current connection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamStats {
    pub transport: Option<Transport>,
    pub generation: u64,
    /// Frames presented since the last successful connect.
    pub frames: u64,
    /// Presented frames per second over the last full window.
    pub fps: f32,
    pub resolution: Option<(u32, u32)>,
    /// Signals discarded because their generation was superseded.
    pub stale_dropped: u64,
}

#[derive(Debug)]
struct RateWindow {
    started: Instant,
    frames: u32,
}

/// One camera connection and everything it holds.
pub struct StreamSession {
    endpoint: CameraEndpoint,
    config: PlayerConfig,
    capabilities: Capabilities,
    reporter: StatusReporter,
    surface: Box<dyn RenderSurface>,
    motion: Option<MotionDetector>,

    state: SessionState,
    generation: u64,
    tx: mpsc::UnboundedSender<Tagged>,
    rx: mpsc::UnboundedReceiver<Tagged>,
    handler: Option<JoinHandle<()>>,
    attempt_timer: Option<JoinHandle<()>>,
    reconnect_timer: Option<JoinHandle<()>>,
    attempt_window: Duration,
    retry_transport: Option<Transport>,
    last_error: Option<TransportError>,

    sequence: u64,
    stats: StreamStats,
    window: Option<RateWindow>,
}

impl StreamSession {
    pub fn new(
        endpoint: CameraEndpoint,
        config: PlayerConfig,
        capabilities: Capabilities,
        surface: Box<dyn RenderSurface>,
        reporter: StatusReporter,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let motion = config
            .motion
            .enabled
            .then(|| MotionDetector::new(config.motion.detector));
        let attempt_window = config.attempt_timeout;
        Self {
            endpoint,
            config,
            capabilities,
            reporter,
            surface,
            motion,
            state: SessionState::Idle,
            generation: 0,
            tx,
            rx,
            handler: None,
            attempt_timer: None,
            reconnect_timer: None,
            attempt_window,
            retry_transport: None,
            last_error: None,
            sequence: 0,
            stats: StreamStats::default(),
            window: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn endpoint(&self) -> &CameraEndpoint {
        &self.endpoint
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn stats(&self) -> StreamStats {
        StreamStats {
            transport: self.state.transport(),
            generation: self.generation,
            ..self.stats.clone()
        }
    }

    /// Failure that ended the most recent attempt.
    pub fn last_error(&self) -> Option<&TransportError> {
        self.last_error.as_ref()
    }

    /// Whether a transport handler is currently attached.
    pub fn has_active_handler(&self) -> bool {
        self.handler.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn motion_detection_enabled(&self) -> bool {
        self.motion.is_some()
    }

    pub fn surface_mut(&mut self) -> &mut dyn RenderSurface {
        self.surface.as_mut()
    }

    pub fn into_surface(mut self) -> Box<dyn RenderSurface> {
        self.disconnect();
        std::mem::replace(&mut self.surface, Box::new(NullSurface))
    }

    /// Tear down and enter `Negotiating`. Negotiation attempts never schedule
    /// reconnects until one of them connects.
    pub fn begin_negotiation(&mut self) {
        self.disconnect();
        self.retry_transport = None;
        self.last_error = None;
        self.transition(SessionState::Negotiating);
    }

    /// Start `transport` with the configured attempt window.
    pub fn start(&mut self, transport: Transport) {
        self.start_attempt(transport, self.config.attempt_timeout);
    }

    /// Detach any current handler and start a new attempt bounded by `window`.
    pub fn start_attempt(&mut self, transport: Transport, window: Duration) {
        let next = SessionState::Connecting(transport);
        if !self.state.can_move_to(next) {
            // Connected or Connecting: fully release before switching.
            self.disconnect();
        }
        self.detach();
        self.attempt_window = window;
        self.transition(next);
        log::info!(
            "connecting {} via {} (generation {})",
            self.endpoint.redacted(),
            transport,
            self.generation
        );

        let spec = HandlerSpec {
            endpoint: self.endpoint.clone(),
            proxy: self.config.proxy.clone(),
            capabilities: self.capabilities.clone(),
            jpeg: self.config.jpeg.clone(),
            mjpeg_liveness: self.config.mjpeg_liveness,
        };
        let ctx = HandlerContext::new(self.generation, self.tx.clone());
        match spawn_handler(transport, spec, ctx) {
            Ok(handle) => {
                self.handler = Some(handle);
                self.attempt_timer = Some(self.arm(window, SessionSignal::AttemptTimeout));
            }
            Err(err) => self.fail_attempt(err),
        }
    }

    /// Wait until the attempt started last either connects or ends.
    pub async fn await_attempt(&mut self) -> Result<Transport, TransportError> {
        let attempt = self.generation;
        loop {
            match self.state {
                SessionState::Connected(transport) => return Ok(transport),
                SessionState::Connecting(_) if self.generation == attempt => {}
                _ => {
                    return Err(self
                        .last_error
                        .clone()
                        .unwrap_or_else(|| TransportError::Network("attempt cancelled".into())))
                }
            }
            self.step().await;
        }
    }

    /// Receive and apply one signal. Returns the state afterwards.
    pub async fn step(&mut self) -> SessionState {
        if let Some(tagged) = self.rx.recv().await {
            self.dispatch(tagged);
        }
        self.state
    }

    /// Apply every signal already queued without waiting.
    pub fn drain_pending(&mut self) -> SessionState {
        while let Ok(tagged) = self.rx.try_recv() {
            self.dispatch(tagged);
        }
        self.state
    }

    /// Go to `Idle`, releasing the handler and every pending timer.
    /// Calling it again is a no-op.
    pub fn disconnect(&mut self) {
        let was = self.state;
        self.detach();
        // A failed stream already reported its Disconnected.
        if matches!(was, SessionState::Connecting(_) | SessionState::Connected(_)) {
            self.reporter.report(Transition::Disconnected);
        }
        if was != SessionState::Idle {
            log::info!("session for {} idle", self.endpoint.redacted());
        }
        self.transition(SessionState::Idle);
    }

    pub fn set_motion_detection(&mut self, enabled: bool) {
        match (enabled, self.motion.is_some()) {
            (true, false) => {
                self.motion = Some(MotionDetector::new(self.config.motion.detector));
            }
            (false, true) => {
                self.surface.mark_motion(&[]);
                if let Some(event) = self.motion.take().and_then(|mut m| m.reset()) {
                    self.reporter.report(Transition::Motion(event));
                }
            }
            _ => {}
        }
        self.config.motion.enabled = enabled;
    }

    pub(crate) fn report(&self, transition: Transition) {
        self.reporter.report(transition);
    }

    pub(crate) fn fail_attempt(&mut self, err: TransportError) {
        if !matches!(
            self.state,
            SessionState::Connecting(_) | SessionState::Connected(_)
        ) {
            return;
        }
        log::warn!("{} stream failed: {}", self.endpoint.redacted(), err);
        self.detach();
        self.last_error = Some(err.clone());
        let recoverable = err.is_recoverable();
        self.reporter.report(Transition::Failed(err));
        self.transition(SessionState::Disconnected);
        self.reporter.report(Transition::Disconnected);

        let delay = self.config.reconnect_interval;
        if let (true, false, Some(transport)) = (recoverable, delay.is_zero(), self.retry_transport) {
            self.transition(SessionState::Reconnecting(transport));
            self.reporter
                .report(Transition::ReconnectScheduled { transport, delay });
            self.reconnect_timer = Some(self.arm(delay, SessionSignal::ReconnectDue));
        }
    }

    fn dispatch(&mut self, tagged: Tagged) {
        if tagged.generation != self.generation {
            self.stats.stale_dropped += 1;
            log::trace!(
                "dropping signal from generation {} (current {})",
                tagged.generation,
                self.generation
            );
            return;
        }
        match tagged.signal {
            SessionSignal::Handler(HandlerSignal::Ready) => self.mark_connected(),
            SessionSignal::Handler(HandlerSignal::Frame(frame)) => {
                self.mark_connected();
                self.accept_frame(frame);
            }
            SessionSignal::Handler(HandlerSignal::Failed(err)) => self.fail_attempt(err),
            SessionSignal::AttemptTimeout => {
                if let SessionState::Connecting(transport) = self.state {
                    self.attempt_timer = None;
                    self.fail_attempt(TransportError::ConnectTimeout {
                        transport,
                        waited_ms: self.attempt_window.as_millis() as u64,
                    });
                }
            }
            SessionSignal::ReconnectDue => {
                self.reconnect_timer = None;
                if let SessionState::Reconnecting(transport) = self.state {
                    self.start(transport);
                }
            }
        }
    }

    fn mark_connected(&mut self) {
        let SessionState::Connecting(transport) = self.state else {
            return;
        };
        if let Some(timer) = self.attempt_timer.take() {
            timer.abort();
        }
        self.transition(SessionState::Connected(transport));
        self.retry_transport = Some(transport);
        self.last_error = None;
        self.stats.frames = 0;
        self.stats.fps = 0.0;
        self.window = None;
        log::info!("connected to {} via {}", self.endpoint.redacted(), transport);
        self.reporter.report(Transition::Connected(transport));
    }

    fn accept_frame(&mut self, frame: Frame) {
        if !matches!(self.state, SessionState::Connected(_)) {
            return;
        }
        self.sequence += 1;
        let frame = frame.with_sequence(self.sequence);
        self.surface.present(&frame);
        self.record_frame(&frame);

        if let Some(detector) = self.motion.as_mut() {
            let (event, analysis) = detector.analyze(&frame);
            // An empty mark list clears the previous overlay.
            if let Some(analysis) = analysis {
                self.surface.mark_motion(&analysis.marks);
            }
            if let Some(event) = event {
                self.reporter.report(Transition::Motion(event));
            }
        }
    }

    fn record_frame(&mut self, frame: &Frame) {
        self.stats.frames += 1;
        self.stats.resolution = Some(frame.dimensions());
        let now = Instant::now();
        // The frame opening a window only marks its start.
        let Some(window) = self.window.as_mut() else {
            self.window = Some(RateWindow {
                started: now,
                frames: 0,
            });
            return;
        };
        window.frames += 1;
        let elapsed = now.duration_since(window.started);
        if elapsed >= Duration::from_secs(1) {
            self.stats.fps = window.frames as f32 / elapsed.as_secs_f32();
            self.window = Some(RateWindow {
                started: now,
                frames: 0,
            });
        }
    }

    /// Release the handler and both timers, clear the surface and reset
    /// motion state. Advances the generation.
    fn detach(&mut self) {
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
        for timer in [self.attempt_timer.take(), self.reconnect_timer.take()]
            .into_iter()
            .flatten()
        {
            timer.abort();
        }
        self.generation += 1;
        self.surface.clear();
        self.stats.resolution = None;
        if let Some(MotionEvent::Stopped) = self.motion.as_mut().and_then(|m| m.reset()) {
            self.reporter
                .report(Transition::Motion(MotionEvent::Stopped));
        }
    }

    fn arm(&self, delay: Duration, signal: SessionSignal) -> JoinHandle<()> {
        let tx = self.tx.clone();
        let generation = self.generation;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Tagged { generation, signal });
        })
    }

    fn transition(&mut self, next: SessionState) {
        if self.state == next {
            return;
        }
        debug_assert!(
            self.state.can_move_to(next),
            "undefined session edge {:?} -> {:?}",
            self.state,
            next
        );
        log::debug!("session {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    #[cfg(test)]
    fn inject(&self, generation: u64, signal: HandlerSignal) {
        let _ = self.tx.send(Tagged {
            generation,
            signal: SessionSignal::Handler(signal),
        });
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
        for timer in [self.attempt_timer.take(), self.reconnect_timer.take()]
            .into_iter()
            .flatten()
        {
            timer.abort();
        }
    }
}

struct NullSurface;

impl RenderSurface for NullSurface {
    fn present(&mut self, _frame: &Frame) {}
    fn mark_motion(&mut self, _marks: &[crate::detect::SamplePoint]) {}
    fn clear(&mut self) {}
    fn set_fullscreen(&mut self, _enabled: bool) -> Result<(), String> {
        Ok(())
    }
}
