//! Host-facing facade.
//!
//! A [`Player`] owns at most one [`StreamSession`]. Connecting to a different
//! endpoint tears the old session down completely and moves the render
//! surface to the new one, so two sessions never share it.

use std::sync::Arc;

use crate::config::PlayerConfig;
use crate::control::{
    ControlChannel, PtzAction, PtzController, RecordAction, Recorder, RecordingToggle,
};
use crate::endpoint::{CameraEndpoint, Transport, TransportPreference};
use crate::error::{PlayerError, Result};
use crate::frame::FrameDecoder;
use crate::negotiate::TransportNegotiator;
use crate::session::{SessionState, StreamSession, StreamStats};
use crate::status::{EventStream, PlayerEvent, StatusReporter};
use crate::surface::RenderSurface;
use crate::transport::{Capabilities, FrameFetcher, MediaPipeline};

type Listener = Box<dyn Fn(&PlayerEvent) + Send + Sync>;

/// Collects host capabilities before a [`Player`] is built.
pub struct PlayerBuilder {
    config: PlayerConfig,
    capabilities: Capabilities,
    surface: Option<Box<dyn RenderSurface>>,
    control: Option<Arc<dyn ControlChannel>>,
    recorder: Option<Arc<dyn Recorder>>,
    listener: Option<Listener>,
}

impl PlayerBuilder {
    pub fn new(config: PlayerConfig) -> Self {
        Self {
            config,
            capabilities: Capabilities::default(),
            surface: None,
            control: None,
            recorder: None,
            listener: None,
        }
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn FrameFetcher>) -> Self {
        self.capabilities.fetcher = Some(fetcher);
        self
    }

    pub fn pipeline(mut self, pipeline: Arc<dyn MediaPipeline>) -> Self {
        self.capabilities.pipeline = Some(pipeline);
        self
    }

    pub fn decoder(mut self, decoder: Arc<dyn FrameDecoder>) -> Self {
        self.capabilities.decoder = Some(decoder);
        self
    }

    pub fn surface(mut self, surface: impl RenderSurface + 'static) -> Self {
        self.surface = Some(Box::new(surface));
        self
    }

    pub fn control(mut self, control: Arc<dyn ControlChannel>) -> Self {
        self.control = Some(control);
        self
    }

    pub fn recorder(mut self, recorder: Arc<dyn Recorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Invoke `listener` synchronously for every event, in addition to the
    /// returned stream.
    pub fn listener(mut self, listener: impl Fn(&PlayerEvent) + Send + Sync + 'static) -> Self {
        self.listener = Some(Box::new(listener));
        self
    }

    /// Fails with `ResourceUnavailable` when no render surface was given.
    pub fn build(self) -> Result<(Player, EventStream)> {
        let surface = self
            .surface
            .ok_or(PlayerError::ResourceUnavailable("render surface"))?;
        let (mut reporter, events) = StatusReporter::channel();
        if let Some(listener) = self.listener {
            reporter = reporter.with_listener(listener);
        }
        let player = Player {
            negotiator: TransportNegotiator::from_config(&self.config),
            config: self.config,
            capabilities: self.capabilities,
            reporter,
            session: None,
            parked_surface: Some(surface),
            control: self.control,
            recorder: self.recorder,
            ptz: PtzController::default(),
            recording: RecordingToggle::default(),
            fullscreen: false,
        };
        Ok((player, events))
    }
}

/// Camera player core.
pub struct Player {
    config: PlayerConfig,
    capabilities: Capabilities,
    reporter: StatusReporter,
    negotiator: TransportNegotiator,
    session: Option<StreamSession>,
    /// Surface held while no session exists.
    parked_surface: Option<Box<dyn RenderSurface>>,
    control: Option<Arc<dyn ControlChannel>>,
    recorder: Option<Arc<dyn Recorder>>,
    ptz: PtzController,
    recording: RecordingToggle,
    fullscreen: bool,
}

impl Player {
    pub fn builder(config: PlayerConfig) -> PlayerBuilder {
        PlayerBuilder::new(config)
    }

    pub fn state(&self) -> SessionState {
        self.session
            .as_ref()
            .map_or(SessionState::Idle, StreamSession::state)
    }

    pub fn stats(&self) -> Option<StreamStats> {
        self.session.as_ref().map(StreamSession::stats)
    }

    pub fn endpoint(&self) -> Option<&CameraEndpoint> {
        self.session.as_ref().map(StreamSession::endpoint)
    }

    /// Negotiate a transport for `endpoint`.
    ///
    /// Returns the current transport without reconnecting when already
    /// connected to the same endpoint.
    pub async fn connect(&mut self, endpoint: CameraEndpoint) -> Result<Transport> {
        let current = self
            .session
            .as_ref()
            .map(|s| (s.endpoint() == &endpoint, s.state()));
        match current {
            Some((true, SessionState::Connected(transport))) => return Ok(transport),
            Some((false, _)) => self.release_session(),
            _ => {}
        }

        let preference = match endpoint.preferred_transport() {
            TransportPreference::Auto => self.config.transport,
            explicit => explicit,
        };
        let session = match self.session.take() {
            Some(session) => session,
            None => {
                let surface = self
                    .parked_surface
                    .take()
                    .ok_or(PlayerError::ResourceUnavailable("render surface"))?;
                StreamSession::new(
                    endpoint,
                    self.config.clone(),
                    self.capabilities.clone(),
                    surface,
                    self.reporter.clone(),
                )
            }
        };
        let session = self.session.insert(session);
        self.negotiator.negotiate(session, preference).await
    }

    pub fn disconnect(&mut self) {
        self.ptz.clear();
        if let Some(session) = self.session.as_mut() {
            session.disconnect();
        }
    }

    /// Apply the next session signal. Never completes while no session
    /// exists.
    pub async fn step(&mut self) -> SessionState {
        match self.session.as_mut() {
            Some(session) => session.step().await,
            None => std::future::pending().await,
        }
    }

    /// Returns whether detection is now enabled.
    pub fn toggle_motion_detection(&mut self) -> bool {
        let enabled = !self.config.motion.enabled;
        self.config.motion.enabled = enabled;
        if let Some(session) = self.session.as_mut() {
            session.set_motion_detection(enabled);
        }
        log::info!(
            "motion detection {}",
            if enabled { "enabled" } else { "disabled" }
        );
        enabled
    }

    pub fn motion_detection_enabled(&self) -> bool {
        self.config.motion.enabled
    }

    /// Returns whether the surface is now fullscreen.
    pub fn toggle_fullscreen(&mut self) -> Result<bool> {
        let wanted = !self.fullscreen;
        let surface: &mut dyn RenderSurface = match self.session.as_mut() {
            Some(session) => session.surface_mut(),
            None => self
                .parked_surface
                .as_deref_mut()
                .ok_or(PlayerError::ResourceUnavailable("render surface"))?,
        };
        surface.set_fullscreen(wanted).map_err(PlayerError::Surface)?;
        self.fullscreen = wanted;
        Ok(wanted)
    }

    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    pub async fn ptz_press(&mut self, action: PtzAction) -> Result<()> {
        let session = connected(self.session.as_ref())?;
        let control = self
            .control
            .as_deref()
            .ok_or(PlayerError::ResourceUnavailable("control channel"))?;
        let endpoint = session.endpoint();
        self.ptz
            .press(
                control,
                endpoint.base_url().as_str(),
                endpoint.credentials(),
                action,
            )
            .await
    }

    /// Returns whether a stop command was sent.
    pub async fn ptz_release(&mut self) -> Result<bool> {
        let Some(control) = self.control.as_deref() else {
            return Ok(false);
        };
        let Some(session) = self.session.as_ref() else {
            self.ptz.clear();
            return Ok(false);
        };
        let endpoint = session.endpoint();
        self.ptz
            .release(control, endpoint.base_url().as_str(), endpoint.credentials())
            .await
    }

    pub fn held_ptz(&self) -> Option<PtzAction> {
        self.ptz.held()
    }

    /// Start or stop recording. Starting needs a connected stream.
    pub async fn toggle_recording(&mut self) -> Result<RecordAction> {
        let recorder = self
            .recorder
            .as_deref()
            .ok_or(PlayerError::ResourceUnavailable("recorder"))?;
        if !self.recording.is_recording() {
            connected(self.session.as_ref())?;
        }
        self.recording.toggle(recorder).await
    }

    pub fn is_recording(&self) -> bool {
        self.recording.is_recording()
    }

    pub fn recording_filename(&self) -> Option<&str> {
        self.recording.filename()
    }

    fn release_session(&mut self) {
        self.ptz.clear();
        if let Some(session) = self.session.take() {
            self.parked_surface = Some(session.into_surface());
        }
    }
}

fn connected(session: Option<&StreamSession>) -> Result<&StreamSession> {
    match session {
        Some(session) if matches!(session.state(), SessionState::Connected(_)) => Ok(session),
        _ => Err(PlayerError::NotConnected),
    }
}
