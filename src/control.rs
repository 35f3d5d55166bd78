//! Camera control: pan/tilt/zoom, presets and recording.
//!
//! The core keeps no PTZ state beyond which button is currently held. Both
//! capabilities are provided by the host and only invoked while a stream is
//! connected.

use std::fmt;

use async_trait::async_trait;

use crate::endpoint::Credentials;
use crate::error::{PlayerError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PtzDirection {
    Up,
    Down,
    Left,
    Right,
    Home,
}

impl PtzDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Left => "left",
            Self::Right => "right",
            Self::Home => "home",
        }
    }
}

/// A PTZ button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PtzAction {
    Move(PtzDirection),
    ZoomIn,
    ZoomOut,
    /// Recall a stored position.
    Preset(u8),
}

impl PtzAction {
    /// Continuous actions run while held and need a `stop` on release.
    pub fn is_continuous(&self) -> bool {
        !matches!(self, Self::Move(PtzDirection::Home) | Self::Preset(_))
    }

    fn command(&self) -> ControlCommand {
        match self {
            Self::Move(direction) => ControlCommand::new("move").param("direction", direction.as_str()),
            Self::ZoomIn => ControlCommand::new("zoom").param("direction", "in"),
            Self::ZoomOut => ControlCommand::new("zoom").param("direction", "out"),
            Self::Preset(slot) => ControlCommand::new("preset").param("preset", slot.to_string()),
        }
    }
}

/// Command sent over a [`ControlChannel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlCommand {
    pub name: String,
    pub params: Vec<(String, String)>,
}

impl ControlCommand {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    pub fn stop() -> Self {
        Self::new("stop")
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for (key, value) in &self.params {
            write!(f, " {}={}", key, value)?;
        }
        Ok(())
    }
}

/// Host capability delivering control commands to a camera.
#[async_trait]
pub trait ControlChannel: Send + Sync {
    async fn send(
        &self,
        endpoint_url: &str,
        credentials: &Credentials,
        command: &ControlCommand,
    ) -> std::result::Result<(), String>;
}

/// Press/release tracking for PTZ buttons.
#[derive(Debug, Default)]
pub struct PtzController {
    held: Option<PtzAction>,
}

impl PtzController {
    pub fn held(&self) -> Option<PtzAction> {
        self.held
    }

    /// Send the command for `action`. Continuous actions stay held until
    /// [`release`](Self::release).
    pub async fn press(
        &mut self,
        channel: &dyn ControlChannel,
        endpoint_url: &str,
        credentials: &Credentials,
        action: PtzAction,
    ) -> Result<()> {
        let command = action.command();
        log::debug!("ptz {}", command);
        channel
            .send(endpoint_url, credentials, &command)
            .await
            .map_err(PlayerError::Control)?;
        self.held = action.is_continuous().then_some(action);
        Ok(())
    }

    /// Stop a held action. Returns whether a stop was sent.
    pub async fn release(
        &mut self,
        channel: &dyn ControlChannel,
        endpoint_url: &str,
        credentials: &Credentials,
    ) -> Result<bool> {
        if self.held.take().is_none() {
            return Ok(false);
        }
        channel
            .send(endpoint_url, credentials, &ControlCommand::stop())
            .await
            .map_err(PlayerError::Control)?;
        Ok(true)
    }

    /// Forget the held button without sending anything.
    pub fn clear(&mut self) {
        self.held = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordAction {
    Start,
    Stop,
}

impl RecordAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
        }
    }
}

/// Host recording capability. `Start` may return the file being written.
#[async_trait]
pub trait Recorder: Send + Sync {
    async fn toggle(&self, action: RecordAction) -> std::result::Result<Option<String>, String>;
}

/// Recording state with an optimistic flip that is reverted on failure.
#[derive(Debug, Default)]
pub struct RecordingToggle {
    recording: bool,
    filename: Option<String>,
}

impl RecordingToggle {
    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    pub async fn toggle(&mut self, recorder: &dyn Recorder) -> Result<RecordAction> {
        let action = if self.recording {
            RecordAction::Stop
        } else {
            RecordAction::Start
        };
        self.recording = !self.recording;
        match recorder.toggle(action).await {
            Ok(filename) => {
                if action == RecordAction::Start {
                    if let Some(name) = &filename {
                        log::info!("recording to {}", name);
                    }
                    self.filename = filename;
                } else {
                    self.filename = None;
                }
                Ok(action)
            }
            Err(message) => {
                self.recording = !self.recording;
                Err(PlayerError::Recording {
                    action: action.as_str(),
                    message,
                })
            }
        }
    }
}
