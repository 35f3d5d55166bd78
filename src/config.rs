use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::detect::MotionConfig;
use crate::endpoint::{Transport, TransportPreference};

const DEFAULT_FPS: u32 = 15;
const DEFAULT_RECONNECT_MS: u64 = 5_000;
const DEFAULT_ATTEMPT_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_MJPEG_LIVENESS_MS: u64 = 5_000;
const DEFAULT_JPEG_MAX_FAILURES: u32 = 5;
const DEFAULT_JPEG_RETRY_MS: u64 = 1_000;

#[derive(Debug, Deserialize, Default)]
struct PlayerConfigFile {
    transport: Option<String>,
    probe_order: Option<Vec<String>>,
    attempt_timeout_ms: Option<u64>,
    reconnect_interval_ms: Option<u64>,
    proxy: Option<String>,
    jpeg: Option<JpegConfigFile>,
    mjpeg: Option<MjpegConfigFile>,
    motion: Option<MotionConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct JpegConfigFile {
    fps: Option<u32>,
    max_failures: Option<u32>,
    retry_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct MjpegConfigFile {
    liveness_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct MotionConfigFile {
    enabled: Option<bool>,
    sample_stride: Option<usize>,
    channel_threshold: Option<u32>,
    trigger_basis_points: Option<u32>,
}

/// Everything the player core can be tuned with.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerConfig {
    /// Used when the endpoint itself asks for `auto`.
    pub transport: TransportPreference,
    /// Negotiation order in auto mode.
    pub probe_order: Vec<Transport>,
    /// Bound on one connect attempt.
    pub attempt_timeout: Duration,
    /// Fixed delay before reconnecting an established stream. Zero disables.
    pub reconnect_interval: Duration,
    /// Optional stream proxy; camera URLs are passed as a query parameter.
    pub proxy: Option<String>,
    pub jpeg: JpegSettings,
    pub mjpeg_liveness: Duration,
    pub motion: MotionSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JpegSettings {
    pub fps: u32,
    /// Consecutive failures tolerated; one more disconnects.
    pub max_failures: u32,
    pub retry_delay: Duration,
}

impl JpegSettings {
    /// Delay between a completed fetch and the next one.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.fps.max(1)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MotionSettings {
    pub enabled: bool,
    pub detector: MotionConfig,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            transport: TransportPreference::Auto,
            probe_order: Transport::PRIORITY.to_vec(),
            attempt_timeout: Duration::from_millis(DEFAULT_ATTEMPT_TIMEOUT_MS),
            reconnect_interval: Duration::from_millis(DEFAULT_RECONNECT_MS),
            proxy: None,
            jpeg: JpegSettings {
                fps: DEFAULT_FPS,
                max_failures: DEFAULT_JPEG_MAX_FAILURES,
                retry_delay: Duration::from_millis(DEFAULT_JPEG_RETRY_MS),
            },
            mjpeg_liveness: Duration::from_millis(DEFAULT_MJPEG_LIVENESS_MS),
            motion: MotionSettings {
                enabled: false,
                detector: MotionConfig::default(),
            },
        }
    }
}

impl PlayerConfig {
    /// Defaults, then the file named by `CAMVIEW_CONFIG`, then `CAMVIEW_*`
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("CAMVIEW_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: PlayerConfigFile) -> Result<Self> {
        let defaults = Self::default();
        let transport = match file.transport {
            Some(name) => name.parse()?,
            None => defaults.transport,
        };
        let probe_order = match file.probe_order {
            Some(names) => parse_transports(names.iter().map(String::as_str))?,
            None => defaults.probe_order,
        };
        let jpeg = file.jpeg.unwrap_or_default();
        let motion = file.motion.unwrap_or_default();
        let detector = MotionConfig {
            sample_stride: motion
                .sample_stride
                .unwrap_or(defaults.motion.detector.sample_stride),
            channel_threshold: motion
                .channel_threshold
                .unwrap_or(defaults.motion.detector.channel_threshold),
            trigger_basis_points: motion
                .trigger_basis_points
                .unwrap_or(defaults.motion.detector.trigger_basis_points),
        };
        Ok(Self {
            transport,
            probe_order,
            attempt_timeout: file
                .attempt_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.attempt_timeout),
            reconnect_interval: file
                .reconnect_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.reconnect_interval),
            proxy: file.proxy.filter(|p| !p.trim().is_empty()),
            jpeg: JpegSettings {
                fps: jpeg.fps.unwrap_or(defaults.jpeg.fps),
                max_failures: jpeg.max_failures.unwrap_or(defaults.jpeg.max_failures),
                retry_delay: jpeg
                    .retry_ms
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.jpeg.retry_delay),
            },
            mjpeg_liveness: file
                .mjpeg
                .and_then(|mjpeg| mjpeg.liveness_ms)
                .map(Duration::from_millis)
                .unwrap_or(defaults.mjpeg_liveness),
            motion: MotionSettings {
                enabled: motion.enabled.unwrap_or(defaults.motion.enabled),
                detector,
            },
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(transport) = std::env::var("CAMVIEW_TRANSPORT") {
            if !transport.trim().is_empty() {
                self.transport = transport.parse()?;
            }
        }
        if let Ok(order) = std::env::var("CAMVIEW_PROBE_ORDER") {
            let parsed = split_csv(&order);
            if !parsed.is_empty() {
                self.probe_order = parse_transports(parsed.iter().map(String::as_str))?;
            }
        }
        if let Ok(fps) = std::env::var("CAMVIEW_FPS") {
            self.jpeg.fps = fps
                .trim()
                .parse()
                .map_err(|_| anyhow!("CAMVIEW_FPS must be a positive integer"))?;
        }
        if let Ok(ms) = std::env::var("CAMVIEW_RECONNECT_MS") {
            let ms: u64 = ms
                .trim()
                .parse()
                .map_err(|_| anyhow!("CAMVIEW_RECONNECT_MS must be an integer number of milliseconds"))?;
            self.reconnect_interval = Duration::from_millis(ms);
        }
        if let Ok(ms) = std::env::var("CAMVIEW_ATTEMPT_TIMEOUT_MS") {
            let ms: u64 = ms.trim().parse().map_err(|_| {
                anyhow!("CAMVIEW_ATTEMPT_TIMEOUT_MS must be an integer number of milliseconds")
            })?;
            self.attempt_timeout = Duration::from_millis(ms);
        }
        if let Ok(proxy) = std::env::var("CAMVIEW_PROXY") {
            if !proxy.trim().is_empty() {
                self.proxy = Some(proxy);
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.jpeg.fps == 0 {
            return Err(anyhow!("jpeg fps must be greater than zero"));
        }
        if self.probe_order.is_empty() {
            return Err(anyhow!("probe order must name at least one transport"));
        }
        for (i, transport) in self.probe_order.iter().enumerate() {
            if self.probe_order[..i].contains(transport) {
                return Err(anyhow!("probe order lists {} twice", transport));
            }
        }
        if self.attempt_timeout.is_zero() {
            return Err(anyhow!("attempt timeout must be greater than zero"));
        }
        if self.mjpeg_liveness.is_zero() {
            return Err(anyhow!("mjpeg liveness timeout must be greater than zero"));
        }
        if self.motion.detector.sample_stride == 0 {
            return Err(anyhow!("motion sample stride must be greater than zero"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<PlayerConfigFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn parse_transports<'a>(names: impl Iterator<Item = &'a str>) -> Result<Vec<Transport>> {
    names
        .map(|name| name.parse::<Transport>().map_err(anyhow::Error::from))
        .collect()
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
