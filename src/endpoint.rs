//! Camera endpoints, transports and stream URL construction.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::{form_urlencoded, Url};

use crate::error::{PlayerError, Result};

/// A streaming delivery mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Transport {
    /// HTTP Live Streaming, played by the host media pipeline.
    #[serde(rename = "hls")]
    Hls,
    /// RTSP bridged to the host over WebRTC signaling.
    #[serde(rename = "rtsp", alias = "rtsp_webrtc")]
    RtspWebRtc,
    /// Long-lived `multipart/x-mixed-replace` JPEG stream.
    #[serde(rename = "mjpeg")]
    Mjpeg,
    /// Successive single-frame snapshot fetches.
    #[serde(rename = "jpg", alias = "jpeg")]
    JpegPoll,
}

impl Transport {
    /// Default negotiation order, most capable first.
    pub const PRIORITY: [Transport; 4] = [
        Transport::Hls,
        Transport::RtspWebRtc,
        Transport::Mjpeg,
        Transport::JpegPoll,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hls => "hls",
            Self::RtspWebRtc => "rtsp",
            Self::Mjpeg => "mjpeg",
            Self::JpegPoll => "jpg",
        }
    }

    /// Whether liveness is delegated to the host media pipeline.
    pub fn uses_media_pipeline(&self) -> bool {
        matches!(self, Self::Hls | Self::RtspWebRtc)
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Transport {
    type Err = PlayerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hls" => Ok(Self::Hls),
            "rtsp" | "rtsp_webrtc" | "webrtc" => Ok(Self::RtspWebRtc),
            "mjpeg" => Ok(Self::Mjpeg),
            "jpg" | "jpeg" => Ok(Self::JpegPoll),
            other => Err(PlayerError::InvalidEndpoint(format!(
                "unknown transport '{}'",
                other
            ))),
        }
    }
}

/// Which transports a connection may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportPreference {
    /// Probe the configured order until one connects.
    #[default]
    Auto,
    /// Try exactly this transport.
    Only(Transport),
}

impl FromStr for TransportPreference {
    type Err = PlayerError;

    fn from_str(s: &str) -> Result<Self> {
        if s.trim().eq_ignore_ascii_case("auto") {
            return Ok(Self::Auto);
        }
        s.parse().map(Self::Only)
    }
}

impl fmt::Display for TransportPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Only(t) => t.fmt(f),
        }
    }
}

/// Camera login. Only embedded into URLs when both parts are present.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Where and how to reach one camera. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraEndpoint {
    base: Url,
    credentials: Credentials,
    preferred: TransportPreference,
}

impl CameraEndpoint {
    /// Parse a base URL. `http://` is assumed when no scheme is given, so
    /// `192.168.1.20:8080` is accepted.
    pub fn new(base_url: &str) -> Result<Self> {
        let trimmed = base_url.trim();
        if trimmed.is_empty() {
            return Err(PlayerError::InvalidEndpoint("empty base url".into()));
        }
        let with_scheme = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("http://{}", trimmed)
        };
        let base = Url::parse(&with_scheme)
            .map_err(|e| PlayerError::InvalidEndpoint(format!("{}: {}", trimmed, e)))?;
        if base.cannot_be_a_base() || base.host_str().is_none() {
            return Err(PlayerError::InvalidEndpoint(format!(
                "{} has no host",
                trimmed
            )));
        }
        Ok(Self {
            base,
            credentials: Credentials::default(),
            preferred: TransportPreference::Auto,
        })
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_preferred_transport(mut self, preferred: TransportPreference) -> Self {
        self.preferred = preferred;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn preferred_transport(&self) -> TransportPreference {
        self.preferred
    }

    /// Build the URL a transport handler connects to.
    ///
    /// `cache_token` is appended as `t=<token>` for snapshot fetches so that
    /// intermediaries never serve a stale frame. With a `proxy`, the camera URL
    /// is wrapped as `<proxy>?url=..&protocol=..[&t=..]`.
    pub fn stream_url(
        &self,
        transport: Transport,
        cache_token: Option<u64>,
        proxy: Option<&str>,
    ) -> Result<String> {
        let mut url = self.base.clone();
        if self.credentials.is_complete() {
            url.set_username(&self.credentials.username)
                .and_then(|_| url.set_password(Some(&self.credentials.password)))
                .map_err(|_| {
                    PlayerError::InvalidEndpoint("url cannot carry credentials".into())
                })?;
        }

        let base_path = self.base.path().trim_end_matches('/').to_string();
        let camera_url = match transport {
            Transport::Hls => {
                url.set_path(&format!("{}/stream.m3u8", base_path));
                url.to_string()
            }
            Transport::RtspWebRtc => {
                let serialized = url.to_string();
                match serialized.strip_prefix("http") {
                    Some(rest) => format!("rtsp{}", rest),
                    None => serialized,
                }
            }
            Transport::Mjpeg => {
                url.set_path(&format!("{}/mjpeg", base_path));
                url.to_string()
            }
            Transport::JpegPoll => {
                url.set_path(&format!("{}/snapshot.jpg", base_path));
                if let Some(token) = cache_token {
                    url.set_query(Some(&format!("t={}", token)));
                }
                url.to_string()
            }
        };

        let Some(proxy) = proxy else {
            return Ok(camera_url);
        };
        let mut query = form_urlencoded::Serializer::new(String::new());
        query
            .append_pair("url", &camera_url)
            .append_pair("protocol", transport.as_str());
        if let Some(token) = cache_token {
            query.append_pair("t", &token.to_string());
        }
        Ok(format!("{}?{}", proxy, query.finish()))
    }

    /// Base URL safe for logs.
    pub fn redacted(&self) -> String {
        let mut url = self.base.clone();
        if self.credentials.is_complete() {
            let _ = url.set_username(&self.credentials.username);
            let _ = url.set_password(Some("***"));
        }
        url.to_string()
    }
}
