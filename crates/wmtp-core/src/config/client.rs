//! Client configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::{duration_secs, optional_duration_secs};
use crate::error::ConfigError;
use crate::types::CertificateFingerprint;
use wmtp_protocol::DEFAULT_MAX_FRAME_SIZE;

/// Configuration for the WMTP client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server URL, e.g. `https://mail.example.com:4433`
    pub url: String,

    /// Base64 SHA-256 of the server certificate, for self-signed servers.
    /// When unset the platform trust roots are used.
    pub cert_hash: Option<String>,

    /// Bound on handshake plus control stream open
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,

    /// QUIC keep-alive interval; 0 disables
    #[serde(with = "optional_duration_secs")]
    pub keep_alive_interval: Option<Duration>,

    /// QUIC idle timeout
    #[serde(with = "duration_secs")]
    pub max_idle_timeout: Duration,

    /// How long the connection may stay silent before it is considered dead
    #[serde(with = "duration_secs")]
    pub heartbeat_timeout: Duration,

    /// Largest inbound message accepted, in bytes
    pub max_frame_size: usize,

    /// Where the session record is kept
    pub session_dir: PathBuf,

    /// Backoff configuration for reconnections
    pub backoff: BackoffConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: "https://localhost:4433".to_string(),
            cert_hash: None,
            connect_timeout: Duration::from_secs(10),
            keep_alive_interval: Some(Duration::from_secs(10)),
            max_idle_timeout: Duration::from_secs(60),
            heartbeat_timeout: Duration::from_secs(20),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            session_dir: super::default_data_dir(),
            backoff: BackoffConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Decode the pinned certificate hash, if one is configured
    pub fn fingerprint(&self) -> Result<Option<CertificateFingerprint>, ConfigError> {
        match self.cert_hash.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(text) => CertificateFingerprint::from_base64(text)
                .map(Some)
                .map_err(|e| ConfigError::Invalid(e.to_string())),
        }
    }

    /// Check the configuration for values the client cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.url.starts_with("https://") || self.url.len() <= "https://".len() {
            return Err(ConfigError::Invalid(format!(
                "url must be an https:// URL, got '{}'",
                self.url
            )));
        }

        self.fingerprint()?;

        for (name, value) in [
            ("connect_timeout", self.connect_timeout),
            ("max_idle_timeout", self.max_idle_timeout),
            ("heartbeat_timeout", self.heartbeat_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigError::Invalid(format!("{} must be non-zero", name)));
            }
        }

        if self.max_frame_size == 0 {
            return Err(ConfigError::Invalid("max_frame_size must be non-zero".into()));
        }

        self.backoff.validate()
    }
}

/// Exponential backoff configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Initial delay
    #[serde(with = "duration_secs")]
    pub initial: Duration,

    /// Maximum delay
    #[serde(with = "duration_secs")]
    pub max: Duration,

    /// Multiplier for each retry
    pub multiplier: f64,

    /// Jitter factor (0.0 to 1.0)
    pub jitter: f64,

    /// Give up after this many consecutive failed attempts
    pub max_attempts: Option<u32>,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: 0.25,
            max_attempts: None,
        }
    }
}

impl BackoffConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(ConfigError::Invalid(
                "backoff.multiplier must be a finite number of at least 1.0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(ConfigError::Invalid(
                "backoff.jitter must be between 0.0 and 1.0".into(),
            ));
        }
        if self.initial > self.max {
            return Err(ConfigError::Invalid(
                "backoff.initial must not exceed backoff.max".into(),
            ));
        }
        Ok(())
    }
}
