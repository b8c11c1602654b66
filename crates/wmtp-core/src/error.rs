//! Core error types for the WMTP client

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use wmtp_protocol::ProtocolError;

/// Top-level error type for the WMTP client
#[derive(Error, Debug)]
pub enum WmtpError {
    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Transport error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Session error
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Session store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Transport-level errors
#[derive(Error, Debug)]
pub enum TransportError {
    /// The runtime cannot provide a WebTransport endpoint
    #[error("WebTransport unavailable: {0}")]
    CapabilityUnavailable(String),

    /// Send attempted without a live connection
    #[error("Not connected")]
    NotConnected,

    /// Address is not a usable WebTransport URL
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Pinned certificate fingerprint could not be decoded
    #[error("Invalid certificate fingerprint: {0}")]
    InvalidFingerprint(String),

    /// QUIC / HTTP3 / WebTransport handshake failed
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// The control stream could not be opened
    #[error("Failed to open control stream: {0}")]
    StreamOpen(String),

    /// Handshake and stream open did not finish in time
    #[error("Connection timed out after {0:?}")]
    Timeout(Duration),

    /// Writing a frame failed
    #[error("Write failed: {0}")]
    Write(String),

    /// Message could not be encoded
    #[error("Encode failed: {0}")]
    Encode(#[from] ProtocolError),
}

impl TransportError {
    /// Errors that retrying cannot fix
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TransportError::CapabilityUnavailable(_)
                | TransportError::InvalidAddress(_)
                | TransportError::InvalidFingerprint(_)
        )
    }
}

/// Protocol session errors
#[derive(Error, Debug)]
pub enum SessionError {
    /// A command argument failed validation
    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// A caller-built command was rejected before sending
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// The transport refused or failed the send
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Persistent store errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Reading or writing the backing file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Record could not be encoded
    #[error("Serialize error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
