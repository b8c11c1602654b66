//! Core domain types

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::TransportError;

/// Lifecycle state of a transport connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No connection; stream handles released
    #[default]
    Disconnected,
    /// Handshake in progress
    Connecting,
    /// Control stream open
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

/// SHA-256 digest of a server certificate, used to trust self-signed
/// deployments without a CA chain
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CertificateFingerprint([u8; 32]);

impl CertificateFingerprint {
    /// Wrap a raw digest
    pub fn new(digest: [u8; 32]) -> Self {
        Self(digest)
    }

    /// Decode the base64 text form handed out to clients
    pub fn from_base64(text: &str) -> Result<Self, TransportError> {
        let bytes = STANDARD
            .decode(text.trim())
            .map_err(|e| TransportError::InvalidFingerprint(e.to_string()))?;
        let digest: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            TransportError::InvalidFingerprint(format!(
                "expected 32 bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(digest))
    }

    /// Fingerprint of a DER-encoded certificate
    pub fn of_der(der: &[u8]) -> Self {
        Self(Sha256::digest(der).into())
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for CertificateFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CertificateFingerprint({})", self.to_base64())
    }
}

impl fmt::Display for CertificateFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}
