//! wmtp-core: Core abstractions and configuration for the WMTP client
//!
//! This crate provides the types shared by the transport, the protocol
//! session and the command-line driver: the error taxonomy, the
//! [`Transport`](traits::Transport) seam, the client-side session model,
//! the key-value store contract used to persist sessions, and TOML
//! configuration.

pub mod config;
pub mod error;
pub mod session;
pub mod store;
pub mod traits;
pub mod types;

pub use error::{SessionError, StoreError, TransportError, WmtpError};
pub use session::{SavedSession, Session, SessionPhase};
pub use store::{FileStore, MemoryStore};
pub use traits::{KeyValueStore, Transport, TransportEvent};
pub use types::{CertificateFingerprint, ConnectionState};
