//! wmtp-client: WebTransport client and protocol session
//!
//! [`WebTransportClient`] owns the QUIC connection and its single control
//! stream, turning bytes into [`Response`](wmtp_protocol::Response)s.
//! [`ProtocolSession`] sits on top of any [`Transport`](wmtp_core::Transport),
//! sends commands, tracks the session state machine and fans out typed
//! notifications. [`HeartbeatMonitor`] and [`Supervisor`] keep a long-lived
//! connection healthy.

pub mod heartbeat;
pub mod session;
pub mod supervisor;
pub mod testing;
pub mod transport;

pub use heartbeat::HeartbeatMonitor;
pub use session::{ProtocolSession, SessionEvent, SessionListener};
pub use supervisor::Supervisor;
pub use transport::{ExponentialBackoff, TransportOptions, WebTransportClient};
