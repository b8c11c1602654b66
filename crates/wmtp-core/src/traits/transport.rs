//! Transport traits

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::TransportError;
use crate::types::ConnectionState;
use wmtp_protocol::{Request, Response};

/// Lifecycle and traffic notifications published by a transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Control stream is open
    Connected,
    /// Connection torn down, whatever the cause
    Disconnected,
    /// Connect failure or read error, as text
    Error(String),
    /// One inbound message, in arrival order
    Message(Response),
}

/// Abstraction over a message-oriented connection to the server
///
/// Connection parameters are fixed when the implementation is built, so
/// `connect` takes no arguments.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish the connection and open the control stream
    ///
    /// Returns `Ok` without side effects when already connected.
    async fn connect(&self) -> Result<(), TransportError>;

    /// Close the connection; safe to call at any time
    async fn disconnect(&self);

    /// Write one message. Fails with `NotConnected` unless connected.
    async fn send(&self, request: &Request) -> Result<(), TransportError>;

    /// Current connection state
    fn state(&self) -> ConnectionState;

    /// Subscribe to lifecycle and message notifications
    fn subscribe(&self) -> broadcast::Receiver<TransportEvent>;

    /// Check if the transport is connected
    fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }
}
