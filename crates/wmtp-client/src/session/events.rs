//! Session notifications

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::warn;

use wmtp_protocol::Response;

/// Notification fired by [`ProtocolSession`](super::ProtocolSession)
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Transport connected
    Connected,
    /// Transport torn down
    Disconnected,
    /// Transport-level failure (connect or read)
    TransportError(String),
    /// Server heartbeat; no other notification fires for it
    Heartbeat(Response),
    /// `SESSION_INIT` or `SESSION_RESUMED` was applied
    SessionInitialized(Response),
    /// `AUTH_OK` was applied
    AuthSuccess(Response),
    /// Any `ERR` response
    Error(Response),
    /// Every non-heartbeat message, after the more specific notifications
    Response(Response),
}

impl SessionEvent {
    /// Call the matching listener hook
    pub fn deliver(&self, listener: &dyn SessionListener) {
        match self {
            SessionEvent::Connected => listener.on_connected(),
            SessionEvent::Disconnected => listener.on_disconnected(),
            SessionEvent::TransportError(error) => listener.on_transport_error(error),
            SessionEvent::Heartbeat(msg) => listener.on_heartbeat(msg),
            SessionEvent::SessionInitialized(msg) => listener.on_session_initialized(msg),
            SessionEvent::AuthSuccess(msg) => listener.on_auth_success(msg),
            SessionEvent::Error(msg) => listener.on_error(msg),
            SessionEvent::Response(msg) => listener.on_response(msg),
        }
    }
}

/// Typed hooks for session notifications. Override the ones you need.
pub trait SessionListener: Send + Sync {
    fn on_connected(&self) {}
    fn on_disconnected(&self) {}
    fn on_transport_error(&self, _error: &str) {}
    fn on_heartbeat(&self, _msg: &Response) {}
    fn on_session_initialized(&self, _msg: &Response) {}
    fn on_auth_success(&self, _msg: &Response) {}
    fn on_error(&self, _msg: &Response) {}
    fn on_response(&self, _msg: &Response) {}
}

/// Drive `listener` from `events` until the channel closes
pub(crate) fn spawn_listener(
    mut events: broadcast::Receiver<SessionEvent>,
    listener: Arc<dyn SessionListener>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => event.deliver(listener.as_ref()),
                Err(RecvError::Lagged(n)) => {
                    warn!("Session listener lagged, skipped {} events", n);
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
