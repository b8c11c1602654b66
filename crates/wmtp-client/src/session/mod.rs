//! Protocol session
//!
//! [`ProtocolSession`] turns command calls into requests on an injected
//! [`Transport`] and classifies everything the transport publishes, in
//! arrival order, on a single dispatcher task. Commands are fire and
//! forget: they return once the request is written, and replies arrive as
//! [`SessionEvent`]s.

mod classify;
mod events;

pub use classify::classify;
pub use events::{SessionEvent, SessionListener};

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use wmtp_core::store;
use wmtp_core::{
    KeyValueStore, SavedSession, Session, SessionError, StoreError, Transport, TransportError,
    TransportEvent,
};
use wmtp_protocol::{Request, Response};

/// Channel capacity for session notifications
const SESSION_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Session state shared between the handle and its dispatcher
type SharedSession = Arc<RwLock<Session>>;

/// Command API and session state machine over a [`Transport`]
pub struct ProtocolSession {
    transport: Arc<dyn Transport>,
    session: SharedSession,
    events: broadcast::Sender<SessionEvent>,
    store: Option<Arc<dyn KeyValueStore>>,
    dispatcher: JoinHandle<()>,
}

impl ProtocolSession {
    /// Attach to `transport` and start classifying its events.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let (events, _) = broadcast::channel(SESSION_EVENT_CHANNEL_CAPACITY);
        let session = SharedSession::default();
        let dispatcher = tokio::spawn(dispatch(
            transport.subscribe(),
            Arc::clone(&session),
            events.clone(),
        ));

        Self {
            transport,
            session,
            events,
            store: None,
            dispatcher,
        }
    }

    /// Use `store` for the persistence bridge
    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Subscribe to session notifications
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Drive `listener` from this session's notifications on its own task
    pub fn attach(&self, listener: Arc<dyn SessionListener>) -> JoinHandle<()> {
        events::spawn_listener(self.subscribe(), listener)
    }

    /// Snapshot of the current session state
    pub fn session(&self) -> Session {
        read_lock(&self.session).clone()
    }

    pub fn token(&self) -> Option<String> {
        read_lock(&self.session).token.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        read_lock(&self.session).is_authenticated()
    }

    pub async fn connect(&self) -> Result<(), TransportError> {
        self.transport.connect().await
    }

    pub async fn disconnect(&self) {
        self.transport.disconnect().await
    }

    /// Ask the server for a fresh session
    pub async fn init(&self) -> Result<(), SessionError> {
        self.write(Request::init()).await
    }

    /// Authenticate the current session as `email`
    pub async fn auth(&self, email: &str) -> Result<(), SessionError> {
        let email = email.trim();
        if email.is_empty() {
            return Err(SessionError::InvalidArgument("email must not be empty"));
        }
        self.write(Request::auth(email)).await
    }

    /// Resume a previously issued session
    pub async fn resume(&self, token: &str) -> Result<(), SessionError> {
        if token.is_empty() {
            return Err(SessionError::InvalidArgument("token must not be empty"));
        }
        self.write(Request::resume(token)).await
    }

    /// End the session. Local state is cleared once the write returns,
    /// whether or not it succeeded and without waiting for `LOGOUT_OK`.
    pub async fn logout(&self) -> Result<(), SessionError> {
        let token = self.token();
        let result = self.write(Request::logout(token.as_deref())).await;
        write_lock(&self.session).clear();
        result
    }

    pub async fn ping(&self) -> Result<(), SessionError> {
        self.write(Request::ping()).await
    }

    pub async fn latency_ping(&self) -> Result<(), SessionError> {
        self.write(Request::latency_ping()).await
    }

    pub async fn status(&self) -> Result<(), SessionError> {
        self.write(Request::status()).await
    }

    pub async fn info(&self) -> Result<(), SessionError> {
        self.write(Request::info()).await
    }

    /// Ask the server to describe the current session
    pub async fn session_info(&self) -> Result<(), SessionError> {
        let token = self.token();
        self.write(Request::session_info(token.as_deref())).await
    }

    /// Send a caller-built request as-is, apart from upper-casing `cmd`
    pub async fn send(&self, request: Request) -> Result<(), SessionError> {
        let cmd = request.cmd.trim().to_ascii_uppercase();
        if cmd.is_empty() {
            return Err(SessionError::InvalidCommand(
                "command name must not be empty".to_string(),
            ));
        }
        self.write(Request { cmd, ..request }).await
    }

    /// Persist the current session. Returns whether anything was written;
    /// sessions without a token and sessions without a store write nothing.
    pub fn save_session(&self) -> Result<bool, StoreError> {
        match &self.store {
            Some(s) => store::save_session(s.as_ref(), &self.session()),
            None => Ok(false),
        }
    }

    /// Saved session, if there is a readable one
    pub fn load_session(&self) -> Option<SavedSession> {
        match &self.store {
            Some(s) => store::load_session(s.as_ref()),
            None => None,
        }
    }

    /// Delete the saved session
    pub fn clear_session(&self) -> Result<(), StoreError> {
        match &self.store {
            Some(s) => store::clear_session(s.as_ref()),
            None => Ok(()),
        }
    }

    async fn write(&self, request: Request) -> Result<(), SessionError> {
        self.transport.send(&request).await?;
        Ok(())
    }
}

impl Drop for ProtocolSession {
    fn drop(&mut self) {
        self.dispatcher.abort();
    }
}

/// Classify transport events in arrival order
async fn dispatch(
    mut transport_events: broadcast::Receiver<TransportEvent>,
    session: SharedSession,
    events: broadcast::Sender<SessionEvent>,
) {
    loop {
        let event = match transport_events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(n)) => {
                warn!("Session dispatcher lagged, dropped {} transport events", n);
                continue;
            }
            Err(RecvError::Closed) => {
                debug!("Transport event channel closed");
                break;
            }
        };

        let fired = match event {
            TransportEvent::Connected => vec![SessionEvent::Connected],
            TransportEvent::Disconnected => vec![SessionEvent::Disconnected],
            TransportEvent::Error(error) => vec![SessionEvent::TransportError(error)],
            TransportEvent::Message(msg) => apply(&session, &msg),
        };
        for event in fired {
            let _ = events.send(event);
        }
    }
}

fn apply(session: &SharedSession, msg: &Response) -> Vec<SessionEvent> {
    let mut guard = write_lock(session);
    classify(&mut guard, msg)
}

// Session updates are single assignments, so a poisoned lock still holds
// a consistent value.
fn read_lock(session: &RwLock<Session>) -> RwLockReadGuard<'_, Session> {
    session.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_lock(session: &RwLock<Session>) -> RwLockWriteGuard<'_, Session> {
    session.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
