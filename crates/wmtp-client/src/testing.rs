//! Test doubles and conformance checks for [`Transport`] implementations.
//!
//! [`MockTransport`] records every request it is asked to send and lets a
//! test play the server: inject inbound messages, queue connect failures,
//! script replies to specific commands, or simulate a remote close.
//!
//! ```rust,ignore
//! let mock = Arc::new(MockTransport::new());
//! mock.reply_to("INIT", Response::ok("SESSION_INIT").with_token("X"));
//! let session = ProtocolSession::new(mock.clone());
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::broadcast;

use wmtp_core::{ConnectionState, Transport, TransportError, TransportEvent};
use wmtp_protocol::{Request, Response};

const MOCK_EVENT_CHANNEL_CAPACITY: usize = 256;

/// In-memory [`Transport`]
pub struct MockTransport {
    state: Mutex<ConnectionState>,
    events: broadcast::Sender<TransportEvent>,
    sent: Mutex<Vec<Request>>,
    connect_failures: Mutex<VecDeque<TransportError>>,
    replies: Mutex<HashMap<String, VecDeque<Response>>>,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(MOCK_EVENT_CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(ConnectionState::Disconnected),
            events,
            sent: Mutex::new(Vec::new()),
            connect_failures: Mutex::new(VecDeque::new()),
            replies: Mutex::new(HashMap::new()),
            connects: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
        }
    }

    /// Make the next `connect` fail with `error`. Queued failures are used
    /// in order.
    pub fn fail_next_connect(&self, error: TransportError) {
        if let Ok(mut failures) = self.connect_failures.lock() {
            failures.push_back(error);
        }
    }

    /// Answer the next request for `cmd` with `reply`. Several replies for
    /// the same command are used in order.
    pub fn reply_to(&self, cmd: &str, reply: Response) {
        if let Ok(mut replies) = self.replies.lock() {
            replies
                .entry(cmd.to_ascii_uppercase())
                .or_default()
                .push_back(reply);
        }
    }

    /// Deliver an inbound message as if the server had sent it
    pub fn inject(&self, message: Response) {
        let _ = self.events.send(TransportEvent::Message(message));
    }

    /// Publish a read error as the reader task would
    pub fn inject_error(&self, error: &str) {
        let _ = self.events.send(TransportEvent::Error(error.to_string()));
    }

    /// Server closed the stream
    pub fn simulate_remote_close(&self) {
        self.teardown();
    }

    /// Requests sent so far
    pub fn sent(&self) -> Vec<Request> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Command names sent so far
    pub fn sent_commands(&self) -> Vec<String> {
        self.sent().into_iter().map(|r| r.cmd).collect()
    }

    pub fn clear_sent(&self) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.clear();
        }
    }

    /// Successful connects
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Teardowns that actually happened
    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    fn set_state(&self, state: ConnectionState) -> ConnectionState {
        match self.state.lock() {
            Ok(mut current) => std::mem::replace(&mut *current, state),
            Err(_) => ConnectionState::Disconnected,
        }
    }

    fn teardown(&self) {
        if self.set_state(ConnectionState::Disconnected) == ConnectionState::Connected {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
            let _ = self.events.send(TransportEvent::Disconnected);
        }
    }

    fn scripted_reply(&self, cmd: &str) -> Option<Response> {
        self.replies
            .lock()
            .ok()
            .and_then(|mut replies| replies.get_mut(cmd).and_then(VecDeque::pop_front))
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        if self.state() == ConnectionState::Connected {
            return Ok(());
        }

        let failure = self
            .connect_failures
            .lock()
            .ok()
            .and_then(|mut failures| failures.pop_front());
        if let Some(error) = failure {
            if !error.is_fatal() {
                let _ = self.events.send(TransportEvent::Error(error.to_string()));
            }
            return Err(error);
        }

        self.set_state(ConnectionState::Connected);
        self.connects.fetch_add(1, Ordering::SeqCst);
        let _ = self.events.send(TransportEvent::Connected);
        Ok(())
    }

    async fn disconnect(&self) {
        self.teardown();
    }

    async fn send(&self, request: &Request) -> Result<(), TransportError> {
        if self.state() != ConnectionState::Connected {
            return Err(TransportError::NotConnected);
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(request.clone());
        }
        if let Some(reply) = self.scripted_reply(&request.cmd) {
            self.inject(reply);
        }
        Ok(())
    }

    fn state(&self) -> ConnectionState {
        self.state
            .lock()
            .map(|s| *s)
            .unwrap_or(ConnectionState::Disconnected)
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }
}

/// Assert that a fresh transport reports `Disconnected`.
pub fn assert_disconnected_before_connect(transport: &dyn Transport) {
    assert_eq!(
        transport.state(),
        ConnectionState::Disconnected,
        "transport should start disconnected"
    );
    assert!(!transport.is_connected());
}

/// Assert that sending before `connect()` fails with `NotConnected`.
pub async fn assert_send_before_connect_fails(transport: &dyn Transport) {
    let result = transport.send(&Request::ping()).await;
    assert!(
        matches!(result, Err(TransportError::NotConnected)),
        "send before connect should fail with NotConnected, got {:?}",
        result
    );
}

/// Assert that disconnecting twice fires at most one `Disconnected`.
pub async fn assert_double_disconnect_is_idempotent(transport: &dyn Transport) {
    let mut events = transport.subscribe();
    let was_connected = transport.is_connected();

    transport.disconnect().await;
    transport.disconnect().await;

    let mut disconnects = 0;
    while let Ok(event) = events.try_recv() {
        if event == TransportEvent::Disconnected {
            disconnects += 1;
        }
    }
    let expected = usize::from(was_connected);
    assert_eq!(
        disconnects, expected,
        "expected {} Disconnected events, got {}",
        expected, disconnects
    );
    assert_eq!(transport.state(), ConnectionState::Disconnected);
}

/// Run the checks that need no server.
pub async fn assert_offline_conformance(transport: &dyn Transport) {
    assert_disconnected_before_connect(transport);
    assert_send_before_connect_fails(transport).await;
    assert_double_disconnect_is_idempotent(transport).await;
}
