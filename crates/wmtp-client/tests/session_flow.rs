//! End-to-end session behaviour over the mock transport

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast;
use wmtp_client::testing::MockTransport;
use wmtp_client::{ProtocolSession, SessionEvent, SessionListener};
use wmtp_core::{Session, Transport};
use wmtp_protocol::{codes, InboundDecoder, Response};

fn setup() -> (Arc<MockTransport>, ProtocolSession) {
    let mock = Arc::new(MockTransport::new());
    let session = ProtocolSession::new(mock.clone());
    (mock, session)
}

/// Collect events until `n` have arrived
async fn take(events: &mut broadcast::Receiver<SessionEvent>, n: usize) -> Vec<SessionEvent> {
    let mut out = Vec::with_capacity(n);
    while out.len() < n {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for session event")
            .expect("event channel closed");
        out.push(event);
    }
    out
}

#[tokio::test]
async fn session_init_scenario() {
    let (mock, session) = setup();
    let mut events = session.subscribe();

    session.connect().await.unwrap();
    let init = Response::from_json(
        r#"{"status":"OK","cmd":"SESSION_INIT","session_token":"X","authenticated":false}"#,
    )
    .unwrap();
    mock.inject(init.clone());

    let fired = take(&mut events, 3).await;
    assert_eq!(fired[0], SessionEvent::Connected);
    assert_eq!(fired[1], SessionEvent::SessionInitialized(init.clone()));
    assert_eq!(fired[2], SessionEvent::Response(init));

    assert_eq!(
        session.session(),
        Session {
            token: Some("X".into()),
            authenticated: false,
            email: None,
            username: None,
        }
    );
    assert!(events.try_recv().is_err(), "initialized must fire once");
}

#[tokio::test]
async fn logout_ok_clears_all_fields() {
    let (mock, session) = setup();
    let mut events = session.subscribe();
    session.connect().await.unwrap();

    mock.inject(
        Response::ok("AUTH_OK")
            .with_token("T")
            .with_authenticated(true)
            .with_identity("a@b.com", "a"),
    );
    mock.inject(Response::ok("LOGOUT_OK"));
    take(&mut events, 4).await;

    assert_eq!(session.session(), Session::default());
}

#[tokio::test]
async fn logout_clears_local_state_without_waiting() {
    let (mock, session) = setup();
    let mut events = session.subscribe();
    session.connect().await.unwrap();

    mock.inject(
        Response::ok("AUTH_OK")
            .with_token("T")
            .with_authenticated(true)
            .with_identity("a@b.com", "a"),
    );
    take(&mut events, 3).await;
    assert!(session.is_authenticated());

    session.logout().await.unwrap();
    assert_eq!(session.session(), Session::default());
    assert_eq!(
        mock.sent().last().unwrap().to_json().unwrap(),
        r#"{"cmd":"LOGOUT","data":{"token":"T"}}"#
    );
}

#[tokio::test]
async fn notifications_follow_arrival_order() {
    let (mock, session) = setup();
    let mut events = session.subscribe();
    session.connect().await.unwrap();
    take(&mut events, 1).await;

    let sequence = vec![
        Response::heartbeat(1),
        Response::ok("SESSION_INIT").with_token("A"),
        Response::ok("PONG"),
        Response::err("AUTH", "AUTH_FAILED", codes::AUTH_FAILED),
        Response::heartbeat(2),
        Response::ok("INFO"),
    ];
    for msg in &sequence {
        mock.inject(msg.clone());
    }

    let fired = take(&mut events, 8).await;
    let expected = vec![
        SessionEvent::Heartbeat(sequence[0].clone()),
        SessionEvent::SessionInitialized(sequence[1].clone()),
        SessionEvent::Response(sequence[1].clone()),
        SessionEvent::Response(sequence[2].clone()),
        SessionEvent::Error(sequence[3].clone()),
        SessionEvent::Response(sequence[3].clone()),
        SessionEvent::Heartbeat(sequence[4].clone()),
        SessionEvent::Response(sequence[5].clone()),
    ];
    assert_eq!(fired, expected);
}

#[tokio::test]
async fn malformed_segment_is_dropped_and_the_rest_dispatched() {
    let (mock, session) = setup();
    let mut events = session.subscribe();
    session.connect().await.unwrap();
    take(&mut events, 1).await;

    // What the reader task does with one chunk off the wire
    let mut decoder = InboundDecoder::default();
    let decoded = decoder.feed(br#"{"cmd":"PONG",oops}{"status":"OK","cmd":"PONG"}"#);
    assert_eq!(decoded.len(), 2);
    let good: Vec<Response> = decoded.into_iter().filter_map(Result::ok).collect();
    assert_eq!(good.len(), 1);
    for msg in good {
        mock.inject(msg);
    }

    let fired = take(&mut events, 1).await;
    match &fired[0] {
        SessionEvent::Response(msg) => assert_eq!(msg.cmd, "PONG"),
        other => panic!("unexpected {:?}", other),
    }
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn teardown_fires_once() {
    let (mock, session) = setup();
    let mut events = session.subscribe();
    session.connect().await.unwrap();

    session.disconnect().await;
    session.disconnect().await;

    // Remote close after an explicit disconnect is a no-op
    mock.simulate_remote_close();
    session.disconnect().await;

    let fired = take(&mut events, 2).await;
    assert_eq!(fired, vec![SessionEvent::Connected, SessionEvent::Disconnected]);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(events.try_recv().is_err());
    assert_eq!(mock.disconnect_count(), 1);
}

#[tokio::test]
async fn remote_close_then_disconnect() {
    let (mock, session) = setup();
    let mut events = session.subscribe();
    session.connect().await.unwrap();

    mock.simulate_remote_close();
    session.disconnect().await;

    let fired = take(&mut events, 2).await;
    assert_eq!(fired[1], SessionEvent::Disconnected);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(events.try_recv().is_err());
}

#[derive(Default)]
struct Recorder {
    calls: Mutex<Vec<String>>,
}

impl Recorder {
    fn push(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

impl SessionListener for Recorder {
    fn on_connected(&self) {
        self.push("connected");
    }
    fn on_session_initialized(&self, msg: &Response) {
        self.push(format!("initialized:{}", msg.session_token.as_deref().unwrap_or("")));
    }
    fn on_auth_success(&self, msg: &Response) {
        self.push(format!("auth:{}", msg.email.as_deref().unwrap_or("")));
    }
    fn on_error(&self, msg: &Response) {
        self.push(format!("error:{}", msg.code.unwrap_or(0)));
    }
    fn on_disconnected(&self) {
        self.push("disconnected");
    }
}

#[tokio::test]
async fn multiple_listeners_see_every_event() {
    let (mock, session) = setup();
    let first = Arc::new(Recorder::default());
    let second = Arc::new(Recorder::default());
    session.attach(first.clone());
    session.attach(second.clone());

    mock.reply_to("INIT", Response::ok("SESSION_INIT").with_token("S"));
    mock.reply_to(
        "AUTH",
        Response::ok("AUTH_OK")
            .with_token("S")
            .with_authenticated(true)
            .with_identity("u@x.io", "u"),
    );

    session.connect().await.unwrap();
    session.init().await.unwrap();
    session.auth("u@x.io").await.unwrap();
    mock.inject(Response::err("MB_LIST", "AUTH_REQUIRED", codes::AUTH_REQUIRED));
    session.disconnect().await;

    tokio::time::sleep(Duration::from_millis(100)).await;

    let expected = vec![
        "connected",
        "initialized:S",
        "auth:u@x.io",
        "error:2002",
        "disconnected",
    ];
    assert_eq!(*first.calls.lock().unwrap(), expected);
    assert_eq!(*second.calls.lock().unwrap(), expected);
}

#[tokio::test]
async fn transport_errors_are_surfaced() {
    let (mock, session) = setup();
    let mut events = session.subscribe();
    mock.inject_error("stream reset");

    let fired = take(&mut events, 1).await;
    assert_eq!(fired[0], SessionEvent::TransportError("stream reset".into()));
    assert!(!mock.is_connected());
}
