//! Inbound message classification

use wmtp_core::Session;
use wmtp_protocol::{cmd, Response};

use super::SessionEvent;

/// Apply `msg` to `session` and return the notifications it fires, in order
pub fn classify(session: &mut Session, msg: &Response) -> Vec<SessionEvent> {
    if msg.is_heartbeat() {
        return vec![SessionEvent::Heartbeat(msg.clone())];
    }

    let mut events = Vec::with_capacity(3);
    match msg.cmd.as_str() {
        cmd::SESSION_INIT => {
            session.apply_init(msg);
            events.push(SessionEvent::SessionInitialized(msg.clone()));
        }
        cmd::AUTH_OK => {
            session.apply_auth(msg);
            events.push(SessionEvent::AuthSuccess(msg.clone()));
        }
        cmd::SESSION_RESUMED => {
            session.apply_resumed(msg);
            events.push(SessionEvent::SessionInitialized(msg.clone()));
        }
        cmd::LOGOUT_OK => session.clear(),
        _ => {}
    }

    if msg.is_error() {
        events.push(SessionEvent::Error(msg.clone()));
    }
    events.push(SessionEvent::Response(msg.clone()));
    events
}
