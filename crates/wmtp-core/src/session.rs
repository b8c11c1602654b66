//! Client-side view of the server session
//!
//! [`Session`] holds what the client believes about its authentication
//! state. It changes only through the transition methods below, each of
//! which corresponds to one classified server reply, plus [`Session::clear`].
//! Every transition re-establishes the invariant that an authenticated
//! session always carries a token.

use serde::{Deserialize, Serialize};
use wmtp_protocol::Response;

/// Coarse position in the session state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No session token
    Uninitialized,
    /// Token issued, not authenticated
    Unauthenticated,
    /// Token issued and authenticated
    Authenticated,
}

/// Client-perceived session state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub token: Option<String>,
    pub authenticated: bool,
    pub email: Option<String>,
    pub username: Option<String>,
}

impl Session {
    /// Empty session
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> SessionPhase {
        match (&self.token, self.authenticated) {
            (None, _) => SessionPhase::Uninitialized,
            (Some(_), false) => SessionPhase::Unauthenticated,
            (Some(_), true) => SessionPhase::Authenticated,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.phase() == SessionPhase::Authenticated
    }

    /// `SESSION_INIT`: fresh, unauthenticated session
    pub fn apply_init(&mut self, msg: &Response) {
        self.token = non_empty(msg.session_token.as_deref());
        self.authenticated = false;
        self.email = None;
        self.username = None;
    }

    /// `AUTH_OK`: authenticated as the identity in the reply
    pub fn apply_auth(&mut self, msg: &Response) {
        if let Some(token) = non_empty(msg.session_token.as_deref()) {
            self.token = Some(token);
        }
        self.authenticated = true;
        self.adopt_identity(msg);
        self.enforce_invariant();
    }

    /// `SESSION_RESUMED`: whatever the server says the session is
    pub fn apply_resumed(&mut self, msg: &Response) {
        if let Some(token) = non_empty(msg.session_token.as_deref()) {
            self.token = Some(token);
        }
        self.authenticated = msg.authenticated.unwrap_or(false);
        self.adopt_identity(msg);
        self.enforce_invariant();
    }

    /// `LOGOUT_OK` or explicit clear
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Record to persist, if there is a token to persist
    pub fn to_saved(&self) -> Option<SavedSession> {
        let token = self.token.clone()?;
        Some(SavedSession {
            token,
            email: self.email.clone(),
            username: self.username.clone(),
        })
    }

    fn adopt_identity(&mut self, msg: &Response) {
        self.email = non_empty(msg.email.as_deref());
        self.username = non_empty(msg.username.as_deref()).or_else(|| {
            if self.authenticated {
                self.email.as_deref().and_then(username_from_email)
            } else {
                None
            }
        });
    }

    fn enforce_invariant(&mut self) {
        if self.token.is_none() {
            self.authenticated = false;
        }
    }
}

/// Session record kept in the persistent store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedSession {
    pub token: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

/// Local part of an address, as the server derives usernames
fn username_from_email(email: &str) -> Option<String> {
    email
        .split('@')
        .next()
        .filter(|local| !local.is_empty())
        .map(String::from)
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init(token: &str) -> Response {
        Response::ok("SESSION_INIT")
            .with_token(token)
            .with_authenticated(false)
    }

    #[test]
    fn test_init_starts_unauthenticated() {
        let mut session = Session::new();
        assert_eq!(session.phase(), SessionPhase::Uninitialized);

        session.apply_init(&init("X"));
        assert_eq!(
            session,
            Session {
                token: Some("X".into()),
                authenticated: false,
                email: None,
                username: None,
            }
        );
        assert_eq!(session.phase(), SessionPhase::Unauthenticated);
    }

    #[test]
    fn test_init_clears_previous_identity() {
        let mut session = Session {
            token: Some("old".into()),
            authenticated: true,
            email: Some("a@b.com".into()),
            username: Some("a".into()),
        };
        session.apply_init(&init("new"));
        assert_eq!(session.token.as_deref(), Some("new"));
        assert!(!session.authenticated);
        assert!(session.email.is_none());
        assert!(session.username.is_none());
    }

    #[test]
    fn test_auth_ok() {
        let mut session = Session::new();
        session.apply_init(&init("T0"));
        session.apply_auth(
            &Response::ok("AUTH_OK")
                .with_token("T1")
                .with_authenticated(true)
                .with_identity("user@example.com", "user"),
        );
        assert!(session.is_authenticated());
        assert_eq!(session.token.as_deref(), Some("T1"));
        assert_eq!(session.email.as_deref(), Some("user@example.com"));
        assert_eq!(session.username.as_deref(), Some("user"));
    }

    #[test]
    fn test_auth_ok_without_token_keeps_current_token() {
        let mut session = Session::new();
        session.apply_init(&init("T0"));
        let mut reply = Response::ok("AUTH_OK");
        reply.email = Some("bob@example.com".into());
        session.apply_auth(&reply);

        assert_eq!(session.token.as_deref(), Some("T0"));
        assert!(session.authenticated);
        // Username falls back to the local part
        assert_eq!(session.username.as_deref(), Some("bob"));
    }

    #[test]
    fn test_auth_ok_without_any_token_cannot_authenticate() {
        let mut session = Session::new();
        session.apply_auth(&Response::ok("AUTH_OK").with_authenticated(true));
        assert!(!session.authenticated);
        assert_eq!(session.phase(), SessionPhase::Uninitialized);
    }

    #[test]
    fn test_resumed_follows_authenticated_flag() {
        let mut session = Session::new();
        session.apply_resumed(
            &Response::ok("SESSION_RESUMED")
                .with_token("R")
                .with_authenticated(true)
                .with_identity("r@x.io", "r"),
        );
        assert!(session.is_authenticated());

        session.apply_resumed(
            &Response::ok("SESSION_RESUMED")
                .with_token("R2")
                .with_authenticated(false),
        );
        assert_eq!(session.phase(), SessionPhase::Unauthenticated);
        assert!(session.email.is_none());
        assert!(session.username.is_none());
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut session = Session {
            token: Some("T".into()),
            authenticated: true,
            email: Some("a@b.com".into()),
            username: Some("a".into()),
        };
        session.clear();
        assert_eq!(session, Session::default());
    }

    #[test]
    fn test_to_saved_requires_token() {
        assert!(Session::new().to_saved().is_none());

        let session = Session {
            token: Some("T".into()),
            authenticated: true,
            email: Some("a@b.com".into()),
            username: Some("a".into()),
        };
        let saved = session.to_saved().unwrap();
        assert_eq!(saved.token, "T");
        assert_eq!(saved.email.as_deref(), Some("a@b.com"));
        assert_eq!(saved.username.as_deref(), Some("a"));
    }
}
