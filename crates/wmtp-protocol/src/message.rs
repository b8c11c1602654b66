//! Request and response messages
//!
//! Requests are `{cmd, data?}`. Everything the server sends, heartbeats
//! included, is read as a [`Response`]: the heartbeat is simply a response
//! whose `cmd` is `HB`.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::ProtocolError;

/// Command names used on the wire
pub mod cmd {
    // Session commands
    pub const INIT: &str = "INIT";
    pub const AUTH: &str = "AUTH";
    pub const RESUME: &str = "RESUME";
    pub const LOGOUT: &str = "LOGOUT";
    pub const SESSION_INFO: &str = "SESSION_INFO";

    // Session replies consumed by the state machine
    pub const SESSION_INIT: &str = "SESSION_INIT";
    pub const AUTH_OK: &str = "AUTH_OK";
    pub const SESSION_RESUMED: &str = "SESSION_RESUMED";
    pub const LOGOUT_OK: &str = "LOGOUT_OK";

    // Connectivity
    pub const PING: &str = "PING";
    pub const PONG: &str = "PONG";
    pub const LATENCY_PING: &str = "LATENCY_PING";
    pub const LATENCY_PONG: &str = "LATENCY_PONG";
    pub const HB: &str = "HB";

    // Info
    pub const STATUS: &str = "STATUS";
    pub const INFO: &str = "INFO";
}

/// Numeric error codes carried in `ERR` responses
pub mod codes {
    // Parse errors (1xxx)
    pub const MALFORMED_JSON: u32 = 1001;
    pub const UNKNOWN_COMMAND: u32 = 1002;
    pub const MISSING_FIELD: u32 = 1003;
    pub const INVALID_FORMAT: u32 = 1004;

    // Auth errors (2xxx)
    pub const AUTH_FAILED: u32 = 2001;
    pub const AUTH_REQUIRED: u32 = 2002;
    pub const SESSION_NOT_FOUND: u32 = 2003;
    pub const SESSION_EXPIRED: u32 = 2004;
    pub const INVALID_TOKEN: u32 = 2005;

    // Mail errors (3xxx)
    pub const MAIL_NOT_FOUND: u32 = 3001;
    pub const MAILBOX_NOT_FOUND: u32 = 3002;
    pub const RECIPIENT_NOT_FOUND: u32 = 3003;
    pub const MAIL_TOO_LARGE: u32 = 3004;

    // Server errors (5xxx)
    pub const INTERNAL_ERROR: u32 = 5000;
    pub const SERVICE_UNAVAILABLE: u32 = 5001;
}

/// A server error code, known or not
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode(pub u32);

impl ErrorCode {
    /// Symbolic name for codes the client knows about
    pub fn name(&self) -> Option<&'static str> {
        let name = match self.0 {
            codes::MALFORMED_JSON => "MALFORMED_JSON",
            codes::UNKNOWN_COMMAND => "UNKNOWN_COMMAND",
            codes::MISSING_FIELD => "MISSING_FIELD",
            codes::INVALID_FORMAT => "INVALID_FORMAT",
            codes::AUTH_FAILED => "AUTH_FAILED",
            codes::AUTH_REQUIRED => "AUTH_REQUIRED",
            codes::SESSION_NOT_FOUND => "SESSION_NOT_FOUND",
            codes::SESSION_EXPIRED => "SESSION_EXPIRED",
            codes::INVALID_TOKEN => "INVALID_TOKEN",
            codes::MAIL_NOT_FOUND => "MAIL_NOT_FOUND",
            codes::MAILBOX_NOT_FOUND => "MAILBOX_NOT_FOUND",
            codes::RECIPIENT_NOT_FOUND => "RECIPIENT_NOT_FOUND",
            codes::MAIL_TOO_LARGE => "MAIL_TOO_LARGE",
            codes::INTERNAL_ERROR => "INTERNAL_ERROR",
            codes::SERVICE_UNAVAILABLE => "SERVICE_UNAVAILABLE",
            _ => return None,
        };
        Some(name)
    }

    /// True when the server no longer recognises the session token
    pub fn is_session_gone(&self) -> bool {
        matches!(
            self.0,
            codes::SESSION_NOT_FOUND | codes::SESSION_EXPIRED | codes::INVALID_TOKEN
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({})", name, self.0),
            None => write!(f, "code {}", self.0),
        }
    }
}

/// Outgoing request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Command name, e.g. `INIT`, `AUTH`, `PING`
    pub cmd: String,

    /// Optional payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Request {
    /// Create a request without payload. The command is upper-cased.
    pub fn new(cmd: impl AsRef<str>) -> Self {
        Self {
            cmd: cmd.as_ref().trim().to_ascii_uppercase(),
            data: None,
        }
    }

    /// Attach a payload
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn init() -> Self {
        Self::new(cmd::INIT)
    }

    pub fn auth(email: &str) -> Self {
        Self::new(cmd::AUTH).with_data(json!({ "email": email }))
    }

    pub fn resume(token: &str) -> Self {
        Self::new(cmd::RESUME).with_data(json!({ "token": token }))
    }

    /// `token` is `null` on the wire when the client holds no session
    pub fn logout(token: Option<&str>) -> Self {
        Self::new(cmd::LOGOUT).with_data(json!({ "token": token }))
    }

    pub fn ping() -> Self {
        Self::new(cmd::PING)
    }

    pub fn latency_ping() -> Self {
        Self::new(cmd::LATENCY_PING)
    }

    pub fn status() -> Self {
        Self::new(cmd::STATUS)
    }

    pub fn info() -> Self {
        Self::new(cmd::INFO)
    }

    pub fn session_info(token: Option<&str>) -> Self {
        Self::new(cmd::SESSION_INFO).with_data(json!({ "session_token": token }))
    }

    /// String field from `data`
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.as_ref()?.get(key)?.as_str()
    }

    /// Compact JSON encoding, exactly as written to the stream
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Response status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "ERR")]
    Err,
    /// Anything else the server might send
    #[serde(other)]
    Unknown,
}

/// Incoming message: a response, a server push, or a heartbeat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// `OK` / `ERR`; absent on legacy heartbeats
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,

    /// Command / response type
    pub cmd: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticated: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// Heartbeat timestamp (unix seconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<i64>,

    /// Fields the client does not model (`server_time`, `uptime`, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Response {
    /// Parse one framed segment
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let response: Response = serde_json::from_slice(bytes)?;
        if response.cmd.trim().is_empty() {
            return Err(ProtocolError::MissingCommand);
        }
        Ok(response)
    }

    /// Parse from text
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        Self::from_slice(text.as_bytes())
    }

    fn bare(status: Option<Status>, cmd: &str) -> Self {
        Self {
            status,
            cmd: cmd.to_string(),
            msg: None,
            session_token: None,
            authenticated: None,
            email: None,
            username: None,
            code: None,
            data: None,
            ts: None,
            extra: Map::new(),
        }
    }

    /// `OK` response for `cmd`
    pub fn ok(cmd: &str) -> Self {
        Self::bare(Some(Status::Ok), cmd)
    }

    /// `ERR` response for `cmd`
    pub fn err(cmd: &str, msg: &str, code: u32) -> Self {
        let mut response = Self::bare(Some(Status::Err), cmd);
        response.msg = Some(msg.to_string());
        response.code = Some(code);
        response
    }

    /// Legacy heartbeat shape `{cmd: "HB", ts}`
    pub fn heartbeat(ts: i64) -> Self {
        let mut response = Self::bare(None, cmd::HB);
        response.ts = Some(ts);
        response
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.session_token = Some(token.to_string());
        self
    }

    pub fn with_authenticated(mut self, authenticated: bool) -> Self {
        self.authenticated = Some(authenticated);
        self
    }

    pub fn with_identity(mut self, email: &str, username: &str) -> Self {
        self.email = Some(email.to_string());
        self.username = Some(username.to_string());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn is_heartbeat(&self) -> bool {
        self.cmd == cmd::HB
    }

    pub fn is_error(&self) -> bool {
        self.status == Some(Status::Err)
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        self.code.map(ErrorCode)
    }

    /// Compact JSON encoding
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
