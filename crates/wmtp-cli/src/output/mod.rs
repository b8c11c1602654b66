//! Output formatting utilities for the CLI
//!
//! Tables for server responses and the saved session, one-line renderings
//! of session events, and colored status messages.

use serde_json::Value;
use tabled::{settings::Style, Table, Tabled};

use wmtp_client::SessionEvent;
use wmtp_core::SavedSession;
use wmtp_protocol::{Response, Status};

#[derive(Tabled)]
struct FieldRow {
    #[tabled(rename = "FIELD")]
    field: String,
    #[tabled(rename = "VALUE")]
    value: String,
}

fn row(field: &str, value: impl Into<String>) -> FieldRow {
    FieldRow {
        field: field.to_string(),
        value: value.into(),
    }
}

/// Format a server response as a FIELD / VALUE table
///
/// Only fields present in the message are listed. Fields the client does
/// not model (`server_time`, `uptime`, ...) follow in key order.
pub fn format_response(msg: &Response) -> String {
    let mut rows = vec![row("cmd", msg.cmd.clone())];

    if let Some(status) = msg.status {
        rows.push(row("status", status_label(status)));
    }
    if let Some(text) = &msg.msg {
        rows.push(row("msg", text.clone()));
    }
    if let Some(code) = msg.error_code() {
        rows.push(row("code", code.to_string()));
    }
    if let Some(token) = &msg.session_token {
        rows.push(row("session_token", token.clone()));
    }
    if let Some(authenticated) = msg.authenticated {
        rows.push(row("authenticated", authenticated.to_string()));
    }
    if let Some(email) = &msg.email {
        rows.push(row("email", email.clone()));
    }
    if let Some(username) = &msg.username {
        rows.push(row("username", username.clone()));
    }
    if let Some(ts) = msg.ts {
        rows.push(row("ts", ts.to_string()));
    }
    if let Some(data) = &msg.data {
        rows.push(row("data", render_value(data)));
    }

    let mut extra: Vec<(&String, &Value)> = msg.extra.iter().collect();
    extra.sort_by(|a, b| a.0.cmp(b.0));
    for (key, value) in extra {
        rows.push(row(key, render_value(value)));
    }

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Format the saved session record
pub fn format_session(saved: Option<&SavedSession>) -> String {
    let Some(saved) = saved else {
        return "No saved session".to_string();
    };

    let rows = vec![
        row("token", truncate(&saved.token, 40)),
        row("email", saved.email.clone().unwrap_or_else(|| "-".to_string())),
        row(
            "username",
            saved.username.clone().unwrap_or_else(|| "-".to_string()),
        ),
    ];
    Table::new(rows).with(Style::rounded()).to_string()
}

/// One line per session event, for `watch`
pub fn format_event(event: &SessionEvent) -> String {
    match event {
        SessionEvent::Connected => "connected".to_string(),
        SessionEvent::Disconnected => "disconnected".to_string(),
        SessionEvent::TransportError(e) => format!("transport error: {}", e),
        SessionEvent::Heartbeat(msg) => match msg.ts {
            Some(ts) => format!("heartbeat ts={}", ts),
            None => "heartbeat".to_string(),
        },
        SessionEvent::SessionInitialized(msg) => format!(
            "session {} ({})",
            msg.session_token.as_deref().map(|t| truncate(t, 16)).unwrap_or_else(|| "-".into()),
            msg.cmd
        ),
        SessionEvent::AuthSuccess(msg) => format!(
            "authenticated as {}",
            msg.email.as_deref().unwrap_or("-")
        ),
        SessionEvent::Error(msg) => format!(
            "error on {}: {}{}",
            msg.cmd,
            msg.msg.as_deref().unwrap_or("unknown error"),
            msg.error_code()
                .map(|c| format!(" [{}]", c))
                .unwrap_or_default()
        ),
        SessionEvent::Response(msg) => format_compact(msg),
    }
}

/// `<cmd> <json>` on one line
pub fn format_compact(msg: &Response) -> String {
    match msg.to_json() {
        Ok(json) => format!("{} {}", msg.cmd, json),
        Err(_) => msg.cmd.clone(),
    }
}

fn status_label(status: Status) -> &'static str {
    match status {
        Status::Ok => "OK",
        Status::Err => "ERR",
        Status::Unknown => "?",
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// Truncate a string with ellipsis if too long
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Green),
        Print("✓ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an error message in red to stderr
pub fn print_error(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Red),
        Print("✗ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a warning message in yellow to stderr
pub fn print_warning(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Yellow),
        Print("⚠ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

pub fn print_info(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Cyan),
        Print("ℹ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}
