//! Login and logout

use std::time::Duration;

use anyhow::{bail, Context, Result};

use wmtp_client::SessionEvent;
use wmtp_core::config::ClientConfig;
use wmtp_protocol::{cmd, Response};

use super::connect::{describe_error, Connection};
use crate::output::{print_info, print_success, print_warning};

/// Start a fresh session and authenticate it as `email`
pub async fn login_command(config: &ClientConfig, timeout: Duration, email: &str) -> Result<()> {
    let mut conn = Connection::open(config, timeout).await?;
    let result = login(&mut conn, email).await;
    conn.close().await;

    let reply = result?;
    print_success(&format!(
        "Logged in as {}",
        reply.email.as_deref().unwrap_or(email)
    ));
    Ok(())
}

/// INIT, AUTH, wait for the outcome, save on success
pub async fn login(conn: &mut Connection, email: &str) -> Result<Response> {
    conn.session().init().await?;
    let reply = conn.next_response().await?;
    if reply.is_error() {
        bail!("Session init failed: {}", describe_error(&reply));
    }

    conn.session().auth(email).await?;
    let outcome = conn
        .wait_for(|event| match event {
            SessionEvent::AuthSuccess(msg) => Some(Ok(msg.clone())),
            SessionEvent::Error(msg) if msg.cmd == cmd::AUTH => Some(Err(msg.clone())),
            _ => None,
        })
        .await?;

    match outcome {
        Ok(msg) => {
            conn.session()
                .save_session()
                .context("Failed to save session")?;
            Ok(msg)
        }
        Err(msg) => bail!("Login failed: {}", describe_error(&msg)),
    }
}

/// Resume the saved session, log it out, forget it
pub async fn logout_command(config: &ClientConfig, timeout: Duration) -> Result<()> {
    let mut conn = Connection::open(config, timeout).await?;
    let result = logout(&mut conn).await;
    conn.close().await;

    match result? {
        true => print_success("Logged out"),
        false => print_info("No saved session"),
    }
    Ok(())
}

/// Returns false when there was no saved session to log out
pub async fn logout(conn: &mut Connection) -> Result<bool> {
    let Some(saved) = conn.session().load_session() else {
        return Ok(false);
    };

    conn.session().resume(&saved.token).await?;
    let reply = conn.next_response().await?;
    if reply.is_error() {
        // Server already forgot it; nothing left to log out remotely
        print_warning(&format!("Saved session not resumed: {}", describe_error(&reply)));
    } else {
        conn.session().logout().await?;
        let reply = conn.next_response().await?;
        if reply.is_error() {
            print_warning(&format!("Server rejected logout: {}", describe_error(&reply)));
        }
    }

    conn.session()
        .clear_session()
        .context("Failed to clear saved session")?;
    Ok(true)
}
