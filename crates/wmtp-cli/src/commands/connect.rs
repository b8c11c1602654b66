//! Connection setup shared by the networked commands

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use wmtp_client::{ProtocolSession, SessionEvent, TransportOptions, WebTransportClient};
use wmtp_core::config::ClientConfig;
use wmtp_core::FileStore;
use wmtp_protocol::Response;

/// Build a session over WebTransport with the file-backed session store
pub fn build_session(config: &ClientConfig) -> Result<ProtocolSession> {
    let options = TransportOptions::from_config(config).context("Invalid transport options")?;
    let transport = Arc::new(WebTransportClient::new(options));
    let store = Arc::new(FileStore::new(config.session_dir.clone()));
    Ok(ProtocolSession::new(transport).with_store(store))
}

/// A connected session plus an event subscription used to wait for replies
pub struct Connection {
    session: ProtocolSession,
    events: broadcast::Receiver<SessionEvent>,
    timeout: Duration,
}

impl Connection {
    /// Connect to the configured server. `timeout` bounds every reply wait.
    pub async fn open(config: &ClientConfig, timeout: Duration) -> Result<Self> {
        let session = build_session(config)?;
        Self::over(session, timeout).await
    }

    /// Connect an already built session
    pub async fn over(session: ProtocolSession, timeout: Duration) -> Result<Self> {
        // Subscribe first so nothing sent right after connect is missed
        let events = session.subscribe();
        session
            .connect()
            .await
            .context("Failed to connect to server")?;
        Ok(Self {
            session,
            events,
            timeout,
        })
    }

    pub fn session(&self) -> &ProtocolSession {
        &self.session
    }

    /// Wait for the first event `pick` accepts
    pub async fn wait_for<T>(
        &mut self,
        mut pick: impl FnMut(&SessionEvent) -> Option<T>,
    ) -> Result<T> {
        let deadline = Instant::now() + self.timeout;
        loop {
            let event = match tokio::time::timeout_at(deadline, self.events.recv()).await {
                Err(_) => bail!("No reply from server within {:?}", self.timeout),
                Ok(Err(RecvError::Lagged(n))) => {
                    warn!("Skipped {} session events", n);
                    continue;
                }
                Ok(Err(RecvError::Closed)) => bail!("Session closed"),
                Ok(Ok(event)) => event,
            };

            if let Some(found) = pick(&event) {
                return Ok(found);
            }
            match event {
                SessionEvent::Disconnected => bail!("Connection closed by server"),
                SessionEvent::TransportError(e) => warn!("Transport error: {}", e),
                _ => {}
            }
        }
    }

    /// Next non-heartbeat message
    pub async fn next_response(&mut self) -> Result<Response> {
        self.wait_for(|event| match event {
            SessionEvent::Response(msg) => Some(msg.clone()),
            _ => None,
        })
        .await
    }

    /// Resume the saved session, or start a new one when there is none or
    /// the server no longer knows it
    pub async fn bootstrap(&mut self) -> Result<()> {
        if let Some(saved) = self.session.load_session() {
            debug!("Resuming saved session");
            self.session.resume(&saved.token).await?;
            let reply = self.next_response().await?;

            if !reply.is_error() {
                if self.session.is_authenticated() {
                    self.session
                        .save_session()
                        .context("Failed to save session")?;
                }
                return Ok(());
            }

            match reply.error_code() {
                Some(code) if code.is_session_gone() => {
                    info!("Saved session rejected ({}), starting a new one", code);
                    self.session
                        .clear_session()
                        .context("Failed to clear saved session")?;
                }
                _ => bail!("Resume failed: {}", describe_error(&reply)),
            }
        }

        self.session.init().await?;
        let reply = self.next_response().await?;
        if reply.is_error() {
            bail!("Session init failed: {}", describe_error(&reply));
        }
        Ok(())
    }

    /// Disconnect
    pub async fn close(self) {
        self.session.disconnect().await;
    }
}

/// `msg [CODE (n)]` for an `ERR` response
pub fn describe_error(msg: &Response) -> String {
    let text = msg.msg.as_deref().unwrap_or("unknown error");
    match msg.error_code() {
        Some(code) => format!("{} [{}]", text, code),
        None => text.to_string(),
    }
}
