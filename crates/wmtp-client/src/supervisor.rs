//! Reconnect supervisor
//!
//! Keeps a [`ProtocolSession`] connected: reconnects with exponential
//! backoff, resumes the saved session (or starts a fresh one) after every
//! connect, and keeps the saved session in step with the server.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use wmtp_core::config::BackoffConfig;
use wmtp_core::TransportError;
use wmtp_protocol::{cmd, Response};

use crate::session::{ProtocolSession, SessionEvent};
use crate::transport::ExponentialBackoff;

/// Drives a [`ProtocolSession`] through connect / bootstrap / reconnect
pub struct Supervisor {
    session: Arc<ProtocolSession>,
    backoff: BackoffConfig,
}

impl Supervisor {
    pub fn new(session: Arc<ProtocolSession>, backoff: BackoffConfig) -> Self {
        Self { session, backoff }
    }

    pub fn session(&self) -> &Arc<ProtocolSession> {
        &self.session
    }

    /// Run until cancelled.
    ///
    /// Returns `Ok` on cancellation, or the error that made reconnecting
    /// pointless (a fatal transport error, or running out of attempts).
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), TransportError> {
        // Subscribe before connecting so no reply to the bootstrap is missed
        let mut events = self.session.subscribe();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.session.disconnect().await;
                    return Ok(());
                }
                result = self.connect_with_retry() => result?,
            }

            self.bootstrap().await;

            let cancelled = tokio::select! {
                _ = cancel.cancelled() => true,
                _ = self.watch(&mut events) => false,
            };
            if cancelled {
                self.session.disconnect().await;
                return Ok(());
            }
            info!("Connection lost, reconnecting");
        }
    }

    /// Connect, retrying transient failures with backoff
    async fn connect_with_retry(&self) -> Result<(), TransportError> {
        let mut backoff = ExponentialBackoff::from_config(&self.backoff);
        loop {
            let error = match self.session.connect().await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_fatal() => {
                    warn!("Not retrying: {}", e);
                    return Err(e);
                }
                Err(e) => e,
            };

            match backoff.next_delay() {
                Some(delay) => {
                    warn!("Connection failed: {}. Retrying in {:?}", error, delay);
                    tokio::time::sleep(delay).await;
                }
                None => {
                    warn!(
                        "Connection failed: {}. Giving up after {} attempts",
                        error,
                        backoff.attempts()
                    );
                    return Err(error);
                }
            }
        }
    }

    /// Resume the saved session if there is one, else start fresh
    async fn bootstrap(&self) {
        let result = match self.session.load_session() {
            Some(saved) => {
                debug!("Resuming saved session");
                self.session.resume(&saved.token).await
            }
            None => {
                debug!("No saved session, starting a new one");
                self.session.init().await
            }
        };
        if let Err(e) = result {
            warn!("Session bootstrap failed: {}", e);
        }
    }

    /// Handle session events until the connection drops
    async fn watch(&self, events: &mut broadcast::Receiver<SessionEvent>) {
        loop {
            match events.recv().await {
                Ok(SessionEvent::Disconnected) => return,
                Ok(SessionEvent::AuthSuccess(_)) => self.persist(),
                Ok(SessionEvent::SessionInitialized(msg)) => {
                    if msg.cmd == cmd::SESSION_RESUMED && self.session.is_authenticated() {
                        self.persist();
                    }
                }
                Ok(SessionEvent::Error(msg)) if is_stale_resume(&msg) => {
                    info!("Saved session rejected ({}), starting a new one", describe(&msg));
                    if let Err(e) = self.session.clear_session() {
                        warn!("Failed to clear saved session: {}", e);
                    }
                    if let Err(e) = self.session.init().await {
                        warn!("Failed to start a new session: {}", e);
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(n)) => {
                    warn!("Supervisor lagged, skipped {} session events", n);
                }
                Err(RecvError::Closed) => return,
            }
        }
    }

    fn persist(&self) {
        match self.session.save_session() {
            Ok(true) => debug!("Session saved"),
            Ok(false) => {}
            Err(e) => warn!("Failed to save session: {}", e),
        }
    }
}

/// `ERR` to `RESUME` meaning the token is no longer usable
fn is_stale_resume(msg: &Response) -> bool {
    msg.cmd == cmd::RESUME && msg.error_code().is_some_and(|code| code.is_session_gone())
}

fn describe(msg: &Response) -> String {
    match msg.error_code() {
        Some(code) => code.to_string(),
        None => msg.msg.clone().unwrap_or_default(),
    }
}
