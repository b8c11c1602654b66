//! Long-running connection that prints every notification

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use wmtp_client::{HeartbeatMonitor, Supervisor};
use wmtp_core::config::ClientConfig;

use super::connect::build_session;
use crate::output::format_event;

/// Stay connected until `cancel` fires, reconnecting as needed
pub async fn watch_command(config: &ClientConfig, cancel: CancellationToken) -> Result<()> {
    let session = Arc::new(build_session(config)?);
    let mut events = session.subscribe();

    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => println!("{}", format_event(&event)),
                Err(RecvError::Lagged(n)) => warn!("Output lagged, skipped {} events", n),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let monitor = HeartbeatMonitor::new(Arc::clone(session.transport()), config.heartbeat_timeout)
        .spawn(cancel.clone());

    info!("Watching {}", config.url);
    let supervisor = Supervisor::new(Arc::clone(&session), config.backoff.clone());
    let result = supervisor.run(cancel.clone()).await;

    cancel.cancel();
    let _ = monitor.await;
    printer.abort();

    result.context("Gave up reconnecting")
}
