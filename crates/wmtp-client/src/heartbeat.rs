//! Connection liveness monitoring
//!
//! The server sends a heartbeat every few seconds. If nothing at all
//! arrives for longer than the timeout while connected, the connection is
//! presumed dead and torn down, which lets a [`Supervisor`](crate::Supervisor)
//! reconnect instead of waiting for the QUIC idle timeout.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use wmtp_core::{Transport, TransportEvent};

/// Default silence allowed before a connection is considered dead
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(20);

/// Disconnects a transport that has gone silent
pub struct HeartbeatMonitor {
    transport: Arc<dyn Transport>,
    timeout: Duration,
}

impl HeartbeatMonitor {
    pub fn new(transport: Arc<dyn Transport>, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Start monitoring on a new task
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    /// Monitor until cancelled or the transport goes away
    pub async fn run(self, cancel: CancellationToken) {
        let mut events = self.transport.subscribe();
        let mut ticker = tokio::time::interval(check_interval(self.timeout));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_seen = Instant::now();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Ok(TransportEvent::Connected) | Ok(TransportEvent::Message(_)) => {
                        last_seen = Instant::now();
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(_)) => {
                        // Lagging means traffic
                        last_seen = Instant::now();
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = ticker.tick() => {
                    let silent = last_seen.elapsed();
                    if self.transport.is_connected() && silent >= self.timeout {
                        warn!(
                            "No traffic from server for {:?} (timeout {:?}), disconnecting",
                            silent, self.timeout
                        );
                        self.transport.disconnect().await;
                        last_seen = Instant::now();
                    }
                }
            }
        }
        debug!("Heartbeat monitor stopped");
    }
}

fn check_interval(timeout: Duration) -> Duration {
    std::cmp::max(timeout / 4, Duration::from_millis(10))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;
    use wmtp_protocol::Response;

    #[tokio::test(start_paused = true)]
    async fn test_silence_disconnects() {
        let mock = Arc::new(MockTransport::new());
        let cancel = CancellationToken::new();
        let handle = HeartbeatMonitor::new(mock.clone(), Duration::from_secs(20))
            .spawn(cancel.clone());

        mock.connect().await.unwrap();
        tokio::time::sleep(Duration::from_secs(26)).await;

        assert_eq!(mock.disconnect_count(), 1);
        assert!(!mock.is_connected());

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeats_keep_connection() {
        let mock = Arc::new(MockTransport::new());
        let cancel = CancellationToken::new();
        let handle = HeartbeatMonitor::new(mock.clone(), Duration::from_secs(20))
            .spawn(cancel.clone());

        mock.connect().await.unwrap();
        for ts in 0..12 {
            tokio::time::sleep(Duration::from_secs(5)).await;
            mock.inject(Response::heartbeat(ts));
        }

        assert_eq!(mock.disconnect_count(), 0);
        assert!(mock.is_connected());

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_while_disconnected_is_ignored() {
        let mock = Arc::new(MockTransport::new());
        let cancel = CancellationToken::new();
        let handle = HeartbeatMonitor::new(mock.clone(), Duration::from_secs(20))
            .spawn(cancel.clone());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(mock.disconnect_count(), 0);

        cancel.cancel();
        handle.await.unwrap();
    }
}
