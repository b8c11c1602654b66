//! Single request / reply commands

use std::time::{Duration, Instant};

use anyhow::{bail, Result};

use wmtp_core::config::ClientConfig;
use wmtp_protocol::Response;

use super::connect::{describe_error, Connection};
use crate::output::{format_response, print_info};

/// Requests that are answered by one reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query {
    Ping,
    Latency,
    Status,
    Info,
    SessionInfo,
}

/// Bootstrap a session, send `query`, print the reply
pub async fn query_command(config: &ClientConfig, timeout: Duration, query: Query) -> Result<()> {
    let mut conn = Connection::open(config, timeout).await?;
    let result = run_query(&mut conn, query).await;
    conn.close().await;

    let (reply, elapsed) = result?;
    println!("{}", format_response(&reply));
    if query == Query::Latency {
        print_info(&format!("Round trip: {:.1} ms", elapsed.as_secs_f64() * 1000.0));
    }
    if reply.is_error() {
        bail!("{} failed: {}", reply.cmd, describe_error(&reply));
    }
    Ok(())
}

/// Send `query` on a bootstrapped session and wait for the reply
pub async fn run_query(conn: &mut Connection, query: Query) -> Result<(Response, Duration)> {
    conn.bootstrap().await?;

    let started = Instant::now();
    let session = conn.session();
    match query {
        Query::Ping => session.ping().await?,
        Query::Latency => session.latency_ping().await?,
        Query::Status => session.status().await?,
        Query::Info => session.info().await?,
        Query::SessionInfo => session.session_info().await?,
    }
    let reply = conn.next_response().await?;
    Ok((reply, started.elapsed()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use wmtp_client::testing::MockTransport;
    use wmtp_client::ProtocolSession;
    use wmtp_core::MemoryStore;

    async fn connected(mock: &Arc<MockTransport>) -> Connection {
        let session = ProtocolSession::new(mock.clone()).with_store(Arc::new(MemoryStore::new()));
        Connection::over(session, Duration::from_secs(5)).await.unwrap()
    }

    #[tokio::test]
    async fn test_ping_waits_for_pong() {
        let mock = Arc::new(MockTransport::new());
        mock.reply_to("INIT", Response::ok("SESSION_INIT").with_token("T"));
        mock.reply_to("PING", Response::ok("PONG"));

        let mut conn = connected(&mock).await;
        let (reply, _) = run_query(&mut conn, Query::Ping).await.unwrap();

        assert_eq!(reply.cmd, "PONG");
        assert_eq!(mock.sent_commands(), vec!["INIT", "PING"]);
    }

    #[tokio::test]
    async fn test_session_info_carries_token() {
        let mock = Arc::new(MockTransport::new());
        mock.reply_to("INIT", Response::ok("SESSION_INIT").with_token("T"));
        mock.reply_to("SESSION_INFO", Response::ok("SESSION_INFO").with_token("T"));

        let mut conn = connected(&mock).await;
        run_query(&mut conn, Query::SessionInfo).await.unwrap();

        let sent = mock.sent();
        assert_eq!(sent[1].data_str("session_token"), Some("T"));
    }

    #[tokio::test]
    async fn test_error_reply_is_returned() {
        let mock = Arc::new(MockTransport::new());
        mock.reply_to("INIT", Response::ok("SESSION_INIT").with_token("T"));
        mock.reply_to(
            "STATUS",
            Response::err("STATUS", "down", wmtp_protocol::codes::SERVICE_UNAVAILABLE),
        );

        let mut conn = connected(&mock).await;
        let (reply, _) = run_query(&mut conn, Query::Status).await.unwrap();
        assert!(reply.is_error());
    }
}
