//! Raw command passthrough

use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::Value;

use wmtp_core::config::ClientConfig;
use wmtp_protocol::{Request, Response};

use super::connect::Connection;
use crate::output::{format_response, print_warning};

/// Parse `--data` as JSON
pub fn parse_data(data: Option<&str>) -> Result<Option<Value>> {
    data.map(|text| serde_json::from_str(text).context("--data is not valid JSON"))
        .transpose()
}

/// Build the outgoing request
pub fn build_request(command: &str, data: Option<&str>) -> Result<Request> {
    let request = Request::new(command);
    Ok(match parse_data(data)? {
        Some(value) => request.with_data(value),
        None => request,
    })
}

/// Bootstrap, send an arbitrary command, print the reply
pub async fn send_command(
    config: &ClientConfig,
    timeout: Duration,
    command: &str,
    data: Option<&str>,
) -> Result<()> {
    let request = build_request(command, data)?;

    let mut conn = Connection::open(config, timeout).await?;
    let result = exchange(&mut conn, request).await;
    conn.close().await;

    let reply = result?;
    if reply.is_error() {
        print_warning("Server returned an error");
    }
    println!("{}", format_response(&reply));
    Ok(())
}

async fn exchange(conn: &mut Connection, request: Request) -> Result<Response> {
    conn.bootstrap().await?;
    conn.session().send(request).await?;
    conn.next_response().await
}
