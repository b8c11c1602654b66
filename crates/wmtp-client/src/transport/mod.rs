//! WebTransport connection to the WMTP server

mod reconnect;
mod webtransport;

pub use reconnect::ExponentialBackoff;
pub use webtransport::{TransportOptions, WebTransportClient};
