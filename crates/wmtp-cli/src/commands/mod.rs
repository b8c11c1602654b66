//! CLI command implementations

mod cert;
mod config;
mod connect;
mod login;
mod request;
mod send;
mod session;
mod watch;

pub use cert::{fingerprint_pem, hash_cert_command};
pub use config::{config_init, config_show};
pub use connect::{build_session, describe_error, Connection};
pub use login::{login, login_command, logout, logout_command};
pub use request::{query_command, run_query, Query};
pub use send::{build_request, send_command};
pub use session::{session_forget, session_show};
pub use watch::watch_command;
