//! wmtp
//!
//! Command-line client for WMTP servers over WebTransport:
//! - One-shot requests (ping, status, info, latency)
//! - Login / logout with a saved, resumable session
//! - A long-running `watch` that reconnects and prints every notification

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wmtp_cli::commands::{self, Query};
use wmtp_cli::output::print_error;
use wmtp_core::config::{self, ClientConfig};

#[derive(Parser)]
#[command(name = "wmtp")]
#[command(author, version, about = "WMTP client over WebTransport")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log level (overrides -v / -q)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Server URL (overrides config)
    #[arg(long, global = true, env = "WMTP_URL")]
    url: Option<String>,

    /// Base64 SHA-256 of the server certificate (overrides config)
    #[arg(long, global = true, env = "WMTP_CERT_HASH")]
    cert_hash: Option<String>,

    /// Directory holding the saved session (overrides config)
    #[arg(long, global = true)]
    session_dir: Option<PathBuf>,

    /// Seconds to wait for a reply
    #[arg(long, global = true, default_value_t = 10)]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the server answers
    Ping,

    /// Measure round-trip latency
    Latency,

    /// Show server status
    Status,

    /// Show server information
    Info,

    /// Ask the server about the current session
    SessionInfo,

    /// Start a session and authenticate it
    Login {
        /// Account email
        email: String,
    },

    /// End the saved session on the server and forget it
    Logout,

    /// Send any command and print the reply
    Send {
        /// Command name, e.g. MB_LIST
        command: String,
        /// JSON payload
        #[arg(short, long)]
        data: Option<String>,
    },

    /// Stay connected and print every notification until Ctrl-C
    Watch,

    /// Show the saved session (no network)
    Session {
        /// Delete the saved session instead
        #[arg(long)]
        forget: bool,
    },

    /// Print the fingerprint of a PEM certificate, for `cert_hash`
    HashCert {
        /// PEM file
        pem: PathBuf,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show effective configuration
    Show,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
    /// Show config file path
    Path,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(&cli);

    if let Err(e) = run(cli).await {
        print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

fn init_logging(cli: &Cli) {
    let log_level = match (&cli.log_level, cli.quiet, cli.verbose) {
        (Some(level), _, _) => level.clone(),
        (None, true, _) => "error".into(),
        (None, false, 0) => "warn".into(),
        (None, false, 1) => "info".into(),
        (None, false, 2) => "debug".into(),
        (None, false, _) => "trace".into(),
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or(log_level),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.clone().unwrap_or_else(config::default_config_path);
    let timeout = Duration::from_secs(cli.timeout);

    // Commands that must work without a usable config
    match &cli.command {
        Commands::Config {
            action: ConfigAction::Init { force },
        } => return commands::config_init(&config_path, *force),
        Commands::Config {
            action: ConfigAction::Path,
        } => {
            println!("{}", config_path.display());
            return Ok(());
        }
        Commands::HashCert { pem } => return commands::hash_cert_command(pem),
        _ => {}
    }

    let config = load_config(&cli, &config_path)?;

    match cli.command {
        Commands::Ping => commands::query_command(&config, timeout, Query::Ping).await,
        Commands::Latency => commands::query_command(&config, timeout, Query::Latency).await,
        Commands::Status => commands::query_command(&config, timeout, Query::Status).await,
        Commands::Info => commands::query_command(&config, timeout, Query::Info).await,
        Commands::SessionInfo => {
            commands::query_command(&config, timeout, Query::SessionInfo).await
        }
        Commands::Login { email } => commands::login_command(&config, timeout, &email).await,
        Commands::Logout => commands::logout_command(&config, timeout).await,
        Commands::Send { command, data } => {
            commands::send_command(&config, timeout, &command, data.as_deref()).await
        }
        Commands::Watch => {
            let cancel = CancellationToken::new();
            let cancel_on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("Received Ctrl+C, shutting down...");
                }
                cancel_on_signal.cancel();
            });
            commands::watch_command(&config, cancel).await
        }
        Commands::Session { forget: false } => commands::session_show(&config),
        Commands::Session { forget: true } => commands::session_forget(&config),
        Commands::Config {
            action: ConfigAction::Show,
        } => commands::config_show(&config, &config_path),
        Commands::Config { .. } | Commands::HashCert { .. } => Ok(()),
    }
}

/// Config file (or defaults) with command-line overrides applied, validated
fn load_config(cli: &Cli, path: &Path) -> Result<ClientConfig> {
    let mut config: ClientConfig = config::load_config_or_default(path)
        .with_context(|| format!("Failed to load config from {:?}", path))?;

    if let Some(url) = &cli.url {
        config.url = url.clone();
    }
    if let Some(hash) = &cli.cert_hash {
        config.cert_hash = Some(hash.clone());
    }
    if let Some(dir) = &cli.session_dir {
        config.session_dir = dir.clone();
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}
