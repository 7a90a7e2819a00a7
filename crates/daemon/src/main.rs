//! `workscoped`, the workscope daemon binary.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use workscope_daemon::config::Config;
use workscope_daemon::daemon;
use workscope_wm::SocketTransport;

#[derive(Debug, Parser)]
#[command(name = "workscoped", version, about = "Workscope window-state daemon")]
struct Args {
    /// Config file path (overrides the standard locations).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Client IPC socket path.
    #[arg(long)]
    socket: Option<PathBuf>,

    /// State directory for checkpoints, layouts and the event log.
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Window-manager IPC socket path.
    #[arg(long)]
    wm_socket: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration first (needed for the log level).
    let mut config = match &args.config {
        Some(path) => Config::load_from_path(path).unwrap_or_else(|error| {
            // Can't use tracing yet, fall back to eprintln
            eprintln!("Failed to load configuration: {error}. Using defaults.");
            Config::default()
        }),
        None => Config::load().unwrap_or_else(|error| {
            eprintln!("Failed to load configuration: {error}. Using defaults.");
            Config::default()
        }),
    };
    if let Some(socket) = args.socket {
        config.daemon.socket_path = Some(socket);
    }
    if let Some(state_dir) = args.state_dir {
        config.daemon.state_dir = Some(state_dir);
    }
    if let Some(wm_socket) = args.wm_socket {
        config.wm.socket_path = Some(wm_socket);
    }

    let log_level = match config.daemon.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    for warning in config.validate() {
        warn!("Config: {} - {}", warning.field, warning.message);
    }

    info!("Workscope daemon starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        "WM socket: {}, state dir: {}",
        config.wm_socket_path().display(),
        config.state_dir().display()
    );

    let transport = Arc::new(SocketTransport::new(
        config.wm_socket_path(),
        Duration::from_secs(config.wm.command_timeout_secs),
    ));

    daemon::run(config, transport).await
}
