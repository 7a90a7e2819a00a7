//! Workscope CLI
//!
//! Thin client for the workscope daemon: every subcommand maps onto one
//! IPC method over the daemon's Unix socket.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use workscope_ipc::{
    default_socket_path, EnvCoverageReport, Method, Request, Response,
};

#[derive(Parser)]
#[command(name = "workscope", version, about = "Control the workscope daemon")]
struct Cli {
    /// Daemon socket path (defaults to the runtime directory).
    #[arg(long)]
    socket: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the daemon is alive
    Ping,
    /// Show daemon status
    Status,
    /// List tracked windows and monitors
    Windows,
    /// Show buffered events
    Events {
        /// Only events with sequence numbers after this one
        #[arg(long, default_value_t = 0)]
        since: u64,
    },
    /// Run a read-only drift check against the live WM tree
    Validate,
    /// Report project windows missing the launch environment contract.
    /// Exits 0 on full coverage, 1 on partial, 2 on internal error.
    CheckEnv,
    /// Capture the current window arrangement as a named layout
    Capture {
        /// Layout name, optionally prefixed with a project ("dev/main")
        name: String,
    },
    /// Restore a named layout (waits for all placeholders to settle)
    Restore { name: String },
    /// Cancel an in-flight restore; launched processes keep running
    CancelRestore,
    /// Stream daemon events to stdout
    Subscribe,
    /// Stop the daemon
    Stop,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let socket = cli.socket.unwrap_or_else(default_socket_path);

    let method = match cli.command {
        Commands::Ping => Method::Ping,
        Commands::Status => Method::GetStatus,
        Commands::Windows => Method::ListWindows,
        Commands::Events { since } => Method::GetEvents { since_seq: since },
        Commands::Validate => Method::Validate,
        Commands::CheckEnv => {
            let exit_code = check_env(&socket).await;
            std::process::exit(exit_code);
        }
        Commands::Capture { name } => Method::CaptureLayout { name },
        Commands::Restore { name } => Method::RestoreLayout { name },
        Commands::CancelRestore => Method::CancelRestore,
        Commands::Subscribe => return subscribe(&socket).await,
        Commands::Stop => Method::Stop,
    };

    let response = send_request(&socket, method).await?;
    print_response(&response)
}

/// Send one request and read its response line.
async fn send_request(socket: &PathBuf, method: Method) -> Result<Response> {
    let request = Request { id: 1, method };
    let mut stream = UnixStream::connect(socket)
        .await
        .with_context(|| format!("is the daemon running on {}?", socket.display()))?;

    let mut payload = serde_json::to_string(&request)?;
    payload.push('\n');
    stream.write_all(payload.as_bytes()).await?;

    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    let read = reader.read_line(&mut line).await?;
    anyhow::ensure!(read > 0, "daemon closed the connection without a response");
    Ok(serde_json::from_str(line.trim())?)
}

fn print_response(response: &Response) -> Result<()> {
    if let Some(error) = &response.error {
        anyhow::bail!("{:?}: {}", error.code, error.message);
    }
    let result = response.result.clone().unwrap_or(serde_json::Value::Null);
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

/// Environment coverage check with contract exit codes: 0 full coverage,
/// 1 partial, 2 internal error.
async fn check_env(socket: &PathBuf) -> i32 {
    let response = match send_request(socket, Method::CheckEnv).await {
        Ok(response) => response,
        Err(error) => {
            eprintln!("check-env failed: {error:#}");
            return 2;
        }
    };
    let report: EnvCoverageReport = match response.parse() {
        Ok(report) => report,
        Err(error) => {
            eprintln!("check-env failed: {error}");
            return 2;
        }
    };

    println!(
        "covered: {}, missing: {}, unreadable: {}",
        report.covered,
        report.missing.len(),
        report.unreadable
    );
    for window in &report.missing {
        println!(
            "  window {} ({}) pid {:?} lacks the environment contract",
            window.id, window.app_id, window.pid
        );
    }
    if report.missing.is_empty() {
        0
    } else {
        1
    }
}

/// Subscribe and print notification lines until the daemon goes away.
async fn subscribe(socket: &PathBuf) -> Result<()> {
    let request = Request {
        id: 1,
        method: Method::Subscribe,
    };
    let mut stream = UnixStream::connect(socket)
        .await
        .with_context(|| format!("is the daemon running on {}?", socket.display()))?;
    let mut payload = serde_json::to_string(&request)?;
    payload.push('\n');
    stream.write_all(payload.as_bytes()).await?;

    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    // first line is the acknowledgment
    let read = reader.read_line(&mut line).await?;
    anyhow::ensure!(read > 0, "daemon closed the connection without a response");
    let ack: Response = serde_json::from_str(line.trim())?;
    if let Some(error) = &ack.error {
        anyhow::bail!("{:?}: {}", error.code, error.message);
    }

    loop {
        line.clear();
        let read = reader.read_line(&mut line).await?;
        if read == 0 {
            return Ok(());
        }
        print!("{line}");
    }
}
