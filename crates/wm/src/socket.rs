//! Unix-socket transport to the window manager.
//!
//! Events arrive over a dedicated subscription connection; commands use
//! short-lived request connections so a stuck command can never wedge the
//! event stream. Both directions are line-delimited JSON.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;

use crate::{WmCommand, WmError, WmEventStream, WmReply, WmTransport};

/// Handshake line that switches a connection into event-stream mode.
const SUBSCRIBE_LINE: &[u8] = b"{\"subscribe\":[\"all\"]}\n";

/// Connects to the WM's IPC socket.
pub struct SocketTransport {
    path: PathBuf,
    command_timeout: Duration,
}

impl SocketTransport {
    pub fn new(path: PathBuf, command_timeout: Duration) -> Self {
        Self {
            path,
            command_timeout,
        }
    }
}

struct SocketEventStream {
    lines: Lines<BufReader<OwnedReadHalf>>,
    // Keeps the write direction open for the lifetime of the subscription.
    _writer: OwnedWriteHalf,
}

#[async_trait]
impl WmEventStream for SocketEventStream {
    async fn next_line(&mut self) -> Result<String, WmError> {
        match self.lines.next_line().await {
            Ok(Some(line)) => Ok(line),
            Ok(None) => Err(WmError::ConnectionLost("event stream closed".to_string())),
            Err(error) => Err(WmError::ConnectionLost(error.to_string())),
        }
    }
}

#[async_trait]
impl WmTransport for SocketTransport {
    async fn subscribe(&self) -> Result<Box<dyn WmEventStream>, WmError> {
        let stream = UnixStream::connect(&self.path)
            .await
            .map_err(|e| WmError::ConnectionLost(e.to_string()))?;
        let (read, mut write) = stream.into_split();
        write
            .write_all(SUBSCRIBE_LINE)
            .await
            .map_err(|e| WmError::ConnectionLost(e.to_string()))?;
        Ok(Box::new(SocketEventStream {
            lines: BufReader::new(read).lines(),
            _writer: write,
        }))
    }

    async fn request(&self, command: &WmCommand) -> Result<WmReply, WmError> {
        let exchange = async {
            let stream = UnixStream::connect(&self.path)
                .await
                .map_err(|e| WmError::ConnectionLost(e.to_string()))?;
            let (read, mut write) = stream.into_split();

            let mut payload = serde_json::to_string(command)
                .map_err(|e| WmError::Protocol(e.to_string()))?;
            payload.push('\n');
            write
                .write_all(payload.as_bytes())
                .await
                .map_err(|e| WmError::ConnectionLost(e.to_string()))?;

            let mut line = String::new();
            BufReader::new(read)
                .read_line(&mut line)
                .await
                .map_err(|e| WmError::ConnectionLost(e.to_string()))?;
            if line.trim().is_empty() {
                return Err(WmError::ConnectionLost(
                    "connection closed before reply".to_string(),
                ));
            }
            serde_json::from_str(line.trim()).map_err(|e| WmError::Protocol(e.to_string()))
        };

        match tokio::time::timeout(self.command_timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(WmError::CommandTimeout(self.command_timeout)),
        }
    }
}
