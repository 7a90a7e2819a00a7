//! Client IPC server.
//!
//! Accepts connections on the daemon's Unix socket, authenticates peers by
//! OS-level credentials before parsing anything, and forwards requests into
//! the daemon event loop. Subscribed connections turn into notification
//! streams.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use workscope_ipc::{
    ErrorCode, Method, Notification, Request, Response, MAX_IPC_MESSAGE_SIZE,
};

use crate::daemon::DaemonEvent;

/// Run the accept loop. Exits when the daemon event loop goes away.
pub async fn run(
    listener: UnixListener,
    event_tx: mpsc::Sender<DaemonEvent>,
    allowed_uids: Arc<HashSet<u32>>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                if event_tx.is_closed() {
                    return;
                }
                let event_tx = event_tx.clone();
                let allowed_uids = allowed_uids.clone();
                tokio::spawn(async move {
                    if let Err(error) = handle_client(stream, event_tx, allowed_uids).await {
                        debug!("Client handler ended: {error}");
                    }
                });
            }
            Err(error) => {
                warn!("Failed to accept client connection: {error}");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

/// Handle one client connection for its lifetime.
async fn handle_client(
    stream: UnixStream,
    event_tx: mpsc::Sender<DaemonEvent>,
    allowed_uids: Arc<HashSet<u32>>,
) -> Result<()> {
    // Authentication happens before any request is parsed. A mismatched
    // peer gets no response at all, just a closed connection.
    let cred = stream.peer_cred()?;
    if !allowed_uids.contains(&cred.uid()) {
        warn!("Rejecting IPC client with disallowed uid {}", cred.uid());
        // Close the connection without sending a response. Half-close the
        // write side so the peer observes a clean EOF, then drain anything
        // the peer already sent so the final drop is a graceful FIN rather
        // than an RST (which Linux emits when a socket is closed with unread
        // data still buffered).
        let mut stream = stream;
        let _ = stream.shutdown().await;
        let mut discard = [0u8; 256];
        while let Ok(n) = stream.read(&mut discard).await {
            if n == 0 {
                break;
            }
        }
        return Ok(());
    }

    let (read, mut writer) = stream.into_split();
    let mut reader = BufReader::new(read);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            return Ok(()); // client disconnected
        }
        if bytes_read > MAX_IPC_MESSAGE_SIZE {
            let response =
                Response::error(0, ErrorCode::Protocol, "request exceeds size limit");
            write_response(&mut writer, &response).await?;
            continue;
        }
        if line.trim().is_empty() {
            continue;
        }

        let request: Request = match serde_json::from_str(line.trim()) {
            Ok(request) => request,
            Err(error) => {
                // Malformed request: answered with an error response, the
                // connection stays open.
                let response = Response::error(
                    0,
                    ErrorCode::Protocol,
                    format!("invalid request: {error}"),
                );
                write_response(&mut writer, &response).await?;
                continue;
            }
        };
        debug!("Received request {} ({:?})", request.id, request.method);

        if request.method == Method::Subscribe {
            return serve_subscription(request.id, reader, writer, event_tx).await;
        }

        let (resp_tx, resp_rx) = oneshot::channel();
        if event_tx
            .send(DaemonEvent::Ipc {
                request,
                responder: resp_tx,
            })
            .await
            .is_err()
        {
            let response =
                Response::error(0, ErrorCode::ShuttingDown, "daemon is shutting down");
            write_response(&mut writer, &response).await?;
            return Ok(());
        }
        let response = resp_rx.await.unwrap_or_else(|_| {
            Response::error(0, ErrorCode::Internal, "daemon dropped the request")
        });
        write_response(&mut writer, &response).await?;
    }
}

/// Turn the connection into a notification stream after acknowledging the
/// subscribe request.
async fn serve_subscription(
    request_id: u64,
    mut reader: BufReader<tokio::net::unix::OwnedReadHalf>,
    mut writer: tokio::net::unix::OwnedWriteHalf,
    event_tx: mpsc::Sender<DaemonEvent>,
) -> Result<()> {
    let (sink_tx, mut sink_rx) = mpsc::channel::<Notification>(256);
    let (resp_tx, resp_rx) = oneshot::channel();
    if event_tx
        .send(DaemonEvent::Subscribe {
            request_id,
            sink: sink_tx,
            responder: resp_tx,
        })
        .await
        .is_err()
    {
        let response =
            Response::error(request_id, ErrorCode::ShuttingDown, "daemon is shutting down");
        write_response(&mut writer, &response).await?;
        return Ok(());
    }
    let response = resp_rx.await.unwrap_or_else(|_| {
        Response::error(request_id, ErrorCode::Internal, "daemon dropped the request")
    });
    write_response(&mut writer, &response).await?;

    let mut discard = String::new();
    loop {
        tokio::select! {
            notification = sink_rx.recv() => match notification {
                Some(notification) => {
                    let mut payload = serde_json::to_string(&notification)?;
                    payload.push('\n');
                    writer.write_all(payload.as_bytes()).await?;
                }
                // daemon dropped the sink (shutdown)
                None => return Ok(()),
            },
            // a disconnecting subscriber cancels only its own delivery
            read = reader.read_line(&mut discard) => {
                if read? == 0 {
                    return Ok(());
                }
                discard.clear();
            }
        }
    }
}

async fn write_response(
    writer: &mut tokio::net::unix::OwnedWriteHalf,
    response: &Response,
) -> Result<()> {
    let mut payload = serde_json::to_string(response).unwrap_or_else(|error| {
        warn!("Failed to serialize IPC response: {error}");
        "{\"id\":0,\"error\":{\"code\":\"internal\",\"message\":\"serialization error\"}}"
            .to_string()
    });
    payload.push('\n');
    writer.write_all(payload.as_bytes()).await?;
    Ok(())
}

/// Bind the client socket, replacing a stale socket file. Refuses when
/// another daemon instance is already serving it.
pub async fn bind_socket(path: &std::path::Path) -> Result<UnixListener> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    if path.exists() {
        if UnixStream::connect(path).await.is_ok() {
            anyhow::bail!(
                "another workscope daemon is already listening on {}",
                path.display()
            );
        }
        std::fs::remove_file(path)?;
    }
    Ok(UnixListener::bind(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_socket(label: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!(
            "workscope-server-test-{label}-{}.sock",
            std::process::id()
        ))
    }

    #[tokio::test]
    async fn bind_replaces_stale_socket_file() {
        let path = temp_socket("stale");
        let _ = std::fs::remove_file(&path);
        std::fs::write(&path, b"stale").unwrap();

        let listener = bind_socket(&path).await.expect("bind after stale cleanup");
        drop(listener);
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn bind_refuses_when_daemon_already_listening() {
        let path = temp_socket("active");
        let _ = std::fs::remove_file(&path);
        let active = UnixListener::bind(&path).unwrap();

        let error = bind_socket(&path).await.expect_err("second bind must fail");
        assert!(error.to_string().contains("already listening"));

        drop(active);
        let _ = std::fs::remove_file(&path);
    }
}
