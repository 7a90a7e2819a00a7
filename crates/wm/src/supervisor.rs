//! Connection supervision.
//!
//! Owns the daemon's one live WM connection. On loss it backs off
//! exponentially and retries forever; failure to connect is reported, never
//! fatal. Every successful (re)connection fetches the full live tree first,
//! so recovery can run before normal event processing resumes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use workscope_core_state::validate::LiveTree;
use workscope_core_state::StateEvent;

use crate::{ingest, WmCommand, WmError, WmReply, WmTransport};

/// Exponential backoff: `min(base * 2^attempt, cap)` seconds.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub base_secs: u64,
    pub cap_secs: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_secs: 1,
            cap_secs: 30,
        }
    }
}

impl BackoffPolicy {
    /// Delay before the given (zero-based) consecutive failed attempt.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let secs = self.base_secs.saturating_mul(factor).min(self.cap_secs);
        Duration::from_secs(secs)
    }
}

/// What the supervisor reports into the daemon loop.
#[derive(Debug)]
pub enum SupervisorEvent {
    /// A connection was (re)established; `tree` is the live WM state at
    /// that moment. Recovery runs on this before events are processed.
    Connected { tree: LiveTree },
    /// A normalized WM event.
    Event(StateEvent),
    /// The connection dropped; a reconnect cycle is starting.
    Disconnected { reason: String },
}

enum SessionEnd {
    /// The daemon loop went away; stop supervising.
    Shutdown,
    /// An established connection died.
    Lost(String),
    /// Connecting (or the initial tree fetch) failed.
    ConnectFailed(String),
}

/// Supervises the WM connection for the lifetime of the daemon.
pub struct ConnectionSupervisor {
    transport: Arc<dyn WmTransport>,
    backoff: BackoffPolicy,
    events: mpsc::Sender<SupervisorEvent>,
    /// External reconnect trigger: the daemon nudges this when a command
    /// times out, converting a silent connection into a reconnect cycle.
    reconnect: mpsc::Receiver<()>,
}

impl ConnectionSupervisor {
    pub fn new(
        transport: Arc<dyn WmTransport>,
        backoff: BackoffPolicy,
        events: mpsc::Sender<SupervisorEvent>,
        reconnect: mpsc::Receiver<()>,
    ) -> Self {
        Self {
            transport,
            backoff,
            events,
            reconnect,
        }
    }

    /// Run until the daemon loop drops its receiver.
    pub async fn run(mut self) {
        let mut attempt: u32 = 0;
        loop {
            match self.session().await {
                SessionEnd::Shutdown => return,
                SessionEnd::Lost(reason) => {
                    tracing::warn!("WM connection lost: {reason}");
                    if self
                        .events
                        .send(SupervisorEvent::Disconnected { reason })
                        .await
                        .is_err()
                    {
                        return;
                    }
                    // the session connected successfully, so the next
                    // failure starts the backoff sequence from the base
                    attempt = 0;
                }
                SessionEnd::ConnectFailed(reason) => {
                    tracing::warn!("WM connection attempt failed: {reason}");
                }
            }
            let delay = self.backoff.delay(attempt);
            attempt = attempt.saturating_add(1);
            tracing::info!("Reconnecting to window manager in {}s", delay.as_secs());
            tokio::time::sleep(delay).await;
        }
    }

    /// One connection lifetime: subscribe, fetch the tree, pump events.
    async fn session(&mut self) -> SessionEnd {
        let mut stream = match self.transport.subscribe().await {
            Ok(stream) => stream,
            Err(error) => return SessionEnd::ConnectFailed(error.to_string()),
        };
        let tree = match self.transport.request(&WmCommand::GetTree).await {
            Ok(WmReply::Tree { tree }) => tree,
            Ok(other) => {
                return SessionEnd::ConnectFailed(format!("unexpected tree reply: {other:?}"))
            }
            Err(error) => return SessionEnd::ConnectFailed(error.to_string()),
        };
        if self
            .events
            .send(SupervisorEvent::Connected { tree })
            .await
            .is_err()
        {
            return SessionEnd::Shutdown;
        }
        tracing::info!("Connected to window manager");

        loop {
            tokio::select! {
                line = stream.next_line() => match line {
                    Ok(line) => {
                        if let Some(event) = ingest::ingest_line(&line) {
                            if self.events.send(SupervisorEvent::Event(event)).await.is_err() {
                                return SessionEnd::Shutdown;
                            }
                        }
                    }
                    Err(error) => return SessionEnd::Lost(error.to_string()),
                },
                trigger = self.reconnect.recv() => match trigger {
                    Some(()) => {
                        return SessionEnd::Lost(
                            WmError::CommandTimeout(Duration::ZERO).to_string(),
                        )
                    }
                    None => return SessionEnd::Shutdown,
                },
            }
        }
    }
}
