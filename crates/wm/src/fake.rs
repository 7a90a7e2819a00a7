//! Deterministic in-memory WM transport for tests.
//!
//! Implements the same event/command interface as the real socket transport,
//! so supervisor and daemon behavior can be exercised without a window
//! manager or wall-clock timing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use workscope_core_state::validate::LiveTree;

use crate::{RawWmEvent, WmCommand, WmError, WmEventStream, WmReply, WmTransport};

struct FakeInner {
    tree: Mutex<LiveTree>,
    /// Sender feeding the currently subscribed event stream.
    event_tx: Mutex<Option<mpsc::UnboundedSender<String>>>,
    requests: Mutex<Vec<WmCommand>>,
    fail_requests: AtomicBool,
}

/// A scriptable window manager double.
#[derive(Clone)]
pub struct FakeWm {
    inner: Arc<FakeInner>,
}

impl FakeWm {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(FakeInner {
                tree: Mutex::new(LiveTree::default()),
                event_tx: Mutex::new(None),
                requests: Mutex::new(Vec::new()),
                fail_requests: AtomicBool::new(false),
            }),
        }
    }

    /// Set the tree returned by `get_tree`.
    pub fn set_tree(&self, tree: LiveTree) {
        *self.inner.tree.lock().expect("fake tree lock") = tree;
    }

    /// Emit an event to the current subscriber.
    pub fn push_event(&self, event: &RawWmEvent) {
        let line = serde_json::to_string(event).expect("raw event serializes");
        self.push_line(&line);
    }

    /// Emit a raw line, valid or not, to the current subscriber.
    pub fn push_line(&self, line: &str) {
        if let Some(tx) = self.inner.event_tx.lock().expect("fake sender lock").as_ref() {
            let _ = tx.send(line.to_string());
        }
    }

    /// Drop the current subscription, ending its stream with a
    /// connection-lost error on next read.
    pub fn disconnect(&self) {
        self.inner.event_tx.lock().expect("fake sender lock").take();
    }

    /// Make subsequent requests fail with a command timeout.
    pub fn fail_requests(&self, fail: bool) {
        self.inner.fail_requests.store(fail, Ordering::SeqCst);
    }

    /// Commands received so far, in order.
    pub fn requests(&self) -> Vec<WmCommand> {
        self.inner.requests.lock().expect("fake request lock").clone()
    }
}

impl Default for FakeWm {
    fn default() -> Self {
        Self::new()
    }
}

struct FakeEventStream {
    rx: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl WmEventStream for FakeEventStream {
    async fn next_line(&mut self) -> Result<String, WmError> {
        self.rx
            .recv()
            .await
            .ok_or_else(|| WmError::ConnectionLost("fake WM disconnected".to_string()))
    }
}

#[async_trait]
impl WmTransport for FakeWm {
    async fn subscribe(&self) -> Result<Box<dyn WmEventStream>, WmError> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.inner.event_tx.lock().expect("fake sender lock") = Some(tx);
        Ok(Box::new(FakeEventStream { rx }))
    }

    async fn request(&self, command: &WmCommand) -> Result<WmReply, WmError> {
        self.inner
            .requests
            .lock()
            .expect("fake request lock")
            .push(command.clone());
        if self.inner.fail_requests.load(Ordering::SeqCst) {
            return Err(WmError::CommandTimeout(Duration::from_secs(0)));
        }
        match command {
            WmCommand::GetTree => Ok(WmReply::Tree {
                tree: self.inner.tree.lock().expect("fake tree lock").clone(),
            }),
            _ => Ok(WmReply::Ok),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_tree_and_events_flow_through() {
        let fake = FakeWm::new();
        let mut stream = fake.subscribe().await.unwrap();

        fake.push_event(&RawWmEvent::WindowClose { id: 1 });
        let line = stream.next_line().await.unwrap();
        assert!(line.contains("window_close"));

        let reply = fake.request(&WmCommand::GetTree).await.unwrap();
        assert!(matches!(reply, WmReply::Tree { .. }));
        assert_eq!(fake.requests(), vec![WmCommand::GetTree]);
    }

    #[tokio::test]
    async fn disconnect_ends_the_stream() {
        let fake = FakeWm::new();
        let mut stream = fake.subscribe().await.unwrap();
        fake.disconnect();
        assert!(matches!(
            stream.next_line().await,
            Err(WmError::ConnectionLost(_))
        ));
    }

    #[tokio::test]
    async fn failing_requests_simulate_command_timeouts() {
        let fake = FakeWm::new();
        fake.fail_requests(true);
        assert!(matches!(
            fake.request(&WmCommand::GetTree).await,
            Err(WmError::CommandTimeout(_))
        ));
    }
}
