//! Workscope WM connection layer.
//!
//! Talks to the window manager's IPC socket and shields the rest of the
//! daemon from it:
//! - Raw event parsing and normalization into the core event set
//! - A connection supervisor that reconnects with exponential backoff
//! - A command client with timeouts
//! - A deterministic in-memory transport for tests
//!
//! The wire protocol is one JSON object per line in both directions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use workscope_core_state::validate::{LiveOutput, LiveTree, LiveWindow};
use workscope_core_state::{Geometry, WindowId, WorkspaceId};

pub mod fake;
pub mod ingest;
pub mod socket;
pub mod supervisor;

pub use fake::FakeWm;
pub use socket::SocketTransport;
pub use supervisor::{BackoffPolicy, ConnectionSupervisor, SupervisorEvent};

/// Errors at the WM boundary.
#[derive(Debug, Error)]
pub enum WmError {
    /// The connection dropped or could not be established. Transient:
    /// handled by the supervisor's reconnect cycle, never fatal.
    #[error("window manager connection lost: {0}")]
    ConnectionLost(String),

    /// A command went unanswered. Treated as connection loss.
    #[error("window manager command timed out after {0:?}")]
    CommandTimeout(std::time::Duration),

    /// The WM answered with something unparseable.
    #[error("window manager protocol error: {0}")]
    Protocol(String),
}

/// Raw events as emitted by the window manager, before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RawWmEvent {
    WindowNew { window: LiveWindow },
    WindowClose { id: WindowId },
    WindowMove {
        id: WindowId,
        workspace: WorkspaceId,
        output: String,
        geometry: Geometry,
    },
    WindowTitle { id: WindowId, title: String },
    WindowMark {
        id: WindowId,
        #[serde(default)]
        marks: Vec<String>,
    },
    WindowFocus { id: WindowId },
    WorkspaceFocus { workspace: WorkspaceId, output: String },
    WorkspaceInit { workspace: WorkspaceId, output: String },
    WorkspaceEmpty { workspace: WorkspaceId },
    OutputConnect { output: LiveOutput },
    OutputDisconnect { name: String },
}

/// Commands the daemon issues to the window manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum WmCommand {
    /// Fetch the full live tree (windows and outputs).
    GetTree,
    /// Move a window to a workspace, optionally onto a specific output.
    MoveWindow {
        id: WindowId,
        workspace: WorkspaceId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<String>,
    },
    /// Resize/reposition a window.
    ResizeWindow { id: WindowId, geometry: Geometry },
    /// Toggle a window between floating and tiled.
    SetFloating { id: WindowId, floating: bool },
}

/// Replies to [`WmCommand`]s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum WmReply {
    Ok,
    Tree { tree: LiveTree },
    Error { message: String },
}

/// A live subscription to the WM's event stream.
///
/// Produces a lazy, infinite, non-restartable sequence of raw event lines;
/// any error means the connection is gone and the stream is dead.
#[async_trait]
pub trait WmEventStream: Send {
    async fn next_line(&mut self) -> Result<String, WmError>;
}

/// A way to reach the window manager. Implemented by the Unix-socket
/// transport and by [`FakeWm`] for deterministic tests.
#[async_trait]
pub trait WmTransport: Send + Sync {
    /// Open an event subscription.
    async fn subscribe(&self) -> Result<Box<dyn WmEventStream>, WmError>;

    /// Issue a command and await its reply, bounded by the transport's
    /// command timeout.
    async fn request(&self, command: &WmCommand) -> Result<WmReply, WmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_serialize_with_command_tag() {
        let command = WmCommand::MoveWindow {
            id: 12,
            workspace: 3,
            output: None,
        };
        let json = serde_json::to_string(&command).unwrap();
        assert!(json.contains("\"command\":\"move_window\""));
        assert!(!json.contains("output"));

        let back: WmCommand = serde_json::from_str(&json).unwrap();
        assert_eq!(command, back);
    }

    #[test]
    fn tree_reply_roundtrips() {
        let reply = WmReply::Tree {
            tree: LiveTree::default(),
        };
        let json = serde_json::to_string(&reply).unwrap();
        let back: WmReply = serde_json::from_str(&json).unwrap();
        assert_eq!(reply, back);
    }

    #[test]
    fn unknown_raw_event_fails_to_parse() {
        let result: Result<RawWmEvent, _> =
            serde_json::from_str(r#"{"event":"window_exploded","id":1}"#);
        assert!(result.is_err());
    }
}
