//! Workscope IPC Protocol
//!
//! Shared types for daemon-client communication over a Unix domain socket.
//! One JSON object per line in both directions. Requests carry an id;
//! responses carry the same id and either a `result` or an `error` object
//! with a machine-readable code. Subscribed clients additionally receive
//! notification lines without ids.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use workscope_core_state::events::EventEntry;
use workscope_core_state::validate::{RecoveryResult, ValidationResult};
use workscope_core_state::{Monitor, WindowId, WindowRecord, WorkspaceId};

/// Upper bound on a single request line; longer requests are rejected.
pub const MAX_IPC_MESSAGE_SIZE: usize = 256 * 1024;

/// Socket file name inside the runtime directory.
pub const SOCKET_FILE: &str = "workscope.sock";

/// Default daemon socket path: the user's runtime directory, falling back
/// to the temp directory when the platform provides none.
pub fn default_socket_path() -> PathBuf {
    directories::BaseDirs::new()
        .and_then(|dirs| dirs.runtime_dir().map(|p| p.join(SOCKET_FILE)))
        .unwrap_or_else(|| std::env::temp_dir().join(SOCKET_FILE))
}

/// A client request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Client-chosen id, echoed on the response.
    pub id: u64,
    #[serde(flatten)]
    pub method: Method,
}

/// Methods the daemon serves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum Method {
    /// Liveness probe.
    Ping,
    /// Stream all future event entries as notifications on this connection.
    Subscribe,
    /// Daemon status summary.
    GetStatus,
    /// All tracked windows.
    ListWindows,
    /// Event-buffer entries with sequence numbers after `since_seq`.
    GetEvents { since_seq: u64 },
    /// Run a read-only drift check against the live WM tree.
    Validate,
    /// Report daemon-launched windows missing their environment contract.
    CheckEnv,
    /// Capture the current arrangement under a name.
    CaptureLayout { name: String },
    /// Restore a named layout. Responds once every placeholder reached a
    /// terminal state.
    RestoreLayout { name: String },
    /// Cancel an in-flight restore. Launched processes keep running.
    CancelRestore,
    /// Shut the daemon down cleanly.
    Stop,
}

/// Machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Malformed request; the connection stays open.
    Protocol,
    /// No layout/resource under the requested name.
    NotFound,
    /// The WM connection is down and the method needs it.
    WmUnavailable,
    /// A restore is already in flight.
    RestoreBusy,
    /// No restore in flight to cancel.
    NoRestore,
    /// The daemon is shutting down.
    ShuttingDown,
    /// Unexpected daemon-side failure.
    Internal,
}

/// Error body of a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
}

/// A daemon response. Exactly one of `result`/`error` is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Response {
    /// Build a success response from any serializable payload.
    pub fn ok(id: u64, payload: &impl Serialize) -> Self {
        match serde_json::to_value(payload) {
            Ok(value) => Self {
                id,
                result: Some(value),
                error: None,
            },
            Err(error) => Self::error(id, ErrorCode::Internal, error.to_string()),
        }
    }

    /// Build an error response.
    pub fn error(id: u64, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            id,
            result: None,
            error: Some(ErrorBody {
                code,
                message: message.into(),
            }),
        }
    }

    /// Interpret the response as a typed payload.
    pub fn parse<T: serde::de::DeserializeOwned>(&self) -> Result<T, ResponseError> {
        if let Some(error) = &self.error {
            return Err(ResponseError::Daemon {
                code: error.code,
                message: error.message.clone(),
            });
        }
        let value = self.result.clone().unwrap_or(serde_json::Value::Null);
        serde_json::from_value(value).map_err(|e| ResponseError::Shape(e.to_string()))
    }
}

/// Client-side response interpretation failures.
#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("daemon error ({code:?}): {message}")]
    Daemon { code: ErrorCode, message: String },
    #[error("unexpected response shape: {0}")]
    Shape(String),
}

/// Notifications pushed to subscribed clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "notification", rename_all = "snake_case")]
pub enum Notification {
    /// An event entry was appended to the buffer.
    Event { entry: EventEntry },
}

// ----------------------------------------------------------------------
// Response payloads
// ----------------------------------------------------------------------

/// `ping` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pong {
    pub version: String,
}

/// `get_status` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusInfo {
    pub version: String,
    pub uptime_seconds: u64,
    pub wm_connected: bool,
    pub window_count: usize,
    pub monitor_count: usize,
    pub project_count: usize,
    /// Sequence number of the most recently applied event, 0 before any.
    pub last_seq: u64,
    pub restore_active: bool,
}

/// `list_windows` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowList {
    pub windows: Vec<WindowRecord>,
    pub monitors: Vec<Monitor>,
}

/// `get_events` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventsPage {
    pub entries: Vec<EventEntry>,
    /// Oldest sequence number still retained; earlier history was pruned.
    pub first_retained_seq: Option<u64>,
}

/// `validate` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidateReport {
    pub validation: ValidationResult,
}

/// `capture_layout` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureResult {
    pub name: String,
    pub workspaces: usize,
    pub placeholders: usize,
    /// Placeholders without a recoverable launch command.
    pub manual: usize,
    pub path: PathBuf,
}

/// Terminal state of one placeholder after restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceholderOutcome {
    /// Launched, correlated and positioned.
    Placed,
    /// Launched but no matching window appeared within the timeout.
    TimedOut,
    /// Manual placeholder, not launched.
    Skipped,
    /// The launch command failed to spawn.
    LaunchFailed,
    /// Restore was cancelled before this placeholder finished.
    Cancelled,
}

/// Per-placeholder restore report line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceholderReport {
    pub expected_class: String,
    pub workspace: WorkspaceId,
    pub outcome: PlaceholderOutcome,
    /// The correlated window, when one was placed.
    pub window: Option<WindowId>,
}

/// `restore_layout` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestoreReport {
    pub name: String,
    pub placed: usize,
    pub timed_out: usize,
    pub skipped: usize,
    pub cancelled: bool,
    pub placeholders: Vec<PlaceholderReport>,
}

/// A window missing the daemon's environment contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvMissing {
    pub id: WindowId,
    pub app_id: String,
    pub pid: Option<i32>,
}

/// `check_env` result. Full coverage maps to exit code 0, partial to 1,
/// read errors to 2 on the CLI side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvCoverageReport {
    pub covered: usize,
    pub missing: Vec<EnvMissing>,
    /// Windows whose environment could not be read.
    pub unreadable: usize,
}

/// `stop` and recovery summaries reuse core result types.
pub type RecoverySummary = RecoveryResult;
