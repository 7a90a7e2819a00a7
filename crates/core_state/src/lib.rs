//! Workscope Core State
//!
//! Platform-agnostic state model for the workscope daemon.
//!
//! This crate owns the authoritative picture of the window manager's world:
//! - Window, monitor and workspace records
//! - The state manager, sole mutator of that picture
//! - Project classification rules
//! - The bounded event buffer
//! - Layout snapshots and the geometry math behind capture/restore
//! - The validator that diffs cached state against a live WM tree
//!
//! Nothing in here performs I/O; the daemon feeds events in and writes
//! snapshots out.

use serde::{Deserialize, Serialize};

pub mod classify;
pub mod events;
pub mod layout;
pub mod state;
pub mod validate;

pub use classify::{ClassificationEngine, ClassificationRule, MatchField, PatternKind};
pub use events::{BufferLimits, EventBuffer, EventEntry, EventSource};
pub use layout::{
    FractionalGeometry, LayoutSnapshot, PlaceholderState, RestoreTarget, WindowPlaceholder,
    WorkspaceLayout,
};
pub use state::{StateCheckpoint, StateManager, WorkspaceInfo};
pub use validate::{Discrepancy, LiveTree, LiveWindow, RecoveryPlan, ValidationResult};

/// Unique identifier for a window, assigned by the window manager.
/// Valid for the lifetime of the window's process, never reused while live.
pub type WindowId = u64;

/// Workspace number as reported by the window manager.
pub type WorkspaceId = u32;

/// Project name every unmatched-but-rule-covered window lands in.
/// Global windows stay visible across all projects.
pub const GLOBAL_PROJECT: &str = "global";

/// A rectangle in screen coordinates (pixels).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Geometry {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Geometry {
    /// Create a new rectangle.
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// Check if this rectangle intersects with another.
    pub fn intersects(&self, other: &Geometry) -> bool {
        self.x < other.x + other.width
            && self.x + self.width > other.x
            && self.y < other.y + other.height
            && self.y + self.height > other.y
    }
}

/// Stable logical label for a monitor, decoupling layout data from physical
/// output names. A snapshot captured on three monitors degrades gracefully to
/// one because restore resolves roles, not output names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorRole {
    Primary,
    Secondary,
    Tertiary,
}

impl MonitorRole {
    /// The role a placeholder collapses onto when this role has no monitor.
    pub fn fallback(self) -> Option<MonitorRole> {
        match self {
            MonitorRole::Primary => None,
            MonitorRole::Secondary => Some(MonitorRole::Primary),
            MonitorRole::Tertiary => Some(MonitorRole::Secondary),
        }
    }
}

/// A physical output known to the window manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Monitor {
    /// Output name as reported by the WM (e.g. "DP-1").
    pub name: String,
    /// Full output rectangle in the global coordinate space.
    pub geometry: Geometry,
    /// Assigned role, stable across topology changes.
    pub role: MonitorRole,
    /// Workspace currently shown on this output.
    pub current_workspace: WorkspaceId,
    /// False once the output disconnects.
    pub active: bool,
}

/// A window tracked by the daemon.
///
/// Owned exclusively by the [`StateManager`]; everything else sees clones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowRecord {
    /// WM-assigned window id.
    pub id: WindowId,
    /// Window class (Wayland app-id / X11 class).
    pub app_id: String,
    /// Window instance name, empty when the WM does not report one.
    pub instance: String,
    /// Current title.
    pub title: String,
    /// Workspace the window sits on.
    pub workspace: WorkspaceId,
    /// Output name the window sits on.
    pub output: String,
    /// Assigned project, `None` while unclassified.
    pub project: Option<String>,
    /// True when the user pinned the project assignment with a mark.
    /// Pinned windows are never silently reclassified.
    pub pinned: bool,
    /// True for floating (non-tiled) windows.
    pub floating: bool,
    /// Window rectangle.
    pub geometry: Geometry,
    /// Owning process id, when the WM reports one.
    pub pid: Option<i32>,
    /// Whether the window is on its output's visible workspace.
    pub visible: bool,
}

/// A project definition, loaded from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    /// Unique slug-form name.
    pub name: String,
    /// Project directory, exported to launched windows.
    pub directory: std::path::PathBuf,
    /// Window classes scoped to this project. Matching windows classify here
    /// after all explicit rules have had their chance.
    pub window_classes: Vec<String>,
    /// Capture a layout automatically on clean shutdown.
    pub auto_save: bool,
    /// Layout restored when the project is brought up, if any.
    pub default_layout: Option<String>,
}

/// Initial properties of a window entering the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowProps {
    pub id: WindowId,
    pub app_id: String,
    #[serde(default)]
    pub instance: String,
    #[serde(default)]
    pub title: String,
    pub workspace: WorkspaceId,
    pub output: String,
    pub geometry: Geometry,
    #[serde(default)]
    pub floating: bool,
    #[serde(default)]
    pub pid: Option<i32>,
}

/// The closed set of events the state manager consumes.
///
/// The ingestion pipeline produces these from raw WM events; the recovery
/// subsystem synthesizes them for corrections. No other mutation path exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateEvent {
    WindowOpened { window: WindowProps },
    WindowClosed { id: WindowId },
    WindowTitle { id: WindowId, title: String },
    WindowMoved {
        id: WindowId,
        workspace: WorkspaceId,
        output: String,
        geometry: Geometry,
    },
    WindowFocused { id: WindowId },
    /// User-applied project mark. `Some` pins the window to a project,
    /// `None` clears the pin and re-runs rule classification.
    WindowMarked { id: WindowId, project: Option<String> },
    /// Re-run rule classification for an unpinned window. Synthesized by
    /// recovery when the recorded assignment drifted from the rules.
    WindowReclassify { id: WindowId },
    WorkspaceFocused { workspace: WorkspaceId, output: String },
    WorkspaceInitialized { workspace: WorkspaceId, output: String },
    WorkspaceEmptied { workspace: WorkspaceId },
    OutputConnected {
        name: String,
        geometry: Geometry,
        primary: bool,
        current_workspace: WorkspaceId,
    },
    OutputDisconnected { name: String },
}

impl StateEvent {
    /// Short kind tag used in event-buffer entries.
    pub fn kind(&self) -> &'static str {
        match self {
            StateEvent::WindowOpened { .. } => "window_opened",
            StateEvent::WindowClosed { .. } => "window_closed",
            StateEvent::WindowTitle { .. } => "window_title",
            StateEvent::WindowMoved { .. } => "window_moved",
            StateEvent::WindowFocused { .. } => "window_focused",
            StateEvent::WindowMarked { .. } => "window_marked",
            StateEvent::WindowReclassify { .. } => "window_reclassify",
            StateEvent::WorkspaceFocused { .. } => "workspace_focused",
            StateEvent::WorkspaceInitialized { .. } => "workspace_initialized",
            StateEvent::WorkspaceEmptied { .. } => "workspace_emptied",
            StateEvent::OutputConnected { .. } => "output_connected",
            StateEvent::OutputDisconnected { .. } => "output_disconnected",
        }
    }
}

/// What a single applied event changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum StateDelta {
    WindowAdded { window: WindowRecord },
    WindowUpdated { window: WindowRecord },
    WindowRemoved { id: WindowId },
    WorkspaceFocused { workspace: WorkspaceId, output: String },
    WorkspaceAdded { workspace: WorkspaceId, output: String },
    WorkspaceRemoved { workspace: WorkspaceId },
    OutputAdded { name: String },
    OutputRemoved { name: String },
    /// The event did not apply; the sequence counter still advanced.
    None,
}

/// Result of [`StateManager::apply`]: the sequence number consumed by the
/// event and the resulting delta.
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    pub seq: u64,
    pub delta: StateDelta,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_intersection() {
        let a = Geometry::new(0, 0, 100, 100);
        let b = Geometry::new(50, 50, 100, 100);
        let c = Geometry::new(200, 200, 10, 10);
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
    }

    #[test]
    fn role_fallback_chain_ends_at_primary() {
        assert_eq!(MonitorRole::Tertiary.fallback(), Some(MonitorRole::Secondary));
        assert_eq!(MonitorRole::Secondary.fallback(), Some(MonitorRole::Primary));
        assert_eq!(MonitorRole::Primary.fallback(), None);
    }

    #[test]
    fn state_event_serialization_is_tagged() {
        let event = StateEvent::WindowClosed { id: 7 };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"window_closed\""));

        let back: StateEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, back);
    }

    #[test]
    fn unknown_event_type_is_rejected() {
        let result: Result<StateEvent, _> =
            serde_json::from_str(r#"{"type":"window_teleported","id":1}"#);
        assert!(result.is_err());
    }
}
