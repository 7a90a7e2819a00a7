//! Raw event normalization.
//!
//! The single validation point between the window manager and the state
//! manager: heterogeneous raw events become the closed [`StateEvent`] set
//! here, and anything malformed or unknown is logged and dropped so it never
//! reaches the model.

use workscope_core_state::validate::project_mark;
use workscope_core_state::{StateEvent, WindowProps};

use crate::RawWmEvent;

/// Parse one raw event line. Malformed or unknown events yield `None`.
pub fn parse_line(line: &str) -> Option<RawWmEvent> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str(trimmed) {
        Ok(raw) => Some(raw),
        Err(error) => {
            tracing::debug!("Dropping unparseable WM event: {error} ({trimmed})");
            None
        }
    }
}

/// Map a raw event onto the internal event set.
pub fn normalize(raw: RawWmEvent) -> StateEvent {
    match raw {
        RawWmEvent::WindowNew { window } => StateEvent::WindowOpened {
            window: WindowProps {
                id: window.id,
                app_id: window.app_id,
                instance: window.instance,
                title: window.title,
                workspace: window.workspace,
                output: window.output,
                geometry: window.geometry,
                floating: window.floating,
                pid: window.pid,
            },
        },
        RawWmEvent::WindowClose { id } => StateEvent::WindowClosed { id },
        RawWmEvent::WindowMove {
            id,
            workspace,
            output,
            geometry,
        } => StateEvent::WindowMoved {
            id,
            workspace,
            output,
            geometry,
        },
        RawWmEvent::WindowTitle { id, title } => StateEvent::WindowTitle { id, title },
        RawWmEvent::WindowMark { id, marks } => StateEvent::WindowMarked {
            id,
            project: project_mark(&marks).map(str::to_string),
        },
        RawWmEvent::WindowFocus { id } => StateEvent::WindowFocused { id },
        RawWmEvent::WorkspaceFocus { workspace, output } => {
            StateEvent::WorkspaceFocused { workspace, output }
        }
        RawWmEvent::WorkspaceInit { workspace, output } => {
            StateEvent::WorkspaceInitialized { workspace, output }
        }
        RawWmEvent::WorkspaceEmpty { workspace } => StateEvent::WorkspaceEmptied { workspace },
        RawWmEvent::OutputConnect { output } => StateEvent::OutputConnected {
            name: output.name,
            geometry: output.geometry,
            primary: output.primary,
            current_workspace: output.current_workspace,
        },
        RawWmEvent::OutputDisconnect { name } => StateEvent::OutputDisconnected { name },
    }
}

/// Parse and normalize one event line.
pub fn ingest_line(line: &str) -> Option<StateEvent> {
    parse_line(line).map(normalize)
}
