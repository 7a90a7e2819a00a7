//! Layout snapshots: capture a window arrangement, restore it later onto a
//! possibly different monitor topology.
//!
//! Geometry is stored as fractions of the owning monitor's rectangle, and
//! workspaces are keyed by monitor role rather than output name, so a
//! snapshot taken on three monitors replays cleanly on one.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::state::StateManager;
use crate::{Geometry, Monitor, MonitorRole, WindowId, WindowRecord, WorkspaceId};

/// Window geometry relative to its monitor, each component in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FractionalGeometry {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl FractionalGeometry {
    /// Express an absolute rectangle as fractions of a monitor rectangle.
    pub fn from_absolute(geometry: &Geometry, monitor: &Geometry) -> Self {
        let width = monitor.width.max(1) as f64;
        let height = monitor.height.max(1) as f64;
        Self {
            x: ((geometry.x - monitor.x) as f64 / width).clamp(0.0, 1.0),
            y: ((geometry.y - monitor.y) as f64 / height).clamp(0.0, 1.0),
            width: (geometry.width as f64 / width).clamp(0.0, 1.0),
            height: (geometry.height as f64 / height).clamp(0.0, 1.0),
        }
    }

    /// Scale back to absolute pixels on a (possibly different) monitor.
    pub fn to_absolute(&self, monitor: &Geometry) -> Geometry {
        Geometry {
            x: monitor.x + (self.x * monitor.width as f64).round() as i32,
            y: monitor.y + (self.y * monitor.height as f64).round() as i32,
            width: ((self.width * monitor.width as f64).round() as i32).max(1),
            height: ((self.height * monitor.height as f64).round() as i32).max(1),
        }
    }
}

/// One window slot in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowPlaceholder {
    /// Launch command (argv). `None` marks a manual placeholder: the launch
    /// command could not be recovered, restore skips it with a warning.
    pub command: Option<Vec<String>>,
    /// Window class the launched process is expected to produce.
    pub expected_class: String,
    /// Geometry relative to the owning monitor.
    pub geometry: FractionalGeometry,
    pub floating: bool,
    /// Project assignment at capture time.
    pub project: Option<String>,
}

/// The windows of one workspace at capture time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceLayout {
    pub workspace: WorkspaceId,
    /// Role of the monitor the workspace was shown on.
    pub role: MonitorRole,
    pub windows: Vec<WindowPlaceholder>,
}

/// An immutable, named arrangement of windows. Restore only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutSnapshot {
    pub name: String,
    /// Unix timestamp (seconds) of capture.
    pub captured_at: u64,
    pub workspaces: Vec<WorkspaceLayout>,
    /// Monitor configuration at capture time.
    pub monitors: Vec<Monitor>,
}

/// Lifecycle of one placeholder during restore.
///
/// `Pending → Launched → Correlated → Placed` is the success path;
/// `TimedOut`, `Skipped` (manual placeholder) and `Failed` (spawn error)
/// are terminal failures. No retries within one restore invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderState {
    Pending,
    Launched,
    Correlated(WindowId),
    Placed(WindowId),
    TimedOut,
    Skipped,
    Failed,
}

impl PlaceholderState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PlaceholderState::Placed(_)
                | PlaceholderState::TimedOut
                | PlaceholderState::Skipped
                | PlaceholderState::Failed
        )
    }
}

/// A placeholder resolved against the current monitor topology.
#[derive(Debug, Clone, PartialEq)]
pub struct RestoreTarget {
    pub workspace: WorkspaceId,
    /// Output the placeholder lands on after role resolution.
    pub output: String,
    /// Absolute geometry on that output.
    pub geometry: Geometry,
    pub placeholder: WindowPlaceholder,
}

/// Capture the current arrangement. `command_for` recovers the launch
/// command of a window (e.g. from its process's command line); windows it
/// cannot resolve become manual placeholders.
pub fn capture<F>(
    name: &str,
    state: &StateManager,
    captured_at: u64,
    mut command_for: F,
) -> LayoutSnapshot
where
    F: FnMut(&WindowRecord) -> Option<Vec<String>>,
{
    let monitors = state.active_monitors();
    let mut by_workspace: BTreeMap<WorkspaceId, Vec<WindowRecord>> = BTreeMap::new();
    for window in state.windows() {
        by_workspace.entry(window.workspace).or_default().push(window);
    }

    let mut workspaces = Vec::with_capacity(by_workspace.len());
    for (workspace, mut windows) in by_workspace {
        // Stable left-to-right order so restore replays the arrangement.
        windows.sort_by_key(|w| (w.geometry.x, w.geometry.y, w.id));

        let monitor = windows
            .first()
            .and_then(|w| monitors.iter().find(|m| m.name == w.output));
        let (role, monitor_geometry) = match monitor {
            Some(m) => (m.role, m.geometry),
            None => (MonitorRole::Primary, Geometry::new(0, 0, 1920, 1080)),
        };

        let placeholders = windows
            .iter()
            .map(|window| WindowPlaceholder {
                command: command_for(window),
                expected_class: window.app_id.clone(),
                geometry: FractionalGeometry::from_absolute(&window.geometry, &monitor_geometry),
                floating: window.floating,
                project: window.project.clone(),
            })
            .collect();

        workspaces.push(WorkspaceLayout {
            workspace,
            role,
            windows: placeholders,
        });
    }

    LayoutSnapshot {
        name: name.to_string(),
        captured_at,
        workspaces,
        monitors,
    }
}

/// Resolve a capture-time role against the current monitor set, collapsing
/// missing roles down the fallback chain (tertiary → secondary → primary).
pub fn resolve_role(role: MonitorRole, monitors: &[Monitor]) -> Option<&Monitor> {
    let mut candidate = Some(role);
    while let Some(role) = candidate {
        if let Some(monitor) = monitors.iter().find(|m| m.active && m.role == role) {
            return Some(monitor);
        }
        candidate = role.fallback();
    }
    monitors.iter().find(|m| m.active)
}

/// Resolve every placeholder in a snapshot against the current topology.
/// Returns an empty list when no monitor is available.
pub fn plan_restore(snapshot: &LayoutSnapshot, monitors: &[Monitor]) -> Vec<RestoreTarget> {
    let mut targets = Vec::new();
    for layout in &snapshot.workspaces {
        let Some(monitor) = resolve_role(layout.role, monitors) else {
            continue;
        };
        for placeholder in &layout.windows {
            targets.push(RestoreTarget {
                workspace: layout.workspace,
                output: monitor.name.clone(),
                geometry: placeholder.geometry.to_absolute(&monitor.geometry),
                placeholder: placeholder.clone(),
            });
        }
    }
    targets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ClassificationEngine;
    use crate::{StateEvent, WindowProps};

    fn monitor(name: &str, role: MonitorRole, x: i32, width: i32, height: i32) -> Monitor {
        Monitor {
            name: name.to_string(),
            geometry: Geometry::new(x, 0, width, height),
            role,
            current_workspace: 1,
            active: true,
        }
    }

    fn state_with_one_window() -> StateManager {
        let mut state = StateManager::new(ClassificationEngine::new(&[], &[]), vec![]);
        state.apply(&StateEvent::OutputConnected {
            name: "DP-1".to_string(),
            geometry: Geometry::new(0, 0, 1920, 1080),
            primary: true,
            current_workspace: 1,
        });
        state.apply(&StateEvent::WindowOpened {
            window: WindowProps {
                id: 1,
                app_id: "Ghostty".to_string(),
                instance: String::new(),
                title: String::new(),
                workspace: 1,
                output: "DP-1".to_string(),
                geometry: Geometry::new(0, 0, 960, 1080),
                floating: false,
                pid: Some(4242),
            },
        });
        state
    }

    #[test]
    fn fractions_roundtrip_on_same_monitor() {
        let monitor = Geometry::new(100, 50, 1920, 1080);
        let window = Geometry::new(100, 50, 960, 540);
        let fraction = FractionalGeometry::from_absolute(&window, &monitor);
        assert_eq!(fraction.to_absolute(&monitor), window);
    }

    #[test]
    fn fractions_rescale_to_smaller_monitor() {
        let big = Geometry::new(0, 0, 3840, 2160);
        let small = Geometry::new(0, 0, 1920, 1080);
        let window = Geometry::new(1920, 0, 1920, 2160);
        let fraction = FractionalGeometry::from_absolute(&window, &big);
        let scaled = fraction.to_absolute(&small);
        assert_eq!(scaled, Geometry::new(960, 0, 960, 1080));
    }

    #[test]
    fn capture_records_relative_geometry_and_project() {
        let state = state_with_one_window();
        let snapshot = capture("test", &state, 0, |w| {
            Some(vec![format!("app-{}", w.app_id)])
        });
        assert_eq!(snapshot.workspaces.len(), 1);
        let layout = &snapshot.workspaces[0];
        assert_eq!(layout.role, MonitorRole::Primary);
        let placeholder = &layout.windows[0];
        assert_eq!(placeholder.expected_class, "Ghostty");
        assert!((placeholder.geometry.width - 0.5).abs() < 1e-9);
        assert!((placeholder.geometry.height - 1.0).abs() < 1e-9);
    }

    #[test]
    fn capture_marks_unrecoverable_commands_as_manual() {
        let state = state_with_one_window();
        let snapshot = capture("test", &state, 0, |_| None);
        assert_eq!(snapshot.workspaces[0].windows[0].command, None);
    }

    #[test]
    fn capture_then_restore_on_unchanged_topology_is_identity() {
        let state = state_with_one_window();
        let snapshot = capture("test", &state, 0, |_| Some(vec!["ghostty".to_string()]));
        let targets = plan_restore(&snapshot, &state.active_monitors());
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].output, "DP-1");
        assert_eq!(targets[0].geometry, Geometry::new(0, 0, 960, 1080));
        assert_eq!(targets[0].placeholder.project, None);
    }

    #[test]
    fn three_monitor_snapshot_collapses_onto_single_monitor() {
        let snapshot = LayoutSnapshot {
            name: "tri".to_string(),
            captured_at: 0,
            workspaces: vec![
                WorkspaceLayout {
                    workspace: 1,
                    role: MonitorRole::Primary,
                    windows: vec![placeholder("a")],
                },
                WorkspaceLayout {
                    workspace: 2,
                    role: MonitorRole::Secondary,
                    windows: vec![placeholder("b")],
                },
                WorkspaceLayout {
                    workspace: 3,
                    role: MonitorRole::Tertiary,
                    windows: vec![placeholder("c")],
                },
            ],
            monitors: vec![
                monitor("DP-1", MonitorRole::Primary, 0, 1920, 1080),
                monitor("DP-2", MonitorRole::Secondary, 1920, 1920, 1080),
                monitor("DP-3", MonitorRole::Tertiary, 3840, 1920, 1080),
            ],
        };

        let single = vec![monitor("eDP-1", MonitorRole::Primary, 0, 1920, 1080)];
        let targets = plan_restore(&snapshot, &single);
        assert_eq!(targets.len(), 3);
        assert!(targets.iter().all(|t| t.output == "eDP-1"));
    }

    #[test]
    fn tertiary_collapses_to_secondary_before_primary() {
        let snapshot = LayoutSnapshot {
            name: "t".to_string(),
            captured_at: 0,
            workspaces: vec![WorkspaceLayout {
                workspace: 3,
                role: MonitorRole::Tertiary,
                windows: vec![placeholder("c")],
            }],
            monitors: vec![],
        };
        let two = vec![
            monitor("DP-1", MonitorRole::Primary, 0, 1920, 1080),
            monitor("DP-2", MonitorRole::Secondary, 1920, 1920, 1080),
        ];
        let targets = plan_restore(&snapshot, &two);
        assert_eq!(targets[0].output, "DP-2");
    }

    #[test]
    fn snapshot_roundtrips_through_json() {
        let state = state_with_one_window();
        let snapshot = capture("rt", &state, 7, |_| Some(vec!["ghostty".to_string()]));
        let json = serde_json::to_string_pretty(&snapshot).unwrap();
        let back: LayoutSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(snapshot, back);
    }

    fn placeholder(class: &str) -> WindowPlaceholder {
        WindowPlaceholder {
            command: Some(vec![class.to_lowercase()]),
            expected_class: class.to_string(),
            geometry: FractionalGeometry {
                x: 0.0,
                y: 0.0,
                width: 1.0,
                height: 1.0,
            },
            floating: false,
            project: None,
        }
    }
}
