//! Drift detection and recovery planning.
//!
//! `validate` is a read-only diff between the cached model and a freshly
//! fetched live WM tree. `plan_recovery` turns the mechanical part of that
//! diff into corrective events that flow through the normal
//! [`StateManager::apply`] path; there is no back-door mutation.
//! Discrepancies that cannot be resolved mechanically are reported only.

use serde::{Deserialize, Serialize};

use crate::state::StateManager;
use crate::{Geometry, StateEvent, WindowId, WindowProps, WorkspaceId};

/// A window as reported by the live WM tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveWindow {
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
    /// WM marks on the window; `project:<name>` marks carry user pins.
    #[serde(default)]
    pub marks: Vec<String>,
}

/// An output as reported by the live WM tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveOutput {
    pub name: String,
    pub geometry: Geometry,
    #[serde(default)]
    pub primary: bool,
    pub current_workspace: WorkspaceId,
}

/// A full snapshot of the window manager's live state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveTree {
    pub windows: Vec<LiveWindow>,
    pub outputs: Vec<LiveOutput>,
}

/// Outcome class of a validation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Pass,
    Drift,
    Error,
}

/// One divergence between model and live tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Discrepancy {
    /// Window exists live but not in the model.
    WindowMissingFromModel { id: WindowId, app_id: String },
    /// Window exists in the model but is gone live.
    WindowMissingFromLive { id: WindowId, app_id: String },
    /// Window exists in both but position, title or geometry drifted.
    WindowStale { id: WindowId, app_id: String },
    /// Recorded project assignment disagrees with marks or rules.
    ProjectMismatch {
        id: WindowId,
        recorded: Option<String>,
        expected: Option<String>,
        pinned: bool,
    },
    /// Output exists live but not in the model.
    OutputMissingFromModel { name: String },
    /// Output is recorded active but gone live.
    OutputMissingFromLive { name: String },
}

/// Result of a read-only validation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub status: ValidationStatus,
    pub discrepancies: Vec<Discrepancy>,
}

/// A discrepancy together with the events that fix it.
#[derive(Debug, Clone, PartialEq)]
pub struct Correction {
    pub discrepancy: Discrepancy,
    pub events: Vec<StateEvent>,
}

/// What recovery will do: mechanical corrections plus report-only findings.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecoveryPlan {
    pub corrections: Vec<Correction>,
    pub reported: Vec<Discrepancy>,
}

/// Result of a recovery pass, after corrections were applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryResult {
    pub status: ValidationStatus,
    pub corrected: Vec<Discrepancy>,
    pub reported: Vec<Discrepancy>,
}

/// Extract a user project pin from WM marks (`project:<name>`).
pub fn project_mark(marks: &[String]) -> Option<&str> {
    marks
        .iter()
        .find_map(|mark| mark.strip_prefix("project:"))
}

/// Read-only diff between the model and a live tree.
pub fn validate(state: &StateManager, live: &LiveTree) -> ValidationResult {
    let mut discrepancies = Vec::new();

    // Outputs first: window placement is judged against them.
    for output in &live.outputs {
        if state.monitor(&output.name).map(|m| m.active) != Some(true) {
            discrepancies.push(Discrepancy::OutputMissingFromModel {
                name: output.name.clone(),
            });
        }
    }
    for monitor in state.active_monitors() {
        if !live.outputs.iter().any(|o| o.name == monitor.name) {
            discrepancies.push(Discrepancy::OutputMissingFromLive {
                name: monitor.name,
            });
        }
    }

    for window in &live.windows {
        let Some(record) = state.window(window.id) else {
            discrepancies.push(Discrepancy::WindowMissingFromModel {
                id: window.id,
                app_id: window.app_id.clone(),
            });
            continue;
        };

        if record.workspace != window.workspace
            || record.output != window.output
            || record.geometry != window.geometry
            || record.title != window.title
        {
            discrepancies.push(Discrepancy::WindowStale {
                id: window.id,
                app_id: window.app_id.clone(),
            });
        }

        let expected = match project_mark(&window.marks) {
            Some(marked) => Some(marked.to_string()),
            None => {
                state.expected_classification(&window.app_id, &window.instance, &window.title)
            }
        };
        if record.project != expected {
            discrepancies.push(Discrepancy::ProjectMismatch {
                id: window.id,
                recorded: record.project.clone(),
                expected,
                pinned: record.pinned,
            });
        }
    }

    for record in state.windows() {
        if !live.windows.iter().any(|w| w.id == record.id) {
            discrepancies.push(Discrepancy::WindowMissingFromLive {
                id: record.id,
                app_id: record.app_id,
            });
        }
    }

    let status = if discrepancies.is_empty() {
        ValidationStatus::Pass
    } else {
        ValidationStatus::Drift
    };
    ValidationResult {
        status,
        discrepancies,
    }
}

/// Plan corrections for the mechanical discrepancies, reporting the rest.
pub fn plan_recovery(state: &StateManager, live: &LiveTree) -> RecoveryPlan {
    let result = validate(state, live);
    let mut plan = RecoveryPlan::default();

    for discrepancy in result.discrepancies {
        match &discrepancy {
            Discrepancy::OutputMissingFromModel { name } => {
                let Some(output) = live.outputs.iter().find(|o| &o.name == name) else {
                    continue;
                };
                plan.corrections.push(Correction {
                    events: vec![StateEvent::OutputConnected {
                        name: output.name.clone(),
                        geometry: output.geometry,
                        primary: output.primary,
                        current_workspace: output.current_workspace,
                    }],
                    discrepancy,
                });
            }
            Discrepancy::OutputMissingFromLive { name } => {
                plan.corrections.push(Correction {
                    events: vec![StateEvent::OutputDisconnected { name: name.clone() }],
                    discrepancy,
                });
            }
            Discrepancy::WindowMissingFromModel { id, .. } => {
                let Some(window) = live.windows.iter().find(|w| &w.id == id) else {
                    continue;
                };
                let mut events = vec![StateEvent::WindowOpened {
                    window: live_props(window),
                }];
                if let Some(marked) = project_mark(&window.marks) {
                    events.push(StateEvent::WindowMarked {
                        id: window.id,
                        project: Some(marked.to_string()),
                    });
                }
                plan.corrections.push(Correction { discrepancy, events });
            }
            Discrepancy::WindowMissingFromLive { id, .. } => {
                plan.corrections.push(Correction {
                    events: vec![StateEvent::WindowClosed { id: *id }],
                    discrepancy,
                });
            }
            Discrepancy::WindowStale { id, .. } => {
                let Some(window) = live.windows.iter().find(|w| &w.id == id) else {
                    continue;
                };
                plan.corrections.push(Correction {
                    events: vec![
                        StateEvent::WindowMoved {
                            id: window.id,
                            workspace: window.workspace,
                            output: window.output.clone(),
                            geometry: window.geometry,
                        },
                        StateEvent::WindowTitle {
                            id: window.id,
                            title: window.title.clone(),
                        },
                    ],
                    discrepancy,
                });
            }
            Discrepancy::ProjectMismatch {
                id,
                expected,
                pinned,
                ..
            } => {
                let live_window = live.windows.iter().find(|w| &w.id == id);
                let marked = live_window.and_then(|w| project_mark(&w.marks));
                if let Some(marked) = marked {
                    // The user's mark in the WM is authoritative.
                    plan.corrections.push(Correction {
                        events: vec![StateEvent::WindowMarked {
                            id: *id,
                            project: Some(marked.to_string()),
                        }],
                        discrepancy,
                    });
                } else if *pinned || expected.is_none() {
                    // A pinned record with no live mark, or a recorded
                    // assignment the rules cannot confirm: ambiguous,
                    // never guessed.
                    plan.reported.push(discrepancy);
                } else {
                    plan.corrections.push(Correction {
                        events: vec![StateEvent::WindowReclassify { id: *id }],
                        discrepancy,
                    });
                }
            }
        }
    }

    plan
}

fn live_props(window: &LiveWindow) -> WindowProps {
    WindowProps {
        id: window.id,
        app_id: window.app_id.clone(),
        instance: window.instance.clone(),
        title: window.title.clone(),
        workspace: window.workspace,
        output: window.output.clone(),
        geometry: window.geometry,
        floating: window.floating,
        pid: window.pid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{ClassificationEngine, ClassificationRule, MatchField, PatternKind};
    use crate::{Project, StateDelta};

    fn engine(rules: Vec<ClassificationRule>) -> ClassificationEngine {
        ClassificationEngine::new(&rules, &[])
    }

    fn class_rule(pattern: &str, target: &str) -> ClassificationRule {
        ClassificationRule {
            pattern: pattern.to_string(),
            field: MatchField::Class,
            kind: PatternKind::Exact,
            target: target.to_string(),
            priority: 1,
        }
    }

    fn project(name: &str) -> Project {
        Project {
            name: name.to_string(),
            directory: format!("/p/{name}").into(),
            window_classes: vec![],
            auto_save: false,
            default_layout: None,
        }
    }

    fn live_window(id: WindowId, app_id: &str) -> LiveWindow {
        LiveWindow {
            id,
            app_id: app_id.to_string(),
            instance: String::new(),
            title: String::new(),
            workspace: 1,
            output: "DP-1".to_string(),
            geometry: Geometry::new(0, 0, 800, 600),
            floating: false,
            pid: None,
            marks: vec![],
        }
    }

    fn live_output(name: &str) -> LiveOutput {
        LiveOutput {
            name: name.to_string(),
            geometry: Geometry::new(0, 0, 1920, 1080),
            primary: true,
            current_workspace: 1,
        }
    }

    fn seeded_state() -> StateManager {
        let mut state = StateManager::new(
            engine(vec![class_rule("Ghostty", "dev")]),
            vec![project("dev")],
        );
        state.apply(&StateEvent::OutputConnected {
            name: "DP-1".to_string(),
            geometry: Geometry::new(0, 0, 1920, 1080),
            primary: true,
            current_workspace: 1,
        });
        state.apply(&StateEvent::WindowOpened {
            window: live_props(&live_window(1, "Ghostty")),
        });
        state
    }

    fn apply_plan(state: &mut StateManager, plan: &RecoveryPlan) {
        for correction in &plan.corrections {
            for event in &correction.events {
                state.apply(event);
            }
        }
    }

    #[test]
    fn matching_state_passes() {
        let state = seeded_state();
        let live = LiveTree {
            windows: vec![live_window(1, "Ghostty")],
            outputs: vec![live_output("DP-1")],
        };
        let result = validate(&state, &live);
        assert_eq!(result.status, ValidationStatus::Pass);
        assert!(result.discrepancies.is_empty());
    }

    #[test]
    fn stale_window_is_removed_and_nothing_else_touched() {
        let mut state = seeded_state();
        // seed a second window the live tree does not know about
        state.apply(&StateEvent::WindowOpened {
            window: live_props(&live_window(99, "Zombie")),
        });

        let live = LiveTree {
            windows: vec![live_window(1, "Ghostty")],
            outputs: vec![live_output("DP-1")],
        };
        let plan = plan_recovery(&state, &live);
        assert_eq!(plan.corrections.len(), 1);
        assert!(matches!(
            plan.corrections[0].discrepancy,
            Discrepancy::WindowMissingFromLive { id: 99, .. }
        ));

        apply_plan(&mut state, &plan);
        assert!(state.window(99).is_none());
        assert!(state.window(1).is_some());
        assert_eq!(validate(&state, &live).status, ValidationStatus::Pass);
    }

    #[test]
    fn live_only_window_is_reinserted_with_classification() {
        let mut state = seeded_state();
        let live = LiveTree {
            windows: vec![live_window(1, "Ghostty"), live_window(2, "Ghostty")],
            outputs: vec![live_output("DP-1")],
        };
        let plan = plan_recovery(&state, &live);
        apply_plan(&mut state, &plan);

        let record = state.window(2).expect("window 2 reinserted");
        assert_eq!(record.project.as_deref(), Some("dev"));
    }

    #[test]
    fn live_mark_restores_the_pin() {
        let mut state = seeded_state();
        let mut marked = live_window(3, "Firefox");
        marked.marks = vec!["project:dev".to_string()];
        let live = LiveTree {
            windows: vec![live_window(1, "Ghostty"), marked],
            outputs: vec![live_output("DP-1")],
        };

        let plan = plan_recovery(&state, &live);
        apply_plan(&mut state, &plan);

        let record = state.window(3).unwrap();
        assert!(record.pinned);
        assert_eq!(record.project.as_deref(), Some("dev"));
    }

    #[test]
    fn pinned_mismatch_without_live_mark_is_report_only() {
        let mut state = seeded_state();
        state.apply(&StateEvent::WindowMarked {
            id: 1,
            project: Some("global".to_string()),
        });

        let live = LiveTree {
            windows: vec![live_window(1, "Ghostty")],
            outputs: vec![live_output("DP-1")],
        };
        let plan = plan_recovery(&state, &live);
        assert!(plan.corrections.is_empty());
        assert_eq!(plan.reported.len(), 1);
        assert!(matches!(
            plan.reported[0],
            Discrepancy::ProjectMismatch { pinned: true, .. }
        ));
    }

    #[test]
    fn unconfirmable_assignment_is_report_only() {
        // record says "dev" (unpinned) but no rule can confirm it any more
        let state = seeded_state();
        let checkpoint = state.checkpoint(0);
        let state =
            StateManager::from_checkpoint(checkpoint, engine(vec![]), vec![project("dev")]);

        let live = LiveTree {
            windows: vec![live_window(1, "Ghostty")],
            outputs: vec![live_output("DP-1")],
        };
        let plan = plan_recovery(&state, &live);
        assert!(plan
            .corrections
            .iter()
            .all(|c| !matches!(c.discrepancy, Discrepancy::ProjectMismatch { .. })));
        assert!(plan.reported.iter().any(|d| matches!(
            d,
            Discrepancy::ProjectMismatch { pinned: false, expected: None, .. }
        )));
    }

    #[test]
    fn rule_drift_is_fixed_through_reclassify() {
        let state = seeded_state();
        // live title reveals nothing; swap the engine's view by marking then
        // unmarking is the normal path, so instead drift the record: rules
        // say "dev" for Ghostty but the record was restored unclassified.
        let checkpoint = {
            let mut cp = state.checkpoint(0);
            for window in &mut cp.windows {
                window.project = None;
            }
            cp
        };
        let mut state = StateManager::from_checkpoint(
            checkpoint,
            engine(vec![class_rule("Ghostty", "dev")]),
            vec![project("dev")],
        );

        let live = LiveTree {
            windows: vec![live_window(1, "Ghostty")],
            outputs: vec![live_output("DP-1")],
        };
        let plan = plan_recovery(&state, &live);
        assert!(plan
            .corrections
            .iter()
            .any(|c| matches!(c.events[0], StateEvent::WindowReclassify { id: 1 })));

        apply_plan(&mut state, &plan);
        assert_eq!(state.window(1).unwrap().project.as_deref(), Some("dev"));
    }

    #[test]
    fn geometry_drift_synthesizes_move() {
        let mut state = seeded_state();
        let mut moved = live_window(1, "Ghostty");
        moved.geometry = Geometry::new(100, 100, 640, 480);
        moved.workspace = 2;
        let live = LiveTree {
            windows: vec![moved],
            outputs: vec![live_output("DP-1")],
        };

        let plan = plan_recovery(&state, &live);
        apply_plan(&mut state, &plan);

        let record = state.window(1).unwrap();
        assert_eq!(record.workspace, 2);
        assert_eq!(record.geometry, Geometry::new(100, 100, 640, 480));
    }

    #[test]
    fn output_drift_is_synced() {
        let mut state = seeded_state();
        let live = LiveTree {
            windows: vec![live_window(1, "Ghostty")],
            outputs: vec![live_output("DP-1"), live_output("HDMI-1")],
        };
        let plan = plan_recovery(&state, &live);
        apply_plan(&mut state, &plan);
        assert_eq!(state.active_monitors().len(), 2);
    }

    #[test]
    fn corrections_produce_window_deltas_through_apply() {
        let mut state = seeded_state();
        let live = LiveTree {
            windows: vec![live_window(1, "Ghostty"), live_window(2, "Firefox")],
            outputs: vec![live_output("DP-1")],
        };
        let plan = plan_recovery(&state, &live);
        let correction = plan
            .corrections
            .iter()
            .find(|c| matches!(c.discrepancy, Discrepancy::WindowMissingFromModel { id: 2, .. }))
            .expect("missing-from-model correction");
        let applied = state.apply(&correction.events[0]);
        assert!(matches!(applied.delta, StateDelta::WindowAdded { .. }));
    }
}
