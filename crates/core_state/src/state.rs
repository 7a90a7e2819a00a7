//! The state manager, sole authority over window, monitor and workspace data.
//!
//! All mutation flows through [`StateManager::apply`]; every other component
//! receives owned copies. `apply` is total: events that do not apply are
//! no-ops that still consume a sequence number, so the event buffer stays a
//! faithful ordered log of everything the daemon saw.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::classify::ClassificationEngine;
use crate::{
    Applied, Monitor, MonitorRole, Project, StateDelta, StateEvent, WindowId, WindowProps,
    WindowRecord, WorkspaceId, GLOBAL_PROJECT,
};

/// A workspace known to the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceInfo {
    pub id: WorkspaceId,
    pub output: String,
}

/// Serializable checkpoint of the full model, written to disk periodically
/// and on clean shutdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateCheckpoint {
    /// Unix timestamp (seconds) when the checkpoint was taken.
    pub saved_at: u64,
    pub next_seq: u64,
    pub windows: Vec<WindowRecord>,
    pub monitors: Vec<Monitor>,
    pub workspaces: Vec<WorkspaceInfo>,
    pub focused_window: Option<WindowId>,
    pub focused_workspace: Option<WorkspaceId>,
    pub primary_output: Option<String>,
}

pub struct StateManager {
    windows: HashMap<WindowId, WindowRecord>,
    monitors: BTreeMap<String, Monitor>,
    workspaces: BTreeMap<WorkspaceId, WorkspaceInfo>,
    projects: BTreeMap<String, Project>,
    engine: ClassificationEngine,
    focused_window: Option<WindowId>,
    focused_workspace: Option<WorkspaceId>,
    /// Output the WM flags as primary; drives role assignment.
    primary_output: Option<String>,
    next_seq: u64,
}

impl StateManager {
    /// Create an empty model with the given rule engine and project set.
    pub fn new(engine: ClassificationEngine, projects: Vec<Project>) -> Self {
        Self {
            windows: HashMap::new(),
            monitors: BTreeMap::new(),
            workspaces: BTreeMap::new(),
            projects: projects.into_iter().map(|p| (p.name.clone(), p)).collect(),
            engine,
            focused_window: None,
            focused_workspace: None,
            primary_output: None,
            next_seq: 1,
        }
    }

    /// Rebuild a model from a checkpoint. Window records referencing projects
    /// that no longer exist in configuration demote to unclassified.
    pub fn from_checkpoint(
        checkpoint: StateCheckpoint,
        engine: ClassificationEngine,
        projects: Vec<Project>,
    ) -> Self {
        let mut manager = Self::new(engine, projects);
        manager.next_seq = checkpoint.next_seq.max(1);
        manager.focused_window = checkpoint.focused_window;
        manager.focused_workspace = checkpoint.focused_workspace;
        manager.primary_output = checkpoint.primary_output;
        for monitor in checkpoint.monitors {
            manager.monitors.insert(monitor.name.clone(), monitor);
        }
        for workspace in checkpoint.workspaces {
            manager.workspaces.insert(workspace.id, workspace);
        }
        for mut window in checkpoint.windows {
            if let Some(project) = &window.project {
                if project != GLOBAL_PROJECT && !manager.projects.contains_key(project) {
                    tracing::warn!(
                        "Window {} referenced unknown project '{}', demoting to unclassified",
                        window.id,
                        project
                    );
                    window.project = None;
                    window.pinned = false;
                }
            }
            manager.windows.insert(window.id, window);
        }
        manager
    }

    /// Apply one event. Total: never fails, unrecognized or inapplicable
    /// events are no-ops that still advance the sequence counter.
    pub fn apply(&mut self, event: &StateEvent) -> Applied {
        let seq = self.next_seq;
        self.next_seq += 1;

        let delta = match event {
            StateEvent::WindowOpened { window } => self.apply_opened(window),
            StateEvent::WindowClosed { id } => self.apply_closed(*id),
            StateEvent::WindowTitle { id, title } => self.apply_title(*id, title),
            StateEvent::WindowMoved {
                id,
                workspace,
                output,
                geometry,
            } => self.apply_moved(*id, *workspace, output, *geometry),
            StateEvent::WindowFocused { id } => self.apply_focused(*id),
            StateEvent::WindowMarked { id, project } => self.apply_marked(*id, project.as_deref()),
            StateEvent::WindowReclassify { id } => self.apply_reclassify(*id),
            StateEvent::WorkspaceFocused { workspace, output } => {
                self.apply_workspace_focused(*workspace, output)
            }
            StateEvent::WorkspaceInitialized { workspace, output } => {
                if self.workspaces.contains_key(workspace) {
                    StateDelta::None
                } else {
                    self.workspaces.insert(
                        *workspace,
                        WorkspaceInfo {
                            id: *workspace,
                            output: output.clone(),
                        },
                    );
                    StateDelta::WorkspaceAdded {
                        workspace: *workspace,
                        output: output.clone(),
                    }
                }
            }
            StateEvent::WorkspaceEmptied { workspace } => {
                if self.workspaces.remove(workspace).is_some() {
                    StateDelta::WorkspaceRemoved {
                        workspace: *workspace,
                    }
                } else {
                    StateDelta::None
                }
            }
            StateEvent::OutputConnected {
                name,
                geometry,
                primary,
                current_workspace,
            } => {
                if *primary {
                    self.primary_output = Some(name.clone());
                }
                self.monitors.insert(
                    name.clone(),
                    Monitor {
                        name: name.clone(),
                        geometry: *geometry,
                        role: MonitorRole::Primary,
                        current_workspace: *current_workspace,
                        active: true,
                    },
                );
                self.assign_roles();
                StateDelta::OutputAdded { name: name.clone() }
            }
            StateEvent::OutputDisconnected { name } => match self.monitors.get_mut(name) {
                Some(monitor) if monitor.active => {
                    monitor.active = false;
                    if self.primary_output.as_deref() == Some(name.as_str()) {
                        self.primary_output = None;
                    }
                    self.assign_roles();
                    StateDelta::OutputRemoved { name: name.clone() }
                }
                _ => StateDelta::None,
            },
        };

        Applied { seq, delta }
    }

    fn apply_opened(&mut self, props: &WindowProps) -> StateDelta {
        if self.windows.contains_key(&props.id) {
            // Duplicate open: refresh WM-owned fields, keep the assignment.
            let visible = self.on_visible_workspace(&props.output, props.workspace);
            let record = self.windows.get_mut(&props.id).expect("checked above");
            record.app_id = props.app_id.clone();
            record.instance = props.instance.clone();
            record.title = props.title.clone();
            record.workspace = props.workspace;
            record.output = props.output.clone();
            record.geometry = props.geometry;
            record.floating = props.floating;
            record.pid = props.pid.or(record.pid);
            record.visible = visible;
            return StateDelta::WindowUpdated {
                window: record.clone(),
            };
        }

        // Classification happens before insertion, so a record is never
        // observable without an assignment (possibly unclassified).
        let project = self.resolve_classification(&props.app_id, &props.instance, &props.title);
        let record = WindowRecord {
            id: props.id,
            app_id: props.app_id.clone(),
            instance: props.instance.clone(),
            title: props.title.clone(),
            workspace: props.workspace,
            output: props.output.clone(),
            project,
            pinned: false,
            floating: props.floating,
            geometry: props.geometry,
            pid: props.pid,
            visible: self.on_visible_workspace(&props.output, props.workspace),
        };
        self.windows.insert(record.id, record.clone());
        StateDelta::WindowAdded { window: record }
    }

    fn apply_closed(&mut self, id: WindowId) -> StateDelta {
        if self.focused_window == Some(id) {
            self.focused_window = None;
        }
        match self.windows.remove(&id) {
            Some(_) => StateDelta::WindowRemoved { id },
            None => StateDelta::None,
        }
    }

    fn apply_title(&mut self, id: WindowId, title: &str) -> StateDelta {
        let Some(record) = self.windows.get(&id) else {
            return StateDelta::None;
        };
        // Some applications only reveal their identity after launch, so a
        // title change re-runs classification. User pins take precedence.
        let project = if record.pinned {
            record.project.clone()
        } else {
            self.resolve_classification(&record.app_id, &record.instance, title)
        };
        let record = self.windows.get_mut(&id).expect("checked above");
        record.title = title.to_string();
        record.project = project;
        StateDelta::WindowUpdated {
            window: record.clone(),
        }
    }

    fn apply_moved(
        &mut self,
        id: WindowId,
        workspace: WorkspaceId,
        output: &str,
        geometry: crate::Geometry,
    ) -> StateDelta {
        let visible = self.on_visible_workspace(output, workspace);
        match self.windows.get_mut(&id) {
            Some(record) => {
                record.workspace = workspace;
                record.output = output.to_string();
                record.geometry = geometry;
                record.visible = visible;
                StateDelta::WindowUpdated {
                    window: record.clone(),
                }
            }
            None => StateDelta::None,
        }
    }

    fn apply_focused(&mut self, id: WindowId) -> StateDelta {
        match self.windows.get_mut(&id) {
            Some(record) => {
                record.visible = true;
                self.focused_window = Some(id);
                self.focused_workspace = Some(record.workspace);
                StateDelta::WindowUpdated {
                    window: record.clone(),
                }
            }
            None => StateDelta::None,
        }
    }

    fn apply_marked(&mut self, id: WindowId, project: Option<&str>) -> StateDelta {
        match project {
            Some(name) => {
                if name != GLOBAL_PROJECT && !self.projects.contains_key(name) {
                    tracing::warn!(
                        "Ignoring mark on window {}: unknown project '{}'",
                        id,
                        name
                    );
                    return StateDelta::None;
                }
                match self.windows.get_mut(&id) {
                    Some(record) => {
                        record.project = Some(name.to_string());
                        record.pinned = true;
                        StateDelta::WindowUpdated {
                            window: record.clone(),
                        }
                    }
                    None => StateDelta::None,
                }
            }
            None => {
                let Some(record) = self.windows.get(&id) else {
                    return StateDelta::None;
                };
                let project = self.resolve_classification(
                    &record.app_id,
                    &record.instance,
                    &record.title,
                );
                let record = self.windows.get_mut(&id).expect("checked above");
                record.pinned = false;
                record.project = project;
                StateDelta::WindowUpdated {
                    window: record.clone(),
                }
            }
        }
    }

    fn apply_reclassify(&mut self, id: WindowId) -> StateDelta {
        let Some(record) = self.windows.get(&id) else {
            return StateDelta::None;
        };
        if record.pinned {
            return StateDelta::None;
        }
        let project = self.resolve_classification(&record.app_id, &record.instance, &record.title);
        if project == record.project {
            return StateDelta::None;
        }
        let record = self.windows.get_mut(&id).expect("checked above");
        record.project = project;
        StateDelta::WindowUpdated {
            window: record.clone(),
        }
    }

    fn apply_workspace_focused(&mut self, workspace: WorkspaceId, output: &str) -> StateDelta {
        self.focused_workspace = Some(workspace);
        self.workspaces.entry(workspace).or_insert(WorkspaceInfo {
            id: workspace,
            output: output.to_string(),
        });
        if let Some(monitor) = self.monitors.get_mut(output) {
            monitor.current_workspace = workspace;
        }
        for record in self.windows.values_mut() {
            if record.output == output {
                record.visible = record.workspace == workspace;
            }
        }
        StateDelta::WorkspaceFocused {
            workspace,
            output: output.to_string(),
        }
    }

    /// Run the rule engine and resolve its target against configuration.
    /// Targets naming unknown projects demote to unclassified.
    fn resolve_classification(
        &self,
        app_id: &str,
        instance: &str,
        title: &str,
    ) -> Option<String> {
        let target = self.engine.classify(app_id, instance, title)?;
        if target == GLOBAL_PROJECT || self.projects.contains_key(target) {
            Some(target.to_string())
        } else {
            tracing::warn!(
                "Classification rule targets unknown project '{}', leaving window unclassified",
                target
            );
            None
        }
    }

    fn on_visible_workspace(&self, output: &str, workspace: WorkspaceId) -> bool {
        self.monitors
            .get(output)
            .map(|m| m.current_workspace == workspace)
            .unwrap_or(true)
    }

    /// Recompute monitor roles: the WM-flagged primary first, remaining
    /// active outputs ordered left to right. Outputs beyond the third share
    /// the tertiary role.
    fn assign_roles(&mut self) {
        let mut names: Vec<String> = self
            .monitors
            .values()
            .filter(|m| m.active)
            .map(|m| m.name.clone())
            .collect();
        names.sort_by_key(|name| {
            let monitor = &self.monitors[name];
            let primary = self.primary_output.as_deref() == Some(name.as_str());
            (!primary, monitor.geometry.x, monitor.geometry.y)
        });
        for (index, name) in names.iter().enumerate() {
            let role = match index {
                0 => MonitorRole::Primary,
                1 => MonitorRole::Secondary,
                _ => MonitorRole::Tertiary,
            };
            if let Some(monitor) = self.monitors.get_mut(name) {
                monitor.role = role;
            }
        }
    }

    // ------------------------------------------------------------------
    // Read accessors. All return owned copies, never live references, so
    // concurrent readers cannot observe a record mid-mutation.
    // ------------------------------------------------------------------

    /// All tracked windows, ordered by id.
    pub fn windows(&self) -> Vec<WindowRecord> {
        let mut windows: Vec<WindowRecord> = self.windows.values().cloned().collect();
        windows.sort_by_key(|w| w.id);
        windows
    }

    pub fn window(&self, id: WindowId) -> Option<WindowRecord> {
        self.windows.get(&id).cloned()
    }

    pub fn window_count(&self) -> usize {
        self.windows.len()
    }

    /// All known monitors, including inactive ones, ordered by name.
    pub fn monitors(&self) -> Vec<Monitor> {
        self.monitors.values().cloned().collect()
    }

    /// Currently connected monitors.
    pub fn active_monitors(&self) -> Vec<Monitor> {
        self.monitors.values().filter(|m| m.active).cloned().collect()
    }

    pub fn monitor(&self, name: &str) -> Option<Monitor> {
        self.monitors.get(name).cloned()
    }

    pub fn workspaces(&self) -> Vec<WorkspaceInfo> {
        self.workspaces.values().cloned().collect()
    }

    pub fn focused_window(&self) -> Option<WindowRecord> {
        self.focused_window.and_then(|id| self.windows.get(&id).cloned())
    }

    pub fn focused_workspace(&self) -> Option<WorkspaceId> {
        self.focused_workspace
    }

    pub fn projects(&self) -> Vec<Project> {
        self.projects.values().cloned().collect()
    }

    pub fn project(&self, name: &str) -> Option<Project> {
        self.projects.get(name).cloned()
    }

    /// Run the rule engine against arbitrary window properties without
    /// touching state. Used by the validator to compute expected
    /// assignments.
    pub fn expected_classification(
        &self,
        app_id: &str,
        instance: &str,
        title: &str,
    ) -> Option<String> {
        self.resolve_classification(app_id, instance, title)
    }

    /// Sequence number the next applied event will consume.
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Take a serializable checkpoint of the model.
    pub fn checkpoint(&self, saved_at: u64) -> StateCheckpoint {
        StateCheckpoint {
            saved_at,
            next_seq: self.next_seq,
            windows: self.windows(),
            monitors: self.monitors(),
            workspaces: self.workspaces(),
            focused_window: self.focused_window,
            focused_workspace: self.focused_workspace,
            primary_output: self.primary_output.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{ClassificationRule, MatchField, PatternKind};
    use crate::Geometry;

    fn engine(rules: Vec<ClassificationRule>) -> ClassificationEngine {
        ClassificationEngine::new(&rules, &[])
    }

    fn rule(pattern: &str, target: &str, priority: u32) -> ClassificationRule {
        ClassificationRule {
            pattern: pattern.to_string(),
            field: MatchField::Class,
            kind: PatternKind::Regex,
            target: target.to_string(),
            priority,
        }
    }

    fn project(name: &str) -> Project {
        Project {
            name: name.to_string(),
            directory: format!("/home/u/{name}").into(),
            window_classes: vec![],
            auto_save: false,
            default_layout: None,
        }
    }

    fn props(id: WindowId, app_id: &str) -> WindowProps {
        WindowProps {
            id,
            app_id: app_id.to_string(),
            instance: String::new(),
            title: String::new(),
            workspace: 1,
            output: "DP-1".to_string(),
            geometry: Geometry::new(0, 0, 800, 600),
            floating: false,
            pid: Some(1000 + id as i32),
        }
    }

    fn manager_with_rules() -> StateManager {
        StateManager::new(
            engine(vec![rule("Ghostty", "dev", 1), rule(".*", "global", 99)]),
            vec![project("dev")],
        )
    }

    #[test]
    fn open_classifies_before_insert() {
        let mut manager = manager_with_rules();
        let applied = manager.apply(&StateEvent::WindowOpened { window: props(1, "Ghostty") });
        match applied.delta {
            StateDelta::WindowAdded { window } => {
                assert_eq!(window.project.as_deref(), Some("dev"));
            }
            other => panic!("expected WindowAdded, got {other:?}"),
        }
        let applied = manager.apply(&StateEvent::WindowOpened { window: props(2, "Firefox") });
        match applied.delta {
            StateDelta::WindowAdded { window } => {
                assert_eq!(window.project.as_deref(), Some("global"));
            }
            other => panic!("expected WindowAdded, got {other:?}"),
        }
    }

    #[test]
    fn rule_targeting_unknown_project_demotes_to_unclassified() {
        let mut manager = StateManager::new(
            engine(vec![rule("Ghostty", "nonexistent", 1)]),
            vec![],
        );
        manager.apply(&StateEvent::WindowOpened { window: props(1, "Ghostty") });
        assert_eq!(manager.window(1).unwrap().project, None);
    }

    #[test]
    fn apply_is_total_and_always_advances_seq() {
        let mut manager = manager_with_rules();
        let first = manager.apply(&StateEvent::WindowClosed { id: 999 });
        assert_eq!(first.delta, StateDelta::None);
        let second = manager.apply(&StateEvent::WindowTitle {
            id: 999,
            title: "ghost".to_string(),
        });
        assert_eq!(second.delta, StateDelta::None);
        assert_eq!(second.seq, first.seq + 1);
    }

    #[test]
    fn title_change_reclassifies_unpinned_window() {
        let mut manager = StateManager::new(
            engine(vec![ClassificationRule {
                pattern: ".*nvim.*".to_string(),
                field: MatchField::Title,
                kind: PatternKind::Regex,
                target: "dev".to_string(),
                priority: 1,
            }]),
            vec![project("dev")],
        );
        manager.apply(&StateEvent::WindowOpened { window: props(1, "foot") });
        assert_eq!(manager.window(1).unwrap().project, None);

        manager.apply(&StateEvent::WindowTitle {
            id: 1,
            title: "nvim src/main.rs".to_string(),
        });
        assert_eq!(manager.window(1).unwrap().project.as_deref(), Some("dev"));
    }

    #[test]
    fn pinned_window_is_never_reclassified() {
        let mut manager = manager_with_rules();
        manager.apply(&StateEvent::WindowOpened { window: props(1, "Firefox") });
        manager.apply(&StateEvent::WindowMarked {
            id: 1,
            project: Some("dev".to_string()),
        });
        let record = manager.window(1).unwrap();
        assert!(record.pinned);
        assert_eq!(record.project.as_deref(), Some("dev"));

        // title change would classify to "global" but the pin holds
        manager.apply(&StateEvent::WindowTitle {
            id: 1,
            title: "new title".to_string(),
        });
        assert_eq!(manager.window(1).unwrap().project.as_deref(), Some("dev"));

        // explicit reclassify is also a no-op for pinned windows
        let applied = manager.apply(&StateEvent::WindowReclassify { id: 1 });
        assert_eq!(applied.delta, StateDelta::None);

        // clearing the mark restores rule output
        manager.apply(&StateEvent::WindowMarked { id: 1, project: None });
        let record = manager.window(1).unwrap();
        assert!(!record.pinned);
        assert_eq!(record.project.as_deref(), Some("global"));
    }

    #[test]
    fn mark_with_unknown_project_is_ignored() {
        let mut manager = manager_with_rules();
        manager.apply(&StateEvent::WindowOpened { window: props(1, "Firefox") });
        let applied = manager.apply(&StateEvent::WindowMarked {
            id: 1,
            project: Some("nonexistent".to_string()),
        });
        assert_eq!(applied.delta, StateDelta::None);
        assert!(!manager.window(1).unwrap().pinned);
    }

    #[test]
    fn close_removes_window_and_clears_focus() {
        let mut manager = manager_with_rules();
        manager.apply(&StateEvent::WindowOpened { window: props(1, "Ghostty") });
        manager.apply(&StateEvent::WindowFocused { id: 1 });
        assert_eq!(manager.focused_window().map(|w| w.id), Some(1));

        manager.apply(&StateEvent::WindowClosed { id: 1 });
        assert_eq!(manager.window_count(), 0);
        assert!(manager.focused_window().is_none());
    }

    #[test]
    fn roles_follow_primary_then_position() {
        let mut manager = manager_with_rules();
        manager.apply(&StateEvent::OutputConnected {
            name: "HDMI-1".to_string(),
            geometry: Geometry::new(1920, 0, 1920, 1080),
            primary: false,
            current_workspace: 2,
        });
        manager.apply(&StateEvent::OutputConnected {
            name: "DP-1".to_string(),
            geometry: Geometry::new(0, 0, 2560, 1440),
            primary: true,
            current_workspace: 1,
        });
        manager.apply(&StateEvent::OutputConnected {
            name: "DP-2".to_string(),
            geometry: Geometry::new(3840, 0, 1920, 1080),
            primary: false,
            current_workspace: 3,
        });

        let roles: BTreeMap<String, MonitorRole> = manager
            .active_monitors()
            .into_iter()
            .map(|m| (m.name, m.role))
            .collect();
        assert_eq!(roles["DP-1"], MonitorRole::Primary);
        assert_eq!(roles["HDMI-1"], MonitorRole::Secondary);
        assert_eq!(roles["DP-2"], MonitorRole::Tertiary);

        // disconnecting the primary promotes the leftmost survivor
        manager.apply(&StateEvent::OutputDisconnected {
            name: "DP-1".to_string(),
        });
        let roles: BTreeMap<String, MonitorRole> = manager
            .active_monitors()
            .into_iter()
            .map(|m| (m.name, m.role))
            .collect();
        assert_eq!(roles.len(), 2);
        assert_eq!(roles["HDMI-1"], MonitorRole::Primary);
        assert_eq!(roles["DP-2"], MonitorRole::Secondary);
    }

    #[test]
    fn workspace_focus_updates_visibility() {
        let mut manager = manager_with_rules();
        manager.apply(&StateEvent::OutputConnected {
            name: "DP-1".to_string(),
            geometry: Geometry::new(0, 0, 2560, 1440),
            primary: true,
            current_workspace: 1,
        });
        manager.apply(&StateEvent::WindowOpened { window: props(1, "Ghostty") });
        assert!(manager.window(1).unwrap().visible);

        manager.apply(&StateEvent::WorkspaceFocused {
            workspace: 2,
            output: "DP-1".to_string(),
        });
        assert!(!manager.window(1).unwrap().visible);

        manager.apply(&StateEvent::WorkspaceFocused {
            workspace: 1,
            output: "DP-1".to_string(),
        });
        assert!(manager.window(1).unwrap().visible);
    }

    #[test]
    fn checkpoint_roundtrip_preserves_model_and_seq() {
        let mut manager = manager_with_rules();
        manager.apply(&StateEvent::WindowOpened { window: props(1, "Ghostty") });
        manager.apply(&StateEvent::WindowMarked {
            id: 1,
            project: Some("dev".to_string()),
        });
        let next_seq = manager.next_seq();

        let checkpoint = manager.checkpoint(1_700_000_000);
        let json = serde_json::to_string(&checkpoint).unwrap();
        let parsed: StateCheckpoint = serde_json::from_str(&json).unwrap();
        let restored = StateManager::from_checkpoint(
            parsed,
            engine(vec![rule("Ghostty", "dev", 1)]),
            vec![project("dev")],
        );

        assert_eq!(restored.next_seq(), next_seq);
        let record = restored.window(1).unwrap();
        assert_eq!(record.project.as_deref(), Some("dev"));
        assert!(record.pinned);
    }

    #[test]
    fn checkpoint_with_stale_project_demotes_window() {
        let mut manager = manager_with_rules();
        manager.apply(&StateEvent::WindowOpened { window: props(1, "Ghostty") });
        let checkpoint = manager.checkpoint(0);

        // restart without the "dev" project configured
        let restored = StateManager::from_checkpoint(checkpoint, engine(vec![]), vec![]);
        assert_eq!(restored.window(1).unwrap().project, None);
    }
}
