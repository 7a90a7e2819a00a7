//! Layout restore sessions.
//!
//! A session walks every placeholder of a snapshot through
//! `Pending → Launched → Correlated → Placed`, or into a terminal failure
//! (`TimedOut`, `Skipped`, `Failed`). Freshly appeared windows are matched
//! to launched placeholders by expected class ("swallowing"); launches that
//! never produce a window are reported after the correlation timeout, never
//! retried. Cancellation leaves already-launched processes running.

use std::path::Path;

use tokio::sync::oneshot;
use tokio::time::Instant;

use workscope_core_state::layout::{PlaceholderState, RestoreTarget};
use workscope_core_state::{WindowId, WindowRecord};
use workscope_ipc::{PlaceholderOutcome, PlaceholderReport, Response, RestoreReport};
use workscope_wm::{WmCommand, WmError, WmTransport};

/// Environment contract for daemon-launched windows.
pub const ENV_PROJECT: &str = "WORKSCOPE_PROJECT";
pub const ENV_PROJECT_DIR: &str = "WORKSCOPE_PROJECT_DIR";
pub const ENV_LAYOUT: &str = "WORKSCOPE_LAYOUT";

/// One placeholder being restored.
pub struct RestoreItem {
    pub target: RestoreTarget,
    pub state: PlaceholderState,
    /// Correlation deadline, set when the launch succeeds.
    pub deadline: Option<Instant>,
}

/// Everything needed to position a correlated window.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacementSpec {
    pub window: WindowId,
    pub workspace: workscope_core_state::WorkspaceId,
    pub output: String,
    pub geometry: workscope_core_state::Geometry,
    pub floating: bool,
}

/// An in-flight restore. At most one exists at a time; the response to the
/// originating client is held until every placeholder is terminal.
pub struct RestoreSession {
    pub name: String,
    pub request_id: u64,
    items: Vec<RestoreItem>,
    responder: Option<oneshot::Sender<Response>>,
    cancelled: bool,
}

impl RestoreSession {
    /// Build a session from resolved targets. Manual placeholders (no
    /// recoverable launch command) are skipped immediately with a warning.
    pub fn prepare(
        name: String,
        request_id: u64,
        responder: oneshot::Sender<Response>,
        targets: Vec<RestoreTarget>,
    ) -> Self {
        let items = targets
            .into_iter()
            .map(|target| {
                let state = if target.placeholder.command.is_some() {
                    PlaceholderState::Pending
                } else {
                    tracing::warn!(
                        "Skipping manual placeholder for class '{}' (no launch command)",
                        target.placeholder.expected_class
                    );
                    PlaceholderState::Skipped
                };
                RestoreItem {
                    target,
                    state,
                    deadline: None,
                }
            })
            .collect();
        Self {
            name,
            request_id,
            items,
            responder: Some(responder),
            cancelled: false,
        }
    }

    /// Indices of placeholders still awaiting launch.
    pub fn pending_indices(&self) -> Vec<usize> {
        self.items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.state == PlaceholderState::Pending)
            .map(|(index, _)| index)
            .collect()
    }

    pub fn target(&self, index: usize) -> &RestoreTarget {
        &self.items[index].target
    }

    pub fn mark_launched(&mut self, index: usize, deadline: Instant) {
        let item = &mut self.items[index];
        item.state = PlaceholderState::Launched;
        item.deadline = Some(deadline);
    }

    pub fn mark_failed(&mut self, index: usize) {
        self.items[index].state = PlaceholderState::Failed;
    }

    /// Try to swallow a freshly appeared window: the first launched
    /// placeholder expecting this window's class claims it.
    pub fn correlate(&mut self, window: &WindowRecord) -> Option<(usize, PlacementSpec)> {
        if self.cancelled {
            return None;
        }
        let index = self.items.iter().position(|item| {
            item.state == PlaceholderState::Launched
                && item.target.placeholder.expected_class == window.app_id
        })?;
        let item = &mut self.items[index];
        item.state = PlaceholderState::Correlated(window.id);
        tracing::info!(
            "Correlated window {} ({}) to placeholder {} of layout '{}'",
            window.id,
            window.app_id,
            index,
            self.name
        );
        Some((
            index,
            PlacementSpec {
                window: window.id,
                workspace: item.target.workspace,
                output: item.target.output.clone(),
                geometry: item.target.geometry,
                floating: item.target.placeholder.floating,
            },
        ))
    }

    /// Record a finished placement. A failed positioning command still
    /// counts as placed (the window exists); the warning covers it.
    pub fn mark_placed(&mut self, index: usize, window: WindowId, positioned: bool) {
        if !positioned {
            tracing::warn!(
                "Window {} correlated but positioning commands failed",
                window
            );
        }
        if let Some(item) = self.items.get_mut(index) {
            if matches!(item.state, PlaceholderState::Correlated(_)) {
                item.state = PlaceholderState::Placed(window);
            }
        }
    }

    /// Expire launched placeholders past their deadline. Returns how many
    /// timed out.
    pub fn expire(&mut self, now: Instant) -> usize {
        let mut expired = 0;
        for item in &mut self.items {
            if item.state == PlaceholderState::Launched
                && item.deadline.is_some_and(|deadline| deadline <= now)
            {
                item.state = PlaceholderState::TimedOut;
                expired += 1;
                tracing::warn!(
                    "No window of class '{}' appeared within the correlation timeout",
                    item.target.placeholder.expected_class
                );
            }
        }
        expired
    }

    /// Earliest outstanding correlation deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.items
            .iter()
            .filter(|item| item.state == PlaceholderState::Launched)
            .filter_map(|item| item.deadline)
            .min()
    }

    /// Cancel the session: non-terminal placeholders are abandoned, already
    /// launched processes are left running.
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// True once every placeholder reached a terminal state (or the session
    /// was cancelled).
    pub fn is_complete(&self) -> bool {
        self.cancelled || self.items.iter().all(|item| item.state.is_terminal())
    }

    /// Per-placeholder report for the client.
    pub fn report(&self) -> RestoreReport {
        let placeholders: Vec<PlaceholderReport> = self
            .items
            .iter()
            .map(|item| {
                let (outcome, window) = match item.state {
                    PlaceholderState::Placed(window) => (PlaceholderOutcome::Placed, Some(window)),
                    PlaceholderState::TimedOut => (PlaceholderOutcome::TimedOut, None),
                    PlaceholderState::Skipped => (PlaceholderOutcome::Skipped, None),
                    PlaceholderState::Failed => (PlaceholderOutcome::LaunchFailed, None),
                    PlaceholderState::Correlated(window) => {
                        (PlaceholderOutcome::Cancelled, Some(window))
                    }
                    PlaceholderState::Pending | PlaceholderState::Launched => {
                        (PlaceholderOutcome::Cancelled, None)
                    }
                };
                PlaceholderReport {
                    expected_class: item.target.placeholder.expected_class.clone(),
                    workspace: item.target.workspace,
                    outcome,
                    window,
                }
            })
            .collect();

        RestoreReport {
            name: self.name.clone(),
            placed: placeholders
                .iter()
                .filter(|p| p.outcome == PlaceholderOutcome::Placed)
                .count(),
            timed_out: placeholders
                .iter()
                .filter(|p| p.outcome == PlaceholderOutcome::TimedOut)
                .count(),
            skipped: placeholders
                .iter()
                .filter(|p| p.outcome == PlaceholderOutcome::Skipped)
                .count(),
            cancelled: self.cancelled,
            placeholders,
        }
    }

    /// Take the held responder; the session is finished or cancelled.
    pub fn take_responder(&mut self) -> Option<oneshot::Sender<Response>> {
        self.responder.take()
    }
}

/// Spawn a placeholder's launch command, detached, with the project
/// environment contract applied.
pub fn launch(
    target: &RestoreTarget,
    layout_name: &str,
    project_dir: Option<&Path>,
) -> std::io::Result<()> {
    let command = target
        .placeholder
        .command
        .as_ref()
        .filter(|argv| !argv.is_empty())
        .ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty launch command")
        })?;

    let mut process = tokio::process::Command::new(&command[0]);
    process
        .args(&command[1..])
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .env(ENV_LAYOUT, layout_name);
    if let Some(project) = &target.placeholder.project {
        process.env(ENV_PROJECT, project);
    }
    if let Some(dir) = project_dir {
        process.env(ENV_PROJECT_DIR, dir);
        process.current_dir(dir);
    }

    // The child is intentionally detached: cancellation must not kill it.
    process.spawn().map(drop)
}

/// Position a correlated window: move, resize, float. Errors are returned
/// to the caller for logging; the placeholder still counts as placed.
pub async fn place_window(wm: &dyn WmTransport, spec: &PlacementSpec) -> Result<(), WmError> {
    wm.request(&WmCommand::MoveWindow {
        id: spec.window,
        workspace: spec.workspace,
        output: Some(spec.output.clone()),
    })
    .await?;
    wm.request(&WmCommand::ResizeWindow {
        id: spec.window,
        geometry: spec.geometry,
    })
    .await?;
    if spec.floating {
        wm.request(&WmCommand::SetFloating {
            id: spec.window,
            floating: true,
        })
        .await?;
    }
    Ok(())
}
