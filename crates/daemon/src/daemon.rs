//! The daemon core: one event loop owning all mutable state.
//!
//! WM events, client requests and timers multiplex into this loop; the
//! state manager is mutated exclusively from here, so mutual exclusion is
//! structural rather than locked. Long-running work (tree fetches, window
//! placement) runs in background tasks whose results come back through the
//! same event channel.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use workscope_core_state::events::{BufferLimits, EventBuffer, EventEntry, EventSource};
use workscope_core_state::layout::{self, LayoutSnapshot};
use workscope_core_state::validate::{
    plan_recovery, validate, LiveTree, RecoveryResult, ValidationStatus,
};
use workscope_core_state::{
    ClassificationEngine, StateCheckpoint, StateDelta, StateEvent, StateManager, WindowId,
    WindowRecord, GLOBAL_PROJECT,
};
use workscope_ipc::{
    CaptureResult, EnvCoverageReport, EnvMissing, ErrorCode, EventsPage, Method, Notification,
    Pong, Request, Response, StatusInfo, ValidateReport, WindowList,
};
use workscope_wm::{
    BackoffPolicy, ConnectionSupervisor, SupervisorEvent, WmCommand, WmError, WmReply, WmTransport,
};

use crate::config::Config;
use crate::restore::{self, RestoreSession};
use crate::server;

/// Events the daemon loop processes.
pub enum DaemonEvent {
    /// A client request with its response channel.
    Ipc {
        request: Request,
        responder: oneshot::Sender<Response>,
    },
    /// A client turning its connection into a notification stream.
    Subscribe {
        request_id: u64,
        sink: mpsc::Sender<Notification>,
        responder: oneshot::Sender<Response>,
    },
    /// Anything from the WM connection supervisor.
    Wm(SupervisorEvent),
    /// A background placement task finished.
    PlacementDone {
        index: usize,
        window: WindowId,
        positioned: bool,
    },
    /// A background live-tree fetch finished.
    TreeFetched {
        responder: Option<(u64, oneshot::Sender<Response>)>,
        result: Result<LiveTree, String>,
        timed_out: bool,
    },
    /// Shut down cleanly.
    Shutdown,
}

enum Flow {
    Continue,
    Shutdown,
}

/// The daemon context: owns the state manager, event buffer and
/// configuration, passed explicitly to everything that needs it.
pub struct Daemon {
    config: Config,
    state: StateManager,
    buffer: EventBuffer,
    /// Set when the buffer hit an internal invariant violation; the buffer
    /// subsystem halts, the rest of the daemon keeps running.
    buffer_halted: bool,
    subscribers: Vec<mpsc::Sender<Notification>>,
    restore: Option<RestoreSession>,
    wm: Arc<dyn WmTransport>,
    wm_connected: bool,
    validate_in_flight: bool,
    reconnect_tx: mpsc::Sender<()>,
    event_tx: mpsc::Sender<DaemonEvent>,
    state_dir: PathBuf,
    start_time: std::time::Instant,
}

impl Daemon {
    fn new(
        config: Config,
        wm: Arc<dyn WmTransport>,
        event_tx: mpsc::Sender<DaemonEvent>,
        reconnect_tx: mpsc::Sender<()>,
    ) -> Result<Self> {
        let state_dir = config.state_dir();
        std::fs::create_dir_all(&state_dir)
            .with_context(|| format!("failed to create state dir {}", state_dir.display()))?;

        let projects = config.core_projects();
        let engine = ClassificationEngine::new(&config.rules, &projects);

        let state = match load_json::<StateCheckpoint>(&state_dir.join(STATE_FILE)) {
            Some(checkpoint) => {
                info!(
                    "Restored state checkpoint from {} ({} windows)",
                    state_dir.join(STATE_FILE).display(),
                    checkpoint.windows.len()
                );
                StateManager::from_checkpoint(checkpoint, engine, projects)
            }
            None => StateManager::new(engine, projects),
        };

        let limits = BufferLimits {
            max_entries: config.events.max_entries,
            max_age_ms: config.events.max_age_secs.map(|s| s * 1000),
        };
        let mut buffer = match load_json::<Vec<EventEntry>>(&state_dir.join(EVENTS_FILE)) {
            Some(entries) => EventBuffer::restore(limits, entries),
            None => EventBuffer::new(limits),
        };
        // A buffer ahead of the checkpoint would collide with fresh
        // sequence numbers; history is expendable, state is not.
        if buffer.last_seq().is_some_and(|last| last >= state.next_seq()) {
            warn!("Event log is ahead of the state checkpoint, discarding history");
            buffer = EventBuffer::new(limits);
        }

        Ok(Self {
            config,
            state,
            buffer,
            buffer_halted: false,
            subscribers: Vec::new(),
            restore: None,
            wm,
            wm_connected: false,
            validate_in_flight: false,
            reconnect_tx,
            event_tx,
            state_dir,
            start_time: std::time::Instant::now(),
        })
    }

    // ------------------------------------------------------------------
    // Event application: the single mutation path
    // ------------------------------------------------------------------

    /// Apply an event, record it in the buffer, fan it out to subscribers,
    /// and feed window arrivals to an in-flight restore.
    fn ingest(&mut self, source: EventSource, event: &StateEvent) {
        let applied = self.state.apply(event);
        let entry = EventEntry {
            seq: applied.seq,
            source,
            kind: event.kind().to_string(),
            payload: serde_json::to_value(event).unwrap_or(serde_json::Value::Null),
            timestamp_ms: now_ms(),
        };
        if !self.buffer_halted {
            if let Err(buffer_error) = self.buffer.append(entry.clone()) {
                error!("Event buffer halted: {buffer_error}");
                self.buffer_halted = true;
            }
        }
        self.subscribers
            .retain(|sink| sink.try_send(Notification::Event { entry: entry.clone() }).is_ok());

        if let StateDelta::WindowAdded { window } = applied.delta {
            self.try_swallow(&window);
        }
    }

    // ------------------------------------------------------------------
    // Loop event handling
    // ------------------------------------------------------------------

    fn handle_event(&mut self, event: DaemonEvent) -> Flow {
        match event {
            DaemonEvent::Ipc { request, responder } => {
                return self.handle_request(request, responder)
            }
            DaemonEvent::Subscribe {
                request_id,
                sink,
                responder,
            } => {
                self.subscribers.push(sink);
                let _ = responder.send(Response::ok(
                    request_id,
                    &serde_json::json!({
                        "subscribed": true,
                        "last_seq": self.state.next_seq().saturating_sub(1),
                    }),
                ));
            }
            DaemonEvent::Wm(SupervisorEvent::Connected { tree }) => {
                self.wm_connected = true;
                // Events missed while disconnected are invisible; a full
                // reconciliation runs before normal processing resumes.
                self.recover(&tree);
            }
            DaemonEvent::Wm(SupervisorEvent::Event(event)) => {
                self.ingest(EventSource::Wm, &event);
            }
            DaemonEvent::Wm(SupervisorEvent::Disconnected { reason }) => {
                self.wm_connected = false;
                warn!("Operating without WM connection: {reason}");
            }
            DaemonEvent::PlacementDone {
                index,
                window,
                positioned,
            } => {
                if let Some(session) = self.restore.as_mut() {
                    session.mark_placed(index, window, positioned);
                }
                self.finish_restore_if_complete();
            }
            DaemonEvent::TreeFetched {
                responder,
                result,
                timed_out,
            } => self.handle_tree_fetched(responder, result, timed_out),
            DaemonEvent::Shutdown => return Flow::Shutdown,
        }
        Flow::Continue
    }

    fn handle_request(
        &mut self,
        request: Request,
        responder: oneshot::Sender<Response>,
    ) -> Flow {
        let id = request.id;
        match request.method {
            Method::Stop => {
                let _ = responder.send(Response::ok(id, &serde_json::json!({"stopping": true})));
                return Flow::Shutdown;
            }
            Method::Validate => self.spawn_tree_fetch(Some((id, responder))),
            Method::RestoreLayout { name } => self.start_restore(id, name, responder),
            method => {
                let response = self.handle_sync(id, method);
                let _ = responder.send(response);
            }
        }
        Flow::Continue
    }

    /// Methods answered synchronously within one loop turn.
    fn handle_sync(&mut self, id: u64, method: Method) -> Response {
        match method {
            Method::Ping => Response::ok(
                id,
                &Pong {
                    version: env!("CARGO_PKG_VERSION").to_string(),
                },
            ),
            Method::GetStatus => Response::ok(
                id,
                &StatusInfo {
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    uptime_seconds: self.start_time.elapsed().as_secs(),
                    wm_connected: self.wm_connected,
                    window_count: self.state.window_count(),
                    monitor_count: self.state.active_monitors().len(),
                    project_count: self.state.projects().len(),
                    last_seq: self.state.next_seq().saturating_sub(1),
                    restore_active: self.restore.is_some(),
                },
            ),
            Method::ListWindows => Response::ok(
                id,
                &WindowList {
                    windows: self.state.windows(),
                    monitors: self.state.active_monitors(),
                },
            ),
            Method::GetEvents { since_seq } => Response::ok(
                id,
                &EventsPage {
                    entries: self.buffer.since(since_seq),
                    first_retained_seq: self.buffer.first_seq(),
                },
            ),
            Method::CheckEnv => Response::ok(id, &self.check_env_coverage()),
            Method::CaptureLayout { name } => self.capture_layout(id, &name),
            Method::CancelRestore => self.cancel_restore(id),
            // routed elsewhere before reaching here
            Method::Subscribe | Method::Stop | Method::Validate | Method::RestoreLayout { .. } => {
                Response::error(id, ErrorCode::Internal, "method routed incorrectly")
            }
        }
    }

    // ------------------------------------------------------------------
    // Recovery / validation
    // ------------------------------------------------------------------

    /// Full reconciliation against a live tree: mechanical discrepancies
    /// are corrected through the normal apply path, the rest is reported.
    fn recover(&mut self, tree: &LiveTree) {
        let plan = plan_recovery(&self.state, tree);
        let mut corrected = Vec::new();
        for correction in plan.corrections {
            for event in &correction.events {
                self.ingest(EventSource::Recovery, event);
            }
            corrected.push(correction.discrepancy);
        }
        for discrepancy in &plan.reported {
            warn!("Drift requires manual attention: {discrepancy:?}");
        }
        let result = RecoveryResult {
            status: if corrected.is_empty() && plan.reported.is_empty() {
                ValidationStatus::Pass
            } else {
                ValidationStatus::Drift
            },
            corrected,
            reported: plan.reported,
        };
        info!(
            "Recovery finished: {:?}, {} corrected, {} reported",
            result.status,
            result.corrected.len(),
            result.reported.len()
        );
    }

    /// Fetch the live tree off-loop. With a responder this answers a
    /// `validate` request; without one it is the periodic health check.
    fn spawn_tree_fetch(&mut self, responder: Option<(u64, oneshot::Sender<Response>)>) {
        if !self.wm_connected {
            if let Some((id, tx)) = responder {
                let _ = tx.send(Response::error(
                    id,
                    ErrorCode::WmUnavailable,
                    "window manager is not connected",
                ));
            }
            return;
        }
        if responder.is_none() {
            if self.validate_in_flight {
                return;
            }
            self.validate_in_flight = true;
        }

        let wm = self.wm.clone();
        let event_tx = self.event_tx.clone();
        tokio::spawn(async move {
            let (result, timed_out) = match wm.request(&WmCommand::GetTree).await {
                Ok(WmReply::Tree { tree }) => (Ok(tree), false),
                Ok(other) => (Err(format!("unexpected tree reply: {other:?}")), false),
                Err(wm_error) => {
                    let timed_out = matches!(wm_error, WmError::CommandTimeout(_));
                    (Err(wm_error.to_string()), timed_out)
                }
            };
            let _ = event_tx
                .send(DaemonEvent::TreeFetched {
                    responder,
                    result,
                    timed_out,
                })
                .await;
        });
    }

    fn handle_tree_fetched(
        &mut self,
        responder: Option<(u64, oneshot::Sender<Response>)>,
        result: Result<LiveTree, String>,
        timed_out: bool,
    ) {
        if responder.is_none() {
            self.validate_in_flight = false;
        }
        match result {
            Ok(tree) => {
                let validation = validate(&self.state, &tree);
                match validation.status {
                    ValidationStatus::Pass => debug!("Periodic validation: no drift"),
                    _ => warn!(
                        "Validation found {} discrepancies",
                        validation.discrepancies.len()
                    ),
                }
                if let Some((id, tx)) = responder {
                    let _ = tx.send(Response::ok(id, &ValidateReport { validation }));
                }
            }
            Err(message) => {
                if timed_out {
                    // an unanswered command means the connection is bad;
                    // nudge the supervisor into a reconnect cycle
                    let _ = self.reconnect_tx.try_send(());
                }
                if let Some((id, tx)) = responder {
                    let _ = tx.send(Response::error(id, ErrorCode::WmUnavailable, message));
                } else {
                    warn!("Periodic validation failed: {message}");
                }
            }
        }
    }

    /// Windows scoped to a project must carry the launch environment
    /// contract; report the ones that do not.
    fn check_env_coverage(&self) -> EnvCoverageReport {
        let mut report = EnvCoverageReport {
            covered: 0,
            missing: Vec::new(),
            unreadable: 0,
        };
        for window in self.state.windows() {
            let scoped = window
                .project
                .as_deref()
                .is_some_and(|project| project != GLOBAL_PROJECT);
            if !scoped {
                continue;
            }
            match window.pid {
                Some(pid) => match process_has_env(pid, restore::ENV_PROJECT) {
                    Some(true) => report.covered += 1,
                    Some(false) => report.missing.push(EnvMissing {
                        id: window.id,
                        app_id: window.app_id.clone(),
                        pid: window.pid,
                    }),
                    None => report.unreadable += 1,
                },
                None => report.unreadable += 1,
            }
        }
        report
    }

    // ------------------------------------------------------------------
    // Layout capture / restore
    // ------------------------------------------------------------------

    fn capture_layout(&mut self, id: u64, name: &str) -> Response {
        let Some(path) = self.layout_path(name) else {
            return Response::error(id, ErrorCode::Protocol, "invalid layout name");
        };
        let snapshot = layout::capture(name, &self.state, now_secs(), |window| {
            window.pid.and_then(process_command_line)
        });
        let placeholders: usize = snapshot.workspaces.iter().map(|w| w.windows.len()).sum();
        let manual = snapshot
            .workspaces
            .iter()
            .flat_map(|w| &w.windows)
            .filter(|p| p.command.is_none())
            .count();

        if let Err(write_error) = write_json(&path, &snapshot) {
            return Response::error(id, ErrorCode::Internal, write_error.to_string());
        }
        info!("Captured layout '{name}' ({placeholders} placeholders) to {}", path.display());
        Response::ok(
            id,
            &CaptureResult {
                name: name.to_string(),
                workspaces: snapshot.workspaces.len(),
                placeholders,
                manual,
                path,
            },
        )
    }

    fn start_restore(&mut self, id: u64, name: String, responder: oneshot::Sender<Response>) {
        if self.restore.is_some() {
            let _ = responder.send(Response::error(
                id,
                ErrorCode::RestoreBusy,
                "a restore is already in flight",
            ));
            return;
        }
        if !self.wm_connected {
            let _ = responder.send(Response::error(
                id,
                ErrorCode::WmUnavailable,
                "window manager is not connected",
            ));
            return;
        }
        let Some(path) = self.layout_path(&name) else {
            let _ = responder.send(Response::error(
                id,
                ErrorCode::Protocol,
                "invalid layout name",
            ));
            return;
        };
        let Some(snapshot) = load_json::<LayoutSnapshot>(&path) else {
            let _ = responder.send(Response::error(
                id,
                ErrorCode::NotFound,
                format!("no layout named '{name}'"),
            ));
            return;
        };

        let targets = layout::plan_restore(&snapshot, &self.state.active_monitors());
        let mut session = RestoreSession::prepare(name.clone(), id, responder, targets);

        let deadline = tokio::time::Instant::now()
            + Duration::from_secs(self.config.restore.correlation_timeout_secs);
        let mut launched_count = 0;
        for index in session.pending_indices() {
            let project_dir = session
                .target(index)
                .placeholder
                .project
                .as_deref()
                .and_then(|project| self.state.project(project))
                .map(|project| project.directory);
            let launched = restore::launch(session.target(index), &name, project_dir.as_deref());
            match launched {
                Ok(()) => {
                    session.mark_launched(index, deadline);
                    launched_count += 1;
                }
                Err(spawn_error) => {
                    warn!(
                        "Failed to launch '{}': {spawn_error}",
                        session.target(index).placeholder.expected_class
                    );
                    session.mark_failed(index);
                }
            }
        }

        info!("Restoring layout '{name}': {launched_count} placeholders launched");
        self.restore = Some(session);
        self.finish_restore_if_complete();
    }

    fn cancel_restore(&mut self, id: u64) -> Response {
        match self.restore.as_mut() {
            Some(session) => {
                // launched processes are left running, nothing further is
                // processed
                session.cancel();
                self.finish_restore_if_complete();
                Response::ok(id, &serde_json::json!({"cancelled": true}))
            }
            None => Response::error(id, ErrorCode::NoRestore, "no restore in flight"),
        }
    }

    fn try_swallow(&mut self, window: &WindowRecord) {
        let Some(session) = self.restore.as_mut() else {
            return;
        };
        let Some((index, spec)) = session.correlate(window) else {
            return;
        };
        let wm = self.wm.clone();
        let event_tx = self.event_tx.clone();
        tokio::spawn(async move {
            let placed = restore::place_window(wm.as_ref(), &spec).await;
            if let Err(ref place_error) = placed {
                warn!("Placement of window {} failed: {place_error}", spec.window);
            }
            let _ = event_tx
                .send(DaemonEvent::PlacementDone {
                    index,
                    window: spec.window,
                    positioned: placed.is_ok(),
                })
                .await;
        });
    }

    fn restore_deadline(&self) -> Option<tokio::time::Instant> {
        self.restore.as_ref().and_then(|session| session.next_deadline())
    }

    fn expire_restore(&mut self) {
        if let Some(session) = self.restore.as_mut() {
            session.expire(tokio::time::Instant::now());
        }
        self.finish_restore_if_complete();
    }

    fn finish_restore_if_complete(&mut self) {
        let complete = self
            .restore
            .as_ref()
            .is_some_and(|session| session.is_complete());
        if !complete {
            return;
        }
        let mut session = self.restore.take().expect("checked above");
        let report = session.report();
        info!(
            "Restore '{}' finished: {} placed, {} timed out, {} skipped{}",
            report.name,
            report.placed,
            report.timed_out,
            report.skipped,
            if report.cancelled { " (cancelled)" } else { "" }
        );
        if let Some(responder) = session.take_responder() {
            let _ = responder.send(Response::ok(session.request_id, &report));
        }
    }

    fn layout_path(&self, name: &str) -> Option<PathBuf> {
        layout_file_name(name).map(|file| self.state_dir.join(LAYOUTS_DIR).join(file))
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    fn checkpoint_to_disk(&mut self) {
        self.buffer.prune(now_ms());
        if let Err(write_error) =
            write_json(&self.state_dir.join(STATE_FILE), &self.state.checkpoint(now_secs()))
        {
            warn!("Failed to write state checkpoint: {write_error}");
        }
        if let Err(write_error) =
            write_json(&self.state_dir.join(EVENTS_FILE), &self.buffer.snapshot())
        {
            warn!("Failed to write event log: {write_error}");
        }
    }

    fn shutdown(&mut self) {
        if self.config.projects.iter().any(|p| p.auto_save) && self.state.window_count() > 0 {
            let response = self.capture_layout(0, AUTOSAVE_LAYOUT);
            if response.error.is_some() {
                warn!("Autosave capture failed on shutdown");
            }
        }
        self.checkpoint_to_disk();
        // subscribers learn about the shutdown by their sinks closing
        self.subscribers.clear();
        info!("State persisted, daemon stopping");
    }
}

const STATE_FILE: &str = "state.json";
const EVENTS_FILE: &str = "events.json";
const LAYOUTS_DIR: &str = "layouts";
const AUTOSAVE_LAYOUT: &str = "autosave";

/// Run the daemon against a transport, binding the configured socket.
pub async fn run(config: Config, transport: Arc<dyn WmTransport>) -> Result<()> {
    let socket_path = config.socket_path();
    let listener = server::bind_socket(&socket_path).await?;
    info!("Listening on {}", socket_path.display());
    let result = run_with_listener(config, transport, listener).await;
    let _ = std::fs::remove_file(&socket_path);
    result
}

/// Run the daemon loop with an already-bound listener.
pub async fn run_with_listener(
    config: Config,
    transport: Arc<dyn WmTransport>,
    listener: tokio::net::UnixListener,
) -> Result<()> {
    let (event_tx, mut event_rx) = mpsc::channel::<DaemonEvent>(256);
    let (reconnect_tx, reconnect_rx) = mpsc::channel::<()>(1);
    let (supervisor_tx, mut supervisor_rx) = mpsc::channel::<SupervisorEvent>(256);

    let allowed_uids = Arc::new(allowed_uids(&config)?);
    tokio::spawn(server::run(listener, event_tx.clone(), allowed_uids));

    let supervisor = ConnectionSupervisor::new(
        transport.clone(),
        BackoffPolicy {
            base_secs: config.wm.backoff_base_secs,
            cap_secs: config.wm.backoff_cap_secs,
        },
        supervisor_tx,
        reconnect_rx,
    );
    tokio::spawn(supervisor.run());

    // Forward supervisor events into the single daemon channel.
    {
        let event_tx = event_tx.clone();
        tokio::spawn(async move {
            while let Some(supervisor_event) = supervisor_rx.recv().await {
                if event_tx.send(DaemonEvent::Wm(supervisor_event)).await.is_err() {
                    break;
                }
            }
        });
    }

    // SIGINT/SIGTERM trigger the same clean shutdown as the `stop` method.
    {
        let event_tx = event_tx.clone();
        tokio::spawn(async move {
            use tokio::signal::unix::{signal, SignalKind};
            let (Ok(mut interrupt), Ok(mut terminate)) = (
                signal(SignalKind::interrupt()),
                signal(SignalKind::terminate()),
            ) else {
                warn!("Failed to install signal handlers");
                return;
            };
            tokio::select! {
                _ = interrupt.recv() => info!("Received SIGINT, shutting down"),
                _ = terminate.recv() => info!("Received SIGTERM, shutting down"),
            }
            let _ = event_tx.send(DaemonEvent::Shutdown).await;
        });
    }

    let mut daemon = Daemon::new(config, transport, event_tx, reconnect_tx)?;

    let mut checkpoint_timer = tokio::time::interval(Duration::from_secs(
        daemon.config.daemon.checkpoint_interval_secs.max(1),
    ));
    checkpoint_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut validate_timer = tokio::time::interval(Duration::from_secs(
        daemon.config.daemon.validate_interval_secs.max(1),
    ));
    validate_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // both fire immediately on the first tick; consume those
    checkpoint_timer.tick().await;
    validate_timer.tick().await;

    loop {
        let restore_deadline = daemon.restore_deadline();
        tokio::select! {
            maybe_event = event_rx.recv() => match maybe_event {
                Some(event) => {
                    if matches!(daemon.handle_event(event), Flow::Shutdown) {
                        break;
                    }
                }
                None => break,
            },
            _ = checkpoint_timer.tick() => daemon.checkpoint_to_disk(),
            _ = validate_timer.tick() => daemon.spawn_tree_fetch(None),
            _ = async { tokio::time::sleep_until(restore_deadline.expect("guarded")).await },
                if restore_deadline.is_some() => daemon.expire_restore(),
        }
    }

    daemon.shutdown();
    Ok(())
}

/// Peer UIDs accepted on the client socket: the daemon's own user plus any
/// configured extras.
fn allowed_uids(config: &Config) -> Result<HashSet<u32>> {
    let mut uids: HashSet<u32> = config.daemon.allowed_uids.iter().copied().collect();
    uids.insert(current_uid()?);
    Ok(uids)
}

fn current_uid() -> Result<u32> {
    use std::os::unix::fs::MetadataExt;
    Ok(std::fs::metadata("/proc/self")
        .context("failed to determine own uid")?
        .uid())
}

/// Validate a layout name and map it to a file name. Names are slugs with
/// an optional single `project/` prefix.
fn layout_file_name(name: &str) -> Option<PathBuf> {
    if name.is_empty() || name.len() > 128 {
        return None;
    }
    if name.matches('/').count() > 1 {
        return None;
    }
    let valid = name.split('/').all(|part| {
        !part.is_empty()
            && part
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_'))
    });
    valid.then(|| PathBuf::from(format!("{name}.json")))
}

/// Recover a process's launch command from its command line.
fn process_command_line(pid: i32) -> Option<Vec<String>> {
    let raw = std::fs::read(format!("/proc/{pid}/cmdline")).ok()?;
    let argv: Vec<String> = raw
        .split(|byte| *byte == 0)
        .filter(|part| !part.is_empty())
        .map(|part| String::from_utf8_lossy(part).into_owned())
        .collect();
    (!argv.is_empty()).then_some(argv)
}

/// Whether a process carries an environment variable. `None` when the
/// environment cannot be read.
fn process_has_env(pid: i32, name: &str) -> Option<bool> {
    let raw = std::fs::read(format!("/proc/{pid}/environ")).ok()?;
    let prefix = format!("{name}=").into_bytes();
    Some(
        raw.split(|byte| *byte == 0)
            .any(|entry| entry.starts_with(&prefix)),
    )
}

/// Load a JSON file, treating a missing or corrupt file as absent. Corrupt
/// persisted state is discarded with a warning, never an abort.
fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(read_error) if read_error.kind() == std::io::ErrorKind::NotFound => return None,
        Err(read_error) => {
            warn!("Failed to read {}: {read_error}", path.display());
            return None;
        }
    };
    match serde_json::from_str(&content) {
        Ok(value) => Some(value),
        Err(parse_error) => {
            warn!(
                "Discarding corrupt state file {}: {parse_error}",
                path.display()
            );
            None
        }
    }
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)?;
    Ok(())
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_names_are_slugs_with_one_optional_prefix() {
        assert_eq!(
            layout_file_name("main"),
            Some(PathBuf::from("main.json"))
        );
        assert_eq!(
            layout_file_name("dev/main-2"),
            Some(PathBuf::from("dev/main-2.json"))
        );
        assert_eq!(layout_file_name(""), None);
        assert_eq!(layout_file_name("a/b/c"), None);
        assert_eq!(layout_file_name("../etc"), None);
        assert_eq!(layout_file_name("Has Spaces"), None);
        assert_eq!(layout_file_name("/absolute"), None);
        assert_eq!(layout_file_name("trailing/"), None);
    }

    #[test]
    fn own_process_command_line_is_recoverable() {
        let argv = process_command_line(std::process::id() as i32).expect("own cmdline");
        assert!(!argv.is_empty());
    }

    #[test]
    fn own_process_env_is_readable() {
        let pid = std::process::id() as i32;
        assert_eq!(process_has_env(pid, "PATH"), Some(true));
        assert_eq!(
            process_has_env(pid, "WORKSCOPE_DEFINITELY_UNSET_VARIABLE"),
            Some(false)
        );
        // a pid that cannot exist
        assert_eq!(process_has_env(-1, "PATH"), None);
    }

    #[test]
    fn corrupt_json_is_treated_as_absent() {
        let path = std::env::temp_dir().join(format!(
            "workscope-daemon-test-corrupt-{}.json",
            std::process::id()
        ));
        std::fs::write(&path, "{not json").unwrap();
        let loaded: Option<StateCheckpoint> = load_json(&path);
        assert!(loaded.is_none());
        let _ = std::fs::remove_file(&path);
    }
}
