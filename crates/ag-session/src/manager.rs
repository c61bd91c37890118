use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use ag_bus::EventBus;
use ag_git::GitTracker;
use ag_memory::{build_run_memory_entry, build_session_snapshot};
use ag_process::{InteractiveController, ProcessController};
use ag_types::{
    Event, EventKind, GitSnapshot, GitSnapshotPayload, InterventionPayload, Payload, Run, RunStatus, Session,
    SessionStatus,
};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use uuid::Uuid;

use crate::{Error, Result};

#[derive(Clone)]
struct ActiveRun {
    controller: Arc<AsyncMutex<ProcessController>>,
    git_tracker: Arc<AsyncMutex<GitTracker>>,
}

#[derive(Clone)]
struct ActiveInteractive {
    controller: Arc<AsyncMutex<InteractiveController>>,
    git_tracker: Arc<AsyncMutex<GitTracker>>,
    responding: Arc<AtomicBool>,
}

/// Ties a run's `ProcessController`/`InteractiveController`, its
/// `GitTracker`, and the event bus together into the run lifecycle:
/// creation, streaming, pause/resume/abort, branching, and — for
/// interactive sessions — the multi-turn loop and end-of-session memory
/// extraction.
///
/// Every field is an `Arc`, so cloning a `SessionManager` shares the same
/// active-run registries; this is how a background streaming task and the
/// handle the caller holds both see the same controller.
#[derive(Clone)]
pub struct SessionManager {
    bus: Arc<EventBus>,
    active_runs: Arc<Mutex<HashMap<Uuid, ActiveRun>>>,
    interactive: Arc<Mutex<HashMap<Uuid, ActiveInteractive>>>,
}

impl SessionManager {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            active_runs: Arc::new(Mutex::new(HashMap::new())),
            interactive: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Reuses the active session already bound to `working_dir`, if any;
    /// otherwise creates a fresh one.
    pub fn get_or_create_session(&self, working_dir: &str, name: Option<String>) -> Result<Session> {
        let existing = self.bus.with_store(|store| store.get_session_by_working_dir(working_dir))?;
        if let Some(session) = existing {
            if session.status == SessionStatus::Active {
                return Ok(session);
            }
        }
        let session = Session::new(working_dir, name);
        self.bus.with_store(|store| store.create_session(&session))?;
        Ok(session)
    }

    /// Creates the run row, takes and publishes the run's opening git
    /// snapshot, and registers a not-yet-started `ProcessController`.
    /// `stream_events` is what actually spawns the child process.
    pub async fn start_run(
        &self,
        session_id: Uuid,
        prompt: &str,
        model: &str,
        parent_run_id: Option<Uuid>,
        branch_point_event_id: Option<Uuid>,
    ) -> Result<Run> {
        let session =
            self.bus.with_store(|store| store.get_session(session_id))?.ok_or(Error::SessionNotFound(session_id))?;

        let mut run = Run::new(session.id, prompt, model);
        if let (Some(parent), Some(branch_point)) = (parent_run_id, branch_point_event_id) {
            run = run.branch_of(parent, branch_point);
        }
        self.bus.with_store(|store| store.create_run(&run))?;

        let working_dir = PathBuf::from(&session.working_dir);
        let mut git_tracker = GitTracker::new(working_dir.clone(), run.id);
        let snapshot = git_tracker.snapshot().await;
        self.publish_git_snapshot(&session, &run, &snapshot)?;

        let controller = ProcessController::new(session.id, run.id, working_dir, model);
        self.active_runs.lock().unwrap().insert(
            run.id,
            ActiveRun { controller: Arc::new(AsyncMutex::new(controller)), git_tracker: Arc::new(AsyncMutex::new(git_tracker)) },
        );

        run.status = RunStatus::Running;
        self.bus.with_store(|store| store.update_run_status(run.id, RunStatus::Running, None))?;
        Ok(run)
    }

    /// Spawns the child process for `run_id` and returns a channel of every
    /// event it produces, already published. On tool-result events a fresh
    /// git snapshot is taken, persisted, published, and forwarded alongside
    /// the triggering event. Token usage from `result` events accumulates
    /// into the run; on the child exiting, duration and terminal status are
    /// recorded and the run is dropped from the active-run registry.
    pub async fn stream_events(&self, run_id: Uuid) -> Result<mpsc::Receiver<Event>> {
        let run = self.bus.with_store(|store| store.get_run(run_id))?.ok_or(Error::RunNotFound(run_id))?;
        let active = self.lookup_active_run(run_id)?;

        let mut inner_rx = {
            let mut controller = active.controller.lock().await;
            controller.start(&run.prompt).await?
        };

        let (out_tx, out_rx) = mpsc::channel::<Event>(256);
        let bus = self.bus.clone();
        let active_runs = self.active_runs.clone();
        let controller = active.controller.clone();
        let git_tracker = active.git_tracker.clone();
        let session_id = run.session_id;

        tokio::spawn(async move {
            let started_at = Instant::now();
            let mut failure_message: Option<String> = None;

            while let Some(event) = inner_rx.recv().await {
                let published = match bus.publish(event) {
                    Ok(published) => published,
                    Err(e) => {
                        tracing::error!(run_id = %run_id, error = %e, "failed to publish run event");
                        continue;
                    }
                };

                let (tokens_in, tokens_out) = published.result_usage();
                if tokens_in > 0 || tokens_out > 0 {
                    let _ = bus.with_store(|store| store.update_run_metrics(run_id, tokens_in, tokens_out));
                }
                if published.kind == EventKind::RunFailed {
                    failure_message = extract_stderr(&published);
                }

                let mut snapshot_event = None;
                if published.kind == EventKind::StreamToolResult {
                    let mut tracker = git_tracker.lock().await;
                    let snapshot = tracker.snapshot().await;
                    drop(tracker);
                    let _ = bus.with_store(|store| store.create_git_snapshot(&snapshot));
                    let payload = snapshot_payload(&snapshot);
                    match bus.publish(Event::new(session_id, run_id, EventKind::GitSnapshot, Payload::GitSnapshot(payload))) {
                        Ok(event) => snapshot_event = Some(event),
                        Err(e) => tracing::error!(run_id = %run_id, error = %e, "failed to publish git snapshot"),
                    }
                }

                if out_tx.send(published).await.is_err() {
                    controller.lock().await.terminate();
                    break;
                }
                if let Some(snapshot_event) = snapshot_event {
                    if out_tx.send(snapshot_event).await.is_err() {
                        controller.lock().await.terminate();
                        break;
                    }
                }
            }

            let duration_ms = started_at.elapsed().as_millis() as u64;
            let _ = bus.with_store(|store| store.update_run_duration(run_id, duration_ms));
            let _ = match &failure_message {
                Some(message) => bus.with_store(|store| store.update_run_status(run_id, RunStatus::Failed, Some(message))),
                None => bus.with_store(|store| store.update_run_status(run_id, RunStatus::Completed, None)),
            };
            active_runs.lock().unwrap().remove(&run_id);
        });

        Ok(out_rx)
    }

    pub async fn pause_run(&self, run_id: Uuid) -> Result<bool> {
        let active = self.lookup_active_run(run_id)?;
        active.controller.lock().await.pause();
        self.bus.with_store(|store| store.update_run_status(run_id, RunStatus::Paused, None))?;
        self.publish_intervention(run_id, EventKind::InterventionPause, "pause", serde_json::Value::Null)?;
        Ok(true)
    }

    pub async fn resume_run(&self, run_id: Uuid) -> Result<bool> {
        let active = self.lookup_active_run(run_id)?;
        active.controller.lock().await.resume();
        self.bus.with_store(|store| store.update_run_status(run_id, RunStatus::Running, None))?;
        self.publish_intervention(run_id, EventKind::InterventionResume, "resume", serde_json::Value::Null)?;
        Ok(true)
    }

    pub async fn inject_message(&self, run_id: Uuid, message: &str) -> Result<bool> {
        let active = self.lookup_active_run(run_id)?;
        active.controller.lock().await.inject_input(message);
        self.publish_intervention(
            run_id,
            EventKind::InterventionInject,
            "inject",
            serde_json::json!({"message": message}),
        )?;
        Ok(true)
    }

    /// Terminates the controller and marks the run failed with an
    /// "aborted by user" message — there is no distinct terminal status
    /// for a user-requested stop, so abort reuses the failed state, the
    /// same way a paused run can only reach a terminal state through abort.
    pub async fn abort_run(&self, run_id: Uuid) -> Result<bool> {
        let active = self.lookup_active_run(run_id)?;
        active.controller.lock().await.terminate();
        self.bus.with_store(|store| store.update_run_status(run_id, RunStatus::Failed, Some("aborted by user")))?;
        self.publish_intervention(run_id, EventKind::InterventionAbort, "abort", serde_json::Value::Null)?;
        self.active_runs.lock().unwrap().remove(&run_id);
        Ok(true)
    }

    /// Validates the original run and the branch-point event both exist
    /// before touching any state, then starts a fresh run carrying
    /// `parent_run_id`/`branch_point_event_id` and the modified-or-original
    /// prompt.
    pub async fn branch_run(&self, run_id: Uuid, from_event_id: Uuid, modified_prompt: Option<&str>) -> Result<Run> {
        let original = self.bus.with_store(|store| store.get_run(run_id))?.ok_or(Error::RunNotFound(run_id))?;
        let branch_point =
            self.bus.with_store(|store| store.get_event(from_event_id))?.ok_or(Error::EventNotFound(from_event_id))?;

        let prompt = modified_prompt.unwrap_or(&original.prompt).to_string();
        let branched =
            self.start_run(original.session_id, &prompt, &original.model, Some(run_id), Some(branch_point.id)).await?;

        self.bus.publish(Event::new(
            original.session_id,
            branched.id,
            EventKind::RunBranched,
            Payload::Generic(serde_json::json!({
                "parent_run_id": run_id,
                "branch_point_event_id": from_event_id,
            })),
        ))?;

        Ok(branched)
    }

    pub fn get_run_status(&self, run_id: Uuid) -> Result<Run> {
        self.bus.with_store(|store| store.get_run(run_id))?.ok_or(Error::RunNotFound(run_id))
    }

    pub fn get_active_runs(&self) -> Vec<Uuid> {
        self.active_runs.lock().unwrap().keys().copied().collect()
    }

    /// Creates an interactive run, takes its opening git snapshot, and
    /// initializes the `InteractiveController` (which marks the session
    /// live without spawning a process — the first `send_interactive_message`
    /// does that).
    pub async fn start_interactive_session(&self, session_id: Uuid, model: &str) -> Result<Run> {
        let session =
            self.bus.with_store(|store| store.get_session(session_id))?.ok_or(Error::SessionNotFound(session_id))?;

        let mut run = Run::new(session.id, "[Interactive Session]", model);
        run.is_interactive = true;
        self.bus.with_store(|store| store.create_run(&run))?;

        let working_dir = PathBuf::from(&session.working_dir);
        let mut git_tracker = GitTracker::new(working_dir.clone(), run.id);
        let snapshot = git_tracker.snapshot().await;
        self.publish_git_snapshot(&session, &run, &snapshot)?;

        let mut controller = InteractiveController::new(session.id, run.id, working_dir, model);
        let started_event = controller.initialize();
        self.bus.publish(started_event)?;

        self.interactive.lock().unwrap().insert(
            run.id,
            ActiveInteractive {
                controller: Arc::new(AsyncMutex::new(controller)),
                git_tracker: Arc::new(AsyncMutex::new(git_tracker)),
                responding: Arc::new(AtomicBool::new(false)),
            },
        );

        run.status = RunStatus::Running;
        self.bus.with_store(|store| store.update_run_status(run.id, RunStatus::Running, None))?;
        Ok(run)
    }

    /// Records `message` as the run's latest prompt (deriving a title from
    /// it on the first turn), then spawns one turn of the interactive
    /// controller in the background: every event it produces is published,
    /// token usage accumulates, and a tool-result still triggers a fresh
    /// git snapshot exactly like a one-shot run.
    pub async fn send_interactive_message(&self, run_id: Uuid, message: &str) -> Result<bool> {
        let active = {
            let interactive = self.interactive.lock().unwrap();
            interactive.get(&run_id).cloned()
        }
        .ok_or(Error::InteractiveNotActive(run_id))?;

        let run = self.bus.with_store(|store| store.get_run(run_id))?.ok_or(Error::RunNotFound(run_id))?;
        self.bus.with_store(|store| store.update_run_prompt(run_id, message))?;
        if run.title.is_none() {
            let title = Run::title_from_message(message);
            self.bus.with_store(|store| store.update_run_title(run_id, &title))?;
        }

        let mut inner_rx = {
            let mut controller = active.controller.lock().await;
            controller.send_message(message).await?
        };

        active.responding.store(true, Ordering::SeqCst);
        let bus = self.bus.clone();
        let responding = active.responding.clone();
        let git_tracker = active.git_tracker.clone();
        let session_id = run.session_id;

        tokio::spawn(async move {
            while let Some(event) = inner_rx.recv().await {
                let published = match bus.publish(event) {
                    Ok(published) => published,
                    Err(e) => {
                        tracing::warn!(run_id = %run_id, error = %e, "failed to publish interactive event");
                        continue;
                    }
                };

                let (tokens_in, tokens_out) = published.result_usage();
                if tokens_in > 0 || tokens_out > 0 {
                    let _ = bus.with_store(|store| store.update_run_metrics(run_id, tokens_in, tokens_out));
                }
                if published.kind == EventKind::StreamToolResult {
                    let mut tracker = git_tracker.lock().await;
                    let snapshot = tracker.snapshot().await;
                    drop(tracker);
                    let _ = bus.with_store(|store| store.create_git_snapshot(&snapshot));
                    let payload = snapshot_payload(&snapshot);
                    let _ =
                        bus.publish(Event::new(session_id, run_id, EventKind::GitSnapshot, Payload::GitSnapshot(payload)));
                }
            }
            responding.store(false, Ordering::SeqCst);
        });

        Ok(true)
    }

    /// Ends the interactive session: terminates the controller, marks the
    /// run completed, extracts its run memory, and — if the session has no
    /// resume snapshot yet — persists one from the same event log.
    pub async fn end_interactive_session(&self, run_id: Uuid) -> Result<bool> {
        let active = self.interactive.lock().unwrap().remove(&run_id);
        let Some(active) = active else {
            return Ok(false);
        };

        active.controller.lock().await.terminate().await;
        self.bus.with_store(|store| store.update_run_status(run_id, RunStatus::Completed, None))?;

        let run = self.bus.with_store(|store| store.get_run(run_id))?.ok_or(Error::RunNotFound(run_id))?;
        let events = self.bus.with_store(|store| store.get_events_for_run(run_id, 0))?;

        let memory_entry = build_run_memory_entry(&run, &events);
        self.bus.with_store(|store| store.upsert_run_memory(&memory_entry))?;

        let has_snapshot = self.bus.with_store(|store| store.get_latest_session_snapshot(run.session_id))?.is_some();
        if !has_snapshot {
            let snapshot = build_session_snapshot(&run, &events);
            self.bus.with_store(|store| store.create_session_snapshot(&snapshot))?;
        }

        Ok(true)
    }

    pub fn has_interactive_session(&self, run_id: Uuid) -> bool {
        self.interactive.lock().unwrap().contains_key(&run_id)
    }

    /// True while a turn's background task is still draining its channel,
    /// or — as a fallback for the moment between `send_message` returning
    /// and the background task's first observed event — while the
    /// controller still reports a live child pid.
    pub async fn is_interactive_responding(&self, run_id: Uuid) -> bool {
        let active = {
            let interactive = self.interactive.lock().unwrap();
            interactive.get(&run_id).cloned()
        };
        let Some(active) = active else {
            return false;
        };
        if active.responding.load(Ordering::SeqCst) {
            return true;
        }
        active.controller.lock().await.pid().is_some()
    }

    /// Interrupts only the in-flight turn; the session stays live for the
    /// next message. Publishes an `intervention.abort` scoped to `"turn"`.
    pub async fn stop_interactive_response(&self, run_id: Uuid) -> Result<bool> {
        let active = {
            let interactive = self.interactive.lock().unwrap();
            interactive.get(&run_id).cloned()
        }
        .ok_or(Error::InteractiveNotActive(run_id))?;

        let stopped = active.controller.lock().await.interrupt_current_response().await;
        active.responding.store(false, Ordering::SeqCst);

        self.publish_intervention(run_id, EventKind::InterventionAbort, "abort", serde_json::json!({"scope": "turn"}))?;

        Ok(stopped)
    }

    pub fn get_active_interactive_sessions(&self) -> Vec<Uuid> {
        self.interactive.lock().unwrap().keys().copied().collect()
    }

    fn lookup_active_run(&self, run_id: Uuid) -> Result<ActiveRun> {
        self.active_runs.lock().unwrap().get(&run_id).cloned().ok_or(Error::RunNotActive(run_id))
    }

    fn publish_intervention(
        &self,
        run_id: Uuid,
        kind: EventKind,
        intervention_type: &str,
        input_data: serde_json::Value,
    ) -> Result<()> {
        let run = self.bus.with_store(|store| store.get_run(run_id))?.ok_or(Error::RunNotFound(run_id))?;
        let payload = InterventionPayload { intervention_type: intervention_type.to_string(), input_data, result: None };
        self.bus.publish(Event::new(run.session_id, run_id, kind, Payload::Intervention(payload)))?;
        Ok(())
    }

    fn publish_git_snapshot(&self, session: &Session, run: &Run, snapshot: &GitSnapshot) -> Result<()> {
        self.bus.with_store(|store| store.create_git_snapshot(snapshot))?;
        let payload = snapshot_payload(snapshot);
        self.bus.publish(Event::new(session.id, run.id, EventKind::GitSnapshot, Payload::GitSnapshot(payload)))?;
        Ok(())
    }
}

fn snapshot_payload(snapshot: &GitSnapshot) -> GitSnapshotPayload {
    GitSnapshotPayload {
        commit_hash: snapshot.commit_hash.clone(),
        branch: snapshot.branch.clone(),
        dirty_files: snapshot.dirty_files.clone(),
        staged_files: snapshot.staged_files.clone(),
        untracked_files: snapshot.untracked_files.clone(),
        diff_stat: snapshot.diff_stat.clone(),
        is_git_repo: snapshot.is_git_repo,
    }
}

fn extract_stderr(event: &Event) -> Option<String> {
    if event.kind != EventKind::RunFailed {
        return None;
    }
    let Payload::Generic(value) = &event.payload else {
        return None;
    };
    value.get("stderr").and_then(serde_json::Value::as_str).map(str::to_string)
}
