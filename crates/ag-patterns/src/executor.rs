use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use ag_bus::EventBus;
use ag_cache::ResultCache;
use ag_memory::build_run_memory_entry;
use ag_types::{AgentPattern, Event, EventKind, InterventionPayload, Payload, PatternType, Run, RunStatus};
use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::patterns;
use crate::runner::AgentContext;
use crate::{Error, Result};

struct ExecutionInner {
    pattern_name: String,
    pattern_type: PatternType,
    current_iteration: u32,
    results_count: usize,
    awaiting_human: bool,
    checkpoint: Option<oneshot::Sender<String>>,
}

/// Shared, cloneable view onto one in-flight pattern execution's state.
/// `execute_pattern`'s background task owns one of these, the
/// introspection and `provide_human_input` accessors on `PatternExecutor`
/// reach the same state through the `active` registry.
#[derive(Clone)]
pub(crate) struct ExecutionHandle {
    inner: Arc<Mutex<ExecutionInner>>,
}

/// Read-only view of a running pattern execution, returned by
/// `get_execution_state`/`list_active_executions`.
#[derive(Debug, Clone)]
pub struct ExecutionSnapshot {
    pub run_id: Uuid,
    pub pattern_name: String,
    pub pattern_type: PatternType,
    pub current_iteration: u32,
    pub results_count: usize,
    pub awaiting_human: bool,
}

impl ExecutionHandle {
    fn new(pattern_name: String, pattern_type: PatternType) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ExecutionInner {
                pattern_name,
                pattern_type,
                current_iteration: 0,
                results_count: 0,
                awaiting_human: false,
                checkpoint: None,
            })),
        }
    }

    pub(crate) fn set_iteration(&self, iteration: u32) {
        self.inner.lock().unwrap().current_iteration = iteration;
    }

    pub(crate) fn record_result(&self) {
        self.inner.lock().unwrap().results_count += 1;
    }

    fn iteration(&self) -> u32 {
        self.inner.lock().unwrap().current_iteration
    }

    fn results_count(&self) -> usize {
        self.inner.lock().unwrap().results_count
    }

    fn snapshot(&self, run_id: Uuid) -> ExecutionSnapshot {
        let inner = self.inner.lock().unwrap();
        ExecutionSnapshot {
            run_id,
            pattern_name: inner.pattern_name.clone(),
            pattern_type: inner.pattern_type,
            current_iteration: inner.current_iteration,
            results_count: inner.results_count,
            awaiting_human: inner.awaiting_human,
        }
    }

    /// Publishes an `intervention.pause` checkpoint and blocks until
    /// `provide_human_input` resolves it. Grounded on the loop pattern's
    /// `on_checkpoint` callback in the original executor, reshaped as a
    /// registry lookup plus a one-shot channel instead of a passed-in
    /// async callback, since nothing else in this crate needs the callback
    /// indirection.
    pub(crate) async fn await_checkpoint(&self, ctx: &AgentContext<'_>, iteration: u32, previous_output: &str) -> Result<String> {
        let (tx, rx) = oneshot::channel();
        {
            let mut inner = self.inner.lock().unwrap();
            inner.awaiting_human = true;
            inner.checkpoint = Some(tx);
        }

        let preview: String = previous_output.chars().take(500).collect();
        let payload = InterventionPayload {
            intervention_type: "checkpoint".to_string(),
            input_data: json!({
                "checkpoint": "iteration_start",
                "iteration": iteration,
                "previous_output": preview,
                "options": ["continue", "modify", "stop"],
            }),
            result: None,
        };
        let event = Event::new(ctx.session_id, ctx.run_id, EventKind::InterventionPause, Payload::Intervention(payload));
        let published = ctx.bus.publish(event)?;
        let _ = ctx.out_tx.send(published).await;

        let decision = rx.await.unwrap_or_else(|_| "continue".to_string());
        self.inner.lock().unwrap().awaiting_human = false;
        Ok(decision)
    }

    /// Resolves a pending checkpoint. Returns `false` if this execution
    /// isn't actually waiting on one (already resolved, or never reached
    /// one).
    fn resolve(&self, decision: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if !inner.awaiting_human {
            return false;
        }
        inner.awaiting_human = false;
        match inner.checkpoint.take() {
            Some(tx) => tx.send(decision.to_string()).is_ok(),
            None => false,
        }
    }
}

/// Runs saved `AgentPattern`s — solo/loop/panel/debate — against a session,
/// folding every inner agent's events into one parent run. Grounded on
/// `AgentExecutor` in the original, with the `on_checkpoint` callback and
/// `_active_executions`/`_human_response_events` dicts replaced by
/// `ExecutionHandle`'s shared state and a one-shot channel per checkpoint.
#[derive(Clone)]
pub struct PatternExecutor {
    bus: Arc<EventBus>,
    cache: Option<Arc<ResultCache>>,
    max_agent_tokens: Option<u64>,
    active: Arc<Mutex<HashMap<Uuid, ExecutionHandle>>>,
}

impl PatternExecutor {
    pub fn new(bus: Arc<EventBus>, cache: Option<Arc<ResultCache>>) -> Self {
        Self::with_token_limit(bus, cache, None)
    }

    /// `max_agent_tokens` caps the combined input+output tokens a single
    /// agent invocation may accumulate before `run_agent` aborts it; `None`
    /// leaves it unbounded.
    pub fn with_token_limit(bus: Arc<EventBus>, cache: Option<Arc<ResultCache>>, max_agent_tokens: Option<u64>) -> Self {
        Self { bus, cache, max_agent_tokens, active: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// Creates the parent run, registers its execution state, and spawns
    /// the pattern body in the background — same persist-before-forward
    /// discipline as `ag_session::SessionManager::stream_events`: every
    /// event is published (sequenced and stored) before being sent on the
    /// returned channel.
    pub async fn execute_pattern(
        &self,
        pattern: AgentPattern,
        session_id: Uuid,
        input_text: String,
        working_dir: String,
    ) -> Result<mpsc::Receiver<Event>> {
        let session = self.bus.with_store(|store| store.get_session(session_id))?.ok_or(Error::SessionNotFound(session_id))?;

        let prompt = format!("[Agent Pattern: {}] {}", pattern.name, truncate_chars(&input_text, 100));
        let run = Run::new(session.id, prompt, "sonnet");
        self.bus.with_store(|store| store.create_run(&run))?;
        self.bus.with_store(|store| store.update_run_status(run.id, RunStatus::Running, None))?;

        let handle = ExecutionHandle::new(pattern.name.clone(), pattern.pattern_type);
        self.active.lock().unwrap().insert(run.id, handle.clone());

        let (out_tx, out_rx) = mpsc::channel::<Event>(256);
        let bus = self.bus.clone();
        let cache = self.cache.clone();
        let active = self.active.clone();
        let max_agent_tokens = self.max_agent_tokens;
        let run_id = run.id;
        let session_id = session.id;

        tokio::spawn(async move {
            let started_at = Instant::now();

            let start_event =
                Event::new(session_id, run_id, EventKind::RunStarted, patterns::pattern_start_payload(&pattern));
            let outcome = match bus.publish(start_event) {
                Ok(published) => {
                    let _ = out_tx.send(published).await;
                    let ctx = AgentContext {
                        bus: &bus,
                        cache: cache.as_deref(),
                        session_id,
                        run_id,
                        working_dir: &working_dir,
                        out_tx: &out_tx,
                        max_agent_tokens,
                    };
                    dispatch(&ctx, &pattern, &input_text, &handle).await
                }
                Err(e) => Err(Error::from(e)),
            };

            let duration_ms = started_at.elapsed().as_millis() as u64;
            let _ = bus.with_store(|store| store.update_run_duration(run_id, duration_ms));

            let final_event = match &outcome {
                Ok(()) => {
                    let _ = bus.with_store(|store| store.update_run_status(run_id, RunStatus::Completed, None));
                    Event::new(
                        session_id,
                        run_id,
                        EventKind::RunCompleted,
                        Payload::Generic(json!({
                            "pattern_type": pattern.pattern_type,
                            "total_iterations": handle.iteration(),
                            "total_agents_run": handle.results_count(),
                        })),
                    )
                }
                Err(e) => {
                    let message = e.to_string();
                    let _ = bus.with_store(|store| store.update_run_status(run_id, RunStatus::Failed, Some(&message)));
                    Event::new(session_id, run_id, EventKind::RunFailed, Payload::Generic(json!({"error": message})))
                }
            };
            if let Ok(published) = bus.publish(final_event) {
                let _ = out_tx.send(published).await;
            }

            if let Ok(Some(run)) = bus.with_store(|store| store.get_run(run_id)) {
                if let Ok(events) = bus.with_store(|store| store.get_events_for_run(run_id, 0)) {
                    let memory_entry = build_run_memory_entry(&run, &events);
                    let _ = bus.with_store(|store| store.upsert_run_memory(&memory_entry));
                }
            }

            active.lock().unwrap().remove(&run_id);
        });

        Ok(out_rx)
    }

    pub fn get_execution_state(&self, run_id: Uuid) -> Option<ExecutionSnapshot> {
        self.active.lock().unwrap().get(&run_id).map(|handle| handle.snapshot(run_id))
    }

    pub fn list_active_executions(&self) -> Vec<ExecutionSnapshot> {
        self.active.lock().unwrap().iter().map(|(run_id, handle)| handle.snapshot(*run_id)).collect()
    }

    /// Resolves a pending checkpoint for `run_id`. Returns `false` if the
    /// execution is unknown or isn't actually waiting on a checkpoint.
    pub fn provide_human_input(&self, run_id: Uuid, decision: &str) -> bool {
        match self.active.lock().unwrap().get(&run_id) {
            Some(handle) => handle.resolve(decision),
            None => false,
        }
    }
}

async fn dispatch(ctx: &AgentContext<'_>, pattern: &AgentPattern, input_text: &str, handle: &ExecutionHandle) -> Result<()> {
    match pattern.pattern_type {
        PatternType::Solo => patterns::execute_solo(ctx, pattern, input_text, handle).await,
        PatternType::Loop => patterns::execute_loop(ctx, pattern, input_text, handle).await,
        PatternType::Panel => patterns::execute_panel(ctx, pattern, input_text, handle).await,
        PatternType::Debate => patterns::execute_debate(ctx, pattern, input_text, handle).await,
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    s.chars().take(max).collect()
}
