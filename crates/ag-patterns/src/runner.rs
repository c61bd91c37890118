use std::path::{Path, PathBuf};
use std::time::Duration;

use ag_bus::EventBus;
use ag_cache::{cache_key, ResultCache};
use ag_process::ProcessController;
use ag_types::{Agent, AgentRun, AgentRunStatus, Event, EventKind, Payload};
use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{prompts, Error, Result};

const MAX_AGENT_RUNTIME_SECONDS: u64 = 240;
const MAX_REPEATED_BASH_COMMAND: u32 = 8;

/// Watches `stream.tool_use` events for a Bash tool invoked with the exact
/// same command string back to back, the way `SafetyGuard`/`StallDetector`
/// watch for one narrow condition across a stream of events. Resets on any
/// non-Bash tool or a differing command.
struct BashRunawayGuard {
    last_command: Option<String>,
    repeat_count: u32,
}

impl BashRunawayGuard {
    fn new() -> Self {
        Self { last_command: None, repeat_count: 0 }
    }

    /// Returns `Some((command, count))` once the threshold is crossed.
    fn observe(&mut self, tool_name: Option<&str>, tool_input: Option<&Value>) -> Option<(String, u32)> {
        if tool_name != Some("Bash") {
            self.last_command = None;
            self.repeat_count = 0;
            return None;
        }

        let command = tool_input.and_then(|v| v.get("command")).and_then(Value::as_str).unwrap_or("").trim().to_string();
        if command.is_empty() {
            self.last_command = None;
            self.repeat_count = 0;
            return None;
        }

        if self.last_command.as_deref() == Some(command.as_str()) {
            self.repeat_count += 1;
        } else {
            self.last_command = Some(command.clone());
            self.repeat_count = 1;
        }

        (self.repeat_count >= MAX_REPEATED_BASH_COMMAND).then(|| (command, self.repeat_count))
    }
}

/// Everything a single agent invocation needs to publish and forward events
/// through the owning pattern run, bundled so `run_agent` doesn't carry a
/// dozen loose parameters.
pub(crate) struct AgentContext<'a> {
    pub bus: &'a EventBus,
    pub cache: Option<&'a ResultCache>,
    pub session_id: Uuid,
    pub run_id: Uuid,
    pub working_dir: &'a str,
    pub out_tx: &'a mpsc::Sender<Event>,
    pub max_agent_tokens: Option<u64>,
}

/// Runs one agent to completion and returns its captured output text.
/// Grounded on `_run_agent` in the original executor: creates the
/// `AgentRun` record, tags every event the agent emits with
/// `agent_run_id`/`agent_name`, enforces the per-invocation runtime bound
/// and the runaway-Bash-loop guard, and folds token usage into the owning
/// run as it streams.
pub(crate) async fn run_agent(
    ctx: &AgentContext<'_>,
    agent: &Agent,
    input_text: &str,
    role_in_pattern: &str,
    sequence: u32,
    iteration: u32,
) -> Result<String> {
    let agent_run_id = Uuid::new_v4();
    let agent_run = AgentRun {
        id: agent_run_id,
        pattern_execution_id: ctx.run_id,
        agent_id: Some(agent.id),
        agent_name: agent.name.clone(),
        run_id: ctx.run_id,
        round: iteration,
        tokens_in: 0,
        tokens_out: 0,
        output: None,
        status: AgentRunStatus::Running,
        error_message: None,
        created_at: Utc::now(),
    };
    ctx.bus.with_store(|store| store.create_agent_run(&agent_run))?;

    let start_event = Event::new(
        ctx.session_id,
        ctx.run_id,
        EventKind::StreamSystem,
        Payload::Generic(json!({
            "agent_run_id": agent_run_id,
            "agent_id": agent.id,
            "agent_name": agent.name,
            "role": role_in_pattern,
            "sequence": sequence,
            "iteration": iteration,
        })),
    );
    forward(ctx, start_event).await?;

    let full_prompt = prompts::full_prompt(agent, input_text);

    if let Some(cache) = ctx.cache {
        let key = cache_key(&full_prompt, &agent.model, Path::new(ctx.working_dir));
        if let Some(cached) = cache.get(&key) {
            let output = cached.as_str().unwrap_or_default().to_string();
            let cached_event = Event::new(
                ctx.session_id,
                ctx.run_id,
                EventKind::StreamAssistant,
                Payload::Generic(json!({"agent_run_id": agent_run_id, "agent_name": agent.name, "cached": true})),
            );
            let mut cached_event = cached_event;
            cached_event.role = Some("assistant".to_string());
            cached_event.content_type = Some("cached".to_string());
            cached_event.content = Some(output.clone());
            forward(ctx, cached_event).await?;

            ctx.bus.with_store(|store| {
                store.update_agent_run_status(agent_run_id, AgentRunStatus::Completed, Some(&output), None, 0, 0)
            })?;
            return Ok(output);
        }
    }

    let outcome = run_agent_process(ctx, agent, &full_prompt, agent_run_id).await;

    match &outcome {
        Ok(output) => {
            if let Some(cache) = ctx.cache {
                let key = cache_key(&full_prompt, &agent.model, Path::new(ctx.working_dir));
                let _ = cache.set(&key, &Value::String(output.clone()));
            }
            ctx.bus.with_store(|store| {
                store.update_agent_run_status(agent_run_id, AgentRunStatus::Completed, Some(output), None, 0, 0)
            })?;
        }
        Err(e) => {
            ctx.bus.with_store(|store| {
                store.update_agent_run_status(agent_run_id, AgentRunStatus::Failed, None, Some(&e.to_string()), 0, 0)
            })?;
        }
    }

    outcome
}

async fn run_agent_process(ctx: &AgentContext<'_>, agent: &Agent, full_prompt: &str, agent_run_id: Uuid) -> Result<String> {
    let mut controller = ProcessController::new(ctx.session_id, ctx.run_id, PathBuf::from(ctx.working_dir), agent.model.clone());

    let drive = drive_agent(ctx, &mut controller, full_prompt, agent_run_id);
    match tokio::time::timeout(Duration::from_secs(MAX_AGENT_RUNTIME_SECONDS), drive).await {
        Ok(result) => result,
        Err(_elapsed) => {
            controller.terminate();
            Err(Error::AgentTimeout { seconds: MAX_AGENT_RUNTIME_SECONDS })
        }
    }
}

async fn drive_agent(ctx: &AgentContext<'_>, controller: &mut ProcessController, full_prompt: &str, agent_run_id: Uuid) -> Result<String> {
    let mut rx = controller.start(full_prompt).await?;
    let mut guard = BashRunawayGuard::new();
    let mut output_text = String::new();
    let mut failure: Option<String> = None;
    let mut tokens_used: u64 = 0;

    while let Some(mut event) = rx.recv().await {
        tag_with_agent(&mut event, agent_run_id);

        let published = ctx.bus.publish(event)?;
        if !forward_published(ctx, published.clone()).await {
            controller.terminate();
            break;
        }

        if published.kind == EventKind::StreamToolUse {
            if let Some((command, count)) = guard.observe(published.tool_name.as_deref(), published.tool_input.as_ref()) {
                controller.terminate();
                return Err(Error::RunawayLoop { command, count });
            }
        }

        let (tokens_in, tokens_out) = published.result_usage();
        if tokens_in != 0 || tokens_out != 0 {
            ctx.bus.with_store(|store| store.update_run_metrics(ctx.run_id, tokens_in, tokens_out))?;
            tokens_used = tokens_used.saturating_add(tokens_in).saturating_add(tokens_out);
            if let Some(limit) = ctx.max_agent_tokens {
                if tokens_used > limit {
                    controller.terminate();
                    return Err(Error::TokenBudgetExceeded { limit, used: tokens_used });
                }
            }
        }

        match published.kind {
            EventKind::StreamAssistant => {
                if let Some(content) = &published.content {
                    output_text.push_str(content);
                }
            }
            EventKind::StreamResult => {
                if let Payload::Generic(value) = &published.payload {
                    if let Some(result) = value.get("result").and_then(Value::as_str) {
                        if !result.trim().is_empty() {
                            output_text = result.to_string();
                        }
                    }
                }
            }
            EventKind::RunFailed => {
                failure = Some(extract_stderr(&published).unwrap_or_else(|| "agent process failed".to_string()));
            }
            _ => {}
        }
    }

    match failure {
        Some(reason) => Err(Error::AgentFailed(reason)),
        None => Ok(output_text),
    }
}

fn tag_with_agent(event: &mut Event, agent_run_id: Uuid) {
    if let Payload::Generic(Value::Object(map)) = &mut event.payload {
        map.insert("agent_run_id".to_string(), json!(agent_run_id));
    }
}

async fn forward(ctx: &AgentContext<'_>, event: Event) -> Result<()> {
    let published = ctx.bus.publish(event)?;
    forward_published(ctx, published).await;
    Ok(())
}

/// Returns `false` once the receiving end is gone (caller dropped the
/// stream). Before a process is running this is harmless to ignore; once
/// `drive_agent` is forwarding a live process's events, a closed channel
/// means the caller stopped watching and the agent's controller must be
/// terminated rather than left running unattended.
async fn forward_published(ctx: &AgentContext<'_>, event: Event) -> bool {
    ctx.out_tx.send(event).await.is_ok()
}

fn extract_stderr(event: &Event) -> Option<String> {
    if event.kind != EventKind::RunFailed {
        return None;
    }
    let Payload::Generic(value) = &event.payload else {
        return None;
    };
    value.get("stderr").and_then(Value::as_str).filter(|s| !s.is_empty()).map(str::to_string)
}
