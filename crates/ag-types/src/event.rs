//! The canonical event taxonomy (spec §6) and the `Event` record itself (spec §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Every wire-visible event type string in the system. Stable: these are
/// persisted and replayed, so variants are never renumbered, only added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    #[serde(rename = "session.created")]
    SessionCreated,
    #[serde(rename = "session.started")]
    SessionStarted,
    #[serde(rename = "session.paused")]
    SessionPaused,
    #[serde(rename = "session.resumed")]
    SessionResumed,
    #[serde(rename = "session.completed")]
    SessionCompleted,
    #[serde(rename = "session.failed")]
    SessionFailed,

    #[serde(rename = "run.created")]
    RunCreated,
    #[serde(rename = "run.started")]
    RunStarted,
    #[serde(rename = "run.paused")]
    RunPaused,
    #[serde(rename = "run.resumed")]
    RunResumed,
    #[serde(rename = "run.completed")]
    RunCompleted,
    #[serde(rename = "run.failed")]
    RunFailed,
    #[serde(rename = "run.branched")]
    RunBranched,

    #[serde(rename = "stream.init")]
    StreamInit,
    #[serde(rename = "stream.system")]
    StreamSystem,
    #[serde(rename = "stream.assistant")]
    StreamAssistant,
    #[serde(rename = "stream.user")]
    StreamUser,
    #[serde(rename = "stream.tool_use")]
    StreamToolUse,
    #[serde(rename = "stream.tool_result")]
    StreamToolResult,
    #[serde(rename = "stream.result")]
    StreamResult,
    #[serde(rename = "stream.error")]
    StreamError,

    #[serde(rename = "intervention.pause")]
    InterventionPause,
    #[serde(rename = "intervention.resume")]
    InterventionResume,
    #[serde(rename = "intervention.prompt_edit")]
    InterventionPromptEdit,
    #[serde(rename = "intervention.retry")]
    InterventionRetry,
    #[serde(rename = "intervention.branch")]
    InterventionBranch,
    #[serde(rename = "intervention.inject")]
    InterventionInject,
    #[serde(rename = "intervention.abort")]
    InterventionAbort,

    #[serde(rename = "git.snapshot")]
    GitSnapshot,
    #[serde(rename = "git.diff")]
    GitDiff,
    #[serde(rename = "git.file_change")]
    GitFileChange,

    #[serde(rename = "metrics.tokens")]
    MetricsTokens,
    #[serde(rename = "metrics.cost")]
    MetricsCost,
    #[serde(rename = "metrics.duration")]
    MetricsDuration,
}

impl EventKind {
    /// Whether this kind carries the denormalized stream fields (role,
    /// content, tool_*). Mirrors the original `StreamEvent` subclass split.
    pub fn is_stream(self) -> bool {
        matches!(
            self,
            EventKind::StreamInit
                | EventKind::StreamSystem
                | EventKind::StreamAssistant
                | EventKind::StreamUser
                | EventKind::StreamToolUse
                | EventKind::StreamToolResult
                | EventKind::StreamResult
                | EventKind::StreamError
        )
    }
}

/// Discriminated payload. Concrete variants are produced where the producer
/// (parser, git tracker, ...) knows the shape; everything else falls back to
/// `Generic`, which still round-trips losslessly through persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "payload_type", rename_all = "snake_case")]
pub enum Payload {
    Generic(Value),
    GitSnapshot(GitSnapshotPayload),
    Metrics(MetricsPayload),
    Intervention(InterventionPayload),
}

impl Payload {
    /// Flatten to a `serde_json::Value` for storage or display, regardless
    /// of which concrete variant produced it.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn empty() -> Self {
        Payload::Generic(Value::Object(Default::default()))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitSnapshotPayload {
    pub commit_hash: String,
    pub branch: String,
    pub dirty_files: Vec<String>,
    pub staged_files: Vec<String>,
    pub untracked_files: Vec<String>,
    pub diff_stat: String,
    pub is_git_repo: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsPayload {
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub cost_usd: f64,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InterventionPayload {
    pub intervention_type: String,
    #[serde(default)]
    pub input_data: Value,
    pub result: Option<String>,
}

/// The canonical unit of history (spec §3). Immutable once persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub run_id: Uuid,
    pub session_id: Uuid,
    pub kind: EventKind,
    /// Strictly monotonic per-run sequence, assigned by the event bus.
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub payload: Payload,
    pub parent_event_id: Option<Uuid>,

    // Denormalized stream fields (spec §3 invariant: only meaningful when
    // `kind.is_stream()`; left at defaults otherwise).
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub tool_id: Option<String>,
    #[serde(default)]
    pub tool_input: Option<Value>,
    #[serde(default)]
    pub tool_output: Option<String>,
    #[serde(default)]
    pub is_error: bool,
}

impl Event {
    /// Construct an event with sequence left at 0; the event bus assigns the
    /// real sequence number at publish time.
    pub fn new(session_id: Uuid, run_id: Uuid, kind: EventKind, payload: Payload) -> Self {
        Self {
            id: Uuid::new_v4(),
            run_id,
            session_id,
            kind,
            sequence: 0,
            timestamp: Utc::now(),
            payload,
            parent_event_id: None,
            role: None,
            content: None,
            content_type: None,
            tool_name: None,
            tool_id: None,
            tool_input: None,
            tool_output: None,
            is_error: false,
        }
    }

    pub fn with_parent(mut self, parent_event_id: Uuid) -> Self {
        self.parent_event_id = Some(parent_event_id);
        self
    }

    /// Extract `(tokens_in, tokens_out)` from a finalized `stream.result`
    /// event whose payload is `{"type": "result", "usage": {...}}` (spec
    /// §4.G `stream_events`). Malformed or missing usage fields coerce to
    /// zero silently, never fail.
    pub fn result_usage(&self) -> (u64, u64) {
        if self.kind != EventKind::StreamResult {
            return (0, 0);
        }
        let Payload::Generic(value) = &self.payload else {
            return (0, 0);
        };
        if value.get("type").and_then(Value::as_str) != Some("result") {
            return (0, 0);
        }
        let Some(usage) = value.get("usage").filter(|u| u.is_object()) else {
            return (0, 0);
        };
        let tokens_in = usage
            .get("input_tokens")
            .and_then(coerce_u64)
            .unwrap_or(0);
        let tokens_out = usage
            .get("output_tokens")
            .and_then(coerce_u64)
            .unwrap_or(0);
        (tokens_in, tokens_out)
    }
}

fn coerce_u64(value: &Value) -> Option<u64> {
    value.as_u64().or_else(|| value.as_f64().map(|f| f.max(0.0) as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result_event(usage: Value) -> Event {
        let mut event = Event::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            EventKind::StreamResult,
            Payload::Generic(json!({"type": "result", "usage": usage})),
        );
        event.sequence = 1;
        event
    }

    #[test]
    fn result_usage_extracts_ints() {
        let event = result_event(json!({"input_tokens": 120, "output_tokens": 45}));
        assert_eq!(event.result_usage(), (120, 45));
    }

    #[test]
    fn result_usage_zeroes_on_malformed_usage() {
        let event = result_event(json!("not-a-map"));
        assert_eq!(event.result_usage(), (0, 0));
    }

    #[test]
    fn result_usage_ignores_non_result_payload_types() {
        let mut event = Event::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            EventKind::StreamResult,
            Payload::Generic(json!({"type": "done", "usage": {"input_tokens": 10, "output_tokens": 5}})),
        );
        event.sequence = 1;
        assert_eq!(event.result_usage(), (0, 0));
    }

    #[test]
    fn event_kind_wire_strings_round_trip() {
        let kind = EventKind::StreamToolUse;
        let value = serde_json::to_value(kind).unwrap();
        assert_eq!(value, json!("stream.tool_use"));
        let parsed: EventKind = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, kind);
    }
}
