use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The structured summary produced by walking a run's event log once
/// (spec §4.J). Shared shape behind both `RunMemoryEntry` and
/// `SessionSnapshot`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunMemory {
    pub objective: String,
    pub short_summary: String,
    pub status: String,
    pub recent_user_goals: Vec<String>,
    pub assistant_outcomes: Vec<String>,
    pub files_touched: Vec<String>,
    pub commands: Vec<String>,
    pub test_commands: Vec<String>,
    pub error_count: u32,
    pub phases: Vec<String>,
    pub open_loops: Vec<String>,
    pub next_action: String,
    pub phase_counts: PhaseCounts,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PhaseCounts {
    pub read_ops: u32,
    pub write_ops: u32,
    pub edit_ops: u32,
}

/// The persisted, rankable memory of one completed one-shot run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMemoryEntry {
    pub id: Uuid,
    pub run_id: Uuid,
    pub session_id: Uuid,
    pub objective: Option<String>,
    pub short_summary: String,
    pub memory: RunMemory,
    pub created_at: DateTime<Utc>,
}

/// The persisted resume point for an ended interactive session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub run_id: Uuid,
    pub session_id: Uuid,
    pub goal: String,
    pub summary: String,
    pub resume_prompt: String,
    pub created_at: DateTime<Utc>,
}

/// The merged, ranked view across several `RunMemoryEntry` records, handed
/// back to a caller that wants to resume work with context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextPack {
    pub goal: String,
    pub entries_used: usize,
    pub source_run_id: Option<Uuid>,
    pub run_ids: Vec<Uuid>,
    pub resume_prompt: String,
}
