use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A reusable agent role: a name, a system prompt, and a model preference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: Uuid,
    pub name: String,
    pub role_prompt: String,
    pub model: String,
    pub created_at: DateTime<Utc>,
}

/// One agent's participation in a single pattern execution: which run backed
/// it, what it produced, and how it ended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRun {
    pub id: Uuid,
    pub pattern_execution_id: Uuid,
    pub agent_id: Option<Uuid>,
    pub agent_name: String,
    pub run_id: Uuid,
    pub round: u32,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub output: Option<String>,
    pub status: AgentRunStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRunStatus {
    Running,
    Completed,
    Failed,
    Aborted,
}

/// A saved multi-agent workflow definition (spec §4.I).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentPattern {
    pub id: Uuid,
    pub name: String,
    pub pattern_type: PatternType,
    pub human_involvement: HumanInvolvement,
    pub config: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    Solo,
    Loop,
    Panel,
    Debate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HumanInvolvement {
    Autonomous,
    Checkpoints,
    OnDemand,
}
