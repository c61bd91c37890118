use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One invocation of the child assistant process, one-shot or interactive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub session_id: Uuid,
    pub prompt: String,
    pub title: Option<String>,
    pub model: String,
    pub status: RunStatus,
    pub is_interactive: bool,
    pub parent_run_id: Option<Uuid>,
    pub branch_point_event_id: Option<Uuid>,
    pub pid: Option<u32>,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub cost_usd: f64,
    pub duration_ms: u64,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Created,
    Running,
    Paused,
    Completed,
    Failed,
}

impl Run {
    pub fn new(session_id: Uuid, prompt: impl Into<String>, model: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            session_id,
            prompt: prompt.into(),
            title: None,
            model: model.into(),
            status: RunStatus::Created,
            is_interactive: false,
            parent_run_id: None,
            branch_point_event_id: None,
            pid: None,
            tokens_in: 0,
            tokens_out: 0,
            cost_usd: 0.0,
            duration_ms: 0,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn branch_of(mut self, parent_run_id: Uuid, branch_point_event_id: Uuid) -> Self {
        self.parent_run_id = Some(parent_run_id);
        self.branch_point_event_id = Some(branch_point_event_id);
        self
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, RunStatus::Running | RunStatus::Paused)
    }

    /// Derive a short run title from the first user message, the way an
    /// interactive session names itself after its opening turn.
    pub fn title_from_message(message: &str) -> String {
        let flat: String = message.chars().filter(|c| *c != '\n' && *c != '\r').collect();
        if flat.chars().count() > 50 {
            let truncated: String = flat.chars().take(50).collect();
            format!("{truncated}...")
        } else {
            flat
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_from_message_truncates_and_strips_newlines() {
        let message = "a".repeat(60) + "\nmore";
        let title = Run::title_from_message(&message);
        assert_eq!(title.chars().count(), 53); // 50 + "..."
        assert!(!title.contains('\n'));
    }

    #[test]
    fn title_from_message_keeps_short_messages_verbatim() {
        assert_eq!(Run::title_from_message("fix the bug"), "fix the bug");
    }

    #[test]
    fn new_run_starts_created_and_inactive() {
        let run = Run::new(Uuid::new_v4(), "do something", "sonnet");
        assert_eq!(run.status, RunStatus::Created);
        assert!(!run.is_active());
    }
}
