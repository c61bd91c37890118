use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Git state captured at a point in a run's lifetime. Kept as three
/// independent file lists (dirty / staged / untracked) rather than the
/// union agentling's Python reference stuffed into one list, so each is
/// addressable on its own, matching the data model's own field list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitSnapshot {
    pub id: Uuid,
    pub run_id: Uuid,
    pub event_id: Option<Uuid>,
    pub commit_hash: String,
    pub branch: String,
    pub dirty_files: Vec<String>,
    pub staged_files: Vec<String>,
    pub untracked_files: Vec<String>,
    pub diff_stat: String,
    pub is_git_repo: bool,
    pub created_at: DateTime<Utc>,
}

impl GitSnapshot {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            run_id,
            created_at: Utc::now(),
            is_git_repo: true,
            ..Default::default()
        }
    }

    pub fn not_a_repo(run_id: Uuid) -> Self {
        Self {
            is_git_repo: false,
            ..Self::new(run_id)
        }
    }
}

/// A single file's change between two git states, derived from `diff --numstat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub change_type: FileChangeType,
    pub lines_added: u64,
    pub lines_removed: u64,
    pub old_path: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileChangeType {
    Added,
    Modified,
    Deleted,
    Renamed,
}
