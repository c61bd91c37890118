use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A workspace the user is driving an assistant against. One session maps to
/// one working directory; runs are the individual invocations within it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub name: String,
    pub working_dir: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Paused,
    Completed,
    Failed,
}

impl Session {
    pub fn new(working_dir: impl Into<String>, name: Option<String>) -> Self {
        let working_dir = working_dir.into();
        let now = Utc::now();
        let name = name.unwrap_or_else(|| {
            working_dir
                .rsplit(['/', '\\'])
                .find(|s| !s.is_empty())
                .unwrap_or(&working_dir)
                .to_string()
        });
        Self {
            id: Uuid::new_v4(),
            name,
            working_dir,
            status: SessionStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }
}
