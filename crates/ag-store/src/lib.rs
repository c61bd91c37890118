//! SQLite persistence for the agentling control plane.
//!
//! One [`Store`] wraps one `rusqlite::Connection` and owns migrations. Every
//! column that holds a structured value (`payload`, `tool_input`, the three
//! git file lists, pattern `config`, run `memory`) is stored as a JSON text
//! column rather than normalized further, matching how the original
//! repositories persisted their dataclasses.

mod error;
mod schema;
mod store;

pub use error::{Error, Result};
pub use store::Store;

#[cfg(test)]
mod tests {
    use super::*;
    use ag_types::{
        Agent, AgentPattern, AgentRun, AgentRunStatus, Event, EventKind, GitSnapshot,
        HumanInvolvement, Payload, PatternType, Run, RunMemory, RunMemoryEntry, RunStatus,
        Session, SessionSnapshot, SessionStatus,
    };
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn session_create_get_round_trips() {
        let store = Store::open_in_memory().unwrap();
        let session = Session::new("/tmp/project", Some("demo".to_string()));
        store.create_session(&session).unwrap();

        let fetched = store.get_session(session.id).unwrap().unwrap();
        assert_eq!(fetched.name, "demo");
        assert_eq!(fetched.working_dir, "/tmp/project");
        assert_eq!(fetched.status, SessionStatus::Active);

        let by_dir = store.get_session_by_working_dir("/tmp/project").unwrap().unwrap();
        assert_eq!(by_dir.id, session.id);

        store.update_session_status(session.id, SessionStatus::Completed).unwrap();
        let updated = store.get_session(session.id).unwrap().unwrap();
        assert_eq!(updated.status, SessionStatus::Completed);
    }

    #[test]
    fn missing_session_is_none_not_error() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.get_session(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn run_create_update_round_trips() {
        let store = Store::open_in_memory().unwrap();
        let session = Session::new("/tmp/project", None);
        store.create_session(&session).unwrap();

        let mut run = Run::new(session.id, "fix the bug", "claude-sonnet-4");
        run.status = RunStatus::Running;
        store.create_run(&run).unwrap();

        store.update_run_metrics(run.id, 100, 40).unwrap();
        store.update_run_metrics(run.id, 10, 5).unwrap();
        store.update_run_status(run.id, RunStatus::Completed, None).unwrap();
        store.update_run_title(run.id, "fix the bug in the parser").unwrap();

        let fetched = store.get_run(run.id).unwrap().unwrap();
        assert_eq!(fetched.tokens_in, 110);
        assert_eq!(fetched.tokens_out, 45);
        assert_eq!(fetched.status, RunStatus::Completed);
        assert_eq!(fetched.title.as_deref(), Some("fix the bug in the parser"));
    }

    #[test]
    fn branch_run_carries_parent_and_branch_point() {
        let store = Store::open_in_memory().unwrap();
        let session = Session::new("/tmp/project", None);
        store.create_session(&session).unwrap();

        let parent = Run::new(session.id, "do the thing", "claude-sonnet-4");
        store.create_run(&parent).unwrap();

        let branch_point = Uuid::new_v4();
        let child = Run::new(session.id, "do the thing differently", "claude-sonnet-4")
            .branch_of(parent.id, branch_point);
        store.create_run(&child).unwrap();

        let fetched = store.get_run(child.id).unwrap().unwrap();
        assert_eq!(fetched.parent_run_id, Some(parent.id));
        assert_eq!(fetched.branch_point_event_id, Some(branch_point));
    }

    #[test]
    fn events_are_ordered_by_sequence_and_last_sequence_advances() {
        let store = Store::open_in_memory().unwrap();
        let session = Session::new("/tmp/project", None);
        store.create_session(&session).unwrap();
        let run = Run::new(session.id, "prompt", "model");
        store.create_run(&run).unwrap();

        assert_eq!(store.get_last_sequence(run.id).unwrap(), 0);

        for i in 0..3u64 {
            let mut event = Event::new(
                session.id,
                run.id,
                EventKind::StreamAssistant,
                Payload::Generic(json!({"i": i})),
            );
            event.sequence = i;
            store.append_event(&event).unwrap();
        }

        assert_eq!(store.get_last_sequence(run.id).unwrap(), 3);

        let events = store.get_events_for_run(run.id, 0).unwrap();
        assert_eq!(events.len(), 3);
        assert!(events.windows(2).all(|w| w[0].sequence < w[1].sequence));

        let from_one = store.get_events_for_run(run.id, 1).unwrap();
        assert_eq!(from_one.len(), 2);
    }

    #[test]
    fn duplicate_sequence_for_same_run_is_rejected() {
        let store = Store::open_in_memory().unwrap();
        let session = Session::new("/tmp/project", None);
        store.create_session(&session).unwrap();
        let run = Run::new(session.id, "prompt", "model");
        store.create_run(&run).unwrap();

        let mut first = Event::new(session.id, run.id, EventKind::StreamAssistant, Payload::empty());
        first.sequence = 0;
        store.append_event(&first).unwrap();

        let mut second = Event::new(session.id, run.id, EventKind::StreamAssistant, Payload::empty());
        second.sequence = 0;
        assert!(store.append_event(&second).is_err());
    }

    #[test]
    fn result_event_round_trips_usage_through_storage() {
        let store = Store::open_in_memory().unwrap();
        let session = Session::new("/tmp/project", None);
        store.create_session(&session).unwrap();
        let run = Run::new(session.id, "prompt", "model");
        store.create_run(&run).unwrap();

        let mut event = Event::new(
            session.id,
            run.id,
            EventKind::StreamResult,
            Payload::Generic(json!({"type": "result", "usage": {"input_tokens": 12, "output_tokens": 3}})),
        );
        event.sequence = 0;
        store.append_event(&event).unwrap();

        let fetched = store.get_events_for_run(run.id, 0).unwrap();
        assert_eq!(fetched[0].result_usage(), (12, 3));
    }

    #[test]
    fn git_snapshot_preserves_separate_file_lists() {
        let store = Store::open_in_memory().unwrap();
        let session = Session::new("/tmp/project", None);
        store.create_session(&session).unwrap();
        let run = Run::new(session.id, "prompt", "model");
        store.create_run(&run).unwrap();

        let mut snapshot = GitSnapshot::new(run.id);
        snapshot.commit_hash = "abc123".to_string();
        snapshot.branch = "main".to_string();
        snapshot.dirty_files = vec!["src/lib.rs".to_string()];
        snapshot.staged_files = vec!["README.md".to_string()];
        snapshot.untracked_files = vec!["scratch.txt".to_string()];
        store.create_git_snapshot(&snapshot).unwrap();
    }

    #[test]
    fn agent_pattern_round_trips_config() {
        let store = Store::open_in_memory().unwrap();
        let pattern = AgentPattern {
            id: Uuid::new_v4(),
            name: "reviewer loop".to_string(),
            pattern_type: PatternType::Loop,
            human_involvement: HumanInvolvement::Checkpoints,
            config: json!({"max_rounds": 3}),
            created_at: chrono::Utc::now(),
        };
        store.create_agent_pattern(&pattern).unwrap();

        let fetched = store.get_agent_pattern(pattern.id).unwrap().unwrap();
        assert_eq!(fetched.name, "reviewer loop");
        assert_eq!(fetched.pattern_type, PatternType::Loop);
        assert_eq!(fetched.human_involvement, HumanInvolvement::Checkpoints);
        assert_eq!(fetched.config["max_rounds"], 3);
    }

    #[test]
    fn agent_run_lifecycle() {
        let store = Store::open_in_memory().unwrap();
        let session = Session::new("/tmp/project", None);
        store.create_session(&session).unwrap();
        let run = Run::new(session.id, "prompt", "model");
        store.create_run(&run).unwrap();

        let agent = Agent {
            id: Uuid::new_v4(),
            name: "critic".to_string(),
            role_prompt: "find problems".to_string(),
            model: "claude-sonnet-4".to_string(),
            created_at: chrono::Utc::now(),
        };
        store.create_agent(&agent).unwrap();

        let agent_run = AgentRun {
            id: Uuid::new_v4(),
            pattern_execution_id: Uuid::new_v4(),
            agent_id: Some(agent.id),
            agent_name: agent.name.clone(),
            run_id: run.id,
            round: 1,
            tokens_in: 0,
            tokens_out: 0,
            output: None,
            status: AgentRunStatus::Running,
            error_message: None,
            created_at: chrono::Utc::now(),
        };
        store.create_agent_run(&agent_run).unwrap();
        store
            .update_agent_run_status(agent_run.id, AgentRunStatus::Completed, Some("done"), None, 30, 12)
            .unwrap();
    }

    #[test]
    fn session_snapshot_latest_wins() {
        let store = Store::open_in_memory().unwrap();
        let session = Session::new("/tmp/project", None);
        store.create_session(&session).unwrap();
        let run = Run::new(session.id, "prompt", "model");
        store.create_run(&run).unwrap();

        let snapshot = SessionSnapshot {
            id: Uuid::new_v4(),
            run_id: run.id,
            session_id: session.id,
            goal: "ship the feature".to_string(),
            summary: "made progress".to_string(),
            resume_prompt: "continue from here".to_string(),
            created_at: chrono::Utc::now(),
        };
        store.create_session_snapshot(&snapshot).unwrap();

        let fetched = store.get_latest_session_snapshot(session.id).unwrap().unwrap();
        assert_eq!(fetched.goal, "ship the feature");
    }

    #[test]
    fn run_memory_upsert_replaces_prior_entry_for_same_run() {
        let store = Store::open_in_memory().unwrap();
        let session = Session::new("/tmp/project", None);
        store.create_session(&session).unwrap();
        let run = Run::new(session.id, "prompt", "model");
        store.create_run(&run).unwrap();

        let mut memory = RunMemory::default();
        memory.short_summary = "first pass".to_string();
        let entry = RunMemoryEntry {
            id: Uuid::new_v4(),
            run_id: run.id,
            session_id: session.id,
            objective: Some("ship it".to_string()),
            short_summary: "first pass".to_string(),
            memory,
            created_at: chrono::Utc::now(),
        };
        store.upsert_run_memory(&entry).unwrap();

        let mut updated_memory = RunMemory::default();
        updated_memory.short_summary = "second pass".to_string();
        let updated_entry = RunMemoryEntry {
            short_summary: "second pass".to_string(),
            memory: updated_memory,
            ..entry
        };
        store.upsert_run_memory(&updated_entry).unwrap();

        let entries = store.get_run_memory_entries_for_session(session.id).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].short_summary, "second pass");
    }

    #[test]
    fn get_event_finds_a_persisted_event_by_id_and_none_otherwise() {
        let store = Store::open_in_memory().unwrap();
        let session = Session::new("/tmp/project", None);
        store.create_session(&session).unwrap();
        let run = Run::new(session.id, "prompt", "model");
        store.create_run(&run).unwrap();

        let event = Event::new(session.id, run.id, EventKind::RunStarted, Payload::empty());
        store.append_event(&event).unwrap();

        let fetched = store.get_event(event.id).unwrap();
        assert_eq!(fetched.unwrap().id, event.id);
        assert!(store.get_event(Uuid::new_v4()).unwrap().is_none());
    }
}
