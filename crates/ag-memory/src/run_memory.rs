use ag_types::{Event, Run, RunMemory, RunMemoryEntry, RunStatus};
use chrono::Utc;
use uuid::Uuid;

use crate::walk::{clean_line, EventWalk};

const RECENT_USER_GOALS_OUT: usize = 4;
const ASSISTANT_OUTCOMES_OUT: usize = 2;
const FILES_TOUCHED_OUT: usize = 24;
const COMMANDS_OUT: usize = 24;
const TEST_COMMANDS_OUT: usize = 12;
const OPEN_LOOPS_OUT: usize = 6;

/// Scan `run`'s full event log once and extract its structured,
/// end-of-run memory. Deterministic: the same event log always produces
/// the same entry.
pub fn build_run_memory_entry(run: &Run, events: &[Event]) -> RunMemoryEntry {
    let walk = EventWalk::walk(events);
    let status = status_str(run.status);
    let objective = clean_line(&walk.first_goal, 300);

    let short_summary = if !walk.latest_assistant_summary.is_empty() {
        clean_line(&walk.latest_assistant_summary, 320)
    } else {
        clean_line(
            &format!(
                "Run {status} with {} files touched and {} key commands.",
                walk.touched_files.len(),
                walk.commands.len()
            ),
            320,
        )
    };

    let memory = RunMemory {
        objective: objective.clone(),
        short_summary: short_summary.clone(),
        status: status.to_string(),
        recent_user_goals: tail(&walk.recent_user_goals, RECENT_USER_GOALS_OUT),
        assistant_outcomes: tail(&walk.assistant_outcomes, ASSISTANT_OUTCOMES_OUT),
        files_touched: head(&walk.touched_files, FILES_TOUCHED_OUT),
        commands: head(&walk.commands, COMMANDS_OUT),
        test_commands: head(&walk.test_commands, TEST_COMMANDS_OUT),
        error_count: walk.error_count,
        phases: walk.phases(),
        open_loops: head(&walk.open_loops, OPEN_LOOPS_OUT),
        next_action: walk.next_action(run.status == RunStatus::Failed),
        phase_counts: walk.phase_counts(),
    };

    RunMemoryEntry {
        id: Uuid::new_v4(),
        run_id: run.id,
        session_id: run.session_id,
        objective: if objective.is_empty() { None } else { Some(objective) },
        short_summary,
        memory,
        created_at: Utc::now(),
    }
}

fn status_str(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Created => "created",
        RunStatus::Running => "running",
        RunStatus::Paused => "paused",
        RunStatus::Completed => "completed",
        RunStatus::Failed => "failed",
    }
}

fn tail(items: &[String], n: usize) -> Vec<String> {
    let start = items.len().saturating_sub(n);
    items[start..].to_vec()
}

fn head(items: &[String], n: usize) -> Vec<String> {
    items.iter().take(n).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ag_types::{EventKind, Payload};

    fn user_event(run: &Run, text: &str) -> Event {
        let mut e = Event::new(run.session_id, run.id, EventKind::StreamUser, Payload::empty());
        e.content = Some(text.to_string());
        e
    }

    fn assistant_event(run: &Run, text: &str) -> Event {
        let mut e = Event::new(run.session_id, run.id, EventKind::StreamAssistant, Payload::empty());
        e.content = Some(text.to_string());
        e
    }

    fn result_event(run: &Run) -> Event {
        Event::new(run.session_id, run.id, EventKind::StreamResult, Payload::empty())
    }

    #[test]
    fn failed_run_gets_address_failure_next_action() {
        let mut run = Run::new(Uuid::new_v4(), "fix the thing", "model");
        run.status = RunStatus::Failed;
        let events =
            vec![user_event(&run, "fix the thing"), assistant_event(&run, "working on it"), result_event(&run)];

        let entry = build_run_memory_entry(&run, &events);
        assert_eq!(entry.memory.status, "failed");
        assert!(entry.memory.next_action.starts_with("Fix the latest failure"));
        assert_eq!(entry.objective.as_deref(), Some("fix the thing"));
    }

    #[test]
    fn empty_run_falls_back_to_synthesized_summary() {
        let run = Run::new(Uuid::new_v4(), "do nothing observable", "model");
        let entry = build_run_memory_entry(&run, &[]);
        assert!(entry.short_summary.starts_with("Run created with 0 files touched"));
        assert_eq!(entry.objective, None);
    }
}
