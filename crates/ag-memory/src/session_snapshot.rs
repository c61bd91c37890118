use ag_types::{Event, Run, RunStatus, SessionSnapshot};
use chrono::Utc;
use uuid::Uuid;

use crate::walk::{clean_line, EventWalk};

const RECENT_USER_GOALS_OUT: usize = 3;
const FILES_TOUCHED_OUT: usize = 10;
const COMMANDS_OUT: usize = 8;
const LAST_ASSISTANT_SUMMARY_MAX_LEN: usize = 800;

/// Build the resumable summary for an interactive session that just ended.
/// Shares the same [`EventWalk`] as [`crate::run_memory::build_run_memory_entry`]
/// but shapes its output with this call site's own limits and its own
/// resume-prompt wording, since the two surfaces are read by different
/// consumers (a persisted memory row vs. a human-facing resume prompt).
pub fn build_session_snapshot(run: &Run, events: &[Event]) -> SessionSnapshot {
    let walk = EventWalk::walk(events);
    let status = status_str(run.status);
    let goal = clean_line(&walk.first_goal, 300);
    let phases = walk.phases();
    let last_assistant_summary = clean_line(&walk.latest_assistant_summary, LAST_ASSISTANT_SUMMARY_MAX_LEN);

    let next_step = if run.status == RunStatus::Failed || walk.error_count > 0 {
        "Address the most recent error first, then rerun the smallest relevant verification command."
    } else if !walk.test_commands.is_empty() {
        "Re-run targeted tests for changed files, then finalize any remaining polish."
    } else if !walk.touched_files.is_empty() {
        "Review touched files for correctness and run one lightweight validation command."
    } else {
        "Continue from the latest completed step and run a quick verification."
    };

    let recent_goals = tail(&walk.recent_user_goals, RECENT_USER_GOALS_OUT);
    let files = head(&walk.touched_files, FILES_TOUCHED_OUT);
    let commands = head(&walk.commands, COMMANDS_OUT);

    let summary = format!(
        "goal={goal:?} status={status} files_touched={} commands={} test_commands={} error_count={}",
        walk.touched_files.len(),
        walk.commands.len(),
        walk.test_commands.len(),
        walk.error_count,
    );

    let resume_prompt = format!(
        "Resume this previously ended coding session with smart context.\n\n\
         Objective:\n{}\n\n\
         Session state:\n\
         - Status: {status}\n\
         - Workflow phases observed: {}\n\
         - Errors observed: {}\n\n\
         Recent user intent:\n{}\n\n\
         Key artifacts touched:\n{}\n\n\
         Important commands run:\n{}\n\n\
         Latest assistant outcome:\n{}\n\n\
         Continue from here:\n\
         - {next_step}\n\
         - Reuse existing files/artifacts before creating new ones.\n\
         - Avoid repeating already completed steps unless verification fails.",
        if goal.is_empty() { "(No explicit objective captured)" } else { &goal },
        if phases.is_empty() { "Unknown".to_string() } else { phases.join(", ") },
        walk.error_count,
        bullet(&recent_goals),
        bullet(&files),
        bullet(&commands),
        if last_assistant_summary.is_empty() {
            "(No final assistant outcome captured)"
        } else {
            &last_assistant_summary
        },
    );

    SessionSnapshot {
        id: Uuid::new_v4(),
        run_id: run.id,
        session_id: run.session_id,
        goal,
        summary,
        resume_prompt,
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

fn bullet(items: &[String]) -> String {
    if items.is_empty() {
        "- None".to_string()
    } else {
        items.iter().map(|item| format!("- {item}")).collect::<Vec<_>>().join("\n")
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

    #[test]
    fn no_activity_falls_back_to_placeholder_text() {
        let run = Run::new(Uuid::new_v4(), "prompt", "model");
        let snapshot = build_session_snapshot(&run, &[]);
        assert!(snapshot.resume_prompt.contains("(No explicit objective captured)"));
        assert!(snapshot.resume_prompt.contains("(No final assistant outcome captured)"));
        assert_eq!(snapshot.goal, "");
    }

    #[test]
    fn failed_run_mentions_addressing_the_error_first() {
        let mut run = Run::new(Uuid::new_v4(), "prompt", "model");
        run.status = RunStatus::Failed;
        let error = Event::new(run.session_id, run.id, EventKind::StreamError, Payload::empty());
        let snapshot = build_session_snapshot(&run, &[error]);
        assert!(snapshot.resume_prompt.contains("Address the most recent error first"));
    }
}
