use std::collections::HashSet;

use ag_types::{Event, EventKind, PhaseCounts};

const TEST_RUNNER_KEYWORDS: &[&str] = &["test", "pytest", "jest", "vitest", "go test", "cargo test"];
const OPEN_LOOP_CUES: &[&str] =
    &["let me know", "would you like", "what would you like", "i can also", "next step"];

const RECENT_USER_GOALS_CAP: usize = 6;
const ASSISTANT_OUTCOMES_CAP: usize = 3;
const ASSISTANT_SUMMARY_MAX_LEN: usize = 900;

/// A single pass over a run's event log in sequence order, the way both
/// end-of-run memory extraction and end-of-session resume snapshots scan it.
/// Accumulates the full (uncapped-for-output) state; callers slice it down
/// to whatever shape they need.
#[derive(Debug, Default)]
pub struct EventWalk {
    pub first_goal: String,
    pub recent_user_goals: Vec<String>,
    pub touched_files: Vec<String>,
    touched_seen: HashSet<String>,
    pub commands: Vec<String>,
    command_seen: HashSet<String>,
    pub test_commands: Vec<String>,
    latest_assistant_parts: Vec<String>,
    pub assistant_outcomes: Vec<String>,
    pub latest_assistant_summary: String,
    pub open_loops: Vec<String>,
    seen_open_loops: HashSet<String>,
    pub error_count: u32,
    pub read_count: u32,
    pub edit_count: u32,
    pub write_count: u32,
}

impl EventWalk {
    pub fn walk(events: &[Event]) -> Self {
        let mut walk = Self::default();
        for event in events {
            walk.visit(event);
        }
        walk
    }

    fn visit(&mut self, event: &Event) {
        match event.kind {
            EventKind::StreamUser => self.visit_user(event),
            EventKind::StreamAssistant => self.visit_assistant(event),
            EventKind::StreamResult => self.visit_result(),
            EventKind::StreamToolUse => self.visit_tool_use(event),
            EventKind::StreamError | EventKind::RunFailed => self.error_count += 1,
            _ => {}
        }
    }

    fn visit_user(&mut self, event: &Event) {
        let content = event.content.as_deref().unwrap_or("").trim().to_string();
        if content.is_empty() || content.starts_with("[Agent") {
            return;
        }
        if self.first_goal.is_empty() {
            self.first_goal = content.clone();
        }
        self.recent_user_goals.push(clean_line(&content, 180));
        if self.recent_user_goals.len() > RECENT_USER_GOALS_CAP {
            let drop = self.recent_user_goals.len() - RECENT_USER_GOALS_CAP;
            self.recent_user_goals.drain(0..drop);
        }
        self.latest_assistant_parts.clear();
    }

    fn visit_assistant(&mut self, event: &Event) {
        if let Some(content) = event.content.as_deref().filter(|c| !c.is_empty()) {
            self.latest_assistant_parts.push(content.to_string());
        }
    }

    fn visit_result(&mut self) {
        if self.latest_assistant_parts.is_empty() {
            return;
        }
        let joined: String = self.latest_assistant_parts.concat();
        let summary = clean_line(&joined, ASSISTANT_SUMMARY_MAX_LEN);
        if summary.is_empty() {
            return;
        }
        self.latest_assistant_summary = summary.clone();
        self.assistant_outcomes.push(summary.clone());
        if self.assistant_outcomes.len() > ASSISTANT_OUTCOMES_CAP {
            let drop = self.assistant_outcomes.len() - ASSISTANT_OUTCOMES_CAP;
            self.assistant_outcomes.drain(0..drop);
        }
        let lowered = summary.to_lowercase();
        if OPEN_LOOP_CUES.iter().any(|cue| lowered.contains(cue)) {
            let loop_text = clean_line(&summary, 220);
            if !loop_text.is_empty() && self.seen_open_loops.insert(loop_text.clone()) {
                self.open_loops.push(loop_text);
            }
        }
    }

    fn visit_tool_use(&mut self, event: &Event) {
        let tool_name = event.tool_name.as_deref().unwrap_or("");
        let Some(input) = event.tool_input.as_ref().filter(|v| v.is_object()) else {
            return;
        };

        if matches!(tool_name, "Glob" | "Grep" | "Read") {
            self.read_count += 1;
        }
        if tool_name == "Edit" {
            self.edit_count += 1;
        }
        if tool_name == "Write" {
            self.write_count += 1;
        }

        let path = input
            .get("file_path")
            .or_else(|| input.get("path"))
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .trim()
            .to_string();
        if !path.is_empty() && self.touched_seen.insert(path.clone()) {
            self.touched_files.push(path);
        }

        if tool_name == "Bash" {
            let command = input.get("command").and_then(|v| v.as_str()).unwrap_or("").trim().to_string();
            let normalized = normalize_command(&command);
            if !normalized.is_empty() && self.command_seen.insert(normalized.clone()) {
                self.commands.push(normalized.clone());
                let lowered = command.to_lowercase();
                if TEST_RUNNER_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
                    self.test_commands.push(normalized);
                }
            }
        }
    }

    pub fn phases(&self) -> Vec<String> {
        let mut phases = Vec::new();
        if self.read_count > 0 {
            phases.push("exploration".to_string());
        }
        if self.write_count > 0 || self.edit_count > 0 {
            phases.push("implementation".to_string());
        }
        if !self.test_commands.is_empty() {
            phases.push("validation".to_string());
        }
        if self.error_count > 0 {
            phases.push("error_handling".to_string());
        }
        phases
    }

    pub fn phase_counts(&self) -> PhaseCounts {
        PhaseCounts { read_ops: self.read_count, write_ops: self.write_count, edit_ops: self.edit_count }
    }

    /// The rule-based next action: failed status wins, else validation, else
    /// review, else clarify.
    pub fn next_action(&self, run_failed: bool) -> String {
        if run_failed {
            "Fix the latest failure first, then rerun the smallest relevant validation command.".to_string()
        } else if !self.test_commands.is_empty() {
            "Re-run targeted tests for changed files, then finalize remaining polish.".to_string()
        } else if !self.touched_files.is_empty() {
            "Review touched files for completeness and run one lightweight validation command.".to_string()
        } else {
            "Clarify the next concrete implementation step and proceed.".to_string()
        }
    }
}

/// Collapse internal whitespace and truncate to `max_len`, appending `...`
/// when truncated. Matches the original's `_clean_line`.
pub fn clean_line(text: &str, max_len: usize) -> String {
    let cleaned: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.chars().count() <= max_len {
        return cleaned;
    }
    let truncated: String = cleaned.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", truncated.trim_end())
}

/// Reduce a shell command to its first line, replacing heredoc bodies with a
/// marker so they never leak into persisted memory or resume prompts.
pub fn normalize_command(command: &str) -> String {
    let command = command.trim();
    if command.is_empty() {
        return String::new();
    }
    let first_line = command.lines().next().unwrap_or("").trim();
    if command.contains("<<") {
        clean_line(&format!("{first_line} [heredoc body omitted]"), 220)
    } else {
        clean_line(first_line, 220)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ag_types::Payload;
    use serde_json::json;
    use uuid::Uuid;

    fn event(kind: EventKind) -> Event {
        Event::new(Uuid::new_v4(), Uuid::new_v4(), kind, Payload::empty())
    }

    #[test]
    fn clean_line_collapses_whitespace_and_truncates() {
        assert_eq!(clean_line("a   b\nc", 100), "a b c");
        let long = "x".repeat(50);
        assert_eq!(clean_line(&long, 10), "xxxxxxx...");
    }

    #[test]
    fn normalize_command_replaces_heredoc_body_with_marker() {
        let cmd = "cat <<'EOF' > out.txt\nbig body\nEOF";
        assert_eq!(normalize_command(cmd), "cat <<'EOF' > out.txt [heredoc body omitted]");
    }

    #[test]
    fn walk_tracks_first_goal_and_caps_recent_goals() {
        let mut events = Vec::new();
        for i in 0..8 {
            let mut e = event(EventKind::StreamUser);
            e.content = Some(format!("goal {i}"));
            events.push(e);
        }
        let walk = EventWalk::walk(&events);
        assert_eq!(walk.first_goal, "goal 0");
        assert_eq!(walk.recent_user_goals.len(), RECENT_USER_GOALS_CAP);
        assert_eq!(walk.recent_user_goals.last().unwrap(), "goal 7");
    }

    #[test]
    fn walk_builds_assistant_summary_only_at_result_boundary() {
        let mut user = event(EventKind::StreamUser);
        user.content = Some("do it".to_string());
        let mut assistant = event(EventKind::StreamAssistant);
        assistant.content = Some("working on it".to_string());
        let result = event(EventKind::StreamResult);

        let walk = EventWalk::walk(&[user, assistant, result]);
        assert_eq!(walk.latest_assistant_summary, "working on it");
        assert_eq!(walk.assistant_outcomes, vec!["working on it".to_string()]);
    }

    #[test]
    fn open_loop_cue_is_detected_and_deduplicated() {
        let mut assistant = event(EventKind::StreamAssistant);
        assistant.content = Some("Done. Would you like me to continue?".to_string());
        let result = event(EventKind::StreamResult);

        let walk = EventWalk::walk(&[assistant.clone(), result.clone(), assistant, result]);
        assert_eq!(walk.open_loops.len(), 1);
    }

    #[test]
    fn tool_use_tracks_files_and_test_commands_including_cargo_test() {
        let mut read = event(EventKind::StreamToolUse);
        read.tool_name = Some("Read".to_string());
        read.tool_input = Some(json!({"file_path": "src/lib.rs"}));

        let mut bash = event(EventKind::StreamToolUse);
        bash.tool_name = Some("Bash".to_string());
        bash.tool_input = Some(json!({"command": "cargo test --workspace"}));

        let walk = EventWalk::walk(&[read, bash]);
        assert_eq!(walk.touched_files, vec!["src/lib.rs".to_string()]);
        assert_eq!(walk.read_count, 1);
        assert_eq!(walk.test_commands, vec!["cargo test --workspace".to_string()]);
    }

    #[test]
    fn phases_reflect_observed_activity() {
        let mut read = event(EventKind::StreamToolUse);
        read.tool_name = Some("Read".to_string());
        read.tool_input = Some(json!({"path": "a.txt"}));
        let error = event(EventKind::StreamError);

        let walk = EventWalk::walk(&[read, error]);
        let phases = walk.phases();
        assert!(phases.contains(&"exploration".to_string()));
        assert!(phases.contains(&"error_handling".to_string()));
        assert!(!phases.contains(&"validation".to_string()));
    }
}
