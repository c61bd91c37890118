use std::collections::HashSet;

use ag_types::{ContextPack, RunMemoryEntry};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::walk::clean_line;

const DEFAULT_MAX_ENTRIES: usize = 5;
const RECENT_WORK_CAP: usize = 5;
const FILES_CAP: usize = 12;
const OPEN_LOOPS_CAP: usize = 6;
const VALIDATIONS_CAP: usize = 5;
const COMMANDS_CAP: usize = 6;

/// How strongly a past run's memory should inform a resumed session: a
/// same-run match dominates everything else, then recency, then signals
/// that work was left unfinished (failure, open loops, pending tests).
fn memory_score(entry: &RunMemoryEntry, now: DateTime<Utc>, source_run_id: Option<Uuid>) -> f64 {
    let mut score = 0.0;
    if source_run_id == Some(entry.run_id) {
        score += 1000.0;
    }
    let age_hours = (now - entry.created_at).num_seconds().max(0) as f64 / 3600.0;
    score += (240.0 - age_hours).max(0.0) / 8.0;

    if entry.memory.status == "failed" {
        score += 8.0;
    }
    if !entry.memory.open_loops.is_empty() {
        score += (entry.memory.open_loops.len() as f64).min(6.0);
    }
    if !entry.memory.test_commands.is_empty() {
        score += 3.0;
    }
    if !entry.memory.files_touched.is_empty() {
        score += (entry.memory.files_touched.len() as f64 / 2.0).min(5.0);
    }
    score
}

/// Rank recent run memories for `session` and compose a compact resume
/// prompt. `source_run_id`, when given, is the run the caller is actually
/// branching or resuming from and dominates the ranking.
pub fn build_context_pack(
    entries: &[RunMemoryEntry],
    source_run_id: Option<Uuid>,
    max_entries: usize,
) -> ContextPack {
    if entries.is_empty() {
        return ContextPack {
            goal: String::new(),
            entries_used: 0,
            source_run_id,
            run_ids: Vec::new(),
            resume_prompt: "Resume this coding session.\n\
                 No prior structured memory was found. Start by confirming current objective and state."
                .to_string(),
        };
    }

    let max_entries = if max_entries == 0 { DEFAULT_MAX_ENTRIES } else { max_entries };
    let now = Utc::now();
    let mut ranked: Vec<&RunMemoryEntry> = entries.iter().collect();
    ranked.sort_by(|a, b| {
        memory_score(b, now, source_run_id)
            .partial_cmp(&memory_score(a, now, source_run_id))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let selected: Vec<&RunMemoryEntry> = ranked.into_iter().take(max_entries).collect();

    let primary = selected[0];
    let objective = primary.objective.clone().unwrap_or_else(|| primary.memory.objective.clone());

    let mut recent_work = Vec::new();
    let mut files = Vec::new();
    let mut seen_files = HashSet::new();
    let mut open_loops = Vec::new();
    let mut seen_loops = HashSet::new();
    let mut validations = Vec::new();
    let mut seen_validations = HashSet::new();
    let mut commands = Vec::new();
    let mut seen_commands = HashSet::new();

    for entry in &selected {
        let summary = if !entry.memory.short_summary.is_empty() {
            entry.memory.short_summary.clone()
        } else {
            entry.short_summary.clone()
        };
        if !summary.is_empty() && recent_work.len() < RECENT_WORK_CAP {
            recent_work.push(clean_line(&summary, 180));
        }

        for path in entry.memory.files_touched.iter().take(8) {
            if files.len() >= FILES_CAP {
                break;
            }
            if seen_files.insert(path.clone()) {
                files.push(path.clone());
            }
        }

        for loop_text in entry.memory.open_loops.iter().take(3) {
            if open_loops.len() >= OPEN_LOOPS_CAP {
                break;
            }
            let cleaned = clean_line(loop_text, 160);
            if !cleaned.is_empty() && seen_loops.insert(cleaned.clone()) {
                open_loops.push(cleaned);
            }
        }

        for test_cmd in entry.memory.test_commands.iter().take(3) {
            if validations.len() >= VALIDATIONS_CAP {
                break;
            }
            let cleaned = clean_line(test_cmd, 120);
            if !cleaned.is_empty() && seen_validations.insert(cleaned.clone()) {
                validations.push(cleaned);
            }
        }

        for cmd in entry.memory.commands.iter().take(2) {
            if commands.len() >= COMMANDS_CAP {
                break;
            }
            let cleaned = clean_line(cmd, 120);
            if !cleaned.is_empty() && seen_commands.insert(cleaned.clone()) {
                commands.push(cleaned);
            }
        }
    }

    let next_action = clean_line(
        if primary.memory.next_action.is_empty() {
            "Continue from the latest completed step and verify."
        } else {
            &primary.memory.next_action
        },
        220,
    );

    let resume_prompt = format!(
        "Resume this previously ended coding session with smart memory context.\n\n\
         Objective:\n{}\n\n\
         Recent completed work:\n{}\n\n\
         Open loops needing attention:\n{}\n\n\
         Key artifacts touched:\n{}\n\n\
         Relevant validation commands seen:\n{}\n\n\
         Important commands run:\n{}\n\n\
         Continue from here:\n\
         - {next_action}\n\
         - Reuse existing files/artifacts before creating new ones.\n\
         - Avoid repeating already completed steps unless verification fails.\n\
         - If uncertain, run one small validation command before broad changes.",
        if objective.is_empty() { "(No explicit objective captured)" } else { &objective },
        bullet(&recent_work),
        bullet(&open_loops),
        bullet(&files),
        bullet(&validations),
        bullet(&commands),
    );

    ContextPack {
        goal: objective,
        entries_used: selected.len(),
        source_run_id,
        run_ids: selected.iter().map(|e| e.run_id).collect(),
        resume_prompt,
    }
}

fn bullet(items: &[String]) -> String {
    if items.is_empty() {
        "- None".to_string()
    } else {
        items.iter().map(|item| format!("- {item}")).collect::<Vec<_>>().join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ag_types::RunMemory;

    fn entry(run_id: Uuid, created_at: DateTime<Utc>, status: &str, open_loops: Vec<String>) -> RunMemoryEntry {
        RunMemoryEntry {
            id: Uuid::new_v4(),
            run_id,
            session_id: Uuid::new_v4(),
            objective: Some("ship the feature".to_string()),
            short_summary: "made progress".to_string(),
            memory: RunMemory {
                objective: "ship the feature".to_string(),
                short_summary: "made progress".to_string(),
                status: status.to_string(),
                open_loops,
                ..Default::default()
            },
            created_at,
        }
    }

    #[test]
    fn empty_memories_produce_a_cold_start_prompt() {
        let pack = build_context_pack(&[], None, 5);
        assert_eq!(pack.entries_used, 0);
        assert!(pack.resume_prompt.contains("No prior structured memory"));
    }

    #[test]
    fn source_run_id_match_dominates_ranking() {
        let now = Utc::now();
        let older_matching_run = Uuid::new_v4();
        let newer_other_run = Uuid::new_v4();
        let entries = vec![
            entry(older_matching_run, now - chrono::Duration::hours(100), "completed", vec![]),
            entry(newer_other_run, now - chrono::Duration::minutes(1), "completed", vec![]),
        ];

        let pack = build_context_pack(&entries, Some(older_matching_run), 5);
        assert_eq!(pack.run_ids[0], older_matching_run);
    }

    #[test]
    fn failed_status_and_open_loops_boost_ranking_over_recency_alone() {
        let now = Utc::now();
        let struggling_run = Uuid::new_v4();
        let quiet_run = Uuid::new_v4();
        let entries = vec![
            entry(quiet_run, now - chrono::Duration::hours(1), "completed", vec![]),
            entry(
                struggling_run,
                now - chrono::Duration::hours(2),
                "failed",
                vec!["let me know if you want more".to_string()],
            ),
        ];

        let pack = build_context_pack(&entries, None, 5);
        assert_eq!(pack.run_ids[0], struggling_run);
    }
}
