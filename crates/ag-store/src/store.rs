use std::path::Path;

use ag_types::{
    Agent, AgentPattern, AgentRun, AgentRunStatus, Event, EventKind, GitSnapshot, HumanInvolvement,
    Payload, PatternType, Run, RunMemory, RunMemoryEntry, RunStatus, Session, SessionSnapshot,
    SessionStatus,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::schema;
use crate::{Error, Result};

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let mut conn = Connection::open(path)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        schema::run_migrations(&mut conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        schema::run_migrations(&mut conn)?;
        Ok(Self { conn })
    }

    // --- sessions ---------------------------------------------------

    pub fn create_session(&self, session: &Session) -> Result<()> {
        self.conn.execute(
            "INSERT INTO sessions (id, name, working_dir, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                session.id.to_string(),
                session.name,
                session.working_dir,
                status_str(session.status),
                session.created_at.to_rfc3339(),
                session.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_session(&self, id: Uuid) -> Result<Option<Session>> {
        self.conn
            .query_row(
                "SELECT id, name, working_dir, status, created_at, updated_at
                 FROM sessions WHERE id = ?1",
                params![id.to_string()],
                row_to_session,
            )
            .optional()
            .map_err(Error::from)
    }

    pub fn get_session_by_working_dir(&self, working_dir: &str) -> Result<Option<Session>> {
        self.conn
            .query_row(
                "SELECT id, name, working_dir, status, created_at, updated_at
                 FROM sessions WHERE working_dir = ?1",
                params![working_dir],
                row_to_session,
            )
            .optional()
            .map_err(Error::from)
    }

    pub fn update_session_status(&self, id: Uuid, status: SessionStatus) -> Result<()> {
        self.conn.execute(
            "UPDATE sessions SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id.to_string(), status_str(status), Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    // --- runs ---------------------------------------------------------

    pub fn create_run(&self, run: &Run) -> Result<()> {
        self.conn.execute(
            "INSERT INTO runs (
                id, session_id, prompt, title, model, status, is_interactive,
                parent_run_id, branch_point_event_id, pid, tokens_in, tokens_out,
                cost_usd, duration_ms, error_message, created_at, updated_at
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17)",
            params![
                run.id.to_string(),
                run.session_id.to_string(),
                run.prompt,
                run.title,
                run.model,
                run_status_str(run.status),
                run.is_interactive,
                run.parent_run_id.map(|u| u.to_string()),
                run.branch_point_event_id.map(|u| u.to_string()),
                run.pid,
                run.tokens_in as i64,
                run.tokens_out as i64,
                run.cost_usd,
                run.duration_ms as i64,
                run.error_message,
                run.created_at.to_rfc3339(),
                run.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_run(&self, id: Uuid) -> Result<Option<Run>> {
        self.conn
            .query_row(&format!("{RUN_SELECT} WHERE id = ?1"), params![id.to_string()], row_to_run)
            .optional()
            .map_err(Error::from)
    }

    pub fn update_run_status(&self, id: Uuid, status: RunStatus, error_message: Option<&str>) -> Result<()> {
        self.conn.execute(
            "UPDATE runs SET status = ?2, error_message = ?3, updated_at = ?4 WHERE id = ?1",
            params![id.to_string(), run_status_str(status), error_message, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn update_run_pid(&self, id: Uuid, pid: Option<u32>) -> Result<()> {
        self.conn.execute(
            "UPDATE runs SET pid = ?2, updated_at = ?3 WHERE id = ?1",
            params![id.to_string(), pid, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn update_run_metrics(&self, id: Uuid, tokens_in: u64, tokens_out: u64) -> Result<()> {
        self.conn.execute(
            "UPDATE runs SET tokens_in = tokens_in + ?2, tokens_out = tokens_out + ?3, updated_at = ?4
             WHERE id = ?1",
            params![id.to_string(), tokens_in as i64, tokens_out as i64, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn update_run_duration(&self, id: Uuid, duration_ms: u64) -> Result<()> {
        self.conn.execute(
            "UPDATE runs SET duration_ms = ?2, updated_at = ?3 WHERE id = ?1",
            params![id.to_string(), duration_ms as i64, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn update_run_prompt(&self, id: Uuid, prompt: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE runs SET prompt = ?2, updated_at = ?3 WHERE id = ?1",
            params![id.to_string(), prompt, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn update_run_title(&self, id: Uuid, title: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE runs SET title = ?2, updated_at = ?3 WHERE id = ?1",
            params![id.to_string(), title, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    // --- events ---------------------------------------------------------

    pub fn append_event(&self, event: &Event) -> Result<()> {
        self.conn.execute(
            "INSERT INTO events (
                id, run_id, session_id, kind, sequence, timestamp, payload,
                parent_event_id, role, content, content_type, tool_name, tool_id,
                tool_input, tool_output, is_error
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16)",
            params![
                event.id.to_string(),
                event.run_id.to_string(),
                event.session_id.to_string(),
                event_kind_str(event.kind),
                event.sequence as i64,
                event.timestamp.to_rfc3339(),
                serde_json::to_string(&event.payload.to_json())?,
                event.parent_event_id.map(|u| u.to_string()),
                event.role,
                event.content,
                event.content_type,
                event.tool_name,
                event.tool_id,
                event.tool_input.as_ref().map(serde_json::to_string).transpose()?,
                event.tool_output,
                event.is_error,
            ],
        )?;
        Ok(())
    }

    pub fn get_events_for_run(&self, run_id: Uuid, from_sequence: u64) -> Result<Vec<Event>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, run_id, session_id, kind, sequence, timestamp, payload,
                    parent_event_id, role, content, content_type, tool_name, tool_id,
                    tool_input, tool_output, is_error
             FROM events WHERE run_id = ?1 AND sequence >= ?2 ORDER BY sequence ASC",
        )?;
        let rows = stmt.query_map(params![run_id.to_string(), from_sequence as i64], row_to_event)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    pub fn get_event(&self, id: Uuid) -> Result<Option<Event>> {
        self.conn
            .query_row(
                "SELECT id, run_id, session_id, kind, sequence, timestamp, payload,
                        parent_event_id, role, content, content_type, tool_name, tool_id,
                        tool_input, tool_output, is_error
                 FROM events WHERE id = ?1",
                params![id.to_string()],
                row_to_event,
            )
            .optional()
            .map_err(Error::from)
    }

    pub fn get_last_sequence(&self, run_id: Uuid) -> Result<u64> {
        let max: Option<i64> = self.conn.query_row(
            "SELECT MAX(sequence) FROM events WHERE run_id = ?1",
            params![run_id.to_string()],
            |r| r.get(0),
        )?;
        Ok(max.map(|v| v as u64 + 1).unwrap_or(0))
    }

    // --- git snapshots ----------------------------------------------------

    pub fn create_git_snapshot(&self, snapshot: &GitSnapshot) -> Result<()> {
        self.conn.execute(
            "INSERT INTO git_snapshots (
                id, run_id, event_id, commit_hash, branch, dirty_files, staged_files,
                untracked_files, diff_stat, is_git_repo, created_at
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)",
            params![
                snapshot.id.to_string(),
                snapshot.run_id.to_string(),
                snapshot.event_id.map(|u| u.to_string()),
                snapshot.commit_hash,
                snapshot.branch,
                serde_json::to_string(&snapshot.dirty_files)?,
                serde_json::to_string(&snapshot.staged_files)?,
                serde_json::to_string(&snapshot.untracked_files)?,
                snapshot.diff_stat,
                snapshot.is_git_repo,
                snapshot.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    // --- agents / agent runs / patterns -----------------------------------

    pub fn create_agent(&self, agent: &Agent) -> Result<()> {
        self.conn.execute(
            "INSERT INTO agents (id, name, role_prompt, model, created_at) VALUES (?1,?2,?3,?4,?5)",
            params![
                agent.id.to_string(),
                agent.name,
                agent.role_prompt,
                agent.model,
                agent.created_at.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    pub fn get_agent(&self, id: Uuid) -> Result<Option<Agent>> {
        self.conn
            .query_row(
                "SELECT id, name, role_prompt, model, created_at FROM agents WHERE id = ?1",
                params![id.to_string()],
                row_to_agent,
            )
            .optional()
            .map_err(Error::from)
    }

    pub fn create_agent_run(&self, agent_run: &AgentRun) -> Result<()> {
        self.conn.execute(
            "INSERT INTO agent_runs (
                id, pattern_execution_id, agent_id, agent_name, run_id, round,
                tokens_in, tokens_out, output, status, error_message, created_at
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12)",
            params![
                agent_run.id.to_string(),
                agent_run.pattern_execution_id.to_string(),
                agent_run.agent_id.map(|u| u.to_string()),
                agent_run.agent_name,
                agent_run.run_id.to_string(),
                agent_run.round,
                agent_run.tokens_in as i64,
                agent_run.tokens_out as i64,
                agent_run.output,
                agent_run_status_str(agent_run.status),
                agent_run.error_message,
                agent_run.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn update_agent_run_status(
        &self,
        id: Uuid,
        status: AgentRunStatus,
        output: Option<&str>,
        error_message: Option<&str>,
        tokens_in: u64,
        tokens_out: u64,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE agent_runs SET status = ?2, output = ?3, error_message = ?4,
                tokens_in = ?5, tokens_out = ?6 WHERE id = ?1",
            params![
                id.to_string(),
                agent_run_status_str(status),
                output,
                error_message,
                tokens_in as i64,
                tokens_out as i64
            ],
        )?;
        Ok(())
    }

    pub fn create_agent_pattern(&self, pattern: &AgentPattern) -> Result<()> {
        self.conn.execute(
            "INSERT INTO agent_patterns (id, name, pattern_type, human_involvement, config, created_at)
             VALUES (?1,?2,?3,?4,?5,?6)",
            params![
                pattern.id.to_string(),
                pattern.name,
                pattern_type_str(pattern.pattern_type),
                human_involvement_str(pattern.human_involvement),
                serde_json::to_string(&pattern.config)?,
                pattern.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_agent_pattern(&self, id: Uuid) -> Result<Option<AgentPattern>> {
        self.conn
            .query_row(
                "SELECT id, name, pattern_type, human_involvement, config, created_at
                 FROM agent_patterns WHERE id = ?1",
                params![id.to_string()],
                row_to_agent_pattern,
            )
            .optional()
            .map_err(Error::from)
    }

    // --- session snapshots --------------------------------------------------

    pub fn create_session_snapshot(&self, snapshot: &SessionSnapshot) -> Result<()> {
        self.conn.execute(
            "INSERT INTO session_snapshots (id, run_id, session_id, goal, summary, resume_prompt, created_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7)",
            params![
                snapshot.id.to_string(),
                snapshot.run_id.to_string(),
                snapshot.session_id.to_string(),
                snapshot.goal,
                snapshot.summary,
                snapshot.resume_prompt,
                snapshot.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_latest_session_snapshot(&self, session_id: Uuid) -> Result<Option<SessionSnapshot>> {
        self.conn
            .query_row(
                "SELECT id, run_id, session_id, goal, summary, resume_prompt, created_at
                 FROM session_snapshots WHERE session_id = ?1 ORDER BY created_at DESC LIMIT 1",
                params![session_id.to_string()],
                row_to_session_snapshot,
            )
            .optional()
            .map_err(Error::from)
    }

    // --- run memory entries --------------------------------------------------

    pub fn upsert_run_memory(&self, entry: &RunMemoryEntry) -> Result<()> {
        self.conn.execute(
            "INSERT INTO run_memory_entries (id, run_id, session_id, objective, short_summary, memory, created_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7)
             ON CONFLICT(run_id) DO UPDATE SET
                objective = excluded.objective,
                short_summary = excluded.short_summary,
                memory = excluded.memory,
                created_at = excluded.created_at",
            params![
                entry.id.to_string(),
                entry.run_id.to_string(),
                entry.session_id.to_string(),
                entry.objective,
                entry.short_summary,
                serde_json::to_string(&entry.memory)?,
                entry.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_run_memory_entries_for_session(&self, session_id: Uuid) -> Result<Vec<RunMemoryEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, run_id, session_id, objective, short_summary, memory, created_at
             FROM run_memory_entries WHERE session_id = ?1 ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map(params![session_id.to_string()], row_to_run_memory_entry)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }
}

const RUN_SELECT: &str = "SELECT id, session_id, prompt, title, model, status, is_interactive,
    parent_run_id, branch_point_event_id, pid, tokens_in, tokens_out, cost_usd,
    duration_ms, error_message, created_at, updated_at FROM runs";

fn row_to_session(row: &Row) -> rusqlite::Result<Session> {
    Ok(Session {
        id: parse_uuid(row.get::<_, String>(0)?),
        name: row.get(1)?,
        working_dir: row.get(2)?,
        status: parse_session_status(&row.get::<_, String>(3)?),
        created_at: parse_time(row.get::<_, String>(4)?),
        updated_at: parse_time(row.get::<_, String>(5)?),
    })
}

fn row_to_run(row: &Row) -> rusqlite::Result<Run> {
    Ok(Run {
        id: parse_uuid(row.get::<_, String>(0)?),
        session_id: parse_uuid(row.get::<_, String>(1)?),
        prompt: row.get(2)?,
        title: row.get(3)?,
        model: row.get(4)?,
        status: parse_run_status(&row.get::<_, String>(5)?),
        is_interactive: row.get(6)?,
        parent_run_id: row.get::<_, Option<String>>(7)?.map(parse_uuid),
        branch_point_event_id: row.get::<_, Option<String>>(8)?.map(parse_uuid),
        pid: row.get(9)?,
        tokens_in: row.get::<_, i64>(10)? as u64,
        tokens_out: row.get::<_, i64>(11)? as u64,
        cost_usd: row.get(12)?,
        duration_ms: row.get::<_, i64>(13)? as u64,
        error_message: row.get(14)?,
        created_at: parse_time(row.get::<_, String>(15)?),
        updated_at: parse_time(row.get::<_, String>(16)?),
    })
}

fn row_to_event(row: &Row) -> rusqlite::Result<Event> {
    let payload_text: String = row.get(6)?;
    let payload: Payload = serde_json::from_str(&payload_text).unwrap_or_else(|_| {
        let value: serde_json::Value =
            serde_json::from_str(&payload_text).unwrap_or(serde_json::Value::Null);
        Payload::Generic(value)
    });
    let tool_input_text: Option<String> = row.get(13)?;
    let tool_input = tool_input_text.and_then(|t| serde_json::from_str(&t).ok());

    Ok(Event {
        id: parse_uuid(row.get::<_, String>(0)?),
        run_id: parse_uuid(row.get::<_, String>(1)?),
        session_id: parse_uuid(row.get::<_, String>(2)?),
        kind: parse_event_kind(&row.get::<_, String>(3)?),
        sequence: row.get::<_, i64>(4)? as u64,
        timestamp: parse_time(row.get::<_, String>(5)?),
        payload,
        parent_event_id: row.get::<_, Option<String>>(7)?.map(parse_uuid),
        role: row.get(8)?,
        content: row.get(9)?,
        content_type: row.get(10)?,
        tool_name: row.get(11)?,
        tool_id: row.get(12)?,
        tool_input,
        tool_output: row.get(14)?,
        is_error: row.get(15)?,
    })
}

fn row_to_agent(row: &Row) -> rusqlite::Result<Agent> {
    Ok(Agent {
        id: parse_uuid(row.get::<_, String>(0)?),
        name: row.get(1)?,
        role_prompt: row.get(2)?,
        model: row.get(3)?,
        created_at: parse_time(row.get::<_, String>(4)?),
    })
}

fn row_to_agent_pattern(row: &Row) -> rusqlite::Result<AgentPattern> {
    let config_text: String = row.get(4)?;
    Ok(AgentPattern {
        id: parse_uuid(row.get::<_, String>(0)?),
        name: row.get(1)?,
        pattern_type: parse_pattern_type(&row.get::<_, String>(2)?),
        human_involvement: parse_human_involvement(&row.get::<_, String>(3)?),
        config: serde_json::from_str(&config_text).unwrap_or(serde_json::Value::Null),
        created_at: parse_time(row.get::<_, String>(5)?),
    })
}

fn row_to_session_snapshot(row: &Row) -> rusqlite::Result<SessionSnapshot> {
    Ok(SessionSnapshot {
        id: parse_uuid(row.get::<_, String>(0)?),
        run_id: parse_uuid(row.get::<_, String>(1)?),
        session_id: parse_uuid(row.get::<_, String>(2)?),
        goal: row.get(3)?,
        summary: row.get(4)?,
        resume_prompt: row.get(5)?,
        created_at: parse_time(row.get::<_, String>(6)?),
    })
}

fn row_to_run_memory_entry(row: &Row) -> rusqlite::Result<RunMemoryEntry> {
    let memory_text: String = row.get(5)?;
    let memory: RunMemory = serde_json::from_str(&memory_text).unwrap_or_default();
    Ok(RunMemoryEntry {
        id: parse_uuid(row.get::<_, String>(0)?),
        run_id: parse_uuid(row.get::<_, String>(1)?),
        session_id: parse_uuid(row.get::<_, String>(2)?),
        objective: row.get(3)?,
        short_summary: row.get(4)?,
        memory,
        created_at: parse_time(row.get::<_, String>(6)?),
    })
}

fn parse_uuid(s: String) -> Uuid {
    Uuid::parse_str(&s).unwrap_or_default()
}

fn parse_time(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn status_str(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Active => "active",
        SessionStatus::Paused => "paused",
        SessionStatus::Completed => "completed",
        SessionStatus::Failed => "failed",
    }
}

fn parse_session_status(s: &str) -> SessionStatus {
    match s {
        "paused" => SessionStatus::Paused,
        "completed" => SessionStatus::Completed,
        "failed" => SessionStatus::Failed,
        _ => SessionStatus::Active,
    }
}

fn run_status_str(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Created => "created",
        RunStatus::Running => "running",
        RunStatus::Paused => "paused",
        RunStatus::Completed => "completed",
        RunStatus::Failed => "failed",
    }
}

fn parse_run_status(s: &str) -> RunStatus {
    match s {
        "running" => RunStatus::Running,
        "paused" => RunStatus::Paused,
        "completed" => RunStatus::Completed,
        "failed" => RunStatus::Failed,
        _ => RunStatus::Created,
    }
}

fn event_kind_str(kind: EventKind) -> String {
    serde_json::to_value(kind)
        .ok()
        .and_then(|v| v.as_str().map(String::from))
        .unwrap_or_default()
}

fn parse_event_kind(s: &str) -> EventKind {
    serde_json::from_value(serde_json::Value::String(s.to_string())).unwrap_or(EventKind::StreamAssistant)
}

fn agent_run_status_str(status: AgentRunStatus) -> &'static str {
    match status {
        AgentRunStatus::Running => "running",
        AgentRunStatus::Completed => "completed",
        AgentRunStatus::Failed => "failed",
        AgentRunStatus::Aborted => "aborted",
    }
}

fn pattern_type_str(p: PatternType) -> &'static str {
    match p {
        PatternType::Solo => "solo",
        PatternType::Loop => "loop",
        PatternType::Panel => "panel",
        PatternType::Debate => "debate",
    }
}

fn parse_pattern_type(s: &str) -> PatternType {
    match s {
        "loop" => PatternType::Loop,
        "panel" => PatternType::Panel,
        "debate" => PatternType::Debate,
        _ => PatternType::Solo,
    }
}

fn human_involvement_str(h: HumanInvolvement) -> &'static str {
    match h {
        HumanInvolvement::Autonomous => "autonomous",
        HumanInvolvement::Checkpoints => "checkpoints",
        HumanInvolvement::OnDemand => "on_demand",
    }
}

fn parse_human_involvement(s: &str) -> HumanInvolvement {
    match s {
        "checkpoints" => HumanInvolvement::Checkpoints,
        "on_demand" => HumanInvolvement::OnDemand,
        _ => HumanInvolvement::Autonomous,
    }
}
