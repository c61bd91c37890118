use std::path::PathBuf;
use std::time::Duration;

use ag_parser::StreamParser;
use ag_types::{Event, EventKind, Payload};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::command;
use crate::lifecycle::terminate_gracefully;
use crate::{Error, Result};

const TERMINATE_TIMEOUT: Duration = Duration::from_secs(5);
const INTERRUPT_TIMEOUT: Duration = Duration::from_secs(2);

type TerminateRequest = (Duration, oneshot::Sender<()>);

/// Drives a multi-turn conversation with the assistant CLI. Each turn is a
/// fresh process resumed against the same `claude_session_id`, established
/// on the first turn via `--session-id` and resumed thereafter via
/// `--resume`, so the assistant keeps its own conversational memory across
/// turns even though our process does not.
pub struct InteractiveController {
    session_id: Uuid,
    run_id: Uuid,
    working_dir: PathBuf,
    model: String,
    claude_session_id: String,
    turn_count: u32,
    is_running: bool,
    current_pid: Option<u32>,
    current_terminate_tx: Option<oneshot::Sender<TerminateRequest>>,
}

impl InteractiveController {
    pub fn new(session_id: Uuid, run_id: Uuid, working_dir: PathBuf, model: impl Into<String>) -> Self {
        Self {
            session_id,
            run_id,
            working_dir,
            model: model.into(),
            claude_session_id: Uuid::new_v4().to_string(),
            turn_count: 0,
            is_running: false,
            current_pid: None,
            current_terminate_tx: None,
        }
    }

    /// Marks the session live and returns the `run.started` event the
    /// caller should publish; does not spawn a process (the first turn
    /// does that).
    pub fn initialize(&mut self) -> Event {
        self.is_running = true;
        Event::new(
            self.session_id,
            self.run_id,
            EventKind::RunStarted,
            Payload::Generic(json!({
                "model": self.model,
                "interactive": true,
                "claude_session_id": self.claude_session_id,
            })),
        )
    }

    /// Spawns one turn and returns a channel yielding a leading
    /// `stream.user` event for `message` followed by the parsed response
    /// stream. No terminal completion event is emitted per turn; the
    /// channel simply closes when the turn's process exits.
    pub async fn send_message(&mut self, message: &str) -> Result<mpsc::Receiver<Event>> {
        if !self.is_running {
            return Err(Error::NotRunning);
        }
        self.turn_count += 1;

        let (tx, rx) = mpsc::channel::<Event>(256);

        let mut user_event = Event::new(
            self.session_id,
            self.run_id,
            EventKind::StreamUser,
            Payload::Generic(json!({"turn": self.turn_count})),
        );
        user_event.role = Some("user".to_string());
        user_event.content = Some(message.to_string());
        let _ = tx.send(user_event).await;

        let args = command::interactive_args(&self.model, &self.claude_session_id, self.turn_count, message);
        let mut child = command::build_command(&args, &self.working_dir).spawn()?;
        let pid = child.id().unwrap_or(0);
        self.current_pid = Some(pid);

        let (term_tx, term_rx) = oneshot::channel();
        self.current_terminate_tx = Some(term_tx);

        let stdout = child.stdout.take().expect("spawned with piped stdout");
        let stderr = child.stderr.take().expect("spawned with piped stderr");
        let parser = StreamParser::new(self.session_id, self.run_id);

        tokio::spawn(drive_turn(child, pid, stdout, stderr, parser, tx, term_rx));

        Ok(rx)
    }

    /// Terminates only the in-flight turn (SIGTERM, 2s grace, SIGKILL),
    /// leaving the session otherwise live for the next `send_message`.
    /// Returns `false` if no turn was in flight.
    pub async fn interrupt_current_response(&mut self) -> bool {
        let Some(tx) = self.current_terminate_tx.take() else {
            return false;
        };
        let (ack_tx, ack_rx) = oneshot::channel();
        if tx.send((INTERRUPT_TIMEOUT, ack_tx)).is_err() {
            self.current_pid = None;
            return false;
        }
        let _ = ack_rx.await;
        self.current_pid = None;
        true
    }

    /// Ends the whole session: SIGTERM the in-flight turn if any (5s grace,
    /// SIGKILL), then marks the session no longer running.
    pub async fn terminate(&mut self) {
        self.is_running = false;
        if let Some(tx) = self.current_terminate_tx.take() {
            let (ack_tx, ack_rx) = oneshot::channel();
            if tx.send((TERMINATE_TIMEOUT, ack_tx)).is_ok() {
                let _ = ack_rx.await;
            }
        }
        self.current_pid = None;
    }

    pub fn is_running(&self) -> bool {
        self.is_running
    }

    pub fn pid(&self) -> Option<u32> {
        self.current_pid
    }

    pub fn claude_session_id(&self) -> &str {
        &self.claude_session_id
    }
}

async fn drive_turn(
    mut child: Child,
    pid: u32,
    stdout: ChildStdout,
    mut stderr: ChildStderr,
    mut parser: StreamParser,
    tx: mpsc::Sender<Event>,
    mut term_rx: oneshot::Receiver<TerminateRequest>,
) {
    tokio::spawn(async move {
        let mut discard = String::new();
        let _ = stderr.read_to_string(&mut discard).await;
    });

    let mut lines = BufReader::new(stdout).lines();
    loop {
        tokio::select! {
            signal = &mut term_rx => {
                if let Ok((timeout, ack)) = signal {
                    terminate_gracefully(&mut child, pid, timeout).await;
                    let _ = ack.send(());
                }
                return;
            }
            next = lines.next_line() => {
                match next {
                    Ok(Some(text)) => {
                        if let Some(event) = parser.parse_line(&text) {
                            if tx.send(event).await.is_err() {
                                return;
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(_) => break,
                }
            }
        }
    }
    let _ = child.wait().await;
}
