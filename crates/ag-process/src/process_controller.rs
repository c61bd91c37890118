use std::path::PathBuf;
use std::time::Duration;

use ag_parser::StreamParser;
use ag_types::{Event, EventKind, Payload};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::command;
use crate::lifecycle::terminate_gracefully;
use crate::signal;
use crate::{Error, Result};

/// One-shot runs get 5s to exit after SIGTERM before SIGKILL.
const GRACEFUL_TIMEOUT: Duration = Duration::from_secs(5);

/// Drives a single non-interactive invocation of the assistant CLI: spawn,
/// stream its stdout through the parser, support pause/resume via process
/// signals, and terminate gracefully on request.
pub struct ProcessController {
    session_id: Uuid,
    run_id: Uuid,
    working_dir: PathBuf,
    model: String,
    pid: Option<u32>,
    paused: bool,
    terminated: bool,
    terminate_tx: Option<oneshot::Sender<()>>,
}

impl ProcessController {
    pub fn new(session_id: Uuid, run_id: Uuid, working_dir: PathBuf, model: impl Into<String>) -> Self {
        Self {
            session_id,
            run_id,
            working_dir,
            model: model.into(),
            pid: None,
            paused: false,
            terminated: false,
            terminate_tx: None,
        }
    }

    /// Spawns the child process and returns a channel of events: a leading
    /// `run.started`, then the parsed stream, then a trailing
    /// `run.completed`/`run.failed`. The receiver is dropped (channel
    /// closes) once the child exits or is terminated.
    pub async fn start(&mut self, prompt: &str) -> Result<mpsc::Receiver<Event>> {
        if self.pid.is_some() {
            return Err(Error::AlreadyTerminated);
        }

        let args = command::one_shot_args(&self.model, prompt);
        let mut child = command::build_command(&args, &self.working_dir).spawn()?;
        let pid = child.id().unwrap_or(0);
        self.pid = Some(pid);

        let (tx, rx) = mpsc::channel::<Event>(256);
        let (term_tx, term_rx) = oneshot::channel();
        self.terminate_tx = Some(term_tx);

        let started = Event::new(
            self.session_id,
            self.run_id,
            EventKind::RunStarted,
            Payload::Generic(json!({"prompt": prompt, "model": self.model, "pid": pid})),
        );
        let _ = tx.send(started).await;

        let stdout = child.stdout.take().expect("spawned with piped stdout");
        let stderr = child.stderr.take().expect("spawned with piped stderr");
        let parser = StreamParser::new(self.session_id, self.run_id);

        tokio::spawn(drive_child(
            child,
            pid,
            stdout,
            stderr,
            parser,
            tx,
            term_rx,
            self.session_id,
            self.run_id,
        ));

        Ok(rx)
    }

    /// SIGSTOP. No-op if already paused, terminated, or never started.
    pub fn pause(&mut self) {
        if self.terminated || self.paused {
            return;
        }
        if let Some(pid) = self.pid {
            signal::stop(pid);
            self.paused = true;
        }
    }

    /// SIGCONT. No-op unless currently paused.
    pub fn resume(&mut self) {
        if !self.paused {
            return;
        }
        if let Some(pid) = self.pid {
            signal::cont(pid);
            self.paused = false;
        }
    }

    /// Stdin is closed at spawn time, so there is no channel to inject into;
    /// this mirrors the original controller's documented no-op rather than
    /// pretending to support mid-run prompt injection for one-shot runs.
    pub fn inject_input(&self, _message: &str) {}

    /// SIGTERM the child (unpausing it first so it can actually exit),
    /// escalating to SIGKILL after the graceful timeout. Idempotent.
    pub fn terminate(&mut self) {
        if self.terminated {
            return;
        }
        self.terminated = true;
        if let Some(pid) = self.pid {
            if self.paused {
                signal::cont(pid);
                self.paused = false;
            }
        }
        if let Some(tx) = self.terminate_tx.take() {
            let _ = tx.send(());
        }
    }

    pub fn is_running(&self) -> bool {
        self.pid.is_some() && !self.terminated
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }
}

#[allow(clippy::too_many_arguments)]
async fn drive_child(
    mut child: Child,
    pid: u32,
    stdout: tokio::process::ChildStdout,
    mut stderr: tokio::process::ChildStderr,
    mut parser: StreamParser,
    tx: mpsc::Sender<Event>,
    mut term_rx: oneshot::Receiver<()>,
    session_id: Uuid,
    run_id: Uuid,
) {
    // Drained on its own task so a chatty child can't fill the stderr pipe
    // and stall the stdout loop below.
    let (stderr_tx, stderr_rx) = oneshot::channel::<String>();
    tokio::spawn(async move {
        let mut buf = String::new();
        let _ = stderr.read_to_string(&mut buf).await;
        let _ = stderr_tx.send(buf);
    });

    let mut lines = BufReader::new(stdout).lines();
    loop {
        tokio::select! {
            _ = &mut term_rx => {
                terminate_gracefully(&mut child, pid, GRACEFUL_TIMEOUT).await;
                return;
            }
            next = lines.next_line() => {
                match next {
                    Ok(Some(text)) => {
                        if let Some(event) = parser.parse_line(&text) {
                            if tx.send(event).await.is_err() {
                                // The forwarding side is gone (caller stopped draining);
                                // don't leave the child running unattended.
                                terminate_gracefully(&mut child, pid, GRACEFUL_TIMEOUT).await;
                                return;
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(run_id = %run_id, error = %e, "error reading child stdout");
                        break;
                    }
                }
            }
        }
    }

    let final_event = match child.wait().await {
        Ok(status) if status.success() => Event::new(
            session_id,
            run_id,
            EventKind::RunCompleted,
            Payload::Generic(json!({"return_code": status.code()})),
        ),
        Ok(status) => {
            let stderr_text = stderr_rx.await.unwrap_or_default();
            Event::new(
                session_id,
                run_id,
                EventKind::RunFailed,
                Payload::Generic(json!({"return_code": status.code(), "stderr": stderr_text})),
            )
        }
        Err(e) => Event::new(
            session_id,
            run_id,
            EventKind::RunFailed,
            Payload::Generic(json!({"return_code": null, "stderr": e.to_string()})),
        ),
    };
    let _ = tx.send(final_event).await;
}
