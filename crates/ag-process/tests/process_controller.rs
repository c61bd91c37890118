use ag_process::ProcessController;
use ag_testing::{one_shot_transcript, FakeAssistant};
use ag_types::EventKind;
use uuid::Uuid;

fn set_assistant_bin(script: &std::path::Path) {
    // Safety: tests in this file run single-threaded via `--test-threads=1`
    // semantics of the shared fixture dir; each test uses its own tempdir.
    unsafe {
        std::env::set_var("AG_ASSISTANT_BIN", script);
    }
}

#[tokio::test]
async fn one_shot_run_streams_events_then_completes() {
    let dir = tempfile::tempdir().unwrap();
    let script = FakeAssistant::new()
        .with_lines(one_shot_transcript(120, 45))
        .with_exit_code(0)
        .write_script(dir.path());
    set_assistant_bin(&script);

    let mut controller = ProcessController::new(Uuid::new_v4(), Uuid::new_v4(), dir.path().to_path_buf(), "sonnet");
    let mut rx = controller.start("fix the bug").await.unwrap();

    let mut kinds = Vec::new();
    while let Some(event) = rx.recv().await {
        kinds.push(event.kind);
    }

    assert_eq!(kinds.first(), Some(&EventKind::RunStarted));
    assert!(kinds.contains(&EventKind::StreamAssistant));
    assert!(kinds.contains(&EventKind::StreamToolUse));
    assert_eq!(kinds.last(), Some(&EventKind::RunCompleted));
}

#[tokio::test]
async fn nonzero_exit_emits_run_failed_with_stderr() {
    let dir = tempfile::tempdir().unwrap();
    let script = FakeAssistant::new()
        .with_exit_code(1)
        .with_stderr("boom")
        .write_script(dir.path());
    set_assistant_bin(&script);

    let mut controller = ProcessController::new(Uuid::new_v4(), Uuid::new_v4(), dir.path().to_path_buf(), "sonnet");
    let mut rx = controller.start("do it").await.unwrap();

    let mut last = None;
    while let Some(event) = rx.recv().await {
        last = Some(event);
    }
    let last = last.unwrap();
    assert_eq!(last.kind, EventKind::RunFailed);
    assert_eq!(
        last.payload.to_json().get("stderr").and_then(|v| v.as_str()),
        Some("boom")
    );
}

#[tokio::test]
async fn terminate_stops_a_long_running_process() {
    let dir = tempfile::tempdir().unwrap();
    let script = FakeAssistant::new()
        .with_sleep_before_exit_ms(30_000)
        .write_script(dir.path());
    set_assistant_bin(&script);

    let mut controller = ProcessController::new(Uuid::new_v4(), Uuid::new_v4(), dir.path().to_path_buf(), "sonnet");
    let mut rx = controller.start("long task").await.unwrap();

    // Drain the leading run.started event so the child is confirmed alive.
    let started = rx.recv().await.unwrap();
    assert_eq!(started.kind, EventKind::RunStarted);
    assert!(controller.is_running());

    controller.terminate();

    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(6);
    let mut saw_terminal = false;
    while tokio::time::Instant::now() < deadline {
        match tokio::time::timeout(std::time::Duration::from_millis(500), rx.recv()).await {
            Ok(Some(_)) => continue,
            Ok(None) => {
                saw_terminal = true;
                break;
            }
            Err(_) => continue,
        }
    }
    assert!(saw_terminal, "channel should close once the child is killed");
}

#[tokio::test]
async fn pause_and_resume_are_idempotent_without_a_process() {
    let dir = tempfile::tempdir().unwrap();
    let mut controller = ProcessController::new(Uuid::new_v4(), Uuid::new_v4(), dir.path().to_path_buf(), "sonnet");
    controller.pause();
    controller.resume();
    assert!(!controller.is_paused());
    assert!(!controller.is_running());
}
