use ag_cli::Cli;
use ag_testing::{one_shot_transcript, FakeAssistant};
use clap::Parser;

fn set_assistant_bin(script: &std::path::Path) {
    // Safety: each test points this at its own tempdir-local script before
    // spawning anything; cargo test's per-binary separation keeps these
    // tests from racing each other over the env var.
    unsafe {
        std::env::set_var("AG_ASSISTANT_BIN", script);
    }
}

fn set_home(dir: &std::path::Path) {
    // Safety: same isolation argument as `set_assistant_bin` — each test
    // gets its own tempdir, so config/db paths under it never collide.
    unsafe {
        std::env::set_var("HOME", dir);
    }
}

#[tokio::test]
async fn run_command_streams_to_completion() {
    let home = tempfile::tempdir().unwrap();
    set_home(home.path());

    let project = tempfile::tempdir().unwrap();
    let script = FakeAssistant::new().with_lines(one_shot_transcript(15, 5)).with_exit_code(0).write_script(project.path());
    set_assistant_bin(&script);

    let cli = Cli::try_parse_from(["agentling", "run", project.path().to_str().unwrap(), "fix the bug"]).unwrap();
    ag_cli::run(cli).await.unwrap();
}

#[tokio::test]
async fn replay_of_an_unknown_run_reports_no_events_instead_of_erroring() {
    let home = tempfile::tempdir().unwrap();
    set_home(home.path());

    let cli = Cli::try_parse_from(["agentling", "replay", &uuid::Uuid::new_v4().to_string()]).unwrap();
    ag_cli::run(cli).await.unwrap();
}

#[test]
fn cli_rejects_an_unknown_subcommand() {
    let result = Cli::try_parse_from(["agentling", "not-a-real-command"]);
    assert!(result.is_err());
}
