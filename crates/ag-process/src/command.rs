use tokio::process::Command;

/// The child coding-assistant binary. Overridable only by the `ag-testing`
/// fake (via `ASSISTANT_BIN` env var) so tests never shell out to the real
/// assistant.
pub fn assistant_bin() -> String {
    std::env::var("AG_ASSISTANT_BIN").unwrap_or_else(|_| "claude".to_string())
}

/// `claude -p --verbose --output-format stream-json --include-partial-messages
///  --model <model> --dangerously-skip-permissions <prompt>`
pub fn one_shot_args(model: &str, prompt: &str) -> Vec<String> {
    let mut args = base_args(model);
    args.push(prompt.to_string());
    args
}

/// Same base flags; the first turn of a claude-session establishes its id
/// with `--session-id`, every later turn resumes it with `--resume`.
pub fn interactive_args(model: &str, claude_session_id: &str, turn_count: u32, message: &str) -> Vec<String> {
    let mut args = base_args(model);
    if turn_count == 1 {
        args.push("--session-id".to_string());
        args.push(claude_session_id.to_string());
    } else {
        args.push("--resume".to_string());
        args.push(claude_session_id.to_string());
    }
    args.push(message.to_string());
    args
}

fn base_args(model: &str) -> Vec<String> {
    vec![
        "-p".to_string(),
        "--verbose".to_string(),
        "--output-format".to_string(),
        "stream-json".to_string(),
        "--include-partial-messages".to_string(),
        "--model".to_string(),
        model.to_string(),
        "--dangerously-skip-permissions".to_string(),
    ]
}

/// Builds the spawn-ready `Command`, with stdin closed (the assistant is
/// always driven non-interactively over argv, never over stdin) and the
/// non-interactive marker set the same way the original shell wrapper did.
pub fn build_command(args: &[String], working_dir: &std::path::Path) -> Command {
    let mut cmd = Command::new(assistant_bin());
    cmd.args(args)
        .current_dir(working_dir)
        .env("CLAUDE_CODE_NONINTERACTIVE", "1")
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped());
    cmd
}
