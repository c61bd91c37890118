mod branch;
mod interactive;
mod patterns;
mod replay;
mod run;

pub use branch::handle as handle_branch;
pub use interactive::handle as handle_interactive;
pub use patterns::handle_run as handle_patterns_run;
pub use replay::handle as handle_replay;
pub use run::handle as handle_run;

use ag_types::{Event, EventKind, Payload};
use serde_json::Value;

/// One line per event, in the style of `agtrace-cli`'s plain-text timeline:
/// a sequence number, the kind, and whatever text content the event
/// carries. Tool calls and results render their own shorthand since they
/// have no `content` field to fall back on.
pub fn print_event(event: &Event) {
    match event.kind {
        EventKind::StreamAssistant | EventKind::StreamUser | EventKind::StreamSystem => {
            if let Some(content) = &event.content {
                if !content.is_empty() {
                    print!("{content}");
                    use std::io::Write;
                    let _ = std::io::stdout().flush();
                }
            }
        }
        EventKind::StreamToolUse => {
            let name = event.tool_name.as_deref().unwrap_or("?");
            println!("\n[tool] {name} {}", event.tool_input.as_ref().map(Value::to_string).unwrap_or_default());
        }
        EventKind::StreamToolResult => {
            let marker = if event.is_error { "error" } else { "ok" };
            println!("[tool result: {marker}]");
        }
        EventKind::RunStarted => println!("[run {} started]", event.run_id),
        EventKind::RunCompleted => println!("\n[run {} completed]", event.run_id),
        EventKind::RunFailed => {
            let message = match &event.payload {
                Payload::Generic(value) => value.get("error").and_then(Value::as_str).map(str::to_string),
                _ => None,
            };
            println!("\n[run {} failed: {}]", event.run_id, message.unwrap_or_default());
        }
        EventKind::InterventionPause => println!("\n[checkpoint: run {} is waiting for input]", event.run_id),
        _ => {}
    }
}
