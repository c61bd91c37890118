use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::context::Context;
use crate::handlers::print_event;

/// A REPL over one interactive session: each line of stdin becomes a turn,
/// printed as it streams back, until an empty line or EOF ends the
/// session. `send_interactive_message` doesn't hand back a channel of its
/// own turn's events (they're published onto the shared bus alongside
/// every other run's), so this subscribes once up front and filters on
/// `run.id` rather than opening a new subscription per turn.
pub async fn handle(ctx: &Context, working_dir: PathBuf, model: Option<&str>) -> Result<()> {
    let working_dir = working_dir.to_string_lossy().into_owned();
    let session = ctx.sessions.get_or_create_session(&working_dir, None)?;
    let model = ctx.model(model);
    let run = ctx.sessions.start_interactive_session(session.id, &model).await?;
    println!("interactive session started (run {}). empty line to end.", run.id);

    let run_id = run.id;
    let subscription = ctx.bus.subscribe_all(move |event: &ag_types::Event| {
        if event.run_id == run_id {
            print_event(event);
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        use std::io::Write;
        let _ = std::io::stdout().flush();

        let Some(line) = lines.next_line().await? else { break };
        if line.trim().is_empty() {
            break;
        }

        ctx.sessions.send_interactive_message(run.id, &line).await?;
        while ctx.sessions.is_interactive_responding(run.id).await {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        println!();
    }

    ctx.bus.unsubscribe(subscription);
    ctx.sessions.end_interactive_session(run.id).await?;
    println!("session ended.");
    Ok(())
}
