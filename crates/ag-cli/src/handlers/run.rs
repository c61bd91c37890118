use std::path::PathBuf;

use anyhow::Result;

use crate::context::Context;
use crate::handlers::print_event;

pub async fn handle(ctx: &Context, working_dir: PathBuf, prompt: String, model: Option<&str>) -> Result<()> {
    let working_dir = working_dir.to_string_lossy().into_owned();
    let session = ctx.sessions.get_or_create_session(&working_dir, None)?;
    let model = ctx.model(model);
    let run = ctx.sessions.start_run(session.id, &prompt, &model, None, None).await?;

    println!("run {} started in {}", run.id, working_dir);
    let mut rx = ctx.sessions.stream_events(run.id).await?;
    while let Some(event) = rx.recv().await {
        print_event(&event);
    }

    let finished = ctx.sessions.get_run_status(run.id)?;
    println!(
        "\nstatus: {:?}, tokens in/out: {}/{}, duration: {}ms",
        finished.status, finished.tokens_in, finished.tokens_out, finished.duration_ms
    );
    Ok(())
}
