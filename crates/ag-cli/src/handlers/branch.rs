use anyhow::Result;
use uuid::Uuid;

use crate::context::Context;
use crate::handlers::print_event;

pub async fn handle(ctx: &Context, run_id: Uuid, from_event_id: Uuid, prompt: Option<&str>, stream: bool) -> Result<()> {
    let branched = ctx.sessions.branch_run(run_id, from_event_id, prompt).await?;
    println!("branched run {run_id} at event {from_event_id} -> new run {}", branched.id);

    if !stream {
        return Ok(());
    }

    let mut rx = ctx.sessions.stream_events(branched.id).await?;
    while let Some(event) = rx.recv().await {
        print_event(&event);
    }
    Ok(())
}
