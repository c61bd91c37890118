use std::path::PathBuf;

use anyhow::{Context as _, Result};
use uuid::Uuid;

use crate::context::Context;
use crate::handlers::print_event;

pub async fn handle_run(ctx: &Context, pattern_id: Uuid, working_dir: PathBuf, input: String) -> Result<()> {
    let pattern = ctx
        .bus
        .with_store(|store| store.get_agent_pattern(pattern_id))?
        .with_context(|| format!("agent pattern {pattern_id} not found"))?;

    let working_dir_str = working_dir.to_string_lossy().into_owned();
    let session = ctx.sessions.get_or_create_session(&working_dir_str, None)?;

    println!("running pattern \"{}\" ({:?})", pattern.name, pattern.pattern_type);
    let mut rx = ctx.patterns.execute_pattern(pattern, session.id, input, working_dir_str).await?;
    while let Some(event) = rx.recv().await {
        print_event(&event);
    }
    Ok(())
}
