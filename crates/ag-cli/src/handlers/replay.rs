use anyhow::Result;
use uuid::Uuid;

use crate::context::Context;

pub fn handle(ctx: &Context, run_id: Uuid, from_sequence: u64) -> Result<()> {
    let events = ctx.bus.replay(run_id, from_sequence, None)?;
    if events.is_empty() {
        println!("no events for run {run_id} from sequence {from_sequence}");
        return Ok(());
    }
    for event in &events {
        println!("[{:>6}] {:?}  {}", event.sequence, event.kind, event.content.as_deref().unwrap_or(""));
    }
    Ok(())
}
