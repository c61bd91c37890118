use anyhow::Result;

use crate::args::{Cli, Commands, PatternsCommand};
use crate::config::Config;
use crate::context::Context;
use crate::handlers;

pub async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let ctx = Context::bootstrap(config)?;
    let model = cli.model.as_deref();

    match cli.command {
        Commands::Run { working_dir, prompt } => handlers::handle_run(&ctx, working_dir, prompt, model).await,
        Commands::Branch { run_id, from_event_id, prompt, stream } => {
            handlers::handle_branch(&ctx, run_id, from_event_id, prompt.as_deref(), stream).await
        }
        Commands::Replay { run_id, from_sequence } => handlers::handle_replay(&ctx, run_id, from_sequence),
        Commands::Interactive { working_dir } => handlers::handle_interactive(&ctx, working_dir, model).await,
        Commands::Patterns { command } => match command {
            PatternsCommand::Run { pattern_id, working_dir, input } => {
                handlers::handle_patterns_run(&ctx, pattern_id, working_dir, input).await
            }
        },
    }
}
