use std::path::PathBuf;

use clap::{Parser, Subcommand};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "agentling")]
#[command(about = "Drive, observe, and orchestrate a child coding-assistant process", long_about = None)]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Override the default model for this invocation")]
    pub model: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Start a one-shot run in a working directory and stream its events")]
    Run {
        working_dir: PathBuf,
        prompt: String,
    },

    #[command(about = "Branch an existing run from one of its past events")]
    Branch {
        run_id: Uuid,
        from_event_id: Uuid,
        #[arg(long, help = "Replace the branched run's starting prompt")]
        prompt: Option<String>,
        #[arg(long, help = "Stream the new run's events once it starts")]
        stream: bool,
    },

    #[command(about = "Replay a run's persisted events from the log")]
    Replay {
        run_id: Uuid,
        #[arg(long, default_value_t = 0)]
        from_sequence: u64,
    },

    #[command(about = "Start an interactive, multi-turn session in a working directory")]
    Interactive {
        working_dir: PathBuf,
    },

    #[command(about = "Run a saved multi-agent pattern")]
    Patterns {
        #[command(subcommand)]
        command: PatternsCommand,
    },
}

#[derive(Subcommand)]
pub enum PatternsCommand {
    #[command(about = "Execute a saved pattern against a working directory")]
    Run {
        pattern_id: Uuid,
        working_dir: PathBuf,
        input: String,
    },
}
