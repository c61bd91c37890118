use ag_cli::Cli;
use clap::Parser;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    if let Err(e) = ag_cli::run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
