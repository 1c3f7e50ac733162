use anyhow::Result;
use clap::Parser;
use stagehand::{Cli, Commands, commands};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Load(args) => commands::load::run(args).await?,
    };
    Ok(())
}
