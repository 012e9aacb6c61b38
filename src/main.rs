// hnsresolve - entry point.

use clap::Parser;
use hnsresolve::cli::{Cli, Commands};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_filter = if cli.verbose { "debug" } else { &cli.log_level };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_filter)))
        .init();

    let result = match cli.command {
        Commands::Sync(cmd) => hnsresolve::cli::runner::run_sync(cmd).await,
        Commands::Query(cmd) => hnsresolve::cli::runner::run_query(cmd).await,
        Commands::Info(cmd) => hnsresolve::cli::runner::run_info(cmd).await,
    };

    if let Err(e) = result {
        error!("{e}");
        return Err(anyhow::anyhow!(e));
    }

    Ok(())
}
