// Runner - drives the resolver for each CLI subcommand.

use thiserror::Error;
use tracing::{error, info};

use crate::cli::config::parse_name_hash;
use crate::cli::{InfoCmd, QueryCmd, SyncCmd};
use crate::query::NameQueryResult;
use crate::{Config, Resolver};

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("configuration error: {0}")]
    Config(#[from] crate::error::ConfigError),

    #[error("resolver error: {0}")]
    Resolver(#[from] crate::error::ResolverError),
}

pub async fn run_sync(cmd: SyncCmd) -> Result<(), RunnerError> {
    let config = Config::from_sync_cmd(&cmd)?;
    info!("data dir: {}", config.data_dir.display());

    let mut resolver = Resolver::init(config)?;
    let result = resolver.sync().await;

    if result.success {
        info!(tip = resolver.tip_height(), network_height = ?result.network_height, "sync succeeded");
    } else {
        error!(network_height = ?result.network_height, "sync did not advance the chain against any candidate peer");
    }
    Ok(())
}

pub async fn run_query(cmd: QueryCmd) -> Result<(), RunnerError> {
    let name_hash = parse_name_hash(&cmd.name_hash)?;
    let config = Config::from_query_cmd(&cmd)?;
    let mut resolver = Resolver::init(config)?;

    match resolver.query(name_hash).await {
        NameQueryResult::Success { records, proof } => {
            info!("resolved: {} bytes of records, {} byte proof", records.len(), proof.len());
            println!("records: {}", hex::encode(&records));
            println!("proof: {}", hex::encode(&proof));
        }
        NameQueryResult::NotFound => {
            info!("name not found under current chain root");
            println!("not found");
        }
        NameQueryResult::Error => {
            error!("query failed: insufficient peer evidence");
            println!("error: could not resolve");
        }
    }
    Ok(())
}

pub async fn run_info(cmd: InfoCmd) -> Result<(), RunnerError> {
    let base_path = cmd.base_path.unwrap_or_else(|| {
        dirs::data_dir().unwrap_or_else(|| std::path::PathBuf::from(".")).join("hnsresolve")
    });
    let config = Config { data_dir: base_path, ..Config::default() };
    let resolver = Resolver::init(config)?;

    println!("tip height: {}", resolver.tip_height());
    println!("network height: {:?}", resolver.network_height());
    Ok(())
}
