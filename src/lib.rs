// hnsresolve: an SPV light-client resolver core for the Handshake naming
// blockchain. Follows the chain's header sequence via a peer-to-peer
// protocol and answers name-resolution queries by requesting cryptographic
// proofs from full-node peers.

pub mod chain;
pub mod cli;
pub mod discovery;
pub mod error;
pub mod protocol;
pub mod query;
pub mod registry;
pub mod sync;
pub mod wire;

use std::path::PathBuf;
use std::time::Duration;

use tracing::{info, warn};

use chain::HeaderChain;
use error::ResolverError;
use query::NameQueryResult;
use registry::PeerRegistry;

const HEADER_STORE_FILE: &str = "headers.dat";

/// Assembled runtime configuration. Built from CLI args via
/// `cli::config::NodeConfig::from_run_cmd`, but usable directly by anyone
/// embedding this crate.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub dns_seeds: Vec<String>,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub exclusion_threshold: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")).join("hnsresolve"),
            dns_seeds: discovery::COMPILED_IN_SEEDS.iter().map(|s| s.to_string()).collect(),
            connect_timeout: protocol::CONNECT_TIMEOUT,
            read_timeout: protocol::READ_TIMEOUT,
            exclusion_threshold: registry::DEFAULT_EXCLUSION_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SyncResult {
    pub success: bool,
    pub network_height: Option<u32>,
}

/// The surface a DNS-over-HTTPS/DoT front-end consumes: `sync`, `query`,
/// and `network_height`. Owns the chain and peer registry handles rather
/// than reaching for process-wide singletons.
pub struct Resolver {
    config: Config,
    chain: HeaderChain,
    registry: PeerRegistry,
    network_height: Option<u32>,
}

impl Resolver {
    pub fn init(config: Config) -> Result<Self, ResolverError> {
        std::fs::create_dir_all(&config.data_dir)
            .map_err(|e| ResolverError::Config(error::ConfigError::InvalidDataDir(e.to_string())))?;
        if config.dns_seeds.is_empty() {
            return Err(ResolverError::Config(error::ConfigError::NoSeeds));
        }

        let chain = HeaderChain::load_from(&config.data_dir.join(HEADER_STORE_FILE))?;
        let registry = PeerRegistry::load(&config.data_dir).with_exclusion_threshold(config.exclusion_threshold);

        Ok(Resolver { config, chain, registry, network_height: None })
    }

    pub async fn sync(&mut self) -> SyncResult {
        let outcome = sync::sync(&mut self.chain, &mut self.registry, &self.config.dns_seeds).await;
        if let Some(h) = outcome.network_height {
            self.network_height = Some(h);
        }

        if let Err(e) = self.chain.persist_to(&self.config.data_dir.join(HEADER_STORE_FILE)) {
            warn!("failed to persist header chain: {e}");
        }

        info!(success = outcome.success, tip = self.chain.tip_height(), "sync complete");
        SyncResult { success: outcome.success, network_height: outcome.network_height }
    }

    pub async fn query(&mut self, name_hash: [u8; 32]) -> NameQueryResult {
        let chain_root = self.chain.current_name_root();
        let chain_height = self.chain.tip_height();
        query::query(&mut self.registry, &self.config.dns_seeds, name_hash, chain_root, chain_height, self.network_height)
            .await
    }

    pub fn network_height(&self) -> Option<u32> {
        self.network_height
    }

    pub fn tip_height(&self) -> u32 {
        self.chain.tip_height()
    }
}
