// Convert CLI args into the core Config.

use std::path::PathBuf;

use crate::cli::{QueryCmd, SyncCmd};
use crate::discovery::COMPILED_IN_SEEDS;
use crate::error::ConfigError;
use crate::protocol::{CONNECT_TIMEOUT, READ_TIMEOUT};
use crate::Config;

fn default_base_path() -> PathBuf {
    dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")).join("hnsresolve")
}

fn resolve_dns_seeds(seeds: &[String]) -> Vec<String> {
    if seeds.is_empty() {
        COMPILED_IN_SEEDS.iter().map(|s| s.to_string()).collect()
    } else {
        seeds.to_vec()
    }
}

impl Config {
    pub fn from_sync_cmd(cmd: &SyncCmd) -> Result<Self, ConfigError> {
        Ok(Config {
            data_dir: cmd.base_path.clone().unwrap_or_else(default_base_path),
            dns_seeds: resolve_dns_seeds(&cmd.dns_seeds),
            connect_timeout: CONNECT_TIMEOUT,
            read_timeout: READ_TIMEOUT,
            exclusion_threshold: cmd.exclusion_threshold,
        })
    }

    pub fn from_query_cmd(cmd: &QueryCmd) -> Result<Self, ConfigError> {
        Ok(Config {
            data_dir: cmd.base_path.clone().unwrap_or_else(default_base_path),
            dns_seeds: resolve_dns_seeds(&cmd.dns_seeds),
            connect_timeout: CONNECT_TIMEOUT,
            read_timeout: READ_TIMEOUT,
            exclusion_threshold: crate::registry::DEFAULT_EXCLUSION_THRESHOLD,
        })
    }
}

/// Parses a 32-byte name hash from a hex string.
pub fn parse_name_hash(s: &str) -> Result<[u8; 32], ConfigError> {
    let bytes = hex::decode(s).map_err(|_| ConfigError::InvalidNameHash(s.to_string()))?;
    bytes.try_into().map_err(|_| ConfigError::InvalidNameHash(s.to_string()))
}
