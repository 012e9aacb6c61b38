// CLI - command-line interface for the resolver binary.

pub mod config;
pub mod runner;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "hnsresolve")]
#[command(author = "HNSResolve Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "SPV light-client resolver for the Handshake naming blockchain")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose (debug) logging.
    #[arg(short, long, global = true, default_value = "false")]
    pub verbose: bool,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, global = true, default_value = "info", env = "HNSRESOLVE_LOG")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sync the header chain to the network tip.
    Sync(SyncCmd),

    /// Resolve a name hash by querying a full-node peer for a proof.
    Query(QueryCmd),

    /// Show the locally known chain tip and network height.
    Info(InfoCmd),
}

#[derive(Parser, Debug)]
pub struct SyncCmd {
    /// Base path for persisted chain/peer data.
    #[arg(short = 'd', long, env = "HNSRESOLVE_BASE_PATH")]
    pub base_path: Option<PathBuf>,

    /// DNS seed hostnames, comma-separated (protocol default port applied if absent).
    #[arg(long, value_delimiter = ',', env = "HNSRESOLVE_DNS_SEEDS")]
    pub dns_seeds: Vec<String>,

    /// Error count at/above which a peer is excluded from candidate lists.
    #[arg(long, default_value_t = crate::registry::DEFAULT_EXCLUSION_THRESHOLD)]
    pub exclusion_threshold: u32,
}

#[derive(Parser, Debug)]
pub struct QueryCmd {
    /// Base path for persisted chain/peer data.
    #[arg(short = 'd', long, env = "HNSRESOLVE_BASE_PATH")]
    pub base_path: Option<PathBuf>,

    /// DNS seed hostnames, comma-separated.
    #[arg(long, value_delimiter = ',', env = "HNSRESOLVE_DNS_SEEDS")]
    pub dns_seeds: Vec<String>,

    /// 32-byte name hash, hex-encoded.
    #[arg(long)]
    pub name_hash: String,
}

#[derive(Parser, Debug)]
pub struct InfoCmd {
    /// Base path for persisted chain/peer data.
    #[arg(short = 'd', long, env = "HNSRESOLVE_BASE_PATH")]
    pub base_path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sync_command() {
        let cli = Cli::try_parse_from(["hnsresolve", "sync"]).unwrap();
        assert!(matches!(cli.command, Commands::Sync(_)));
    }

    #[test]
    fn parses_query_command_with_name_hash() {
        let cli = Cli::try_parse_from(["hnsresolve", "query", "--name-hash", "ab".repeat(32).as_str()]).unwrap();
        match cli.command {
            Commands::Query(cmd) => assert_eq!(cmd.name_hash.len(), 64),
            _ => panic!("expected Query command"),
        }
    }

    #[test]
    fn parses_comma_separated_dns_seeds() {
        let cli = Cli::try_parse_from(["hnsresolve", "sync", "--dns-seeds", "a.example:12038,b.example:12038"]).unwrap();
        match cli.command {
            Commands::Sync(cmd) => assert_eq!(cmd.dns_seeds.len(), 2),
            _ => panic!("expected Sync command"),
        }
    }
}
