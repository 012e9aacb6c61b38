// Peer discovery: resolve DNS seeds, merge with persisted peers, and fall
// back to a compiled-in seed list when the network gives us nothing.

use std::collections::HashSet;
use std::time::Duration;

use tracing::warn;

use crate::registry::PeerRegistry;
use crate::wire::DEFAULT_P2P_PORT;

const DNS_BUDGET: Duration = Duration::from_secs(30);

/// Compiled-in fallback seeds, used only when DNS resolution and the
/// persisted peer list both come up empty.
pub const COMPILED_IN_SEEDS: &[&str] = &[
    "seed1.hnsresolve.example:12038",
    "seed2.hnsresolve.example:12038",
    "seed3.hnsresolve.example:12038",
];

/// Resolves every configured seed hostname under a shared 30-second budget,
/// merges the result with the registry's persisted verified peers, and
/// falls back to the compiled-in seed list if both come up empty.
/// Deadline expiry is non-fatal: a seed that times out or errors simply
/// contributes nothing.
pub async fn discover(dns_seeds: &[String], registry: &PeerRegistry) -> Vec<String> {
    let resolved = match tokio::time::timeout(DNS_BUDGET, resolve_all(dns_seeds)).await {
        Ok(addrs) => addrs,
        Err(_) => {
            warn!("dns seed resolution exceeded its 30s budget; using partial results");
            Vec::new()
        }
    };

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for addr in resolved.into_iter().chain(registry.fallback_peers()) {
        if seen.insert(addr.clone()) {
            out.push(addr);
        }
    }

    if out.is_empty() {
        COMPILED_IN_SEEDS.iter().map(|s| s.to_string()).collect()
    } else {
        out
    }
}

async fn resolve_all(dns_seeds: &[String]) -> Vec<String> {
    let tasks: Vec<_> = dns_seeds
        .iter()
        .cloned()
        .map(|seed| tokio::spawn(async move { resolve_one(&seed).await }))
        .collect();

    let mut out = Vec::new();
    for task in tasks {
        match task.await {
            Ok(addrs) => out.extend(addrs),
            Err(e) => warn!("dns seed resolution task panicked: {e}"),
        }
    }
    out
}

async fn resolve_one(seed: &str) -> Vec<String> {
    let lookup_target = if seed.contains(':') { seed.to_string() } else { format!("{seed}:{DEFAULT_P2P_PORT}") };
    match tokio::net::lookup_host(&lookup_target).await {
        Ok(addrs) => addrs.map(|a| a.to_string()).collect(),
        Err(e) => {
            warn!("dns seed {seed} failed to resolve: {e}");
            Vec::new()
        }
    }
}
