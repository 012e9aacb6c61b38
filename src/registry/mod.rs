// Peer registry: seed list, persisted good-peer list, error-count store, and
// full-node list. Mutations never fail the caller — a write that can't reach
// disk is logged and dropped, matching the tolerant-persistence convention
// used for peer state elsewhere in this codebase.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::wire::DEFAULT_P2P_PORT;

/// Cap on the verified-peer fast path, same order of magnitude as the
/// connection-count ceilings used elsewhere in this codebase.
pub const MAX_FALLBACK_PEERS: usize = 50;

/// Error count at or above this excludes a peer from candidate lists.
pub const DEFAULT_EXCLUSION_THRESHOLD: u32 = 5;

const VERIFIED_FILE: &str = "peers_verified.txt";
const ERRORS_FILE: &str = "peers_errors.txt";
const FULLNODE_FILE: &str = "peers_fullnode.txt";

/// Normalizes a peer address to `host:port`, applying the protocol default
/// port when the input carries none.
pub fn normalize_addr(addr: &str) -> String {
    if addr.rsplit(':').next().map(|p| p.parse::<u16>().is_ok()).unwrap_or(false)
        && addr.matches(':').count() == 1
    {
        addr.to_string()
    } else {
        format!("{addr}:{DEFAULT_P2P_PORT}")
    }
}

#[derive(Debug, Default)]
pub struct PeerRegistry {
    data_dir: PathBuf,
    /// Most-recently-verified last; fallback_peers() reverses this.
    verified: Vec<String>,
    errors: HashMap<String, u32>,
    full_nodes: Vec<String>,
    exclusion_threshold: u32,
}

impl PeerRegistry {
    pub fn load(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        let verified = load_list(&data_dir.join(VERIFIED_FILE));
        let full_nodes = load_list(&data_dir.join(FULLNODE_FILE));
        let errors = load_errors(&data_dir.join(ERRORS_FILE));

        PeerRegistry {
            data_dir,
            verified,
            errors,
            full_nodes,
            exclusion_threshold: DEFAULT_EXCLUSION_THRESHOLD,
        }
    }

    pub fn with_exclusion_threshold(mut self, threshold: u32) -> Self {
        self.exclusion_threshold = threshold;
        self
    }

    /// Adds addresses to the verified set, preserving uniqueness; oldest
    /// entries are evicted once capacity is exceeded.
    pub fn add(&mut self, addrs: &[String]) {
        for addr in addrs {
            let addr = normalize_addr(addr);
            if let Some(pos) = self.verified.iter().position(|a| a == &addr) {
                self.verified.remove(pos);
            }
            self.verified.push(addr);
        }
        while self.verified.len() > MAX_FALLBACK_PEERS {
            self.verified.remove(0);
        }
        self.persist();
    }

    /// Capped, most-recently-added first.
    pub fn fallback_peers(&self) -> Vec<String> {
        self.verified.iter().rev().take(MAX_FALLBACK_PEERS).cloned().collect()
    }

    pub fn record_verified_full_node(&mut self, addr: &str) {
        let addr = normalize_addr(addr);
        self.add(&[addr.clone()]);
        if !self.full_nodes.contains(&addr) {
            self.full_nodes.push(addr);
        }
        self.persist();
    }

    pub fn record_error(&mut self, addr: &str) {
        let addr = normalize_addr(addr);
        *self.errors.entry(addr).or_insert(0) += 1;
        self.persist();
    }

    pub fn reset_errors(&mut self, addr: &str) {
        let addr = normalize_addr(addr);
        self.errors.remove(&addr);
        self.persist();
    }

    pub fn clear_all_errors(&mut self) {
        self.errors.clear();
        self.persist();
    }

    pub fn should_exclude(&self, addr: &str) -> bool {
        let addr = normalize_addr(addr);
        self.errors.get(&addr).copied().unwrap_or(0) >= self.exclusion_threshold
    }

    pub fn is_full_node(&self, addr: &str) -> bool {
        self.full_nodes.contains(&normalize_addr(addr))
    }

    /// Best-effort persistence to the three flat files. Failures are logged,
    /// never propagated — losing the registry to disk is not fatal to the
    /// in-memory session.
    pub fn persist(&self) {
        if let Err(e) = std::fs::create_dir_all(&self.data_dir) {
            warn!("failed to create data dir {}: {e}", self.data_dir.display());
            return;
        }
        if let Err(e) = write_list(&self.data_dir.join(VERIFIED_FILE), &self.verified) {
            warn!("failed to persist verified peers: {e}");
        }
        if let Err(e) = write_list(&self.data_dir.join(FULLNODE_FILE), &self.full_nodes) {
            warn!("failed to persist full-node peers: {e}");
        }
        if let Err(e) = write_errors(&self.data_dir.join(ERRORS_FILE), &self.errors) {
            warn!("failed to persist peer error counts: {e}");
        }
    }
}

fn load_list(path: &Path) -> Vec<String> {
    let Ok(contents) = std::fs::read_to_string(path) else { return Vec::new() };
    contents
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() {
                return None;
            }
            if line.matches(':').count() != 1 {
                warn!("skipping malformed peer line in {}: {line:?}", path.display());
                return None;
            }
            Some(line.to_string())
        })
        .collect()
}

fn load_errors(path: &Path) -> HashMap<String, u32> {
    let Ok(contents) = std::fs::read_to_string(path) else { return HashMap::new() };
    let mut map = HashMap::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((addr, count)) = line.rsplit_once(' ') else {
            warn!("skipping malformed error-count line in {}: {line:?}", path.display());
            continue;
        };
        match count.parse::<u32>() {
            Ok(count) => {
                map.insert(addr.to_string(), count);
            }
            Err(_) => warn!("skipping malformed error-count line in {}: {line:?}", path.display()),
        }
    }
    map
}

fn write_list(path: &Path, items: &[String]) -> std::io::Result<()> {
    let body = items.join("\n");
    std::fs::write(path, body)
}

fn write_errors(path: &Path, errors: &HashMap<String, u32>) -> std::io::Result<()> {
    let mut lines: Vec<String> = errors.iter().map(|(addr, count)| format!("{addr} {count}")).collect();
    lines.sort();
    std::fs::write(path, lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn add_preserves_uniqueness_and_order() {
        let dir = TempDir::new().unwrap();
        let mut reg = PeerRegistry::load(dir.path());
        reg.add(&["1.2.3.4:12038".to_string(), "5.6.7.8:12038".to_string()]);
        reg.add(&["1.2.3.4:12038".to_string()]);
        let fallback = reg.fallback_peers();
        assert_eq!(fallback.len(), 2);
        assert_eq!(fallback[0], "1.2.3.4:12038");
    }

    #[test]
    fn eviction_caps_at_max_fallback_peers() {
        let dir = TempDir::new().unwrap();
        let mut reg = PeerRegistry::load(dir.path());
        for i in 0..MAX_FALLBACK_PEERS + 10 {
            reg.add(&[format!("10.0.0.{}:12038", i % 255)]);
        }
        assert!(reg.fallback_peers().len() <= MAX_FALLBACK_PEERS);
    }

    #[test]
    fn record_error_then_reset_clears_exclusion() {
        let dir = TempDir::new().unwrap();
        let mut reg = PeerRegistry::load(dir.path()).with_exclusion_threshold(3);
        for _ in 0..3 {
            reg.record_error("1.2.3.4:12038");
        }
        assert!(reg.should_exclude("1.2.3.4:12038"));
        reg.reset_errors("1.2.3.4:12038");
        assert!(!reg.should_exclude("1.2.3.4:12038"));
    }

    #[test]
    fn verified_immediately_not_excluded() {
        let dir = TempDir::new().unwrap();
        let mut reg = PeerRegistry::load(dir.path());
        reg.record_verified_full_node("9.9.9.9:12038");
        assert!(!reg.should_exclude("9.9.9.9:12038"));
        assert!(reg.is_full_node("9.9.9.9:12038"));
    }

    #[test]
    fn persistence_roundtrips_across_load() {
        let dir = TempDir::new().unwrap();
        {
            let mut reg = PeerRegistry::load(dir.path());
            reg.record_verified_full_node("9.9.9.9:12038");
            reg.record_error("1.1.1.1:12038");
        }
        let reg = PeerRegistry::load(dir.path());
        assert!(reg.is_full_node("9.9.9.9:12038"));
        assert_eq!(reg.fallback_peers(), vec!["9.9.9.9:12038".to_string()]);
        assert!(!reg.should_exclude("1.1.1.1:12038"));
    }

    #[test]
    fn tolerant_load_skips_malformed_lines() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(VERIFIED_FILE), "1.2.3.4:12038\nnotanaddr\n\n5.6.7.8:12038").unwrap();
        let reg = PeerRegistry::load(dir.path());
        assert_eq!(reg.fallback_peers().len(), 2);
    }

    #[test]
    fn normalize_addr_applies_default_port() {
        assert_eq!(normalize_addr("10.0.0.1"), format!("10.0.0.1:{DEFAULT_P2P_PORT}"));
        assert_eq!(normalize_addr("10.0.0.1:9999"), "10.0.0.1:9999");
    }
}
