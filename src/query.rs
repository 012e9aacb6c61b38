// Name-proof query pipeline: full-node selection, proof request/response,
// liveness interleaving, and the not-found corroboration threshold.

use tracing::{debug, warn};

use crate::protocol::{self, PeerConnection};
use crate::registry::PeerRegistry;
use crate::wire::codec::Command;
use crate::wire::SERVICE_NETWORK;

/// Peer height may differ from ours (and from the network's) by at most
/// this many blocks for a proof request to be worth sending.
const HEIGHT_TOLERANCE: u32 = 2;
const EARLY_DRAIN_ATTEMPTS: usize = 5;
const EARLY_DRAIN_PER_MESSAGE_DEADLINE_MS: u64 = 100;
const PROOF_READ_ATTEMPTS: usize = 20;
const NOTFOUND_CORROBORATION_THRESHOLD: usize = 3;

#[derive(Debug, Clone)]
pub enum NameQueryResult {
    Success { records: Vec<u8>, proof: Vec<u8> },
    NotFound,
    Error,
}

pub async fn query(
    registry: &mut PeerRegistry,
    dns_seeds: &[String],
    name_hash: [u8; 32],
    chain_root: [u8; 32],
    chain_height: u32,
    network_height: Option<u32>,
) -> NameQueryResult {
    let mut candidates = registry.fallback_peers();
    if candidates.is_empty() {
        candidates = crate::discovery::discover(dns_seeds, registry).await;
    }
    if candidates.is_empty() {
        return NameQueryResult::Error;
    }

    let mut notfound_votes = 0usize;
    let mut any_non_notfound_error = false;

    for addr in &candidates {
        match query_one_peer(registry, addr, name_hash, chain_root, chain_height, network_height).await {
            PeerQueryOutcome::Success { records, proof } => {
                return NameQueryResult::Success { records, proof };
            }
            PeerQueryOutcome::NotFound => {
                notfound_votes += 1;
                if notfound_votes >= NOTFOUND_CORROBORATION_THRESHOLD {
                    return NameQueryResult::NotFound;
                }
            }
            PeerQueryOutcome::Rejected | PeerQueryOutcome::Error => {
                any_non_notfound_error = true;
            }
        }
    }

    if notfound_votes > 0 && notfound_votes < NOTFOUND_CORROBORATION_THRESHOLD && any_non_notfound_error {
        return NameQueryResult::Error;
    }
    if notfound_votes >= NOTFOUND_CORROBORATION_THRESHOLD {
        return NameQueryResult::NotFound;
    }
    NameQueryResult::Error
}

enum PeerQueryOutcome {
    Success { records: Vec<u8>, proof: Vec<u8> },
    NotFound,
    /// Peer failed policy checks (not a full node, or out of height tolerance) — skipped silently.
    Rejected,
    Error,
}

async fn query_one_peer(
    registry: &mut PeerRegistry,
    addr: &str,
    name_hash: [u8; 32],
    chain_root: [u8; 32],
    chain_height: u32,
    network_height: Option<u32>,
) -> PeerQueryOutcome {
    let mut conn = match PeerConnection::connect(addr).await {
        Ok(c) => c,
        Err(e) => {
            debug!("connect to {addr} failed: {e}");
            registry.record_error(addr);
            return PeerQueryOutcome::Error;
        }
    };

    let handshake = match protocol::perform_handshake(&mut conn, chain_height).await {
        Ok(hs) => hs,
        Err(e) => {
            debug!("handshake with {addr} failed: {e}");
            registry.record_error(addr);
            return PeerQueryOutcome::Error;
        }
    };

    let is_full_node = handshake.peer_services & SERVICE_NETWORK != 0;
    let peer_height_ok = (handshake.peer_height as i64 - chain_height as i64).unsigned_abs() <= HEIGHT_TOLERANCE as u64;
    let network_synced = network_height
        .map(|nh| (chain_height as i64 - nh as i64).unsigned_abs() <= HEIGHT_TOLERANCE as u64)
        .unwrap_or(true);

    if !is_full_node || !peer_height_ok || !network_synced {
        return PeerQueryOutcome::Rejected;
    }

    registry.record_verified_full_node(addr);

    if protocol::send_post_handshake_greeting(&mut conn).await.is_err()
        || protocol::send_getheaders(&mut conn, &[]).await.is_err()
    {
        registry.record_error(addr);
        return PeerQueryOutcome::Error;
    }

    drain_early_responses(&mut conn).await;

    if protocol::send_getproof(&mut conn, chain_root, name_hash).await.is_err() {
        registry.record_error(addr);
        return PeerQueryOutcome::Error;
    }

    for _ in 0..PROOF_READ_ATTEMPTS {
        let frame = match protocol::recv_frame(&mut conn).await {
            Ok(f) => f,
            Err(e) => {
                debug!("proof read from {addr} failed: {e}");
                registry.record_error(addr);
                return PeerQueryOutcome::Error;
            }
        };

        let absorbed = match protocol::absorb_background_traffic(&mut conn, &frame).await {
            Ok(absorbed) => absorbed,
            Err(_) => {
                registry.record_error(addr);
                return PeerQueryOutcome::Error;
            }
        };
        if absorbed {
            continue;
        }

        match frame.command {
            Command::PROOF => {
                if frame.payload.is_empty() {
                    return PeerQueryOutcome::Error;
                }
                // Records/proof split: the full node's encoding is opaque
                // beyond framing, so we hand back the raw payload split at a
                // fixed proof-tail length agreed with that encoding.
                let (records, proof) = split_proof_payload(&frame.payload);
                return PeerQueryOutcome::Success { records, proof };
            }
            Command::NOTFOUND => return PeerQueryOutcome::NotFound,
            _ => {
                debug!("ignoring unexpected {:?} while waiting on proof from {addr}", frame.command);
            }
        }
    }

    registry.record_error(addr);
    PeerQueryOutcome::Error
}

/// Drains up to 5 queued messages (addr/inv/headers) with a 100ms
/// per-message deadline, mirroring the post-handshake `getheaders` flow
/// peers expect before a `getproof`.
async fn drain_early_responses(conn: &mut PeerConnection) {
    for _ in 0..EARLY_DRAIN_ATTEMPTS {
        let deadline = std::time::Duration::from_millis(EARLY_DRAIN_PER_MESSAGE_DEADLINE_MS);
        match tokio::time::timeout(deadline, protocol::recv_frame(conn)).await {
            Ok(Ok(_frame)) => continue,
            Ok(Err(e)) => {
                warn!("early drain read error: {e}");
                break;
            }
            Err(_) => break,
        }
    }
}

/// Proof payloads are opaque beyond framing; the record list is assumed to
/// occupy everything but a fixed 128-byte proof-blob tail when the payload
/// is long enough to carry one, else the whole payload is the record list.
fn split_proof_payload(payload: &[u8]) -> (Vec<u8>, Vec<u8>) {
    const PROOF_BLOB_LEN: usize = 128;
    if payload.len() > PROOF_BLOB_LEN {
        let split_at = payload.len() - PROOF_BLOB_LEN;
        (payload[..split_at].to_vec(), payload[split_at..].to_vec())
    } else {
        (payload.to_vec(), Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::codec::Frame;
    use crate::wire::messages::{NetAddr, VersionPayload};
    use crate::wire::PROTOCOL_VERSION;
    use tempfile::TempDir;
    use tokio::net::TcpListener;

    #[test]
    fn split_proof_payload_separates_fixed_tail() {
        let mut payload = vec![1u8; 50];
        payload.extend(vec![2u8; 128]);
        let (records, proof) = split_proof_payload(&payload);
        assert_eq!(records.len(), 50);
        assert_eq!(proof.len(), 128);
        assert!(proof.iter().all(|&b| b == 2));
    }

    #[test]
    fn split_proof_payload_handles_short_payload() {
        let payload = vec![9u8; 10];
        let (records, proof) = split_proof_payload(&payload);
        assert_eq!(records.len(), 10);
        assert!(proof.is_empty());
    }

    fn scripted_version(height: u32, services: u64) -> VersionPayload {
        VersionPayload {
            version: PROTOCOL_VERSION,
            services,
            time: 0,
            remote_netaddr: NetAddr::unspecified(),
            nonce: 0,
            agent: "/test-peer/".to_string(),
            height,
            no_relay: true,
        }
    }

    enum ScriptedProofResponse {
        Proof(Vec<u8>),
        NotFound,
    }

    /// Drives the server side of one query: completes the version/verack
    /// handshake advertising `height`/`services`, drains everything up to
    /// (and including) the client's `getproof`, then answers with `response`.
    async fn run_scripted_full_node(listener: TcpListener, height: u32, services: u64, response: ScriptedProofResponse) {
        let (mut socket, _) = listener.accept().await.unwrap();
        let _ = Frame::read_from(&mut socket).await.unwrap(); // client's version

        let version = scripted_version(height, services);
        Frame::new(Command::VERSION, version.encode()).write_to(&mut socket).await.unwrap();
        Frame::empty(Command::VERACK).write_to(&mut socket).await.unwrap();

        loop {
            let frame = Frame::read_from(&mut socket).await.unwrap();
            if frame.command == Command::GETPROOF {
                break;
            }
        }

        match response {
            ScriptedProofResponse::Proof(payload) => {
                Frame::new(Command::PROOF, payload).write_to(&mut socket).await.unwrap();
            }
            ScriptedProofResponse::NotFound => {
                Frame::empty(Command::NOTFOUND).write_to(&mut socket).await.unwrap();
            }
        }
    }

    #[tokio::test]
    async fn query_one_peer_rejects_height_delta_beyond_tolerance() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let chain_height = 200_100;

        let server = tokio::spawn(run_scripted_full_node(
            listener,
            chain_height + HEIGHT_TOLERANCE + 1,
            SERVICE_NETWORK,
            ScriptedProofResponse::NotFound,
        ));

        let dir = TempDir::new().unwrap();
        let mut registry = PeerRegistry::load(dir.path());
        let outcome = query_one_peer(&mut registry, &addr, [0u8; 32], [0u8; 32], chain_height, None).await;
        assert!(matches!(outcome, PeerQueryOutcome::Rejected));
        server.abort();
    }

    #[tokio::test]
    async fn query_one_peer_accepts_height_delta_at_tolerance_boundary() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let chain_height = 200_100;
        let mut proof_payload = vec![1u8; 50];
        proof_payload.extend(vec![2u8; 128]);

        let server = tokio::spawn(run_scripted_full_node(
            listener,
            chain_height + HEIGHT_TOLERANCE,
            SERVICE_NETWORK,
            ScriptedProofResponse::Proof(proof_payload),
        ));

        let dir = TempDir::new().unwrap();
        let mut registry = PeerRegistry::load(dir.path());
        let outcome = query_one_peer(&mut registry, &addr, [0u8; 32], [0u8; 32], chain_height, None).await;
        match outcome {
            PeerQueryOutcome::Success { records, proof } => {
                assert_eq!(records.len(), 50);
                assert_eq!(proof.len(), 128);
            }
            _ => panic!("expected Success at the height-tolerance boundary"),
        }
        server.await.unwrap();
    }

    #[tokio::test]
    async fn query_one_peer_rejects_peer_missing_network_service_bit() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let chain_height = 200_100;

        let server = tokio::spawn(run_scripted_full_node(listener, chain_height, 0, ScriptedProofResponse::NotFound));

        let dir = TempDir::new().unwrap();
        let mut registry = PeerRegistry::load(dir.path());
        let outcome = query_one_peer(&mut registry, &addr, [0u8; 32], [0u8; 32], chain_height, None).await;
        assert!(matches!(outcome, PeerQueryOutcome::Rejected));
        server.abort();
    }

    #[tokio::test]
    async fn query_one_peer_returns_notfound_from_full_node() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let chain_height = 200_100;

        let server =
            tokio::spawn(run_scripted_full_node(listener, chain_height, SERVICE_NETWORK, ScriptedProofResponse::NotFound));

        let dir = TempDir::new().unwrap();
        let mut registry = PeerRegistry::load(dir.path());
        let outcome = query_one_peer(&mut registry, &addr, [0u8; 32], [0u8; 32], chain_height, None).await;
        assert!(matches!(outcome, PeerQueryOutcome::NotFound));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn query_returns_notfound_after_three_corroborating_peers() {
        let chain_height = 200_100;
        let mut servers = Vec::new();
        let dir = TempDir::new().unwrap();
        let mut registry = PeerRegistry::load(dir.path());

        for _ in 0..3 {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap().to_string();
            servers.push(tokio::spawn(run_scripted_full_node(
                listener,
                chain_height,
                SERVICE_NETWORK,
                ScriptedProofResponse::NotFound,
            )));
            registry.add(&[addr]);
        }

        let result = query(&mut registry, &[], [0u8; 32], [0u8; 32], chain_height, None).await;
        assert!(matches!(result, NameQueryResult::NotFound));
        for server in servers {
            server.await.unwrap();
        }
    }

    #[tokio::test]
    async fn query_returns_error_when_corroboration_evidence_is_insufficient() {
        let chain_height = 200_100;
        let mut servers = Vec::new();
        let dir = TempDir::new().unwrap();
        let mut registry = PeerRegistry::load(dir.path());

        for _ in 0..2 {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap().to_string();
            servers.push(tokio::spawn(run_scripted_full_node(
                listener,
                chain_height,
                SERVICE_NETWORK,
                ScriptedProofResponse::NotFound,
            )));
            registry.add(&[addr]);
        }

        let result = query(&mut registry, &[], [0u8; 32], [0u8; 32], chain_height, None).await;
        assert!(matches!(result, NameQueryResult::Error));
        for server in servers {
            server.await.unwrap();
        }
    }
}
