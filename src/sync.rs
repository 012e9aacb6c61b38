// Sync orchestrator: drives per-peer connect -> handshake -> getheaders
// loops, advances the header chain, and records peer reputation. The chain
// has a single writer at a time; this module is that writer for the
// duration of one sync() call.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::chain::checkpoint::{CHECKPOINT_HEIGHT, NUM_CHECKPOINT_HEADERS};
use crate::chain::{AppendOutcome, HeaderChain};
use crate::discovery;
use crate::protocol::{self, PeerConnection};
use crate::registry::PeerRegistry;
use crate::wire::codec::Command;
use crate::wire::messages::{self, ZERO_HASH};
use crate::wire::SERVICE_NETWORK;

const DISCOVERY_BUDGET: Duration = Duration::from_secs(15);
/// 1 initial attempt plus up to 3 retries with exponential backoff starting
/// at 1s; the peer is abandoned on the 4th failure.
const MAX_CONNECT_ATTEMPTS: u32 = 4;
const MAX_LOCATOR_DESCENT: usize = 10;
const MAX_HEADERS_PER_BATCH: usize = 2000;
const EXCLUSION_RATIO_RETHRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Copy)]
pub struct SyncOutcome {
    pub success: bool,
    pub network_height: Option<u32>,
}

struct ConnectSyncOutcome {
    was_error: bool,
    headers_received: bool,
    peer_height: Option<u32>,
}

struct ReceiveHeadersOutcome {
    has_valid_headers: bool,
    received_any_headers: bool,
}

pub async fn sync(chain: &mut HeaderChain, registry: &mut PeerRegistry, dns_seeds: &[String]) -> SyncOutcome {
    let mut candidates = match tokio::time::timeout(DISCOVERY_BUDGET, discovery::discover(dns_seeds, registry)).await {
        Ok(addrs) => addrs,
        Err(_) => {
            warn!("discovery exceeded its 15s budget; using persisted fallback peers");
            registry.fallback_peers()
        }
    };

    let total = candidates.len();
    let excluded = candidates.iter().filter(|a| registry.should_exclude(a)).count();
    let exclusion_ratio = if total == 0 { 0.0 } else { excluded as f64 / total as f64 };

    if exclusion_ratio >= EXCLUSION_RATIO_RETHRESHOLD {
        let refreshed = discovery::discover(dns_seeds, registry).await;
        for addr in &candidates {
            if !refreshed.contains(addr) {
                registry.reset_errors(addr);
            }
        }
        candidates = refreshed;
    } else if total > 0 && candidates.iter().all(|a| registry.should_exclude(a)) {
        registry.clear_all_errors();
    }

    let filtered: Vec<String> = candidates.into_iter().filter(|a| !registry.should_exclude(a)).collect();

    let mut max_network_height: Option<u32> = None;

    for addr in &filtered {
        let outcome = connect_and_sync(addr, chain, registry).await;

        if let Some(h) = outcome.peer_height {
            max_network_height = Some(max_network_height.map_or(h, |m| m.max(h)));
        }

        if !outcome.was_error && outcome.headers_received {
            registry.add(&[addr.clone()]);
            info!("sync succeeded via {addr}, tip now at {}", chain.tip_height());
            return SyncOutcome { success: true, network_height: max_network_height };
        }
    }

    SyncOutcome { success: false, network_height: max_network_height }
}

async fn connect_and_sync(addr: &str, chain: &mut HeaderChain, registry: &mut PeerRegistry) -> ConnectSyncOutcome {
    let mut backoff = Duration::from_secs(1);
    let mut established = None;

    for attempt in 0..MAX_CONNECT_ATTEMPTS {
        match PeerConnection::connect(addr).await {
            Ok(mut conn) => match protocol::perform_handshake(&mut conn, chain.tip_height()).await {
                Ok(hs) => {
                    established = Some((conn, hs));
                    break;
                }
                Err(e) => debug!("handshake attempt {attempt} with {addr} failed: {e}"),
            },
            Err(e) => debug!("connect attempt {attempt} to {addr} failed: {e}"),
        }

        if attempt + 1 < MAX_CONNECT_ATTEMPTS {
            tokio::time::sleep(backoff).await;
            backoff *= 2;
        }
    }

    let Some((mut conn, handshake)) = established else {
        registry.record_error(addr);
        return ConnectSyncOutcome { was_error: true, headers_received: false, peer_height: None };
    };

    if handshake.peer_services & SERVICE_NETWORK != 0 {
        registry.record_verified_full_node(addr);
    }

    if protocol::send_post_handshake_greeting(&mut conn).await.is_err() {
        registry.record_error(addr);
        return ConnectSyncOutcome { was_error: true, headers_received: false, peer_height: Some(handshake.peer_height) };
    }

    let start_height = chain.tip_height();
    let full_locator = chain.locator();
    let mut headers_received = false;

    'descent: for locator_index in 0..MAX_LOCATOR_DESCENT {
        let locator_to_send: Vec<[u8; 32]> = if locator_index == 0 {
            full_locator.clone()
        } else {
            match full_locator.get(locator_index) {
                Some(h) => vec![*h],
                None => break 'descent,
            }
        };

        if protocol::send_getheaders(&mut conn, &locator_to_send).await.is_err() {
            registry.record_error(addr);
            return ConnectSyncOutcome { was_error: true, headers_received, peer_height: Some(handshake.peer_height) };
        }

        match receive_headers_loop(&mut conn, chain).await {
            Ok(result) => {
                if result.has_valid_headers {
                    headers_received = true;
                    break 'descent;
                } else if result.received_any_headers {
                    // Peer has nothing newer than what we already hold.
                    break 'descent;
                }
                // notfound -> retry with the next, progressively older locator hash.
            }
            Err(e) => {
                debug!("header read with {addr} failed: {e}");
                registry.record_error(addr);
                return ConnectSyncOutcome { was_error: true, headers_received, peer_height: Some(handshake.peer_height) };
            }
        }
    }

    // One-shot workaround for peers that have pruned headers older than our
    // checkpoint: if we're still sitting exactly at the checkpoint tip, got
    // nothing, and didn't already send a zero locator, try once more with one.
    if start_height == CHECKPOINT_HEIGHT + NUM_CHECKPOINT_HEADERS - 1
        && !headers_received
        && full_locator.first() != Some(&ZERO_HASH)
    {
        if protocol::send_getheaders(&mut conn, &[]).await.is_ok() {
            if let Ok(result) = receive_headers_loop(&mut conn, chain).await {
                if result.has_valid_headers {
                    headers_received = true;
                }
            }
        }
    }

    ConnectSyncOutcome { was_error: false, headers_received, peer_height: Some(handshake.peer_height) }
}

/// Reads messages until a `headers` batch is classified or `notfound`
/// arrives. `ping` is answered; `pong`/`inv`/`addr` are swallowed.
async fn receive_headers_loop(
    conn: &mut PeerConnection,
    chain: &mut HeaderChain,
) -> Result<ReceiveHeadersOutcome, crate::error::HandshakeError> {
    let mut already_reissued_for_stale_batch = false;

    loop {
        let frame = protocol::recv_frame(conn).await?;
        if protocol::absorb_background_traffic(conn, &frame).await? {
            continue;
        }

        match frame.command {
            Command::HEADERS => {
                let batch = messages::decode_headers(&frame.payload)
                    .map_err(|e| crate::error::HandshakeError::Codec(e))?;
                if batch.is_empty() {
                    return Ok(ReceiveHeadersOutcome { has_valid_headers: false, received_any_headers: false });
                }

                let hashes = compute_hashes_parallel(batch.clone()).await;
                let mut accepted = 0usize;
                for (header, hash) in batch.iter().zip(hashes.iter()) {
                    if chain.try_append(*header, *hash) == AppendOutcome::Accepted {
                        accepted += 1;
                    }
                }

                if batch.len() == MAX_HEADERS_PER_BATCH {
                    let last_hash = *hashes.last().unwrap();
                    protocol::send_getheaders(conn, &[last_hash]).await?;
                    continue;
                }

                if accepted == 0 && !already_reissued_for_stale_batch {
                    already_reissued_for_stale_batch = true;
                    let last_hash = *hashes.last().unwrap();
                    protocol::send_getheaders(conn, &[last_hash]).await?;
                    continue;
                }

                return Ok(ReceiveHeadersOutcome {
                    has_valid_headers: accepted > 0,
                    received_any_headers: true,
                });
            }
            Command::NOTFOUND => {
                return Ok(ReceiveHeadersOutcome { has_valid_headers: false, received_any_headers: false });
            }
            other => {
                debug!("ignoring unexpected {other:?} while waiting on headers");
            }
        }
    }
}

/// Hashing 2000 headers per batch is CPU-bound; fan it out across the CPU
/// dispatcher and join before handing the pairs to the (single-writer)
/// chain.
async fn compute_hashes_parallel(headers: Vec<crate::wire::messages::BlockHeader>) -> Vec<[u8; 32]> {
    const CHUNK_SIZE: usize = 256;
    let chunks: Vec<Vec<_>> = headers.chunks(CHUNK_SIZE).map(|c| c.to_vec()).collect();

    let tasks: Vec<_> = chunks
        .into_iter()
        .map(|chunk| tokio::task::spawn_blocking(move || chunk.iter().map(|h| h.hash()).collect::<Vec<_>>()))
        .collect();

    let results = futures::future::join_all(tasks).await;
    results.into_iter().flat_map(|r| r.unwrap_or_default()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::codec::Frame;
    use crate::wire::messages::BlockHeader;
    use tokio::net::{TcpListener, TcpStream};

    fn header_after(prev: [u8; 32], nonce: u64) -> BlockHeader {
        BlockHeader {
            version: 1,
            prev_hash: prev,
            name_root: [nonce as u8; 32],
            extra_root: [0u8; 32],
            mask_hash: [0u8; 32],
            time: 1_900_000_000,
            bits: 0x1d00ffff,
            nonce,
            extra_nonce: [0u8; 84],
        }
    }

    #[tokio::test]
    async fn receive_headers_loop_accepts_batch_under_2000() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mut chain = HeaderChain::init_from_checkpoint();
        let tip_hash = chain.tip_hash();
        let h1 = header_after(tip_hash, 1);
        let h2 = header_after(h1.hash(), 2);
        let batch = vec![h1, h2];

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut socket = socket;
            let frame = Frame::new(Command::HEADERS, messages::encode_headers(&batch));
            frame.write_to(&mut socket).await.unwrap();
        });

        let client = TcpStream::connect(addr).await.unwrap();
        let mut conn = test_conn(client, addr.to_string());
        let result = receive_headers_loop(&mut conn, &mut chain).await.unwrap();
        assert!(result.has_valid_headers);
        assert!(result.received_any_headers);
        assert_eq!(chain.tip_height(), CHECKPOINT_HEIGHT + NUM_CHECKPOINT_HEADERS - 1 + 2);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn receive_headers_loop_returns_notfound() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let mut chain = HeaderChain::init_from_checkpoint();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            Frame::empty(Command::NOTFOUND).write_to(&mut socket).await.unwrap();
        });

        let client = TcpStream::connect(addr).await.unwrap();
        let mut conn = test_conn(client, addr.to_string());
        let result = receive_headers_loop(&mut conn, &mut chain).await.unwrap();
        assert!(!result.has_valid_headers);
        assert!(!result.received_any_headers);
        server.await.unwrap();
    }

    // Test-only constructor: production code only builds PeerConnection via
    // PeerConnection::connect, which also configures the socket.
    fn test_conn(stream: TcpStream, addr: String) -> PeerConnection {
        PeerConnection::from_parts(addr, stream)
    }
}
