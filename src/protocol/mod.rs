// Protocol engine: connection setup, the version/verack handshake state
// machine, liveness (ping/pong), and the post-handshake message order full
// nodes expect. Generalizes the direct tokio::net::TcpStream read/write/
// timeout idiom this codebase already uses for a one-shot heartbeat
// exchange into a persistent multi-message session.

use std::net::SocketAddr;
use std::time::Duration;

use rand::Rng;
use socket2::SockRef;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::error::{CodecError, HandshakeError};
use crate::wire::codec::{Command, Frame};
use crate::wire::messages::{self, NetAddr, VersionPayload, ZERO_HASH};
use crate::wire::{PROTOCOL_VERSION, SERVICE_NETWORK};

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const READ_TIMEOUT: Duration = Duration::from_secs(30);
pub const HANDSHAKE_DEADLINE: Duration = Duration::from_secs(5);
pub const MAX_HANDSHAKE_ATTEMPTS: u32 = 20;

pub struct PeerConnection {
    pub addr: String,
    stream: TcpStream,
}

impl PeerConnection {
    pub async fn connect(addr: &str) -> Result<Self, HandshakeError> {
        let socket_addr: SocketAddr = addr
            .parse()
            .map_err(|_| HandshakeError::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, "bad peer address")))?;

        let stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(socket_addr))
            .await
            .map_err(|_| HandshakeError::Timeout)??;

        stream.set_nodelay(true)?;
        SockRef::from(&stream).set_keepalive(true)?;

        Ok(PeerConnection { addr: addr.to_string(), stream })
    }

    pub async fn send(&mut self, frame: &Frame) -> Result<(), HandshakeError> {
        frame.write_to(&mut self.stream).await?;
        Ok(())
    }

    /// Test-only constructor bypassing connect()'s socket configuration.
    #[cfg(test)]
    pub fn from_parts(addr: String, stream: TcpStream) -> Self {
        PeerConnection { addr, stream }
    }

    pub async fn recv(&mut self) -> Result<Frame, HandshakeError> {
        match timeout(READ_TIMEOUT, Frame::read_from(&mut self.stream)).await {
            Err(_) => Err(HandshakeError::Timeout),
            Ok(Err(CodecError::ConnectionClosed)) => Err(HandshakeError::PeerClosed),
            Ok(Err(e)) => Err(e.into()),
            Ok(Ok(frame)) => Ok(frame),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HandshakeOutcome {
    pub peer_height: u32,
    pub peer_services: u64,
}

/// Drives states `Connecting -> Reading -> Handshake -> Ready | Failed`.
/// `Connecting` is handled by `PeerConnection::connect`; this function
/// implements `Reading`/`Handshake`. Sends our own `version` first, then
/// reads until both a `version` and a `verack` have arrived, a 5-second
/// deadline elapses, or 20 message attempts are exhausted — whichever comes
/// first. `ping`s seen along the way are answered; anything else is ignored.
pub async fn perform_handshake(
    conn: &mut PeerConnection,
    our_height: u32,
) -> Result<HandshakeOutcome, HandshakeError> {
    let version = build_version_payload(our_height);
    conn.send(&Frame::new(Command::VERSION, version.encode())).await?;

    let deadline = tokio::time::Instant::now() + HANDSHAKE_DEADLINE;

    let mut version_received = false;
    let mut verack_received = false;
    let mut peer_height = 0u32;
    let mut peer_services = 0u64;

    for _ in 0..MAX_HANDSHAKE_ATTEMPTS {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return Err(HandshakeError::Timeout);
        }

        let frame = match timeout(remaining, Frame::read_from(conn.stream_mut())).await {
            Ok(Ok(frame)) => frame,
            Ok(Err(CodecError::ConnectionClosed)) => return Err(HandshakeError::PeerClosed),
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(HandshakeError::Timeout),
        };

        match frame.command {
            Command::VERSION => {
                let payload = VersionPayload::decode(&frame.payload).map_err(|_| HandshakeError::MalformedVersion)?;
                peer_height = payload.height;
                peer_services = payload.services;
                version_received = true;
                conn.send(&Frame::empty(Command::VERACK)).await?;
            }
            Command::VERACK => {
                verack_received = true;
            }
            Command::PING => {
                let nonce = messages::decode_nonce(&frame.payload).unwrap_or(0);
                conn.send(&Frame::new(Command::PONG, messages::encode_nonce(nonce).to_vec())).await?;
            }
            _ => {
                debug!("ignoring {:?} during handshake with {}", frame.command, conn.addr);
            }
        }

        if version_received && verack_received {
            return Ok(HandshakeOutcome { peer_height, peer_services });
        }
    }

    Err(HandshakeError::Timeout)
}

/// Sends the fixed post-handshake greeting order full nodes expect:
/// `sendheaders`, `getaddr`.
pub async fn send_post_handshake_greeting(conn: &mut PeerConnection) -> Result<(), HandshakeError> {
    conn.send(&Frame::empty(Command::SENDHEADERS)).await?;
    conn.send(&Frame::empty(Command::GETADDR)).await?;
    Ok(())
}

pub async fn send_getheaders(conn: &mut PeerConnection, locator: &[[u8; 32]]) -> Result<(), HandshakeError> {
    let payload = messages::encode_getheaders(locator, ZERO_HASH);
    conn.send(&Frame::new(Command::GETHEADERS, payload)).await
}

pub async fn send_getproof(conn: &mut PeerConnection, root: [u8; 32], name_hash: [u8; 32]) -> Result<(), HandshakeError> {
    let payload = messages::encode_getproof(root, name_hash);
    conn.send(&Frame::new(Command::GETPROOF, payload.to_vec())).await
}

pub async fn recv_frame(conn: &mut PeerConnection) -> Result<Frame, HandshakeError> {
    conn.recv().await
}

pub async fn send_pong(conn: &mut PeerConnection, nonce: u64) -> Result<(), HandshakeError> {
    conn.send(&Frame::new(Command::PONG, messages::encode_nonce(nonce).to_vec())).await
}

/// `pong`, `inv`, `addr` are swallowed; `ping` is answered in place. Returns
/// `true` if the frame was consumed as liveness/background traffic and the
/// caller should keep reading for whatever it actually wanted.
pub async fn absorb_background_traffic(conn: &mut PeerConnection, frame: &Frame) -> Result<bool, HandshakeError> {
    match frame.command {
        Command::PING => {
            let nonce = messages::decode_nonce(&frame.payload).unwrap_or(0);
            conn.send(&Frame::new(Command::PONG, messages::encode_nonce(nonce).to_vec())).await?;
            Ok(true)
        }
        Command::PONG | Command::ADDR | Command::INV => Ok(true),
        _ => Ok(false),
    }
}

fn build_version_payload(height: u32) -> VersionPayload {
    VersionPayload {
        version: PROTOCOL_VERSION,
        services: SERVICE_NETWORK,
        time: std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0),
        remote_netaddr: NetAddr::unspecified(),
        nonce: rand::thread_rng().gen(),
        agent: format!("/hnsresolve:{}/", env!("CARGO_PKG_VERSION")),
        height,
        no_relay: true,
    }
}

impl PeerConnection {
    fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }
}
