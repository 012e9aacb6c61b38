use crate::error::CodecError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::MAGIC_MAINNET;

/// Sanity cap on a frame's payload length. Generous enough for a 2000-header
/// batch (2000 * 236 B =~ 472 KB) with headroom; mirrors the size-limit
/// convention the rest of this codebase uses for inbound message framing.
pub const MAX_PAYLOAD_SIZE: u32 = 4 * 1024 * 1024;

/// Single-byte command tag. Kept as a plain newtype rather than an enum with
/// derived (de)serialization so unknown commands round-trip instead of
/// failing to parse — the engine only needs to recognize the handful it acts
/// on and otherwise counts-and-ignores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Command(pub u8);

impl Command {
    pub const VERSION: Command = Command(0);
    pub const VERACK: Command = Command(1);
    pub const PING: Command = Command(2);
    pub const PONG: Command = Command(3);
    pub const SENDHEADERS: Command = Command(4);
    pub const GETADDR: Command = Command(5);
    pub const ADDR: Command = Command(6);
    pub const INV: Command = Command(7);
    pub const GETHEADERS: Command = Command(8);
    pub const HEADERS: Command = Command(9);
    pub const NOTFOUND: Command = Command(10);
    pub const GETPROOF: Command = Command(11);
    pub const PROOF: Command = Command(12);
}

#[derive(Debug, Clone)]
pub struct Frame {
    pub command: Command,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(command: Command, payload: Vec<u8>) -> Self {
        Frame { command, payload }
    }

    pub fn empty(command: Command) -> Self {
        Frame { command, payload: Vec::new() }
    }

    /// Serializes `magic | command | payload_len | payload`, all integers
    /// little-endian, with no checksum.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(9 + self.payload.len());
        buf.extend_from_slice(&MAGIC_MAINNET.to_le_bytes());
        buf.push(self.command.0);
        buf.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    pub async fn write_to<W: AsyncWrite + Unpin>(&self, w: &mut W) -> Result<(), CodecError> {
        w.write_all(&self.encode()).await?;
        w.flush().await?;
        Ok(())
    }

    pub async fn read_from<R: AsyncRead + Unpin>(r: &mut R) -> Result<Frame, CodecError> {
        let mut header = [0u8; 9];

        // Read the first byte separately: zero bytes here means the peer
        // closed the connection cleanly between frames, distinct from a
        // close mid-frame (which is a truncation).
        let first = r.read(&mut header[0..1]).await?;
        if first == 0 {
            return Err(CodecError::ConnectionClosed);
        }

        r.read_exact(&mut header[1..9]).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                CodecError::Truncated
            } else {
                CodecError::Io(e)
            }
        })?;

        let magic = u32::from_le_bytes(header[0..4].try_into().unwrap());
        if magic != MAGIC_MAINNET {
            return Err(CodecError::BadMagic { expected: MAGIC_MAINNET, got: magic });
        }
        let command = Command(header[4]);
        let payload_len = u32::from_le_bytes(header[5..9].try_into().unwrap());
        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(CodecError::PayloadTooLarge { got: payload_len, max: MAX_PAYLOAD_SIZE });
        }

        let mut payload = vec![0u8; payload_len as usize];
        r.read_exact(&mut payload).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                CodecError::Truncated
            } else {
                CodecError::Io(e)
            }
        })?;

        Ok(Frame { command, payload })
    }
}

/// Bitcoin-style compact size: `< 0xFD` -> 1 byte; `<= 0xFFFF` -> 0xFD + u16;
/// otherwise 0xFE + u32. We never need the 0xFF + u64 form at this scale.
pub fn write_varint(buf: &mut Vec<u8>, n: u64) {
    if n < 0xFD {
        buf.push(n as u8);
    } else if n <= 0xFFFF {
        buf.push(0xFD);
        buf.extend_from_slice(&(n as u16).to_le_bytes());
    } else {
        buf.push(0xFE);
        buf.extend_from_slice(&(n as u32).to_le_bytes());
    }
}

pub fn read_varint(buf: &[u8], offset: &mut usize) -> Result<u64, CodecError> {
    let tag = *buf.get(*offset).ok_or(CodecError::Truncated)?;
    *offset += 1;
    match tag {
        0xFD => {
            let bytes = buf.get(*offset..*offset + 2).ok_or(CodecError::Truncated)?;
            *offset += 2;
            Ok(u16::from_le_bytes(bytes.try_into().unwrap()) as u64)
        }
        0xFE => {
            let bytes = buf.get(*offset..*offset + 4).ok_or(CodecError::Truncated)?;
            *offset += 4;
            Ok(u32::from_le_bytes(bytes.try_into().unwrap()) as u64)
        }
        n => Ok(n as u64),
    }
}
