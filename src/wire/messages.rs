// Typed payloads layered on top of the raw frame codec. Field layouts not
// otherwise pinned down by spec are fixed here as concrete, stable byte
// layouts so encode/decode round-trips are well-defined.

use crate::error::CodecError;

use super::codec::{read_varint, write_varint};

/// Fixed 236-byte block header. Exact field semantics beyond what the sync
/// engine needs (previous-hash linkage, name-tree root, timestamp, PoW
/// commitment) are not otherwise load-bearing here.
pub const HEADER_SIZE: usize = 236;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub version: u32,
    pub prev_hash: [u8; 32],
    pub name_root: [u8; 32],
    pub extra_root: [u8; 32],
    pub mask_hash: [u8; 32],
    pub time: u64,
    pub bits: u32,
    pub nonce: u64,
    pub extra_nonce: [u8; 84],
}

impl BlockHeader {
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        let mut o = 0;
        buf[o..o + 4].copy_from_slice(&self.version.to_le_bytes());
        o += 4;
        buf[o..o + 32].copy_from_slice(&self.prev_hash);
        o += 32;
        buf[o..o + 32].copy_from_slice(&self.name_root);
        o += 32;
        buf[o..o + 32].copy_from_slice(&self.extra_root);
        o += 32;
        buf[o..o + 32].copy_from_slice(&self.mask_hash);
        o += 32;
        buf[o..o + 8].copy_from_slice(&self.time.to_le_bytes());
        o += 8;
        buf[o..o + 4].copy_from_slice(&self.bits.to_le_bytes());
        o += 4;
        buf[o..o + 8].copy_from_slice(&self.nonce.to_le_bytes());
        o += 8;
        buf[o..o + 84].copy_from_slice(&self.extra_nonce);
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self, CodecError> {
        if buf.len() != HEADER_SIZE {
            return Err(CodecError::Truncated);
        }
        let mut o = 0;
        let version = u32::from_le_bytes(buf[o..o + 4].try_into().unwrap());
        o += 4;
        let prev_hash: [u8; 32] = buf[o..o + 32].try_into().unwrap();
        o += 32;
        let name_root: [u8; 32] = buf[o..o + 32].try_into().unwrap();
        o += 32;
        let extra_root: [u8; 32] = buf[o..o + 32].try_into().unwrap();
        o += 32;
        let mask_hash: [u8; 32] = buf[o..o + 32].try_into().unwrap();
        o += 32;
        let time = u64::from_le_bytes(buf[o..o + 8].try_into().unwrap());
        o += 8;
        let bits = u32::from_le_bytes(buf[o..o + 4].try_into().unwrap());
        o += 4;
        let nonce = u64::from_le_bytes(buf[o..o + 8].try_into().unwrap());
        o += 8;
        let extra_nonce: [u8; 84] = buf[o..o + 84].try_into().unwrap();

        Ok(BlockHeader {
            version,
            prev_hash,
            name_root,
            extra_root,
            mask_hash,
            time,
            bits,
            nonce,
            extra_nonce,
        })
    }

    /// BLAKE3 over the raw 236-byte wire encoding, no domain prefix — the
    /// same general-purpose hash used everywhere else in this crate.
    pub fn hash(&self) -> [u8; 32] {
        *blake3::hash(&self.to_bytes()).as_bytes()
    }
}

/// 88-byte peer address block: time(8) + services(8) + a 72-byte address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetAddr {
    pub time: u64,
    pub services: u64,
    pub addr: [u8; 72],
}

impl NetAddr {
    pub const SIZE: usize = 88;

    pub fn unspecified() -> Self {
        NetAddr { time: 0, services: 0, addr: [0u8; 72] }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..8].copy_from_slice(&self.time.to_le_bytes());
        buf[8..16].copy_from_slice(&self.services.to_le_bytes());
        buf[16..88].copy_from_slice(&self.addr);
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self, CodecError> {
        if buf.len() != Self::SIZE {
            return Err(CodecError::Truncated);
        }
        Ok(NetAddr {
            time: u64::from_le_bytes(buf[0..8].try_into().unwrap()),
            services: u64::from_le_bytes(buf[8..16].try_into().unwrap()),
            addr: buf[16..88].try_into().unwrap(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct VersionPayload {
    pub version: u32,
    pub services: u64,
    pub time: u64,
    pub remote_netaddr: NetAddr,
    pub nonce: u64,
    pub agent: String,
    pub height: u32,
    pub no_relay: bool,
}

impl VersionPayload {
    pub fn encode(&self) -> Vec<u8> {
        let agent_bytes = self.agent.as_bytes();
        let agent_len = agent_bytes.len().min(255) as u8;
        let mut buf = Vec::with_capacity(4 + 8 + 8 + NetAddr::SIZE + 8 + 1 + agent_bytes.len() + 4 + 1);
        buf.extend_from_slice(&self.version.to_le_bytes());
        buf.extend_from_slice(&self.services.to_le_bytes());
        buf.extend_from_slice(&self.time.to_le_bytes());
        buf.extend_from_slice(&self.remote_netaddr.to_bytes());
        buf.extend_from_slice(&self.nonce.to_le_bytes());
        buf.push(agent_len);
        buf.extend_from_slice(&agent_bytes[..agent_len as usize]);
        buf.extend_from_slice(&self.height.to_le_bytes());
        buf.push(self.no_relay as u8);
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        let mut o = 0usize;
        let need = |o: usize, n: usize, buf: &[u8]| -> Result<(), CodecError> {
            if o + n > buf.len() { Err(CodecError::Truncated) } else { Ok(()) }
        };

        need(o, 4, buf)?;
        let version = u32::from_le_bytes(buf[o..o + 4].try_into().unwrap());
        o += 4;
        need(o, 8, buf)?;
        let services = u64::from_le_bytes(buf[o..o + 8].try_into().unwrap());
        o += 8;
        need(o, 8, buf)?;
        let time = u64::from_le_bytes(buf[o..o + 8].try_into().unwrap());
        o += 8;
        need(o, NetAddr::SIZE, buf)?;
        let remote_netaddr = NetAddr::from_bytes(&buf[o..o + NetAddr::SIZE])?;
        o += NetAddr::SIZE;
        need(o, 8, buf)?;
        let nonce = u64::from_le_bytes(buf[o..o + 8].try_into().unwrap());
        o += 8;
        need(o, 1, buf)?;
        let agent_len = buf[o] as usize;
        o += 1;
        need(o, agent_len, buf)?;
        let agent = String::from_utf8_lossy(&buf[o..o + agent_len]).into_owned();
        o += agent_len;
        need(o, 4, buf)?;
        let height = u32::from_le_bytes(buf[o..o + 4].try_into().unwrap());
        o += 4;
        need(o, 1, buf)?;
        let no_relay = buf[o] != 0;

        Ok(VersionPayload { version, services, time, remote_netaddr, nonce, agent, height, no_relay })
    }
}

pub const ZERO_HASH: [u8; 32] = [0u8; 32];

/// `{ varint hash_count, hash_count * 32-byte locator hashes, 32-byte stop_hash }`.
/// An empty locator is serialized as exactly one zero hash, per spec — not
/// as a zero-length list.
pub fn encode_getheaders(locator: &[[u8; 32]], stop_hash: [u8; 32]) -> Vec<u8> {
    let mut buf = Vec::new();
    if locator.is_empty() {
        write_varint(&mut buf, 1);
        buf.extend_from_slice(&ZERO_HASH);
    } else {
        write_varint(&mut buf, locator.len() as u64);
        for h in locator {
            buf.extend_from_slice(h);
        }
    }
    buf.extend_from_slice(&stop_hash);
    buf
}

pub fn decode_getheaders(buf: &[u8]) -> Result<(Vec<[u8; 32]>, [u8; 32]), CodecError> {
    let mut offset = 0usize;
    let count = read_varint(buf, &mut offset)?;
    let mut locator = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let h: [u8; 32] = buf
            .get(offset..offset + 32)
            .ok_or(CodecError::Truncated)?
            .try_into()
            .unwrap();
        locator.push(h);
        offset += 32;
    }
    let stop_hash: [u8; 32] = buf
        .get(offset..offset + 32)
        .ok_or(CodecError::Truncated)?
        .try_into()
        .unwrap();
    Ok((locator, stop_hash))
}

/// Exactly 64 bytes, root-first. Full nodes reject the reversed order, so
/// this layout is not negotiable.
pub fn encode_getproof(root: [u8; 32], name_hash: [u8; 32]) -> [u8; 64] {
    let mut buf = [0u8; 64];
    buf[0..32].copy_from_slice(&root);
    buf[32..64].copy_from_slice(&name_hash);
    buf
}

pub fn decode_getproof(buf: &[u8]) -> Result<([u8; 32], [u8; 32]), CodecError> {
    if buf.len() != 64 {
        return Err(CodecError::Truncated);
    }
    let root: [u8; 32] = buf[0..32].try_into().unwrap();
    let name_hash: [u8; 32] = buf[32..64].try_into().unwrap();
    Ok((root, name_hash))
}

/// `headers` batch: `{ varint count, count * 236-byte headers }`.
pub fn encode_headers(headers: &[BlockHeader]) -> Vec<u8> {
    let mut buf = Vec::new();
    write_varint(&mut buf, headers.len() as u64);
    for h in headers {
        buf.extend_from_slice(&h.to_bytes());
    }
    buf
}

pub fn decode_headers(buf: &[u8]) -> Result<Vec<BlockHeader>, CodecError> {
    let mut offset = 0usize;
    let count = read_varint(buf, &mut offset)?;
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let chunk = buf.get(offset..offset + HEADER_SIZE).ok_or(CodecError::Truncated)?;
        out.push(BlockHeader::from_bytes(chunk)?);
        offset += HEADER_SIZE;
    }
    Ok(out)
}

/// `ping`/`pong` carry an 8-byte nonce.
pub fn encode_nonce(nonce: u64) -> [u8; 8] {
    nonce.to_le_bytes()
}

pub fn decode_nonce(buf: &[u8]) -> Result<u64, CodecError> {
    if buf.len() != 8 {
        return Err(CodecError::Truncated);
    }
    Ok(u64::from_le_bytes(buf.try_into().unwrap()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header(nonce: u64) -> BlockHeader {
        BlockHeader {
            version: 1,
            prev_hash: [1u8; 32],
            name_root: [2u8; 32],
            extra_root: [3u8; 32],
            mask_hash: [4u8; 32],
            time: 1_700_000_000,
            bits: 0x1d00ffff,
            nonce,
            extra_nonce: [0u8; 84],
        }
    }

    #[test]
    fn header_roundtrip() {
        let h = sample_header(42);
        let bytes = h.to_bytes();
        assert_eq!(bytes.len(), HEADER_SIZE);
        let parsed = BlockHeader::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, h);
    }

    #[test]
    fn header_hash_is_deterministic() {
        let h = sample_header(1);
        assert_eq!(h.hash(), h.hash());
        assert_ne!(h.hash(), sample_header(2).hash());
    }

    #[test]
    fn version_payload_roundtrip() {
        let v = VersionPayload {
            version: crate::wire::PROTOCOL_VERSION,
            services: crate::wire::SERVICE_NETWORK,
            time: 123,
            remote_netaddr: NetAddr::unspecified(),
            nonce: 0xdead_beef,
            agent: "/hnsresolve:0.1/".to_string(),
            height: 200_100,
            no_relay: true,
        };
        let encoded = v.encode();
        let decoded = VersionPayload::decode(&encoded).unwrap();
        assert_eq!(decoded.version, v.version);
        assert_eq!(decoded.services, v.services);
        assert_eq!(decoded.agent, v.agent);
        assert_eq!(decoded.height, v.height);
        assert!(decoded.no_relay);
    }

    #[test]
    fn empty_locator_is_single_zero_hash() {
        let payload = encode_getheaders(&[], ZERO_HASH);
        let (locator, stop) = decode_getheaders(&payload).unwrap();
        assert_eq!(locator, vec![ZERO_HASH]);
        assert_eq!(stop, ZERO_HASH);
        // varint(1) + 32 zero bytes + 32 zero stop bytes
        assert_eq!(payload.len(), 1 + 32 + 32);
    }

    #[test]
    fn getproof_payload_layout() {
        let root = [7u8; 32];
        let name_hash = [9u8; 32];
        let payload = encode_getproof(root, name_hash);
        assert_eq!(payload.len(), 64);
        assert_eq!(&payload[0..32], &root);
        assert_eq!(&payload[32..64], &name_hash);
        let (r, n) = decode_getproof(&payload).unwrap();
        assert_eq!(r, root);
        assert_eq!(n, name_hash);
    }

    #[test]
    fn headers_batch_roundtrip() {
        let headers: Vec<_> = (0..5).map(sample_header).collect();
        let encoded = encode_headers(&headers);
        let decoded = decode_headers(&encoded).unwrap();
        assert_eq!(decoded, headers);
    }
}
