// Crate-wide error taxonomy.
// Per-peer transport/protocol errors never cross the orchestrator boundary; they
// are caught and mapped to SyncAttemptResult / NameQueryResult. ResolverError
// exists only for the CLI/startup boundary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("bad magic: expected {expected:#x}, got {got:#x}")]
    BadMagic { expected: u32, got: u32 },

    #[error("payload too large: {got} bytes (max {max})")]
    PayloadTooLarge { got: u32, max: u32 },

    #[error("truncated frame")]
    Truncated,

    #[error("connection closed before any frame bytes arrived")]
    ConnectionClosed,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("handshake deadline exceeded")]
    Timeout,

    #[error("malformed version payload")]
    MalformedVersion,

    #[error("peer closed connection before handshake completed")]
    PeerClosed,
}

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("header does not connect to tip")]
    Disconnected,

    #[error("io error persisting chain: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt header record: expected {expected} bytes, got {got}")]
    CorruptRecord { expected: usize, got: usize },
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid data directory: {0}")]
    InvalidDataDir(String),

    #[error("no DNS seeds configured")]
    NoSeeds,

    #[error("invalid name hash: {0}")]
    InvalidNameHash(String),
}

#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("chain error: {0}")]
    Chain(#[from] ChainError),
}
