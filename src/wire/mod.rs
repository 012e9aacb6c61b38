// Wire protocol: framing, varints, and the typed messages exchanged with peers.

pub mod codec;
pub mod messages;

pub use codec::{Command, Frame, MAX_PAYLOAD_SIZE};
pub use messages::*;

/// Fixed 32-bit magic prefixing every frame. Distinct from Bitcoin's own
/// mainnet magic (`0xD9B4_BEF9`) so frames from unrelated networks are
/// rejected outright rather than merely misparsed.
pub const MAGIC_MAINNET: u32 = 0x48_4e_53_00;

pub const PROTOCOL_VERSION: u32 = 1;

/// bit 0 of the services field.
pub const SERVICE_NETWORK: u64 = 0x01;

pub const DEFAULT_P2P_PORT: u16 = 12038;
