pub mod checkpoint;

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::Path;

use crate::error::ChainError;
use crate::wire::messages::{BlockHeader, HEADER_SIZE};

pub use checkpoint::CHECKPOINT_HEIGHT;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Accepted,
    Duplicate,
    Disconnected,
}

/// Validated header chain rooted at the compiled-in checkpoint. Single
/// writer at a time — callers serialize `try_append` across concurrent sync
/// attempts; queries only ever read the tip snapshot.
#[derive(Debug)]
pub struct HeaderChain {
    headers: BTreeMap<u32, (BlockHeader, [u8; 32])>,
    hash_index: HashMap<[u8; 32], u32>,
    checkpoint_height: u32,
}

impl HeaderChain {
    pub fn init_from_checkpoint() -> Self {
        let mut headers = BTreeMap::new();
        let mut hash_index = HashMap::new();
        for (height, header, hash) in checkpoint::checkpoint_headers() {
            headers.insert(height, (header, hash));
            hash_index.insert(hash, height);
        }
        HeaderChain { headers, hash_index, checkpoint_height: checkpoint::CHECKPOINT_HEIGHT }
    }

    pub fn tip_height(&self) -> u32 {
        *self.headers.keys().next_back().expect("chain always has at least the checkpoint range")
    }

    pub fn tip_hash(&self) -> [u8; 32] {
        self.headers[&self.tip_height()].1
    }

    pub fn current_name_root(&self) -> [u8; 32] {
        self.headers[&self.tip_height()].0.name_root
    }

    /// Tip plus up to 10 ancestors, exponentially spaced, never stepping
    /// below the checkpoint.
    pub fn locator(&self) -> Vec<[u8; 32]> {
        let mut out = Vec::with_capacity(10);
        let mut height = self.tip_height();
        let mut step: u32 = 1;

        loop {
            if let Some((_, hash)) = self.headers.get(&height) {
                out.push(*hash);
            }
            if out.len() >= 10 || height <= self.checkpoint_height {
                break;
            }
            let next = height.saturating_sub(step).max(self.checkpoint_height);
            if next == height {
                break;
            }
            height = next;
            step = step.saturating_mul(2);
        }
        out
    }

    /// Acceptance requires `header.prev_hash == tip_hash()`. Duplicates
    /// (hash already indexed) are non-fatal; anything else disconnects.
    pub fn try_append(&mut self, header: BlockHeader, hash: [u8; 32]) -> AppendOutcome {
        if self.hash_index.contains_key(&hash) {
            return AppendOutcome::Duplicate;
        }
        if header.prev_hash != self.tip_hash() {
            return AppendOutcome::Disconnected;
        }
        let height = self.tip_height() + 1;
        self.headers.insert(height, (header, hash));
        self.hash_index.insert(hash, height);
        AppendOutcome::Accepted
    }

    pub fn contains_hash(&self, hash: &[u8; 32]) -> bool {
        self.hash_index.contains_key(hash)
    }

    /// Sequential 236-byte records, checkpoint height through tip, in order.
    pub fn persist_to(&self, path: &Path) -> Result<(), ChainError> {
        let mut file = std::fs::File::create(path)?;
        for (_, (header, _)) in self.headers.iter() {
            file.write_all(&header.to_bytes())?;
        }
        Ok(())
    }

    pub fn load_from(path: &Path) -> Result<Self, ChainError> {
        let mut chain = Self::init_from_checkpoint();
        let mut file = match std::fs::File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(chain),
            Err(e) => return Err(e.into()),
        };

        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;
        if buf.len() % HEADER_SIZE != 0 {
            return Err(ChainError::CorruptRecord { expected: HEADER_SIZE, got: buf.len() % HEADER_SIZE });
        }

        // The persisted file covers the checkpoint range too; only headers
        // past our in-memory checkpoint tip extend the chain.
        let checkpoint_tip = chain.tip_height();
        let mut height = chain.checkpoint_height;
        for chunk in buf.chunks(HEADER_SIZE) {
            let header = BlockHeader::from_bytes(chunk).map_err(|_| ChainError::CorruptRecord {
                expected: HEADER_SIZE,
                got: chunk.len(),
            })?;
            if height > checkpoint_tip {
                let hash = header.hash();
                if chain.try_append(header, hash) == AppendOutcome::Disconnected {
                    return Err(ChainError::Disconnected);
                }
            }
            height += 1;
        }
        Ok(chain)
    }
}
