use sha2::{Digest, Sha256};

use crate::budget::PadState;

/// Run-scoped state shared by the stages of one normalization. Nothing here outlives the
/// run, so two runs with the same inputs make the same choices.
#[derive(Clone, Debug, Default)]
pub struct RunContext {
    pub seed: u64,
    /// Advanced once per duplicate sentence handled.
    pub variant: usize,
    /// Script-level pad rotation.
    pub pads: PadState,
    /// Block-level topic padding rotation.
    pub block_pads: PadState,
}

impl RunContext {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            ..Self::default()
        }
    }
}

/// First 8 bytes of SHA-256(`topic|audience|type`), big endian.
#[must_use]
pub fn derive_seed(topic: &str, audience: &str, script_type: &str) -> u64 {
    let digest = Sha256::digest(format!("{topic}|{audience}|{script_type}").as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(head)
}

/// Hex SHA-256 of the raw blocks, record-separated.
#[must_use]
pub fn input_fingerprint(blocks: &[String]) -> String {
    let mut hasher = Sha256::new();
    for b in blocks {
        hasher.update(b.as_bytes());
        hasher.update([0x1e]);
    }
    hex::encode(hasher.finalize())
}
