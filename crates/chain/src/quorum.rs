//! # Quorum Selector
//!
//! Deterministic, seed-driven selection of the voting quorum and the
//! disjoint to-test set for one block.
//!
//! ## Determinism
//!
//! The permutation is Fisher-Yates driven by a ChaCha20 PRNG seeded from
//! the first 32 bytes of the block hash. `gen_range` uses rejection
//! sampling, so there is no modulo bias and the sequence is identical on
//! every architecture. Given the same registry snapshot and block hash,
//! every validator derives the same quorum independently, with no clock and no
//! external randomness.
//!
//! Quorum state is never persisted; it is a pure function of
//! `(snapshot, block_hash)` and is recomputed on demand.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};

use palisade_common::{Hash, PublicKey};

/// Number of voting members selected per block.
pub const QUORUM_SIZE: usize = 10;

/// Distinct votes required to deregister a tested node.
pub const MIN_VOTES_TO_KICK: usize = 7;

/// One selected member, tagged with its position in the overall shuffle.
///
/// Voters carry positions `0..QUORUM_SIZE`; to-test entries carry
/// positions offset by `QUORUM_SIZE`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuorumEntry {
    pub position: u32,
    pub pubkey: PublicKey,
}

/// The two disjoint lists derived from one block's shuffle.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuorumState {
    pub voters: Vec<QuorumEntry>,
    pub to_test: Vec<QuorumEntry>,
}

impl QuorumState {
    /// True when no voting is possible this block (registry too small).
    pub fn is_empty(&self) -> bool {
        self.voters.is_empty()
    }

    /// Voter at the given quorum index, if any.
    pub fn voter(&self, index: u32) -> Option<&QuorumEntry> {
        self.voters.get(index as usize)
    }

    /// Tested node at the given to-test index, if any.
    pub fn tested(&self, index: u32) -> Option<&QuorumEntry> {
        self.to_test.get(index as usize)
    }
}

/// Seed bytes for the shuffle PRNG: the leading 32 bytes of the block
/// hash, used as-is with no further transformation.
fn seed_from_hash(block_hash: &Hash) -> [u8; 32] {
    let mut seed = [0u8; 32];
    seed.copy_from_slice(&block_hash.as_bytes()[..32]);
    seed
}

/// Select the quorum for a block.
///
/// `snapshot` must be the registry's canonically ordered key list as of
/// this block. If it does not exceed [`QUORUM_SIZE`] the result is the
/// empty quorum, an expected condition during network bootstrap rather than an
/// error: there must be at least one node left over to be tested.
pub fn select(snapshot: &[PublicKey], block_hash: &Hash) -> QuorumState {
    if snapshot.len() <= QUORUM_SIZE {
        return QuorumState::default();
    }

    let mut indices: Vec<usize> = (0..snapshot.len()).collect();
    let mut rng = ChaCha20Rng::from_seed(seed_from_hash(block_hash));

    // Fisher-Yates (Knuth) shuffle, identical to the committee shuffle
    // elsewhere in the stack: j drawn inclusively in [0, i].
    for i in (1..indices.len()).rev() {
        let j = rng.gen_range(0..=i);
        indices.swap(i, j);
    }

    let voters = indices[..QUORUM_SIZE]
        .iter()
        .enumerate()
        .map(|(pos, &idx)| QuorumEntry {
            position: pos as u32,
            pubkey: snapshot[idx],
        })
        .collect();

    let to_test = indices[QUORUM_SIZE..]
        .iter()
        .enumerate()
        .map(|(pos, &idx)| QuorumEntry {
            position: (QUORUM_SIZE + pos) as u32,
            pubkey: snapshot[idx],
        })
        .collect();

    QuorumState { voters, to_test }
}

// ════════════════════════════════════════════════════════════════════════════════
// TESTS
// ════════════════════════════════════════════════════════════════════════════════
