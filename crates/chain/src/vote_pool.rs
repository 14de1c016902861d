//! # Deregistration Vote Pool
//!
//! Accumulates signed misbehavior votes keyed by
//! `(target height, tested index)` until the kick threshold is reached,
//! then emits exactly one deregistration payload per cell.
//!
//! ## Cell state machine
//!
//! ```text
//! Empty       → Collecting   first valid vote arrives
//! Collecting  → Collecting   further distinct-voter votes accepted
//! Collecting  → Resolved     MIN_VOTES_TO_KICK reached; payload emitted once
//! any         → Discarded    cell height falls behind the chain (culled)
//! ```
//!
//! Rejections are expected under adversarial or stale network conditions:
//! every validation failure drops the single vote and nothing else. The
//! pool itself holds no lock; the engine wraps it in a mutex so concurrent
//! ingestion keeps duplicate detection and threshold counting race-free.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use palisade_common::crypto::ed25519_verify;
use palisade_common::{PublicKey, Signature};

use crate::quorum::{QuorumState, MIN_VOTES_TO_KICK};

/// Domain tag prefixed to every vote signing message.
const VOTE_DOMAIN: &[u8] = b"palisade.dereg.vote.v1";

/// Canonical signed content of a deregistration vote: the domain tag,
/// the target height and the tested index, big-endian, nothing else.
pub fn vote_message(height: u64, tested_index: u32) -> Vec<u8> {
    let mut msg = Vec::with_capacity(VOTE_DOMAIN.len() + 12);
    msg.extend_from_slice(VOTE_DOMAIN);
    msg.extend_from_slice(&height.to_be_bytes());
    msg.extend_from_slice(&tested_index.to_be_bytes());
    msg
}

// ════════════════════════════════════════════════════════════════════════════════
// WIRE TYPES
// ════════════════════════════════════════════════════════════════════════════════

/// A single vote as relayed over the P2P layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeregVote {
    /// Block height whose quorum this vote refers to.
    pub height: u64,
    /// Index of the accused node within the to-test list at that height.
    pub tested_index: u32,
    /// Index of the voting member within the voters list at that height.
    pub voter_index: u32,
    /// Signature over [`vote_message`] by the voter's identity key.
    pub signature: Signature,
}

/// One resolved vote as embedded in a deregistration tx-extra field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub voter_index: u32,
    pub signature: Signature,
}

/// The payload a resolved cell emits, destined for broadcast and
/// eventual inclusion in a deregistration transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeregPayload {
    pub height: u64,
    pub tested_index: u32,
    /// Sorted by voter index; at least [`MIN_VOTES_TO_KICK`] entries.
    pub votes: Vec<VoteRecord>,
}

// ════════════════════════════════════════════════════════════════════════════════
// ERRORS
// ════════════════════════════════════════════════════════════════════════════════

/// Why a single vote was dropped. Never fatal; never halts ingestion of
/// subsequent votes.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum VoteError {
    #[error("vote targets height {height} but the tip is {tip}; outside the actionable window")]
    StaleHeight { height: u64, tip: u64 },

    #[error("no quorum derivable for height {0}")]
    QuorumUnavailable(u64),

    #[error("tested index {tested_index} does not exist in the quorum at height {height}")]
    UnknownTestedIndex { height: u64, tested_index: u32 },

    #[error("voter index {voter_index} does not exist in the quorum at height {height}")]
    UnknownVoterIndex { height: u64, voter_index: u32 },

    #[error("signature does not verify for voter index {voter_index}")]
    BadSignature { voter_index: u32 },

    #[error("duplicate vote from voter index {voter_index}")]
    DuplicateVoter { voter_index: u32 },

    #[error("unknown cell: height {height}, tested index {tested_index} already resolved")]
    CellResolved { height: u64, tested_index: u32 },

    #[error("only {got} distinct valid votes, {required} required")]
    NotEnoughVotes { got: usize, required: usize },
}

// ════════════════════════════════════════════════════════════════════════════════
// POOL
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Debug, PartialEq, Eq)]
enum CellState {
    Collecting(Vec<VoteRecord>),
    /// Threshold reached and payload emitted. The marker stays until the
    /// height is culled so late votes are rejected as "unknown cell"
    /// instead of re-opening the cell.
    Resolved,
}

/// Buffered, not-yet-resolved vote cells.
#[derive(Clone, Debug, Default)]
pub struct VotePool {
    cells: HashMap<(u64, u32), CellState>,
}

impl VotePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (collecting or resolved-marker) cells.
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Validate and insert one vote against the quorum at its target
    /// height.
    ///
    /// Returns `Ok(Some(payload))` exactly once per cell, when this vote
    /// is the threshold vote; `Ok(None)` for an accepted sub-threshold
    /// vote (callers relay newly accepted votes).
    pub fn insert_vote(
        &mut self,
        vote: &DeregVote,
        quorum: &QuorumState,
    ) -> Result<Option<DeregPayload>, VoteError> {
        // resolve both indices against the quorum for that height
        if quorum.tested(vote.tested_index).is_none() {
            return Err(VoteError::UnknownTestedIndex {
                height: vote.height,
                tested_index: vote.tested_index,
            });
        }
        let voter = quorum
            .voter(vote.voter_index)
            .ok_or(VoteError::UnknownVoterIndex {
                height: vote.height,
                voter_index: vote.voter_index,
            })?;

        let msg = vote_message(vote.height, vote.tested_index);
        if !ed25519_verify(&voter.pubkey, &msg, &vote.signature) {
            return Err(VoteError::BadSignature {
                voter_index: vote.voter_index,
            });
        }

        let key = (vote.height, vote.tested_index);
        let cell = self
            .cells
            .entry(key)
            .or_insert_with(|| CellState::Collecting(Vec::new()));

        let resolved = match cell {
            CellState::Resolved => {
                return Err(VoteError::CellResolved {
                    height: vote.height,
                    tested_index: vote.tested_index,
                });
            }
            CellState::Collecting(votes) => {
                if votes.iter().any(|v| v.voter_index == vote.voter_index) {
                    return Err(VoteError::DuplicateVoter {
                        voter_index: vote.voter_index,
                    });
                }
                votes.push(VoteRecord {
                    voter_index: vote.voter_index,
                    signature: vote.signature,
                });
                if votes.len() >= MIN_VOTES_TO_KICK {
                    Some(std::mem::take(votes))
                } else {
                    None
                }
            }
        };

        match resolved {
            Some(mut votes) => {
                *cell = CellState::Resolved;
                votes.sort_by_key(|v| v.voter_index);
                Ok(Some(DeregPayload {
                    height: vote.height,
                    tested_index: vote.tested_index,
                    votes,
                }))
            }
            None => Ok(None),
        }
    }

    /// Discard every cell whose target height can no longer be acted on.
    /// This is the pool's only timeout mechanism; there is no per-vote
    /// timer. Returns the number of discarded cells.
    pub fn cull_stale(&mut self, tip: u64, vote_lifetime: u64) -> usize {
        let before = self.cells.len();
        self.cells
            .retain(|(height, _), _| height.saturating_add(vote_lifetime) >= tip);
        before - self.cells.len()
    }

    /// Drop cells targeting heights above `height`, used when the chain
    /// reorganizes below them, since their votes were validated against
    /// the abandoned branch's quorums.
    pub fn discard_above(&mut self, height: u64) {
        self.cells.retain(|(h, _), _| *h <= height);
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// DEREGISTRATION FIELD VALIDATION
// ════════════════════════════════════════════════════════════════════════════════

/// Validate a deregistration payload (as carried on-chain) against the
/// quorum at its height. Returns the accused node's identity key.
///
/// Checks: tested index exists, every voter index exists and is distinct,
/// every signature verifies over exactly `(height, tested_index)`, and at
/// least [`MIN_VOTES_TO_KICK`] votes remain.
pub fn validate_deregistration(
    payload: &DeregPayload,
    quorum: &QuorumState,
) -> Result<PublicKey, VoteError> {
    let tested = quorum
        .tested(payload.tested_index)
        .ok_or(VoteError::UnknownTestedIndex {
            height: payload.height,
            tested_index: payload.tested_index,
        })?;

    let msg = vote_message(payload.height, payload.tested_index);
    let mut seen: Vec<u32> = Vec::with_capacity(payload.votes.len());
    for v in &payload.votes {
        if seen.contains(&v.voter_index) {
            return Err(VoteError::DuplicateVoter {
                voter_index: v.voter_index,
            });
        }
        let voter = quorum
            .voter(v.voter_index)
            .ok_or(VoteError::UnknownVoterIndex {
                height: payload.height,
                voter_index: v.voter_index,
            })?;
        if !ed25519_verify(&voter.pubkey, &msg, &v.signature) {
            return Err(VoteError::BadSignature {
                voter_index: v.voter_index,
            });
        }
        seen.push(v.voter_index);
    }

    if seen.len() < MIN_VOTES_TO_KICK {
        return Err(VoteError::NotEnoughVotes {
            got: seen.len(),
            required: MIN_VOTES_TO_KICK,
        });
    }

    Ok(tested.pubkey)
}

// ════════════════════════════════════════════════════════════════════════════════
// TESTS
// ════════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quorum::{select, QUORUM_SIZE};
    use palisade_common::crypto::{keypair_from_seed, sign, SecretKey};
    use palisade_common::Hash;

    /// Build 11 real keypairs, the quorum over them, and a secret-key
    /// lookup by pubkey.
    fn quorum_fixture() -> (QuorumState, Vec<(PublicKey, SecretKey)>) {
        let keys: Vec<(PublicKey, SecretKey)> =
            (1..=11u8).map(|b| keypair_from_seed([b; 32])).collect();
        let mut snapshot: Vec<PublicKey> = keys.iter().map(|(pk, _)| *pk).collect();
        snapshot.sort();
        let quorum = select(&snapshot, &Hash([0x5A; 64]));
        assert_eq!(quorum.voters.len(), QUORUM_SIZE);
        assert_eq!(quorum.to_test.len(), 1);
        (quorum, keys)
    }

    fn secret_for(keys: &[(PublicKey, SecretKey)], pk: &PublicKey) -> SecretKey {
        keys.iter()
            .find(|(k, _)| k == pk)
            .map(|(_, s)| s.clone())
            .expect("key present")
    }

    fn signed_vote(
        quorum: &QuorumState,
        keys: &[(PublicKey, SecretKey)],
        height: u64,
        tested_index: u32,
        voter_index: u32,
    ) -> DeregVote {
        let voter = quorum.voter(voter_index).expect("voter exists");
        let sk = secret_for(keys, &voter.pubkey);
        let sig = sign(&sk, &vote_message(height, tested_index));
        DeregVote {
            height,
            tested_index,
            voter_index,
            signature: sig,
        }
    }

    // ────────────────────────────────────────────────────────────────
    // threshold exactness
    // ────────────────────────────────────────────────────────────────

    #[test]
    fn six_votes_do_not_resolve_seventh_does() {
        let (quorum, keys) = quorum_fixture();
        let mut pool = VotePool::new();

        for voter_index in 0..6u32 {
            let v = signed_vote(&quorum, &keys, 20, 0, voter_index);
            let out = pool.insert_vote(&v, &quorum).expect("accepted");
            assert!(out.is_none(), "one vote short must never resolve");
        }

        let v7 = signed_vote(&quorum, &keys, 20, 0, 6);
        let payload = pool
            .insert_vote(&v7, &quorum)
            .expect("accepted")
            .expect("threshold vote resolves the cell");
        assert_eq!(payload.height, 20);
        assert_eq!(payload.tested_index, 0);
        assert_eq!(payload.votes.len(), MIN_VOTES_TO_KICK);
        let indices: Vec<u32> = payload.votes.iter().map(|v| v.voter_index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4, 5, 6]);

        // the cell is gone: an eighth vote hits the resolved marker
        let v8 = signed_vote(&quorum, &keys, 20, 0, 7);
        assert_eq!(
            pool.insert_vote(&v8, &quorum),
            Err(VoteError::CellResolved {
                height: 20,
                tested_index: 0
            })
        );
    }

    #[test]
    fn duplicate_voter_never_counts_twice() {
        let (quorum, keys) = quorum_fixture();
        let mut pool = VotePool::new();

        let v = signed_vote(&quorum, &keys, 20, 0, 3);
        assert!(pool.insert_vote(&v, &quorum).expect("first").is_none());
        assert_eq!(
            pool.insert_vote(&v, &quorum),
            Err(VoteError::DuplicateVoter { voter_index: 3 })
        );

        // six more distinct voters; total distinct = 7 → resolves exactly
        // on the seventh distinct voter, not earlier
        for (n, voter_index) in [0u32, 1, 2, 4, 5, 6].iter().enumerate() {
            let v = signed_vote(&quorum, &keys, 20, 0, *voter_index);
            let out = pool.insert_vote(&v, &quorum).expect("accepted");
            if n < 5 {
                assert!(out.is_none());
            } else {
                assert!(out.is_some());
            }
        }
    }

    // ────────────────────────────────────────────────────────────────
    // rejection paths
    // ────────────────────────────────────────────────────────────────

    #[test]
    fn unknown_indices_rejected() {
        let (quorum, keys) = quorum_fixture();
        let mut pool = VotePool::new();

        let mut v = signed_vote(&quorum, &keys, 20, 0, 0);
        v.tested_index = 5; // only one to-test entry exists
        assert!(matches!(
            pool.insert_vote(&v, &quorum),
            Err(VoteError::UnknownTestedIndex { tested_index: 5, .. })
        ));

        let mut v = signed_vote(&quorum, &keys, 20, 0, 0);
        v.voter_index = 99;
        assert!(matches!(
            pool.insert_vote(&v, &quorum),
            Err(VoteError::UnknownVoterIndex { voter_index: 99, .. })
        ));
    }

    #[test]
    fn forged_signature_rejected() {
        let (quorum, keys) = quorum_fixture();
        let mut pool = VotePool::new();

        // signed by voter 1's key but claiming voter 0's slot
        let voter1 = quorum.voter(1).expect("exists");
        let sk = secret_for(&keys, &voter1.pubkey);
        let forged = DeregVote {
            height: 20,
            tested_index: 0,
            voter_index: 0,
            signature: sign(&sk, &vote_message(20, 0)),
        };
        assert_eq!(
            pool.insert_vote(&forged, &quorum),
            Err(VoteError::BadSignature { voter_index: 0 })
        );
        assert_eq!(pool.cell_count(), 0);
    }

    #[test]
    fn signature_over_wrong_pair_rejected() {
        let (quorum, keys) = quorum_fixture();
        let mut pool = VotePool::new();

        // replayed from a different height: signature covers (21, 0),
        // vote claims (20, 0)
        let voter = quorum.voter(0).expect("exists");
        let sk = secret_for(&keys, &voter.pubkey);
        let replayed = DeregVote {
            height: 20,
            tested_index: 0,
            voter_index: 0,
            signature: sign(&sk, &vote_message(21, 0)),
        };
        assert!(matches!(
            pool.insert_vote(&replayed, &quorum),
            Err(VoteError::BadSignature { .. })
        ));
    }

    #[test]
    fn empty_quorum_rejects_everything() {
        let quorum = QuorumState::default();
        let mut pool = VotePool::new();
        let vote = DeregVote {
            height: 5,
            tested_index: 0,
            voter_index: 0,
            signature: Signature([0u8; 64]),
        };
        assert!(matches!(
            pool.insert_vote(&vote, &quorum),
            Err(VoteError::UnknownTestedIndex { .. })
        ));
    }

    #[test]
    fn rejection_does_not_poison_later_votes() {
        let (quorum, keys) = quorum_fixture();
        let mut pool = VotePool::new();

        let mut bad = signed_vote(&quorum, &keys, 20, 0, 0);
        bad.signature = Signature([0u8; 64]);
        assert!(pool.insert_vote(&bad, &quorum).is_err());

        let good = signed_vote(&quorum, &keys, 20, 0, 0);
        assert!(pool.insert_vote(&good, &quorum).expect("accepted").is_none());
    }

    // ────────────────────────────────────────────────────────────────
    // culling
    // ────────────────────────────────────────────────────────────────

    #[test]
    fn stale_cells_discarded_without_emitting() {
        let (quorum, keys) = quorum_fixture();
        let mut pool = VotePool::new();
        for voter_index in 0..6u32 {
            let v = signed_vote(&quorum, &keys, 20, 0, voter_index);
            pool.insert_vote(&v, &quorum).expect("accepted");
        }
        assert_eq!(pool.cell_count(), 1);

        // within lifetime: kept
        assert_eq!(pool.cull_stale(20 + 60, 60), 0);
        // beyond lifetime: discarded silently
        assert_eq!(pool.cull_stale(20 + 61, 60), 1);
        assert_eq!(pool.cell_count(), 0);
    }

    #[test]
    fn discard_above_drops_post_fork_cells() {
        let (quorum, keys) = quorum_fixture();
        let mut pool = VotePool::new();
        let v = signed_vote(&quorum, &keys, 20, 0, 0);
        pool.insert_vote(&v, &quorum).expect("accepted");
        pool.discard_above(19);
        assert_eq!(pool.cell_count(), 0);
    }

    // ────────────────────────────────────────────────────────────────
    // payload validation
    // ────────────────────────────────────────────────────────────────

    #[test]
    fn resolved_payload_validates_against_same_quorum() {
        let (quorum, keys) = quorum_fixture();
        let mut pool = VotePool::new();
        let mut payload = None;
        for voter_index in 0..7u32 {
            let v = signed_vote(&quorum, &keys, 20, 0, voter_index);
            payload = pool.insert_vote(&v, &quorum).expect("accepted");
        }
        let payload = payload.expect("resolved");
        let accused = validate_deregistration(&payload, &quorum).expect("valid");
        assert_eq!(accused, quorum.tested(0).expect("exists").pubkey);
    }

    #[test]
    fn payload_below_threshold_rejected() {
        let (quorum, keys) = quorum_fixture();
        let mut votes = Vec::new();
        for voter_index in 0..6u32 {
            let v = signed_vote(&quorum, &keys, 20, 0, voter_index);
            votes.push(VoteRecord {
                voter_index,
                signature: v.signature,
            });
        }
        let payload = DeregPayload {
            height: 20,
            tested_index: 0,
            votes,
        };
        assert_eq!(
            validate_deregistration(&payload, &quorum),
            Err(VoteError::NotEnoughVotes {
                got: 6,
                required: MIN_VOTES_TO_KICK
            })
        );
    }

    #[test]
    fn payload_with_duplicate_voter_rejected() {
        let (quorum, keys) = quorum_fixture();
        let one = signed_vote(&quorum, &keys, 20, 0, 0);
        let votes = vec![
            VoteRecord {
                voter_index: 0,
                signature: one.signature
            };
            7
        ];
        let payload = DeregPayload {
            height: 20,
            tested_index: 0,
            votes,
        };
        assert_eq!(
            validate_deregistration(&payload, &quorum),
            Err(VoteError::DuplicateVoter { voter_index: 0 })
        );
    }
}
