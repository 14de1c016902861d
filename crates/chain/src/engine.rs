//! # Staking Engine
//!
//! Owns the live registry and drives every consensus-relevant mutation
//! from blocks, in height order, exactly once per block. Everything
//! downstream (quorums, reward rotation, vote validation) is a pure
//! function of the state this module maintains.
//!
//! ## Design
//!
//! Two mutation sources with very different shapes meet here:
//!
//! * **Blocks** arrive sequentially and mutate registry state through
//!   `process_block` (`&mut self`). Registrations activate one block
//!   after the block that carried them, expiry runs per the protocol
//!   version's policy, deregistration transactions remove records, and
//!   the winner field rotates the reward mark.
//! * **Votes** arrive concurrently from the network and only touch the
//!   pool behind a mutex (`submit_vote` takes `&self`), validated
//!   against the quorum recorded for their target height.
//!
//! ## Invariant Preservation
//!
//! A bounded per-height snapshot history backs both vote validation at
//! past heights and reorg rollback. `rollback_to` restores a snapshot
//! byte-for-byte (including the reward sequence counter), so rolling
//! back and replaying a branch yields state identical to processing
//! that branch from scratch. A rollback below the retained window is a
//! fatal inconsistency, never a silent partial rewind.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use palisade_common::{ConsensusParams, Hash, PublicKey};

use crate::quorum::{self, QuorumState};
use crate::registry::{
    Contribution, RegistrationInfo, Registry, RegistryError, ServiceNodeRecord,
};
use crate::tx_extra::{validate_registration, TxExtraField};
use crate::vote_pool::{
    validate_deregistration, DeregPayload, DeregVote, VoteError, VotePool,
};

/// Extra snapshots retained beyond the vote lifetime so a reorg landing
/// right at the window edge still finds its fork point.
const REORG_SAFETY_MARGIN: u64 = 8;

// ════════════════════════════════════════════════════════════════════════════════
// INPUT / OUTPUT TYPES
// ════════════════════════════════════════════════════════════════════════════════

/// Everything the engine needs from one block: its position, its hash
/// (the quorum seed), its timestamp, and each transaction's decoded
/// extra fields.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockData {
    pub height: u64,
    pub hash: Hash,
    pub timestamp: u64,
    pub extras: Vec<Vec<TxExtraField>>,
}

/// What one block did to the staking state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockOutcome {
    /// Registrations that activated at this height.
    pub activated: Vec<PublicKey>,
    /// Records that aged out at this height.
    pub expired: Vec<ServiceNodeRecord>,
    /// Records removed by deregistration transactions in this block.
    pub deregistered: Vec<PublicKey>,
    /// Node credited by this block's winner field, if any.
    pub rewarded: Option<PublicKey>,
    /// The quorum derived from this block's post-state and hash.
    pub quorum: QuorumState,
}

/// A registration seen in a block, waiting for the next block to
/// activate.
#[derive(Clone, Debug, PartialEq, Eq)]
struct PendingRegistration {
    contributions: Vec<Contribution>,
    operator_cut: u64,
    seen_height: u64,
}

/// Post-state snapshot for one processed height.
#[derive(Clone, Debug, PartialEq, Eq)]
struct HistoryEntry {
    block_hash: Hash,
    registry: Registry,
    pending: BTreeMap<PublicKey, PendingRegistration>,
    quorum: QuorumState,
}

// ════════════════════════════════════════════════════════════════════════════════
// ERRORS
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("expected block at height {expected}, got {got}")]
    NonSequentialBlock { expected: u64, got: u64 },

    #[error("registry violation while activating a queued registration: {0}")]
    Registry(#[from] RegistryError),

    #[error("rollback to height {requested} reaches below the retained history ({retained_from})")]
    RollbackInconsistency { requested: u64, retained_from: u64 },
}

// ════════════════════════════════════════════════════════════════════════════════
// ENGINE
// ════════════════════════════════════════════════════════════════════════════════

pub struct StakingEngine {
    params: ConsensusParams,
    registry: Registry,
    pending: BTreeMap<PublicKey, PendingRegistration>,
    history: BTreeMap<u64, HistoryEntry>,
    tip: Option<u64>,
    vote_pool: Mutex<VotePool>,
}

impl StakingEngine {
    pub fn new(params: ConsensusParams) -> Self {
        StakingEngine {
            params,
            registry: Registry::new(),
            pending: BTreeMap::new(),
            history: BTreeMap::new(),
            tip: None,
            vote_pool: Mutex::new(VotePool::new()),
        }
    }

    // ────────────────────────────────────────────────────────────────
    // accessors
    // ────────────────────────────────────────────────────────────────

    pub fn params(&self) -> &ConsensusParams {
        &self.params
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn tip(&self) -> Option<u64> {
        self.tip
    }

    /// The quorum derived at `height`, if that height is still within
    /// the retained window.
    pub fn quorum_at(&self, height: u64) -> Option<&QuorumState> {
        self.history.get(&height).map(|e| &e.quorum)
    }

    /// Height at which a registration was seen but not yet activated.
    pub fn pending_since(&self, pubkey: &PublicKey) -> Option<u64> {
        self.pending.get(pubkey).map(|p| p.seen_height)
    }

    // ────────────────────────────────────────────────────────────────
    // block processing
    // ────────────────────────────────────────────────────────────────

    /// Apply one block. Blocks must arrive in strict height order; the
    /// first block may start at any height (sync from a checkpoint).
    ///
    /// Per-transaction failures (bad registration signature, under-voted
    /// deregistration) drop that transaction's effect and nothing else.
    /// A registry violation during activation of an already-validated
    /// queued registration is a state corruption and aborts.
    pub fn process_block(&mut self, block: &BlockData) -> Result<BlockOutcome, EngineError> {
        if let Some(tip) = self.tip {
            let expected = tip + 1;
            if block.height != expected {
                return Err(EngineError::NonSequentialBlock {
                    expected,
                    got: block.height,
                });
            }
        }

        let mut outcome = BlockOutcome::default();

        // 1. Activate registrations queued by earlier blocks. BTreeMap
        //    iteration fixes the activation order, which fixes the
        //    reward sequence numbers every node assigns.
        let ready: Vec<PublicKey> = self
            .pending
            .iter()
            .filter(|(_, p)| p.seen_height < block.height)
            .map(|(pk, _)| *pk)
            .collect();
        for pk in ready {
            let p = match self.pending.remove(&pk) {
                Some(p) => p,
                None => continue,
            };
            self.registry.activate(
                RegistrationInfo {
                    pubkey: pk,
                    contributions: p.contributions,
                    operator_cut: p.operator_cut,
                    valid_until: block.height + self.params.stake_lifetime_blocks,
                },
                block.height,
            )?;
            info!(node = %pk, height = block.height, "service node activated");
            outcome.activated.push(pk);
        }

        // 2. Expire per the version's policy.
        outcome.expired = self
            .registry
            .expire_older_than(block.height, self.params.expiry_policy);
        for record in &outcome.expired {
            info!(node = %record.pubkey, height = block.height, "stake expired");
        }

        // 3. Walk each transaction's extra fields.
        let mut winner: Option<PublicKey> = None;
        for fields in &block.extras {
            for field in fields {
                match field {
                    TxExtraField::Deregistration(payload) => {
                        if let Some(pk) = self.apply_deregistration(payload, block.height) {
                            outcome.deregistered.push(pk);
                        }
                    }
                    TxExtraField::Winner(pk) => winner = Some(*pk),
                    _ => {}
                }
            }
            if fields
                .iter()
                .any(|f| matches!(f, TxExtraField::Registration(_)))
            {
                self.queue_registration(fields, block);
            }
        }

        // 4. Credit the block's declared winner. Absence from the
        //    registry is benign (it can expire in the crediting block).
        if let Some(pk) = winner {
            if self.registry.mark_rewarded(&pk, block.height) {
                outcome.rewarded = Some(pk);
            } else {
                debug!(node = %pk, height = block.height, "winner no longer registered");
            }
        }

        // 5. Derive this height's quorum from the post-state.
        outcome.quorum = quorum::select(&self.registry.snapshot(), &block.hash);

        // 6. Snapshot, prune the window, cull stale vote cells.
        self.history.insert(
            block.height,
            HistoryEntry {
                block_hash: block.hash,
                registry: self.registry.clone(),
                pending: self.pending.clone(),
                quorum: outcome.quorum.clone(),
            },
        );
        let keep_from = block
            .height
            .saturating_sub(self.params.vote_lifetime + REORG_SAFETY_MARGIN);
        self.history.retain(|h, _| *h >= keep_from);
        self.vote_pool
            .lock()
            .cull_stale(block.height, self.params.vote_lifetime);

        self.tip = Some(block.height);
        Ok(outcome)
    }

    /// Validate one deregistration payload against the quorum at its
    /// target height. Any failure logs and skips the transaction.
    fn apply_deregistration(&mut self, payload: &DeregPayload, height: u64) -> Option<PublicKey> {
        if payload.height.saturating_add(self.params.vote_lifetime) < height {
            warn!(
                target_height = payload.height,
                height, "deregistration rejected: outside the vote lifetime"
            );
            return None;
        }
        let quorum = match self.history.get(&payload.height) {
            Some(entry) => &entry.quorum,
            None => {
                warn!(
                    target_height = payload.height,
                    height, "deregistration rejected: no quorum retained for that height"
                );
                return None;
            }
        };
        match validate_deregistration(payload, quorum) {
            Ok(pk) => {
                match self.registry.remove(&pk) {
                    Some(_) => info!(node = %pk, height, "service node deregistered"),
                    // already expired in this same window
                    None => debug!(node = %pk, height, "deregistered node was already gone"),
                }
                Some(pk)
            }
            Err(err) => {
                warn!(height, %err, "deregistration rejected");
                None
            }
        }
    }

    /// Validate a registration transaction and queue it for activation
    /// at the next block. Duplicates of an active or already-queued
    /// identity are logged no-ops.
    fn queue_registration(&mut self, fields: &[TxExtraField], block: &BlockData) {
        let validated = match validate_registration(fields, block.timestamp) {
            Ok(v) => v,
            Err(err) => {
                warn!(height = block.height, %err, "registration rejected");
                return;
            }
        };
        if self.registry.contains(&validated.pubkey) || self.pending.contains_key(&validated.pubkey)
        {
            debug!(node = %validated.pubkey, height = block.height, "registration ignored: identity already staked");
            return;
        }
        info!(node = %validated.pubkey, height = block.height, "registration queued");
        self.pending.insert(
            validated.pubkey,
            PendingRegistration {
                contributions: validated.contributions,
                operator_cut: validated.operator_cut,
                seen_height: block.height,
            },
        );
    }

    // ────────────────────────────────────────────────────────────────
    // vote ingestion
    // ────────────────────────────────────────────────────────────────

    /// Validate and pool a misbehavior vote. Safe to call concurrently
    /// with other votes; the engine serializes pool access internally.
    ///
    /// `Ok(Some(payload))` is the threshold signal: the caller should
    /// build and broadcast a deregistration transaction from it.
    pub fn submit_vote(&self, vote: &DeregVote) -> Result<Option<DeregPayload>, VoteError> {
        let tip = match self.tip {
            Some(tip) => tip,
            None => return Err(VoteError::QuorumUnavailable(vote.height)),
        };
        if vote.height.saturating_add(self.params.vote_lifetime) < tip {
            return Err(VoteError::StaleHeight {
                height: vote.height,
                tip,
            });
        }
        let quorum = match self.history.get(&vote.height) {
            Some(entry) => &entry.quorum,
            None => return Err(VoteError::QuorumUnavailable(vote.height)),
        };

        let result = self.vote_pool.lock().insert_vote(vote, quorum);
        match &result {
            Ok(Some(payload)) => info!(
                target_height = payload.height,
                tested_index = payload.tested_index,
                "deregistration threshold reached"
            ),
            Ok(None) => debug!(
                target_height = vote.height,
                voter_index = vote.voter_index,
                "vote pooled"
            ),
            Err(err) => debug!(target_height = vote.height, %err, "vote rejected"),
        }
        result
    }

    // ────────────────────────────────────────────────────────────────
    // reorg handling
    // ────────────────────────────────────────────────────────────────

    /// Rewind state to the snapshot taken at `height`. Vote cells for
    /// heights above it are dropped: their quorums belonged to the
    /// abandoned branch.
    pub fn rollback_to(&mut self, height: u64) -> Result<(), EngineError> {
        match self.tip {
            Some(tip) if height < tip => {}
            // rolling back to the tip or beyond it changes nothing
            _ => return Ok(()),
        }
        let entry = match self.history.get(&height) {
            Some(entry) => entry.clone(),
            None => {
                let retained_from = self.history.keys().next().copied().unwrap_or(0);
                return Err(EngineError::RollbackInconsistency {
                    requested: height,
                    retained_from,
                });
            }
        };
        info!(from = ?self.tip, to = height, "rolling back staking state");
        self.registry = entry.registry;
        self.pending = entry.pending;
        self.history.retain(|h, _| *h <= height);
        self.vote_pool.lock().discard_above(height);
        self.tip = Some(height);
        Ok(())
    }

    /// Switch to a better branch: rewind to the fork point, then apply
    /// the replacement blocks in order. The resulting state matches
    /// processing the winning branch from scratch.
    pub fn reorganize(
        &mut self,
        fork_height: u64,
        blocks: &[BlockData],
    ) -> Result<Vec<BlockOutcome>, EngineError> {
        self.rollback_to(fork_height)?;
        let mut outcomes = Vec::with_capacity(blocks.len());
        for block in blocks {
            outcomes.push(self.process_block(block)?);
        }
        Ok(outcomes)
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// TESTS
// ════════════════════════════════════════════════════════════════════════════════
