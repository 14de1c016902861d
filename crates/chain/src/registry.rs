//! # Stake Registry
//!
//! Holds the set of currently active registered service nodes, their
//! contributor/stake breakdown, and lifecycle bookkeeping.
//!
//! ## Design
//!
//! Records live in a `BTreeMap` keyed by identity public key, so the
//! canonical order (ascending pubkey) is a property of the container and
//! every node derives the identical quorum input from the same state.
//!
//! ## Invariant Preservation
//!
//! The registry is mutated only through `activate`, `expire_older_than`,
//! `remove`, and `mark_rewarded`. All validations are performed BEFORE any
//! mutation; if any validation fails, no state is modified. Everything
//! else is a read-only projection.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use palisade_common::{Address, ExpiryPolicy, PublicKey};

/// Total stake unit: every registration's portion list sums to exactly
/// this many portions, however many contributors share the stake.
pub const STAKING_PORTIONS: u64 = 1_000_000_000_000;

// ════════════════════════════════════════════════════════════════════════════════
// RECORD TYPES
// ════════════════════════════════════════════════════════════════════════════════

/// One contributor's share of a registration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contribution {
    /// Payout address the contributor's reward share goes to.
    pub address: Address,
    /// Share of [`STAKING_PORTIONS`] this contributor funded.
    pub portion: u64,
}

/// Stable rotation key for reward fairness.
///
/// Ordered by height first, then by a monotonically increasing insertion
/// sequence number. An explicit sort key, never container iteration
/// order. Two records can never share a `seq`, so the ordering is total.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LastRewardMark {
    pub height: u64,
    pub seq: u64,
}

/// One active registered service node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceNodeRecord {
    /// Identity public key. Also the registry key.
    pub pubkey: PublicKey,
    /// Contributor breakdown; portions sum to exactly [`STAKING_PORTIONS`].
    pub contributions: Vec<Contribution>,
    /// Operator's cut of the reward, in portions of [`STAKING_PORTIONS`].
    pub operator_cut: u64,
    /// Last block height at which this record may still be in the
    /// registry; the exact boundary depends on [`ExpiryPolicy`].
    pub valid_until: u64,
    /// Rotation marker; smallest mark wins the next reward.
    pub last_reward: LastRewardMark,
}

/// Validated registration handed to [`Registry::activate`] by the engine
/// once the activation height is reached.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationInfo {
    pub pubkey: PublicKey,
    pub contributions: Vec<Contribution>,
    pub operator_cut: u64,
    pub valid_until: u64,
}

// ════════════════════════════════════════════════════════════════════════════════
// ERRORS
// ════════════════════════════════════════════════════════════════════════════════

/// Structural registry violations.
///
/// These indicate an upstream validation bug (transactions must pass the
/// tx-extra validator before reaching the registry), so callers treat
/// them as fatal rather than dropping them silently.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("identity key {0} is already active in the registry")]
    DuplicateIdentity(PublicKey),

    #[error("portions sum to {actual}, expected exactly {expected}")]
    PortionSum { expected: u64, actual: u64 },

    #[error("registration carries no contributions")]
    EmptyContributions,
}

// ════════════════════════════════════════════════════════════════════════════════
// REGISTRY
// ════════════════════════════════════════════════════════════════════════════════

/// Ordered collection of active service-node records.
///
/// An explicit, versioned value: the consensus engine owns instances and
/// clones them into its height history, so multiple chain tips can hold
/// independent registries during reorg evaluation. Never a singleton.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registry {
    records: BTreeMap<PublicKey, ServiceNodeRecord>,
    /// Next insertion sequence number for [`LastRewardMark::seq`].
    next_seq: u64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    // ────────────────────────────────────────────────────────────────
    // mutators
    // ────────────────────────────────────────────────────────────────

    /// Insert a newly activated registration.
    ///
    /// Validations (all before any mutation):
    /// 1. `info.pubkey` MUST NOT already be active.
    /// 2. `info.contributions` MUST be non-empty.
    /// 3. Portions MUST sum to exactly [`STAKING_PORTIONS`].
    ///
    /// The fresh record's reward mark is `(height, next_seq)`, putting new
    /// nodes at the back of the rotation behind anything rewarded earlier.
    pub fn activate(&mut self, info: RegistrationInfo, height: u64) -> Result<(), RegistryError> {
        if self.records.contains_key(&info.pubkey) {
            return Err(RegistryError::DuplicateIdentity(info.pubkey));
        }
        if info.contributions.is_empty() {
            return Err(RegistryError::EmptyContributions);
        }
        let total: u64 = info
            .contributions
            .iter()
            .fold(0u64, |acc, c| acc.saturating_add(c.portion));
        if total != STAKING_PORTIONS {
            return Err(RegistryError::PortionSum {
                expected: STAKING_PORTIONS,
                actual: total,
            });
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.records.insert(
            info.pubkey,
            ServiceNodeRecord {
                pubkey: info.pubkey,
                contributions: info.contributions,
                operator_cut: info.operator_cut,
                valid_until: info.valid_until,
                last_reward: LastRewardMark { height, seq },
            },
        );
        Ok(())
    }

    /// Remove every record whose validity window has passed at `height`,
    /// per the protocol version's expiry policy. Returns the removed
    /// records in canonical order. Idempotent: a second call at the same
    /// height removes nothing.
    pub fn expire_older_than(
        &mut self,
        height: u64,
        policy: ExpiryPolicy,
    ) -> Vec<ServiceNodeRecord> {
        let expired: Vec<PublicKey> = self
            .records
            .values()
            .filter(|r| match policy {
                ExpiryPolicy::AtBoundary => r.valid_until <= height,
                ExpiryPolicy::OneAfter => r.valid_until < height,
            })
            .map(|r| r.pubkey)
            .collect();

        expired
            .iter()
            .filter_map(|pk| self.records.remove(pk))
            .collect()
    }

    /// Remove a record after a successful deregistration.
    ///
    /// Returns `None` when the key is already absent, a legitimate race
    /// when the node expired naturally in the same height window; the
    /// caller logs it and moves on.
    pub fn remove(&mut self, pubkey: &PublicKey) -> Option<ServiceNodeRecord> {
        self.records.remove(pubkey)
    }

    /// Update a node's reward mark after a block confirmed it as winner.
    ///
    /// Returns `false` if the key is not active (benign: the winner can
    /// expire in the same block that credits it).
    pub fn mark_rewarded(&mut self, pubkey: &PublicKey, height: u64) -> bool {
        match self.records.get_mut(pubkey) {
            Some(record) => {
                let seq = self.next_seq;
                self.next_seq += 1;
                record.last_reward = LastRewardMark { height, seq };
                true
            }
            None => false,
        }
    }

    // ────────────────────────────────────────────────────────────────
    // read-only projections
    // ────────────────────────────────────────────────────────────────

    /// The record next in line for a reward: smallest `(height, seq)`
    /// mark. Does not mutate; `mark_rewarded` runs only once the caller
    /// confirms the block was actually built with this winner.
    pub fn winner_for(&self) -> Option<&ServiceNodeRecord> {
        self.records.values().min_by_key(|r| r.last_reward)
    }

    /// Canonically ordered identity keys, the quorum selector's input.
    pub fn snapshot(&self) -> Vec<PublicKey> {
        self.records.keys().copied().collect()
    }

    pub fn get(&self, pubkey: &PublicKey) -> Option<&ServiceNodeRecord> {
        self.records.get(pubkey)
    }

    pub fn contains(&self, pubkey: &PublicKey) -> bool {
        self.records.contains_key(pubkey)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = &ServiceNodeRecord> {
        self.records.values()
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// TESTS
// ════════════════════════════════════════════════════════════════════════════════
