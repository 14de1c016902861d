//! Read-side views over engine state, shaped for RPC handlers. Pure
//! projections: nothing here mutates.

use serde::{Deserialize, Serialize};

use palisade_common::PublicKey;

use crate::engine::StakingEngine;
use crate::quorum::QuorumState;
use crate::registry::ServiceNodeRecord;

/// Where a given identity key stands with the registry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationStatus {
    /// Active and staked until the given height.
    Active { valid_until: u64 },
    /// Seen in a block, activating at the next one.
    Pending { seen_height: u64 },
    NotRegistered,
}

/// Status lookup for one identity key.
pub fn registration_status(engine: &StakingEngine, pubkey: &PublicKey) -> RegistrationStatus {
    if let Some(record) = engine.registry().get(pubkey) {
        return RegistrationStatus::Active {
            valid_until: record.valid_until,
        };
    }
    if let Some(seen_height) = engine.pending_since(pubkey) {
        return RegistrationStatus::Pending { seen_height };
    }
    RegistrationStatus::NotRegistered
}

/// All active records in canonical key order.
pub fn active_registrations(engine: &StakingEngine) -> Vec<ServiceNodeRecord> {
    engine.registry().iter().cloned().collect()
}

/// The quorum derived at `height`, if still within the retained window.
pub fn quorum_at(engine: &StakingEngine, height: u64) -> Option<QuorumState> {
    engine.quorum_at(height).cloned()
}
