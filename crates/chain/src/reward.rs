//! Reward rotation: which staked node the next block's reward share
//! belongs to. Selection is a pure function of registry state so every
//! node that agrees on the registry agrees on the winner.

use serde::{Deserialize, Serialize};

use palisade_common::PublicKey;

use crate::registry::{Contribution, Registry};

/// Where the service-node share of a block reward should go.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RewardTarget {
    /// Pay the winning node's contributors per their recorded splits.
    ServiceNode {
        pubkey: PublicKey,
        contributions: Vec<Contribution>,
        operator_cut: u64,
    },
    /// No nodes are registered; the share reverts to the base emission.
    Fallback,
}

/// Pick the node that has waited longest since its last reward. Ties on
/// height break by registration order, so rotation is total and stable.
pub fn pick_winner(registry: &Registry) -> RewardTarget {
    match registry.winner_for() {
        Some(record) => RewardTarget::ServiceNode {
            pubkey: record.pubkey,
            contributions: record.contributions.clone(),
            operator_cut: record.operator_cut,
        },
        None => RewardTarget::Fallback,
    }
}
