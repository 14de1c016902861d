//! Per-protocol-version consensus parameters.
//!
//! The expiry height offset changed between protocol versions in the wild,
//! so it is an explicit policy value here, never an implicit comparison
//! buried in registry code.

use serde::{Deserialize, Serialize};

/// When does a record with `valid_until == H` leave the registry?
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpiryPolicy {
    /// The record is gone when querying at height `H` itself.
    AtBoundary,
    /// The record is still present at `H` and gone from `H + 1` on.
    OneAfter,
}

/// Protocol versions this daemon understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProtocolVersion {
    V1,
    V2,
}

/// Consensus parameters, fixed per protocol version.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusParams {
    pub version: ProtocolVersion,
    /// Expiration rule for `valid_until` (see [`ExpiryPolicy`]).
    pub expiry_policy: ExpiryPolicy,
    /// How many blocks behind the tip a deregistration vote stays actionable.
    pub vote_lifetime: u64,
    /// How many blocks a stake stays registered after activation
    /// (the record's `valid_until` is activation height plus this).
    pub stake_lifetime_blocks: u64,
    /// Seconds a signed registration authorization stays usable after its
    /// expiration timestamp is set by the operator tooling.
    pub registration_auth_window_secs: u64,
}

impl ConsensusParams {
    pub fn for_version(version: ProtocolVersion) -> Self {
        match version {
            ProtocolVersion::V1 => ConsensusParams {
                version,
                expiry_policy: ExpiryPolicy::AtBoundary,
                vote_lifetime: 60,
                stake_lifetime_blocks: 720,
                registration_auth_window_secs: 1_209_600, // 14 days
            },
            ProtocolVersion::V2 => ConsensusParams {
                version,
                expiry_policy: ExpiryPolicy::OneAfter,
                vote_lifetime: 60,
                stake_lifetime_blocks: 720,
                registration_auth_window_secs: 1_209_600,
            },
        }
    }
}
