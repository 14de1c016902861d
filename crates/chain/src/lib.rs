//! # Palisade staking consensus core
//!
//! The staked service-node layer that rides on top of the base
//! proof-of-work chain: stake-backed registration, deterministic per-block
//! quorum selection, misbehavior (deregistration) voting, and reward
//! rotation.
//!
//! ## Module map
//!
//! - [`registry`]: the set of active registered nodes and its four
//!   mutators (`activate`, `expire_older_than`, `remove`, `mark_rewarded`).
//! - [`quorum`]: pure, seed-driven selection of the voting quorum and the
//!   to-test set for a block.
//! - [`vote_pool`]: accumulation and validation of signed deregistration
//!   votes until the kick threshold is reached.
//! - [`tx_extra`]: codec and structural validator for the staking fields
//!   carried inside transaction "extra" data.
//! - [`reward`]: which registered node the next coinbase credits.
//! - [`engine`]: the block-driven state machine tying it together,
//!   including reorg rollback via a versioned snapshot history.
//! - [`query`]: read-only projections for the RPC/CLI layer.
//!
//! The PoW hash, curve arithmetic, transaction serialization, P2P
//! transport and storage engine are external collaborators; this crate
//! consumes them through `palisade_common` and opaque byte boundaries.

pub mod engine;
pub mod query;
pub mod quorum;
pub mod registry;
pub mod reward;
pub mod tx_extra;
pub mod vote_pool;

pub use engine::{BlockData, BlockOutcome, EngineError, StakingEngine};
pub use quorum::{QuorumEntry, QuorumState, MIN_VOTES_TO_KICK, QUORUM_SIZE};
pub use registry::{
    Contribution, LastRewardMark, RegistrationInfo, Registry, RegistryError, ServiceNodeRecord,
    STAKING_PORTIONS,
};
pub use query::RegistrationStatus;
pub use reward::RewardTarget;
pub use tx_extra::{ExtraError, RegistrationField, TxExtraField, ValidatedRegistration};
pub use vote_pool::{DeregPayload, DeregVote, VoteError, VotePool, VoteRecord};
