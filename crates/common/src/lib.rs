//! Shared foundation for the palisade service-node layer: value types,
//! the opaque crypto boundary, and per-protocol-version consensus
//! parameters.
//!
//! Everything consensus-critical in `palisade-chain` is expressed in terms
//! of these types; the chain crate never touches curve or hash internals
//! directly.

pub mod crypto;
pub mod params;
pub mod types;

pub use params::{ConsensusParams, ExpiryPolicy, ProtocolVersion};
pub use types::{Address, Hash, PublicKey, Signature};
