//! # Transaction Extra Codec
//!
//! Staking metadata rides in the extra section of ordinary transactions
//! as a sequence of tagged fields. This module owns the byte layout,
//! the canonical registration signing hash, and the semantic validation
//! of registration fields.
//!
//! ## Wire layout
//!
//! Each field is a one-byte tag followed by a fixed-shape body. All
//! integers are big-endian. Unknown tags abort the decode of the whole
//! extra blob (a mistagged blob cannot be partially trusted).
//!
//! ```text
//! 0x01 NodePubkey      32B identity key
//! 0x02 Registration    u16 n, n*20B addresses, n*8B portions,
//!                      8B operator_cut, 8B expiration, 64B signature
//! 0x03 Deregistration  8B height, 4B tested_index,
//!                      u16 n, n*(4B voter_index + 64B signature)
//! 0x04 Contributor     20B payout address
//! 0x05 Winner          32B identity key of the rewarded node
//! ```
//!
//! ## Invariant Preservation
//!
//! The registration signing hash covers every economic field. A relayer
//! cannot alter payout splits, the fee cut, or the authorization window
//! without invalidating the operator's signature.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use palisade_common::crypto::{ed25519_verify, sha3_512};
use palisade_common::{Address, Hash, PublicKey, Signature};

use crate::registry::{Contribution, STAKING_PORTIONS};
use crate::vote_pool::{DeregPayload, VoteRecord};

const TAG_NODE_PUBKEY: u8 = 0x01;
const TAG_REGISTRATION: u8 = 0x02;
const TAG_DEREGISTRATION: u8 = 0x03;
const TAG_CONTRIBUTOR: u8 = 0x04;
const TAG_WINNER: u8 = 0x05;

/// Domain tag prefixed to the registration signing hash preimage.
const REGISTRATION_DOMAIN: &[u8] = b"palisade.registration.v1";

// ════════════════════════════════════════════════════════════════════════════════
// FIELD TYPES
// ════════════════════════════════════════════════════════════════════════════════

/// Body of a registration field, exactly as signed by the operator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationField {
    /// Payout addresses, operator first. Parallel to `portions`.
    pub addresses: Vec<Address>,
    /// Stake share per address, in units of [`STAKING_PORTIONS`].
    pub portions: Vec<u64>,
    /// Operator's fee share of rewards, same unit.
    pub operator_cut: u64,
    /// Unix time after which this authorization may no longer enter a block.
    pub expiration: u64,
    /// Operator signature over [`registration_signing_hash`].
    pub signature: Signature,
}

/// One tagged field of a transaction's extra section.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxExtraField {
    NodePubkey(PublicKey),
    Registration(RegistrationField),
    Deregistration(DeregPayload),
    Contributor(Address),
    Winner(PublicKey),
}

impl TxExtraField {
    fn tag(&self) -> u8 {
        match self {
            TxExtraField::NodePubkey(_) => TAG_NODE_PUBKEY,
            TxExtraField::Registration(_) => TAG_REGISTRATION,
            TxExtraField::Deregistration(_) => TAG_DEREGISTRATION,
            TxExtraField::Contributor(_) => TAG_CONTRIBUTOR,
            TxExtraField::Winner(_) => TAG_WINNER,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// ERRORS
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ExtraError {
    #[error("unknown extra field tag 0x{0:02x}")]
    UnknownTag(u8),

    #[error("extra blob truncated while decoding tag 0x{tag:02x}: needed {needed} more bytes")]
    Truncated { tag: u8, needed: usize },

    #[error("registration has {addresses} addresses but {portions} portions")]
    CountMismatch { addresses: usize, portions: usize },

    #[error("tag 0x{tag:02x} field carries {len} entries, more than its u16 count can hold")]
    OversizedList { tag: u8, len: usize },

    #[error("registration carries no contributors")]
    EmptyContributions,

    #[error("portion {portion} for address {address} exceeds the {remaining} still unassigned")]
    PortionExceedsRemaining {
        address: Address,
        portion: u64,
        remaining: u64,
    },

    #[error("portions sum to {actual}, expected exactly {expected}")]
    PortionSum { expected: u64, actual: u64 },

    #[error("operator cut {0} exceeds the portion base")]
    OperatorCutTooLarge(u64),

    #[error("registration authorization expired at {expiration}, block time is {block_time}")]
    AuthorizationExpired { expiration: u64, block_time: u64 },

    #[error("transaction extra is missing a required {0} field")]
    MissingField(&'static str),

    #[error("registration signature does not verify for node {0}")]
    BadSignature(PublicKey),
}

// ════════════════════════════════════════════════════════════════════════════════
// ENCODE
// ════════════════════════════════════════════════════════════════════════════════

/// List counts travel as u16; anything that would not round-trip through
/// that prefix is rejected up front instead of silently truncated.
fn checked_count(tag: u8, len: usize) -> Result<u16, ExtraError> {
    u16::try_from(len).map_err(|_| ExtraError::OversizedList { tag, len })
}

fn encode_field(out: &mut Vec<u8>, field: &TxExtraField) -> Result<(), ExtraError> {
    out.push(field.tag());
    match field {
        TxExtraField::NodePubkey(pk) | TxExtraField::Winner(pk) => {
            out.extend_from_slice(pk.as_bytes());
        }
        TxExtraField::Registration(reg) => {
            let count = checked_count(TAG_REGISTRATION, reg.addresses.len())?;
            out.extend_from_slice(&count.to_be_bytes());
            for addr in &reg.addresses {
                out.extend_from_slice(addr.as_bytes());
            }
            for portion in &reg.portions {
                out.extend_from_slice(&portion.to_be_bytes());
            }
            out.extend_from_slice(&reg.operator_cut.to_be_bytes());
            out.extend_from_slice(&reg.expiration.to_be_bytes());
            out.extend_from_slice(reg.signature.as_bytes());
        }
        TxExtraField::Deregistration(payload) => {
            let count = checked_count(TAG_DEREGISTRATION, payload.votes.len())?;
            out.extend_from_slice(&payload.height.to_be_bytes());
            out.extend_from_slice(&payload.tested_index.to_be_bytes());
            out.extend_from_slice(&count.to_be_bytes());
            for vote in &payload.votes {
                out.extend_from_slice(&vote.voter_index.to_be_bytes());
                out.extend_from_slice(vote.signature.as_bytes());
            }
        }
        TxExtraField::Contributor(addr) => {
            out.extend_from_slice(addr.as_bytes());
        }
    }
    Ok(())
}

/// Serialize fields into an extra blob. Fields are emitted in ascending
/// tag order so equal field sets always produce equal bytes.
pub fn encode_extra(fields: &[TxExtraField]) -> Result<Vec<u8>, ExtraError> {
    let mut sorted: Vec<&TxExtraField> = fields.iter().collect();
    sorted.sort_by_key(|f| f.tag());
    let mut out = Vec::new();
    for field in sorted {
        encode_field(&mut out, field)?;
    }
    Ok(out)
}

// ════════════════════════════════════════════════════════════════════════════════
// DECODE
// ════════════════════════════════════════════════════════════════════════════════

/// Byte cursor over an extra blob. Every read is bounds-checked against
/// the remaining slice so a truncated blob fails cleanly.
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
    tag: u8,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], ExtraError> {
        if self.buf.len() - self.pos < n {
            return Err(ExtraError::Truncated {
                tag: self.tag,
                needed: n - (self.buf.len() - self.pos),
            });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn take_u16(&mut self) -> Result<u16, ExtraError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn take_u32(&mut self) -> Result<u32, ExtraError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn take_u64(&mut self) -> Result<u64, ExtraError> {
        let b = self.take(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(b);
        Ok(u64::from_be_bytes(arr))
    }

    fn take_pubkey(&mut self) -> Result<PublicKey, ExtraError> {
        let b = self.take(32)?;
        let mut arr = [0u8; 32];
        arr.copy_from_slice(b);
        Ok(PublicKey(arr))
    }

    fn take_address(&mut self) -> Result<Address, ExtraError> {
        let b = self.take(20)?;
        let mut arr = [0u8; 20];
        arr.copy_from_slice(b);
        Ok(Address(arr))
    }

    fn take_signature(&mut self) -> Result<Signature, ExtraError> {
        let b = self.take(64)?;
        let mut arr = [0u8; 64];
        arr.copy_from_slice(b);
        Ok(Signature(arr))
    }
}

/// Parse an extra blob back into its fields. The whole blob must parse;
/// any unknown tag or short body rejects everything.
pub fn decode_extra(buf: &[u8]) -> Result<Vec<TxExtraField>, ExtraError> {
    let mut cur = Cursor { buf, pos: 0, tag: 0 };
    let mut fields = Vec::new();

    while cur.pos < buf.len() {
        let tag = buf[cur.pos];
        cur.pos += 1;
        cur.tag = tag;
        let field = match tag {
            TAG_NODE_PUBKEY => TxExtraField::NodePubkey(cur.take_pubkey()?),
            TAG_REGISTRATION => {
                let n = cur.take_u16()? as usize;
                let mut addresses = Vec::with_capacity(n);
                for _ in 0..n {
                    addresses.push(cur.take_address()?);
                }
                let mut portions = Vec::with_capacity(n);
                for _ in 0..n {
                    portions.push(cur.take_u64()?);
                }
                let operator_cut = cur.take_u64()?;
                let expiration = cur.take_u64()?;
                let signature = cur.take_signature()?;
                TxExtraField::Registration(RegistrationField {
                    addresses,
                    portions,
                    operator_cut,
                    expiration,
                    signature,
                })
            }
            TAG_DEREGISTRATION => {
                let height = cur.take_u64()?;
                let tested_index = cur.take_u32()?;
                let n = cur.take_u16()? as usize;
                let mut votes = Vec::with_capacity(n);
                for _ in 0..n {
                    let voter_index = cur.take_u32()?;
                    let signature = cur.take_signature()?;
                    votes.push(VoteRecord {
                        voter_index,
                        signature,
                    });
                }
                TxExtraField::Deregistration(DeregPayload {
                    height,
                    tested_index,
                    votes,
                })
            }
            TAG_CONTRIBUTOR => TxExtraField::Contributor(cur.take_address()?),
            TAG_WINNER => TxExtraField::Winner(cur.take_pubkey()?),
            other => return Err(ExtraError::UnknownTag(other)),
        };
        fields.push(field);
    }

    Ok(fields)
}

// ════════════════════════════════════════════════════════════════════════════════
// REGISTRATION VALIDATION
// ════════════════════════════════════════════════════════════════════════════════

/// Canonical hash the operator signs to authorize a registration. Covers
/// the node identity and every economic field, big-endian, under a fixed
/// domain tag.
pub fn registration_signing_hash(
    pubkey: &PublicKey,
    addresses: &[Address],
    portions: &[u64],
    operator_cut: u64,
    expiration: u64,
) -> Hash {
    let mut preimage = Vec::with_capacity(
        REGISTRATION_DOMAIN.len() + 32 + addresses.len() * 28 + 16,
    );
    preimage.extend_from_slice(REGISTRATION_DOMAIN);
    preimage.extend_from_slice(pubkey.as_bytes());
    for (addr, portion) in addresses.iter().zip(portions) {
        preimage.extend_from_slice(addr.as_bytes());
        preimage.extend_from_slice(&portion.to_be_bytes());
    }
    preimage.extend_from_slice(&operator_cut.to_be_bytes());
    preimage.extend_from_slice(&expiration.to_be_bytes());
    sha3_512(&preimage)
}

/// A registration that passed every semantic check and is ready to be
/// queued for activation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedRegistration {
    pub pubkey: PublicKey,
    pub contributions: Vec<Contribution>,
    pub operator_cut: u64,
    pub expiration: u64,
}

/// Semantic validation of one transaction's extra fields as a
/// registration. Requires a NodePubkey field and a Registration field;
/// checks shape, portion accounting, the authorization window against
/// `block_time`, and the operator's signature over the canonical hash.
pub fn validate_registration(
    fields: &[TxExtraField],
    block_time: u64,
) -> Result<ValidatedRegistration, ExtraError> {
    let pubkey = fields
        .iter()
        .find_map(|f| match f {
            TxExtraField::NodePubkey(pk) => Some(*pk),
            _ => None,
        })
        .ok_or(ExtraError::MissingField("node pubkey"))?;
    let reg = fields
        .iter()
        .find_map(|f| match f {
            TxExtraField::Registration(r) => Some(r),
            _ => None,
        })
        .ok_or(ExtraError::MissingField("registration"))?;

    if reg.addresses.len() != reg.portions.len() {
        return Err(ExtraError::CountMismatch {
            addresses: reg.addresses.len(),
            portions: reg.portions.len(),
        });
    }
    if reg.addresses.is_empty() {
        return Err(ExtraError::EmptyContributions);
    }

    // Each portion must fit in what is still unassigned, and the running
    // total must land exactly on the base. Checked in declaration order
    // so the error names the offending address.
    let mut remaining = STAKING_PORTIONS;
    for (addr, &portion) in reg.addresses.iter().zip(&reg.portions) {
        if portion > remaining {
            return Err(ExtraError::PortionExceedsRemaining {
                address: *addr,
                portion,
                remaining,
            });
        }
        remaining -= portion;
    }
    if remaining != 0 {
        return Err(ExtraError::PortionSum {
            expected: STAKING_PORTIONS,
            actual: STAKING_PORTIONS - remaining,
        });
    }
    if reg.operator_cut > STAKING_PORTIONS {
        return Err(ExtraError::OperatorCutTooLarge(reg.operator_cut));
    }
    if reg.expiration < block_time {
        return Err(ExtraError::AuthorizationExpired {
            expiration: reg.expiration,
            block_time,
        });
    }

    let hash = registration_signing_hash(
        &pubkey,
        &reg.addresses,
        &reg.portions,
        reg.operator_cut,
        reg.expiration,
    );
    if !ed25519_verify(&pubkey, hash.as_bytes(), &reg.signature) {
        return Err(ExtraError::BadSignature(pubkey));
    }

    let contributions = reg
        .addresses
        .iter()
        .zip(&reg.portions)
        .map(|(addr, &portion)| Contribution {
            address: *addr,
            portion,
        })
        .collect();

    Ok(ValidatedRegistration {
        pubkey,
        contributions,
        operator_cut: reg.operator_cut,
        expiration: reg.expiration,
    })
}

// ════════════════════════════════════════════════════════════════════════════════
// TESTS
// ════════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use palisade_common::crypto::{keypair_from_seed, sign, SecretKey};

    fn signed_registration(
        seed: u8,
        splits: &[(Address, u64)],
        operator_cut: u64,
        expiration: u64,
    ) -> (PublicKey, SecretKey, RegistrationField) {
        let (pk, sk) = keypair_from_seed([seed; 32]);
        let addresses: Vec<Address> = splits.iter().map(|(a, _)| *a).collect();
        let portions: Vec<u64> = splits.iter().map(|(_, p)| *p).collect();
        let hash =
            registration_signing_hash(&pk, &addresses, &portions, operator_cut, expiration);
        let signature = sign(&sk, hash.as_bytes());
        (
            pk,
            sk,
            RegistrationField {
                addresses,
                portions,
                operator_cut,
                expiration,
                signature,
            },
        )
    }

    fn addr(b: u8) -> Address {
        Address([b; 20])
    }

    // ────────────────────────────────────────────────────────────────
    // codec
    // ────────────────────────────────────────────────────────────────

    #[test]
    fn encode_decode_all_field_kinds() {
        let (pk, _, reg) =
            signed_registration(1, &[(addr(1), STAKING_PORTIONS)], 0, 9_000);
        let fields = vec![
            TxExtraField::Winner(pk),
            TxExtraField::NodePubkey(pk),
            TxExtraField::Contributor(addr(7)),
            TxExtraField::Registration(reg),
            TxExtraField::Deregistration(DeregPayload {
                height: 42,
                tested_index: 3,
                votes: vec![VoteRecord {
                    voter_index: 1,
                    signature: Signature([0xAB; 64]),
                }],
            }),
        ];
        let blob = encode_extra(&fields).expect("encodes");
        let decoded = decode_extra(&blob).expect("decodes");
        // decoded order is tag order, regardless of input order
        let tags: Vec<u8> = decoded.iter().map(|f| f.tag()).collect();
        assert_eq!(tags, vec![0x01, 0x02, 0x03, 0x04, 0x05]);
        for field in &fields {
            assert!(decoded.contains(field));
        }
    }

    #[test]
    fn encoding_is_canonical_regardless_of_order() {
        let (pk, _, _) = signed_registration(1, &[(addr(1), STAKING_PORTIONS)], 0, 0);
        let a = vec![TxExtraField::NodePubkey(pk), TxExtraField::Winner(pk)];
        let b = vec![TxExtraField::Winner(pk), TxExtraField::NodePubkey(pk)];
        assert_eq!(
            encode_extra(&a).expect("encodes"),
            encode_extra(&b).expect("encodes")
        );
    }

    #[test]
    fn unknown_tag_rejects_whole_blob() {
        let (pk, _, _) = signed_registration(1, &[(addr(1), STAKING_PORTIONS)], 0, 0);
        let mut blob = encode_extra(&[TxExtraField::NodePubkey(pk)]).expect("encodes");
        blob.push(0x7F);
        assert_eq!(decode_extra(&blob), Err(ExtraError::UnknownTag(0x7F)));
    }

    #[test]
    fn truncated_blob_rejected() {
        let (pk, _, _) = signed_registration(1, &[(addr(1), STAKING_PORTIONS)], 0, 0);
        let blob = encode_extra(&[TxExtraField::NodePubkey(pk)]).expect("encodes");
        assert!(matches!(
            decode_extra(&blob[..blob.len() - 1]),
            Err(ExtraError::Truncated { tag: 0x01, .. })
        ));
    }

    #[test]
    fn list_count_above_u16_rejected_at_encode() {
        // zero portions are individually legal, so only the count guard
        // stands between this list and a truncated length prefix
        let n = u16::MAX as usize + 1;
        let reg = RegistrationField {
            addresses: vec![addr(1); n],
            portions: vec![0u64; n],
            operator_cut: 0,
            expiration: 0,
            signature: Signature([0; 64]),
        };
        assert_eq!(
            encode_extra(&[TxExtraField::Registration(reg)]),
            Err(ExtraError::OversizedList { tag: 0x02, len: n })
        );

        let votes = vec![
            VoteRecord {
                voter_index: 0,
                signature: Signature([0; 64]),
            };
            n
        ];
        let payload = DeregPayload {
            height: 1,
            tested_index: 0,
            votes,
        };
        assert_eq!(
            encode_extra(&[TxExtraField::Deregistration(payload)]),
            Err(ExtraError::OversizedList { tag: 0x03, len: n })
        );
    }

    #[test]
    fn empty_blob_decodes_to_no_fields() {
        assert_eq!(decode_extra(&[]).expect("ok"), Vec::new());
    }

    // ────────────────────────────────────────────────────────────────
    // registration validation
    // ────────────────────────────────────────────────────────────────

    #[test]
    fn valid_multi_contributor_registration() {
        let half = STAKING_PORTIONS / 2;
        let (pk, _, reg) =
            signed_registration(2, &[(addr(1), half), (addr(2), half)], 100, 5_000);
        let fields = vec![TxExtraField::NodePubkey(pk), TxExtraField::Registration(reg)];
        let v = validate_registration(&fields, 4_000).expect("valid");
        assert_eq!(v.pubkey, pk);
        assert_eq!(v.contributions.len(), 2);
        assert_eq!(v.operator_cut, 100);
    }

    #[test]
    fn portion_sum_must_be_exact() {
        // one unit short
        let (pk, _, reg) =
            signed_registration(2, &[(addr(1), STAKING_PORTIONS - 1)], 0, 5_000);
        let fields = vec![TxExtraField::NodePubkey(pk), TxExtraField::Registration(reg)];
        assert_eq!(
            validate_registration(&fields, 0),
            Err(ExtraError::PortionSum {
                expected: STAKING_PORTIONS,
                actual: STAKING_PORTIONS - 1
            })
        );

        // one unit over, caught at the overflowing entry
        let (pk, _, reg) = signed_registration(
            2,
            &[(addr(1), STAKING_PORTIONS), (addr(2), 1)],
            0,
            5_000,
        );
        let fields = vec![TxExtraField::NodePubkey(pk), TxExtraField::Registration(reg)];
        assert!(matches!(
            validate_registration(&fields, 0),
            Err(ExtraError::PortionExceedsRemaining { remaining: 0, .. })
        ));
    }

    #[test]
    fn expired_authorization_rejected() {
        let (pk, _, reg) =
            signed_registration(2, &[(addr(1), STAKING_PORTIONS)], 0, 1_000);
        let fields = vec![TxExtraField::NodePubkey(pk), TxExtraField::Registration(reg)];
        assert_eq!(
            validate_registration(&fields, 1_001),
            Err(ExtraError::AuthorizationExpired {
                expiration: 1_000,
                block_time: 1_001
            })
        );
        // boundary: expiration == block_time is still valid
        assert!(validate_registration(&fields, 1_000).is_ok());
    }

    #[test]
    fn tampered_portions_break_signature() {
        let (pk, _, mut reg) =
            signed_registration(2, &[(addr(1), STAKING_PORTIONS - 5), (addr(2), 5)], 0, 5_000);
        // shift one unit between contributors after signing
        reg.portions[0] += 1;
        reg.portions[1] -= 1;
        let fields = vec![TxExtraField::NodePubkey(pk), TxExtraField::Registration(reg)];
        assert_eq!(
            validate_registration(&fields, 0),
            Err(ExtraError::BadSignature(pk))
        );
    }

    #[test]
    fn signature_bound_to_node_pubkey() {
        let (_, _, reg) = signed_registration(2, &[(addr(1), STAKING_PORTIONS)], 0, 5_000);
        let (other_pk, _) = keypair_from_seed([99u8; 32]);
        let fields = vec![
            TxExtraField::NodePubkey(other_pk),
            TxExtraField::Registration(reg),
        ];
        assert_eq!(
            validate_registration(&fields, 0),
            Err(ExtraError::BadSignature(other_pk))
        );
    }

    #[test]
    fn missing_fields_rejected() {
        let (pk, _, reg) = signed_registration(2, &[(addr(1), STAKING_PORTIONS)], 0, 5_000);
        assert_eq!(
            validate_registration(&[TxExtraField::Registration(reg)], 0),
            Err(ExtraError::MissingField("node pubkey"))
        );
        assert_eq!(
            validate_registration(&[TxExtraField::NodePubkey(pk)], 0),
            Err(ExtraError::MissingField("registration"))
        );
    }

    #[test]
    fn shape_errors_rejected() {
        let (pk, sk) = keypair_from_seed([3u8; 32]);
        let hash = registration_signing_hash(&pk, &[], &[], 0, 5_000);
        let empty = RegistrationField {
            addresses: vec![],
            portions: vec![],
            operator_cut: 0,
            expiration: 5_000,
            signature: sign(&sk, hash.as_bytes()),
        };
        let fields = vec![TxExtraField::NodePubkey(pk), TxExtraField::Registration(empty)];
        assert_eq!(
            validate_registration(&fields, 0),
            Err(ExtraError::EmptyContributions)
        );

        let mismatched = RegistrationField {
            addresses: vec![addr(1)],
            portions: vec![STAKING_PORTIONS, 0],
            operator_cut: 0,
            expiration: 5_000,
            signature: Signature([0; 64]),
        };
        let fields = vec![
            TxExtraField::NodePubkey(pk),
            TxExtraField::Registration(mismatched),
        ];
        assert_eq!(
            validate_registration(&fields, 0),
            Err(ExtraError::CountMismatch {
                addresses: 1,
                portions: 2
            })
        );
    }

    #[test]
    fn oversized_operator_cut_rejected() {
        let (pk, _, reg) = signed_registration(
            2,
            &[(addr(1), STAKING_PORTIONS)],
            STAKING_PORTIONS + 1,
            5_000,
        );
        let fields = vec![TxExtraField::NodePubkey(pk), TxExtraField::Registration(reg)];
        assert_eq!(
            validate_registration(&fields, 0),
            Err(ExtraError::OperatorCutTooLarge(STAKING_PORTIONS + 1))
        );
    }

    #[test]
    fn registration_roundtrips_through_codec_and_still_validates() {
        let (pk, _, reg) =
            signed_registration(4, &[(addr(9), STAKING_PORTIONS)], 77, 8_888);
        let blob = encode_extra(&[
            TxExtraField::NodePubkey(pk),
            TxExtraField::Registration(reg),
        ])
        .expect("encodes");
        let fields = decode_extra(&blob).expect("decodes");
        let v = validate_registration(&fields, 8_000).expect("valid");
        assert_eq!(v.pubkey, pk);
        assert_eq!(v.operator_cut, 77);
    }
}
