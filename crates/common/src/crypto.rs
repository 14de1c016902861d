//! crypto helpers for palisade: sha3 hashing + ed25519 sign/verify
//!
//! This is the collaborator boundary the consensus core talks through:
//! `(pubkey, message, signature) -> bool` and `(bytes) -> hash`. Nothing
//! above this module implements curve or digest arithmetic itself.
use anyhow::{anyhow, Result};
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use sha3::{Digest, Sha3_512};

use crate::types::{Address, Hash, PublicKey, Signature};

/// compute sha3-512 raw bytes (64 bytes)
pub fn sha3_512_bytes(data: &[u8]) -> [u8; 64] {
    let mut hasher = Sha3_512::new();
    hasher.update(data);
    let sum = hasher.finalize();
    sum.into()
}

/// compute sha3-512 and return as Hash type
pub fn sha3_512(data: &[u8]) -> Hash {
    Hash::from_bytes(sha3_512_bytes(data))
}

/// Derive a payout Address from raw wallet pubkey bytes:
/// addr = SHA3-512(pubkey)[:20]
pub fn address_from_pubkey_bytes(pubkey_bytes: &[u8]) -> Address {
    let hash = sha3_512_bytes(pubkey_bytes);
    let mut arr = [0u8; 20];
    arr.copy_from_slice(&hash[0..20]);
    Address::from_bytes(arr)
}

/// Deterministic keypair from a 32-byte seed. Test fixtures and node
/// identity files both go through this path.
pub fn keypair_from_seed(seed: [u8; 32]) -> (PublicKey, SecretKey) {
    let signing = SigningKey::from_bytes(&seed);
    let pk = PublicKey::from_bytes(signing.verifying_key().to_bytes());
    (pk, SecretKey { seed })
}

/// Fresh random keypair (OS entropy).
pub fn generate_keypair() -> (PublicKey, SecretKey) {
    let mut seed = [0u8; 32];
    use rand::RngCore;
    rand::rngs::OsRng.fill_bytes(&mut seed);
    keypair_from_seed(seed)
}

/// ed25519 secret key material. Kept opaque; only this module signs.
#[derive(Clone)]
pub struct SecretKey {
    seed: [u8; 32],
}

impl SecretKey {
    pub fn from_bytes(seed: [u8; 32]) -> Self {
        SecretKey { seed }
    }

    pub fn public_key(&self) -> PublicKey {
        let signing = SigningKey::from_bytes(&self.seed);
        PublicKey::from_bytes(signing.verifying_key().to_bytes())
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // never print key material
        f.write_str("SecretKey(..)")
    }
}

/// Sign a message; returns the detached 64-byte signature.
pub fn sign(secret: &SecretKey, msg: &[u8]) -> Signature {
    let signing = SigningKey::from_bytes(&secret.seed);
    Signature::from_bytes(signing.sign(msg).to_bytes())
}

/// Verify a signature. Errors only on malformed key bytes; an invalid
/// signature over a well-formed key is `Ok(false)`.
pub fn verify_signature(pubkey: &PublicKey, msg: &[u8], sig: &Signature) -> Result<bool> {
    let vk = VerifyingKey::from_bytes(pubkey.as_bytes())
        .map_err(|e| anyhow!("malformed ed25519 public key: {e}"))?;
    let signature = ed25519_dalek::Signature::from_bytes(sig.as_bytes());
    Ok(vk.verify(msg, &signature).is_ok())
}

/// Boolean convenience wrapper: malformed keys verify as false.
pub fn ed25519_verify(pubkey: &PublicKey, msg: &[u8], sig: &Signature) -> bool {
    verify_signature(pubkey, msg, sig).unwrap_or(false)
}
