//! Asymmetric signing for trust seals.
//!
//! Classical signatures are Ed25519. A second, pluggable signature slot
//! (the "PQ slot") is described by [`PqSigner`] on the signing side and
//! [`PqScheme`] on the verifying side, keyed by a scheme identifier.
//!
//! # Security Model
//!
//! - Signing always uses the issuer's private key; verification always uses
//!   the issuer's public key
//! - Imported secret bytes are zeroized once the key is constructed
//! - Ed25519 verification uses `verify_strict` (rejects malleable signatures)

use crate::hash::{hash, hex_bytes};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sovereign_core::KernelError;
use std::fmt;
use thiserror::Error;
use zeroize::Zeroize;

/// Ed25519 public key length in bytes.
pub const PUBLIC_KEY_LEN: usize = 32;

/// Ed25519 signature length in bytes.
pub const SIGNATURE_LEN: usize = 64;

/// Scheme identifier of the built-in secondary signature scheme.
pub const SECONDARY_ED25519_SCHEME: &str = "ed25519-secondary";

/// Prefix mixed into payloads signed through the secondary slot, so a
/// classical signature can never stand in for a secondary one.
const SECONDARY_DOMAIN: &[u8] = b"sovereign-trust-kernel/pq-slot|";

/// Errors that can occur during key handling.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Invalid key length: {actual} (expected {expected})")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),
}

impl From<CryptoError> for KernelError {
    fn from(err: CryptoError) -> Self {
        KernelError::malformed("public_key", err.to_string())
    }
}

/// Ed25519 signing key held by an authority.
#[derive(Clone)]
pub struct AuthorityKey {
    signing_key: SigningKey,
    key_id: String,
}

impl AuthorityKey {
    /// Generate a fresh key from the thread-local CSPRNG.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let mut secret_key_bytes = [0u8; 32];
        rng.fill_bytes(&mut secret_key_bytes);

        let signing_key = SigningKey::from_bytes(&secret_key_bytes);
        secret_key_bytes.zeroize();

        Self::from_signing_key(signing_key)
    }

    /// Import a key from its 32 secret bytes.
    ///
    /// # Security
    /// The intermediate copy of the secret is zeroized after use.
    pub fn from_bytes(key_bytes: &[u8]) -> Result<Self, CryptoError> {
        if key_bytes.len() != 32 {
            return Err(CryptoError::InvalidKeyLength {
                expected: 32,
                actual: key_bytes.len(),
            });
        }

        let mut key_array = [0u8; 32];
        key_array.copy_from_slice(key_bytes);
        let signing_key = SigningKey::from_bytes(&key_array);
        key_array.zeroize();

        Ok(Self::from_signing_key(signing_key))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let key_id = Self::generate_key_id(&signing_key.verifying_key());
        Self {
            signing_key,
            key_id,
        }
    }

    /// Stable public key identifier: first 16 bytes of BLAKE3(public key), hex.
    fn generate_key_id(verifying_key: &VerifyingKey) -> String {
        let digest = hash(verifying_key.as_bytes());
        hex::encode(&digest[..16])
    }

    pub fn public_key(&self) -> Vec<u8> {
        self.signing_key.verifying_key().to_bytes().to_vec()
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Sign an already-canonicalized payload.
    pub fn sign(&self, payload: &[u8]) -> Vec<u8> {
        self.signing_key.sign(payload).to_bytes().to_vec()
    }
}

impl fmt::Debug for AuthorityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorityKey")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

/// Verify an Ed25519 signature.
///
/// Returns `Ok(false)` for a signature that does not verify (including one of
/// the wrong length) and `Err` only when the public key itself cannot be decoded.
pub fn verify_classical(
    payload: &[u8],
    signature: &[u8],
    public_key: &[u8],
) -> Result<bool, CryptoError> {
    let key_bytes: [u8; PUBLIC_KEY_LEN] =
        public_key
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyLength {
                expected: PUBLIC_KEY_LEN,
                actual: public_key.len(),
            })?;
    let verifying_key = VerifyingKey::from_bytes(&key_bytes)
        .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;

    let Ok(sig_bytes) = <[u8; SIGNATURE_LEN]>::try_from(signature) else {
        return Ok(false);
    };
    let sig = Signature::from_bytes(&sig_bytes);

    Ok(verifying_key.verify_strict(payload, &sig).is_ok())
}

/// Public half of a secondary-slot key, tagged with its scheme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PqPublicKey {
    pub scheme: String,
    #[serde(with = "hex_bytes")]
    pub key: Vec<u8>,
}

/// Signing side of the secondary signature slot.
pub trait PqSigner: Send + Sync + fmt::Debug {
    fn scheme_id(&self) -> &str;
    fn public_key(&self) -> PqPublicKey;
    fn sign(&self, payload: &[u8]) -> Vec<u8>;
}

/// Verifying side of the secondary signature slot.
pub trait PqScheme: Send + Sync + fmt::Debug {
    fn scheme_id(&self) -> &str;
    fn verify(&self, payload: &[u8], signature: &[u8], public_key: &[u8]) -> bool;
}

/// Secondary-slot signer backed by an independent Ed25519 key.
///
/// Stands in for a post-quantum scheme until one is plugged in; the slot is
/// still real asymmetric signing with a key distinct from the classical one.
#[derive(Debug, Clone)]
pub struct SecondaryEd25519Signer {
    key: AuthorityKey,
}

impl SecondaryEd25519Signer {
    pub fn generate() -> Self {
        Self {
            key: AuthorityKey::generate(),
        }
    }

    pub fn from_key(key: AuthorityKey) -> Self {
        Self { key }
    }
}

fn secondary_message(payload: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(SECONDARY_DOMAIN.len() + payload.len());
    message.extend_from_slice(SECONDARY_DOMAIN);
    message.extend_from_slice(payload);
    message
}

impl PqSigner for SecondaryEd25519Signer {
    fn scheme_id(&self) -> &str {
        SECONDARY_ED25519_SCHEME
    }

    fn public_key(&self) -> PqPublicKey {
        PqPublicKey {
            scheme: SECONDARY_ED25519_SCHEME.to_string(),
            key: self.key.public_key(),
        }
    }

    fn sign(&self, payload: &[u8]) -> Vec<u8> {
        self.key.sign(&secondary_message(payload))
    }
}

/// Verifier for [`SecondaryEd25519Signer`] signatures.
#[derive(Debug, Clone, Copy, Default)]
pub struct SecondaryEd25519;

impl PqScheme for SecondaryEd25519 {
    fn scheme_id(&self) -> &str {
        SECONDARY_ED25519_SCHEME
    }

    fn verify(&self, payload: &[u8], signature: &[u8], public_key: &[u8]) -> bool {
        verify_classical(&secondary_message(payload), signature, public_key).unwrap_or(false)
    }
}
