//! Cryptographic primitives for the sovereign trust kernel.
//!
//! This crate provides the cryptographic foundation every trust object is
//! sealed with: hashing, Merkle anchoring, and asymmetric signing.
//!
//! # Supported Algorithms
//!
//! - **Hashing**: BLAKE3 (exclusively, for all integrity material)
//! - **Classical signatures**: Ed25519
//! - **Secondary signatures**: pluggable through [`PqSigner`] / [`PqScheme`]
//!
//! # Security Principles
//!
//! - A signature is produced with the issuer's private key and checked with
//!   the issuer's public key; nothing here "verifies" by re-hashing a payload
//! - Secrets must never be logged or hardcoded
//! - Imported secret key bytes are zeroized after use

pub mod hash;
pub mod merkle;
pub mod signing;

#[cfg(test)]
mod test_vectors;

pub use hash::{hash, hash_parts, to_hex, Digest, DIGEST_LEN};
pub use merkle::{
    merkle_root, merkle_root_of, MerkleError, MerkleProof, MerkleTree, EMPTY_ROOT_DOMAIN,
};
pub use signing::{
    verify_classical, AuthorityKey, CryptoError, PqPublicKey, PqScheme, PqSigner,
    SecondaryEd25519, SecondaryEd25519Signer, PUBLIC_KEY_LEN, SIGNATURE_LEN,
};
