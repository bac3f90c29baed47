//! Sealing and seal checking.
//!
//! A seal is a function of exactly `(identity.id, policy, lineage.derived_root,
//! issued_at)`. Those fields are serialized to a canonical JSON payload which
//! is signed with the issuer's Ed25519 key (and optionally the PQ slot). The
//! Merkle anchor binds both signatures to the issuer key, root and time:
//!
//! ```text
//! anchor = merkle_root_of([classical_sig, pq_sig | "", public_key, derived_root, issued_at])
//! ```

use crate::model::{Policy, SealEnvelope, TrustObject, TrustVersion};
use serde::{Deserialize, Serialize};
use sovereign_core::{current_timestamp_ms, KernelError, Result, Timestamp};
use sovereign_crypto::{merkle_root_of, verify_classical, AuthorityKey, Digest, PqScheme, PqSigner};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Serialize)]
struct SealPayload<'a> {
    id: &'a str,
    policy: &'a Policy,
    root: &'a str,
    time: Timestamp,
}

/// Canonical bytes signed for `trust` at `issued_at`.
pub fn canonical_payload(trust: &TrustObject, issued_at: Timestamp) -> Result<Vec<u8>> {
    let payload = SealPayload {
        id: &trust.identity.id,
        policy: &trust.policy,
        root: &trust.lineage.derived_root,
        time: issued_at,
    };
    serde_json::to_vec(&payload).map_err(|e| KernelError::malformed("policy", e.to_string()))
}

fn merkle_anchor(
    classical_signature: &[u8],
    pq_signature: Option<&[u8]>,
    public_key: &[u8],
    derived_root: &str,
    issued_at: Timestamp,
) -> Digest {
    let issued_at = issued_at.to_string();
    let leaves: [&[u8]; 5] = [
        classical_signature,
        pq_signature.unwrap_or_default(),
        public_key,
        derived_root.as_bytes(),
        issued_at.as_bytes(),
    ];
    merkle_root_of(&leaves)
}

/// Seal `trust` with a fresh timestamp.
pub fn seal(
    trust: TrustObject,
    signer: &AuthorityKey,
    pq_signer: Option<&dyn PqSigner>,
) -> Result<TrustObject> {
    seal_at(trust, signer, pq_signer, current_timestamp_ms())
}

/// Seal `trust` as of `issued_at`. Identical inputs give an identical seal.
pub fn seal_at(
    mut trust: TrustObject,
    signer: &AuthorityKey,
    pq_signer: Option<&dyn PqSigner>,
    issued_at: Timestamp,
) -> Result<TrustObject> {
    trust.validate()?;
    if trust.lineage.derived_root.is_empty() {
        return Err(KernelError::malformed("lineage.derived_root", "must not be empty"));
    }
    if signer.public_key() != trust.identity.public_key {
        return Err(KernelError::malformed(
            "identity.public_key",
            "does not belong to the signing key",
        ));
    }
    if let Some(pq) = pq_signer {
        if trust.identity.pq_public_key.as_ref() != Some(&pq.public_key()) {
            return Err(KernelError::malformed(
                "identity.pq_public_key",
                "does not belong to the PQ signer",
            ));
        }
    }

    let payload = canonical_payload(&trust, issued_at)?;
    let classical_signature = signer.sign(&payload);
    let pq_signature = pq_signer.map(|pq| pq.sign(&payload));
    let anchor = merkle_anchor(
        &classical_signature,
        pq_signature.as_deref(),
        &trust.identity.public_key,
        &trust.lineage.derived_root,
        issued_at,
    );

    trust.seal = SealEnvelope {
        classical_signature,
        pq_signature,
        merkle_anchor: anchor.to_vec(),
        issued_at,
        expires_at: trust.seal.expires_at,
    };

    info!(
        identity = %trust.identity.id,
        authority = %trust.lineage.derived_root,
        pq = trust.seal.pq_signature.is_some(),
        "Trust object sealed"
    );
    Ok(trust)
}

/// A specific reason a seal did not check out.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "kebab-case")]
pub enum SealFailure {
    #[error("public key rejected: {0}")]
    PublicKeyRejected(String),

    #[error("classical signature mismatch")]
    ClassicalSignatureMismatch,

    #[error("PQ signature missing on a PQ-generation object")]
    PqSignatureMissing,

    #[error("PQ signature present but identity has no PQ public key")]
    PqKeyMissing,

    #[error("no verifier registered for PQ scheme {0}")]
    PqSchemeUnavailable(String),

    #[error("PQ signature mismatch")]
    PqSignatureMismatch,

    #[error("merkle anchor mismatch")]
    MerkleAnchorMismatch,
}

/// Outcome of checking a seal against the object's own fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealCheck {
    pub valid: bool,
    pub classical_signature_valid: bool,
    /// `None` when the object carries no PQ material
    pub pq_signature_valid: Option<bool>,
    pub merkle_anchor_valid: bool,
    pub failures: Vec<SealFailure>,
}

/// Recompute the payload and anchor from `trust` and compare with its seal.
///
/// Mismatches are reported in the returned [`SealCheck`], never as errors.
pub fn check_seal(trust: &TrustObject, pq_schemes: &[Arc<dyn PqScheme>]) -> Result<SealCheck> {
    let envelope = &trust.seal;
    let payload = canonical_payload(trust, envelope.issued_at)?;
    let mut failures = Vec::new();

    let classical_signature_valid = match verify_classical(
        &payload,
        &envelope.classical_signature,
        &trust.identity.public_key,
    ) {
        Ok(true) => true,
        Ok(false) => {
            failures.push(SealFailure::ClassicalSignatureMismatch);
            false
        }
        Err(e) => {
            failures.push(SealFailure::PublicKeyRejected(e.to_string()));
            false
        }
    };

    let pq_signature_valid = match (&envelope.pq_signature, &trust.identity.pq_public_key) {
        (Some(signature), Some(pq_key)) => {
            match pq_schemes.iter().find(|s| s.scheme_id() == pq_key.scheme) {
                Some(scheme) => {
                    let ok = scheme.verify(&payload, signature, &pq_key.key);
                    if !ok {
                        failures.push(SealFailure::PqSignatureMismatch);
                    }
                    Some(ok)
                }
                None => {
                    failures.push(SealFailure::PqSchemeUnavailable(pq_key.scheme.clone()));
                    Some(false)
                }
            }
        }
        (Some(_), None) => {
            failures.push(SealFailure::PqKeyMissing);
            Some(false)
        }
        (None, _) if trust.version == TrustVersion::PostQuantum => {
            failures.push(SealFailure::PqSignatureMissing);
            Some(false)
        }
        (None, _) => None,
    };

    let expected_anchor = merkle_anchor(
        &envelope.classical_signature,
        envelope.pq_signature.as_deref(),
        &trust.identity.public_key,
        &trust.lineage.derived_root,
        envelope.issued_at,
    );
    let merkle_anchor_valid = envelope.merkle_anchor == expected_anchor;
    if !merkle_anchor_valid {
        failures.push(SealFailure::MerkleAnchorMismatch);
    }

    for failure in &failures {
        warn!(identity = %trust.identity.id, reason = %failure, "Seal check failed");
    }

    Ok(SealCheck {
        valid: failures.is_empty(),
        classical_signature_valid,
        pq_signature_valid,
        merkle_anchor_valid,
        failures,
    })
}
