//! Multi-authority federation.
//!
//! Federation merges independently rooted authorities into a signed
//! [`FederationEnvelope`]. Envelopes are immutable; renegotiating produces a
//! new envelope with a new id. Everything needed to check an envelope travels
//! with it, so [`verify_envelope`] works without any remote oracle.

use crate::authority::{Authority, AuthorityRoot};
use crate::model::Lineage;
use serde::{Deserialize, Serialize};
use sovereign_core::{current_timestamp_ms, FederationConfig, KernelError, Result, Timestamp};
use sovereign_crypto::hash::hex_bytes;
use sovereign_crypto::{hash_parts, merkle_root_of, to_hex, verify_classical};
use tracing::{info, warn};

/// Length of an envelope id in hex characters.
const ENVELOPE_ID_LEN: usize = 48;

/// A negotiated trust bridge between two or more authority roots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FederationEnvelope {
    pub id: String,
    pub authorities: Vec<AuthorityRoot>,
    pub created_at: Timestamp,
    pub trust_weight: f64,
    pub policy: String,
    pub merged_lineage: Lineage,
    /// Id of the authority whose key produced `integrity_seal`
    pub initiator: String,
    #[serde(with = "hex_bytes")]
    pub integrity_seal: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub merkle_anchor: Vec<u8>,
}

impl FederationEnvelope {
    pub fn authority_ids(&self) -> Vec<&str> {
        self.authorities.iter().map(|a| a.id.as_str()).collect()
    }

    pub fn includes(&self, authority_id: &str) -> bool {
        self.authorities.iter().any(|a| a.id == authority_id)
    }
}

#[derive(Serialize)]
struct EnvelopePayload<'a> {
    id: &'a str,
    authorities: Vec<&'a str>,
    weight: String,
    policy: &'a str,
    merged_root: &'a str,
    created_at: Timestamp,
}

fn envelope_payload(
    id: &str,
    authorities: &[AuthorityRoot],
    weight: f64,
    policy: &str,
    merged_root: &str,
    created_at: Timestamp,
) -> Result<Vec<u8>> {
    let payload = EnvelopePayload {
        id,
        authorities: authorities.iter().map(|a| a.id.as_str()).collect(),
        // fixed precision survives a JSON round trip of the envelope
        weight: format!("{weight:.6}"),
        policy,
        merged_root,
        created_at,
    };
    serde_json::to_vec(&payload).map_err(|e| KernelError::malformed("federation", e.to_string()))
}

fn envelope_anchor(
    signature: &[u8],
    authorities: &[AuthorityRoot],
    policy: &str,
    created_at: Timestamp,
) -> Vec<u8> {
    let created_at = created_at.to_string();
    let mut leaves: Vec<&[u8]> = vec![signature];
    leaves.extend(authorities.iter().map(|a| a.id.as_bytes()));
    leaves.push(policy.as_bytes());
    leaves.push(created_at.as_bytes());
    merkle_root_of(&leaves).to_vec()
}

fn envelope_id(authorities: &[AuthorityRoot], created_at: Timestamp) -> String {
    let created_at = created_at.to_le_bytes();
    let mut parts: Vec<&[u8]> = authorities.iter().map(|a| a.id.as_bytes()).collect();
    parts.push(&created_at[..]);
    let mut id = to_hex(&hash_parts(parts));
    id.truncate(ENVELOPE_ID_LEN);
    id
}

/// Lineage for a federation: a new root derived from the sorted authority ids
/// and the timestamp, with every authority's current root as a parent.
pub fn merge_lineage(authorities: &[AuthorityRoot], timestamp: Timestamp) -> Result<Lineage> {
    if authorities.is_empty() {
        return Err(KernelError::malformed("authorities", "nothing to merge"));
    }
    let mut ids: Vec<&str> = authorities.iter().map(|a| a.id.as_str()).collect();
    ids.sort_unstable();

    let timestamp_bytes = timestamp.to_le_bytes();
    let mut parts: Vec<&[u8]> = ids.iter().map(|id| id.as_bytes()).collect();
    parts.push(&timestamp_bytes[..]);

    Ok(Lineage {
        parent_roots: authorities
            .iter()
            .map(|a| a.lineage.derived_root.clone())
            .collect(),
        derived_root: to_hex(&hash_parts(parts)),
        rotation_reason: "federation".to_string(),
        timestamp,
    })
}

/// Offline envelope check.
///
/// Every authority in the envelope must be one of `known_roots` (same id and
/// key) with a valid authority seal, and the initiator's signature, the
/// anchor and the merged lineage must all recompute.
pub fn verify_envelope(envelope: &FederationEnvelope, known_roots: &[AuthorityRoot]) -> bool {
    for authority in &envelope.authorities {
        let known = known_roots
            .iter()
            .any(|k| k.id == authority.id && k.public_key == authority.public_key);
        if !known || !authority.verify_seal() {
            warn!(envelope = %envelope.id, authority = %authority.id, "Unknown or unsealed authority");
            return false;
        }
    }

    let Some(initiator) = envelope.authorities.iter().find(|a| a.id == envelope.initiator) else {
        warn!(envelope = %envelope.id, "Initiator is not part of the envelope");
        return false;
    };

    if !(0.0..=1.0).contains(&envelope.trust_weight) {
        warn!(envelope = %envelope.id, weight = envelope.trust_weight, "Weight out of range");
        return false;
    }

    if envelope.id != envelope_id(&envelope.authorities, envelope.created_at) {
        warn!(envelope = %envelope.id, "Envelope id does not recompute");
        return false;
    }

    match merge_lineage(&envelope.authorities, envelope.created_at) {
        Ok(lineage) if lineage == envelope.merged_lineage => {}
        _ => {
            warn!(envelope = %envelope.id, "Merged lineage does not recompute");
            return false;
        }
    }

    let Ok(payload) = envelope_payload(
        &envelope.id,
        &envelope.authorities,
        envelope.trust_weight,
        &envelope.policy,
        &envelope.merged_lineage.derived_root,
        envelope.created_at,
    ) else {
        return false;
    };
    if !matches!(
        verify_classical(&payload, &envelope.integrity_seal, &initiator.public_key),
        Ok(true)
    ) {
        warn!(envelope = %envelope.id, "Integrity seal mismatch");
        return false;
    }

    let anchor = envelope_anchor(
        &envelope.integrity_seal,
        &envelope.authorities,
        &envelope.policy,
        envelope.created_at,
    );
    if anchor != envelope.merkle_anchor {
        warn!(envelope = %envelope.id, "Envelope anchor mismatch");
        return false;
    }

    true
}

/// Federation engine.
#[derive(Debug, Clone, Default)]
pub struct FederationEngine {
    config: FederationConfig,
}

impl FederationEngine {
    pub fn new(config: FederationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FederationConfig {
        &self.config
    }

    /// Distinct roots of the same crypto generation may federate.
    pub fn can_federate(&self, a: &AuthorityRoot, b: &AuthorityRoot) -> bool {
        a.lineage.derived_root != b.lineage.derived_root && a.pq_enabled == b.pq_enabled
    }

    pub fn resolve_weight(&self, a: &AuthorityRoot, b: &AuthorityRoot) -> f64 {
        let mut weight = self.config.base_weight;
        if a.depth() > self.config.depth_threshold && b.depth() > self.config.depth_threshold {
            weight += self.config.depth_bonus;
        }
        if a.pq_enabled && b.pq_enabled {
            weight += self.config.pq_bonus;
        }
        weight.min(1.0)
    }

    /// Federate `initiator` with one peer under the configured policy.
    pub fn federate(
        &self,
        initiator: &Authority,
        peer: &AuthorityRoot,
    ) -> Result<FederationEnvelope> {
        self.federate_all(initiator, std::slice::from_ref(peer), &self.config.default_policy)
    }

    /// Federate `initiator` with every peer. The envelope weight is the
    /// minimum pairwise weight.
    pub fn federate_all(
        &self,
        initiator: &Authority,
        peers: &[AuthorityRoot],
        policy: &str,
    ) -> Result<FederationEnvelope> {
        if peers.is_empty() {
            return Err(KernelError::IncompatibleAuthorities(
                "federation needs at least one peer".to_string(),
            ));
        }
        if policy.is_empty() {
            return Err(KernelError::malformed("policy", "must not be empty"));
        }

        let mut authorities = Vec::with_capacity(peers.len() + 1);
        authorities.push(initiator.root().clone());
        authorities.extend(peers.iter().cloned());

        if let Some(forged) = authorities.iter().find(|a| !a.verify_seal()) {
            return Err(KernelError::IncompatibleAuthorities(format!(
                "authority {} has an invalid seal",
                forged.id
            )));
        }

        let mut trust_weight: f64 = 1.0;
        for (i, a) in authorities.iter().enumerate() {
            for b in &authorities[i + 1..] {
                if !self.can_federate(a, b) {
                    warn!(a = %a.id, b = %b.id, "Authorities cannot federate");
                    return Err(KernelError::IncompatibleAuthorities(format!(
                        "{} and {} share a root or differ in PQ generation",
                        a.id, b.id
                    )));
                }
                trust_weight = trust_weight.min(self.resolve_weight(a, b));
            }
        }

        let created_at = current_timestamp_ms();
        let id = envelope_id(&authorities, created_at);
        let merged_lineage = merge_lineage(&authorities, created_at)?;
        let payload = envelope_payload(
            &id,
            &authorities,
            trust_weight,
            policy,
            &merged_lineage.derived_root,
            created_at,
        )?;
        let integrity_seal = initiator.sign(&payload);
        let merkle_anchor = envelope_anchor(&integrity_seal, &authorities, policy, created_at);

        info!(
            envelope = %id,
            initiator = %initiator.id(),
            authorities = authorities.len(),
            weight = trust_weight,
            "Federation envelope sealed"
        );

        Ok(FederationEnvelope {
            id,
            authorities,
            created_at,
            trust_weight,
            policy: policy.to_string(),
            merged_lineage,
            initiator: initiator.id().to_string(),
            integrity_seal,
            merkle_anchor,
        })
    }
}
