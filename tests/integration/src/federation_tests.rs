//! Federation envelopes and offline attestation
//!
//! Envelopes are produced by one kernel and checked by parties that only hold
//! the public authority roots, the way a disconnected peer would.

use crate::test_utils::{init_tracing, memory_kernel, root_authority, rotated_authority};
use sovereign_core::{current_timestamp_ms, FederationConfig, KernelError};
use sovereign_identity::{
    verify_envelope, AttestationOracle, AttestationRegistry, AttestationRequest, Authority,
    FederationEngine, FederationEnvelope,
};

fn engine() -> FederationEngine {
    FederationEngine::new(FederationConfig::default())
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[test]
fn test_bilateral_envelope_verifies_offline() {
    init_tracing();

    let alpha = root_authority("ALPHA_ROOT", true);
    let bravo = root_authority("BRAVO_ROOT", true);

    let envelope = engine().federate(&alpha, bravo.root()).unwrap();

    assert_eq!(envelope.initiator, alpha.id());
    assert_eq!(envelope.authority_ids(), vec![alpha.id(), bravo.id()]);
    assert_eq!(envelope.policy, FederationConfig::default().default_policy);
    assert!(close(envelope.trust_weight, 0.8));
    assert_eq!(envelope.merged_lineage.rotation_reason, "federation");
    assert_eq!(
        envelope.merged_lineage.parent_roots,
        vec![alpha.id().to_string(), bravo.id().to_string()]
    );

    let known = [alpha.root().clone(), bravo.root().clone()];
    assert!(verify_envelope(&envelope, &known));
}

#[test]
fn test_envelope_survives_json_transport() {
    init_tracing();

    let alpha = root_authority("ALPHA_ROOT", false);
    let bravo = root_authority("BRAVO_ROOT", false);
    let envelope = engine().federate(&alpha, bravo.root()).unwrap();

    let wire = serde_json::to_vec(&envelope).unwrap();
    let received: FederationEnvelope = serde_json::from_slice(&wire).unwrap();

    assert!(verify_envelope(
        &received,
        &[alpha.root().clone(), bravo.root().clone()]
    ));
}

#[test]
fn test_tampered_envelopes_are_rejected() {
    init_tracing();

    let alpha = root_authority("ALPHA_ROOT", true);
    let bravo = root_authority("BRAVO_ROOT", true);
    let known = [alpha.root().clone(), bravo.root().clone()];
    let envelope = engine().federate(&alpha, bravo.root()).unwrap();

    let mut heavier = envelope.clone();
    heavier.trust_weight = 1.0;
    assert!(!verify_envelope(&heavier, &known));

    let mut repoliced = envelope.clone();
    repoliced.policy = "open-door".to_string();
    assert!(!verify_envelope(&repoliced, &known));

    let mut resealed = envelope.clone();
    resealed.integrity_seal[0] ^= 0x01;
    assert!(!verify_envelope(&resealed, &known));

    let mut reanchored = envelope.clone();
    reanchored.merkle_anchor[0] ^= 0x01;
    assert!(!verify_envelope(&reanchored, &known));

    let mut relineaged = envelope.clone();
    relineaged.merged_lineage.parent_roots.pop();
    assert!(!verify_envelope(&relineaged, &known));

    // a verifier that has never seen bravo refuses the envelope
    assert!(!verify_envelope(&envelope, &known[..1]));
}

#[test]
fn test_incompatible_authorities_are_refused() {
    init_tracing();

    let classical = root_authority("CLASSICAL_ROOT", false);
    let pq = root_authority("PQ_ROOT", true);
    assert!(!engine().can_federate(classical.root(), pq.root()));
    assert!(matches!(
        engine().federate(&classical, pq.root()),
        Err(KernelError::IncompatibleAuthorities(_))
    ));

    assert!(matches!(
        engine().federate(&pq, pq.root()),
        Err(KernelError::IncompatibleAuthorities(_))
    ));

    let mut forged = root_authority("FORGED_ROOT", true).root().clone();
    forged.name = "TRUSTED_ROOT".to_string();
    assert!(matches!(
        engine().federate(&pq, &forged),
        Err(KernelError::IncompatibleAuthorities(_))
    ));

    assert!(matches!(
        engine().federate_all(&pq, &[], "sovereign-federation-v1"),
        Err(KernelError::IncompatibleAuthorities(_))
    ));
}

#[test]
fn test_weight_rewards_depth_and_pq() {
    init_tracing();

    let shallow_a = root_authority("SHALLOW_A", false);
    let shallow_b = root_authority("SHALLOW_B", false);
    assert!(close(
        engine().resolve_weight(shallow_a.root(), shallow_b.root()),
        0.7
    ));

    let deep_a = rotated_authority("DEEP_A", true, 3);
    let deep_b = rotated_authority("DEEP_B", true, 3);
    assert_eq!(deep_a.root().depth(), 3);
    assert!(close(engine().resolve_weight(deep_a.root(), deep_b.root()), 0.9));

    let generous = FederationEngine::new(FederationConfig {
        base_weight: 0.95,
        ..FederationConfig::default()
    });
    assert!(close(generous.resolve_weight(deep_a.root(), deep_b.root()), 1.0));
}

#[test]
fn test_multilateral_envelope_takes_weakest_pair() {
    init_tracing();

    let initiator = rotated_authority("DEEP_INITIATOR", true, 3);
    let deep_peer = rotated_authority("DEEP_PEER", true, 3);
    let fresh_peer = root_authority("FRESH_PEER", true);
    let peers = [deep_peer.root().clone(), fresh_peer.root().clone()];

    let envelope = engine()
        .federate_all(&initiator, &peers, "coalition-v2")
        .unwrap();

    assert_eq!(envelope.authorities.len(), 3);
    assert!(envelope.includes(fresh_peer.id()));
    assert_eq!(envelope.policy, "coalition-v2");
    // the deep pair alone would weigh 0.9
    assert!(close(envelope.trust_weight, 0.8));

    let known = [
        initiator.root().clone(),
        deep_peer.root().clone(),
        fresh_peer.root().clone(),
    ];
    assert!(verify_envelope(&envelope, &known));
}

#[test]
fn test_realm_federates_with_foreign_root() {
    init_tracing();

    let home = root_authority("HOME_ROOT", true);
    let realm = Authority::derive_realm(&home, "FORWARD_REALM").unwrap();
    let foreign = root_authority("FOREIGN_ROOT", true);

    let envelope = engine().federate(&realm, foreign.root()).unwrap();
    assert!(verify_envelope(
        &envelope,
        &[realm.root().clone(), foreign.root().clone()]
    ));
}

#[tokio::test]
async fn test_envelope_feeds_offline_attestation() {
    init_tracing();

    let alpha = root_authority("ALPHA_ROOT", true);
    let bravo = root_authority("BRAVO_ROOT", true);
    let envelope = engine().federate(&alpha, bravo.root()).unwrap();

    let registry = AttestationRegistry::new();
    assert_eq!(registry.register_envelope(&envelope).await.unwrap(), 2);
    assert_eq!(registry.len().await, 2);

    let response = registry
        .attest(&AttestationRequest {
            node_id: bravo.id().to_string(),
            timestamp: current_timestamp_ms(),
            signature: bravo.root().authority_seal.clone(),
        })
        .await
        .unwrap();
    assert!(response.ok);
    assert!(response.verified);
    assert_eq!(response.state.map(|s| s.source), Some(envelope.id.clone()));

    let response = registry
        .attest(&AttestationRequest {
            node_id: bravo.id().to_string(),
            timestamp: current_timestamp_ms(),
            signature: alpha.root().authority_seal.clone(),
        })
        .await
        .unwrap();
    assert!(!response.verified);

    let outsider = root_authority("OUTSIDER", true);
    let response = registry
        .attest(&AttestationRequest {
            node_id: outsider.id().to_string(),
            timestamp: current_timestamp_ms(),
            signature: outsider.root().authority_seal.clone(),
        })
        .await
        .unwrap();
    assert!(!response.verified);
    assert!(response.state.is_none());
}

#[tokio::test]
async fn test_kernel_persists_envelopes() {
    init_tracing();

    let kernel = memory_kernel(true);
    let peer = root_authority("PEER_ROOT", true);

    let envelope = kernel.federate(peer.root()).await.unwrap();
    let stored = kernel
        .repository()
        .get_envelope(&envelope.id)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(stored.id, envelope.id);
    assert_eq!(stored.authorities, envelope.authorities);
    assert_eq!(stored.integrity_seal, envelope.integrity_seal);
    assert!(verify_envelope(
        &stored,
        &[kernel.authority().root().clone(), peer.root().clone()]
    ));
}
