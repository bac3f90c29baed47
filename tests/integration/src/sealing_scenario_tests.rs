//! Issue → seal → verify scenarios
//!
//! Every object here is produced by a real authority and every tampering is
//! a single-field change, so each test pins one specific failure reason.

use crate::test_utils::{init_tracing, issue_scored, root_authority, scored_request};
use sovereign_core::{KernelError, VerificationConfig};
use sovereign_identity::{
    Authority, EntityKind, IssueRequest, Policy, PolicyRule, PolicyStatus, RiskLevel, RuleTable,
    SealFailure, Severity, TrustObject, ValidationFailure, Verifier,
};
use std::sync::Arc;

fn deny_policy() -> Policy {
    Policy::new("2.1")
        .with_rule(PolicyRule::new(
            "require-attested-boot",
            "Device must report an attested boot chain",
            "attested-boot",
            Severity::Deny,
        ))
        .with_rule(PolicyRule::new(
            "prefer-recent-metric",
            "Metric should be refreshed daily",
            "recent-metric",
            Severity::Warn,
        ))
}

#[test]
fn test_sovereign_issue_and_verify() {
    init_tracing();

    let authority = root_authority("SOVEREIGN_ROOT", true);
    let trust = authority
        .issue(scored_request("did:sov:device-alpha", 85.0, RiskLevel::Low))
        .unwrap();

    let attestation = Verifier::default().verify(&trust).unwrap();

    assert!(attestation.valid);
    assert!(attestation.seal.classical_signature_valid);
    assert_eq!(attestation.seal.pq_signature_valid, Some(true));
    assert!(attestation.seal.merkle_anchor_valid);
    assert!(attestation.lineage_valid);
    assert!(attestation.metric_gate_passed);
    assert_eq!(attestation.metric.as_ref().map(|m| m.level), Some(RiskLevel::Low));
    assert_eq!(attestation.details.object_id, "did:sov:device-alpha");
    assert_eq!(attestation.details.authority_root, authority.id());
    assert!(attestation.failures().is_empty());
}

#[test]
fn test_classical_only_authority_has_no_pq_result() {
    init_tracing();

    let authority = root_authority("CLASSICAL_ROOT", false);
    let trust = issue_scored(&authority, "did:sov:classical", 70.0);

    let attestation = Verifier::default().verify(&trust).unwrap();
    assert!(attestation.valid);
    assert_eq!(attestation.seal.pq_signature_valid, None);
    assert!(trust.seal.pq_signature.is_none());
}

#[test]
fn test_self_referencing_lineage_is_reported() {
    init_tracing();

    let authority = root_authority("SOVEREIGN_ROOT", true);
    let mut trust = issue_scored(&authority, "did:sov:loop", 85.0);
    let root = trust.lineage.derived_root.clone();
    trust.lineage.parent_roots.push(root);

    let attestation = Verifier::default().verify(&trust).unwrap();

    // parent roots are not part of the seal
    assert!(attestation.seal.valid);
    assert!(!attestation.lineage_valid);
    assert!(!attestation.valid);
    assert_eq!(attestation.failures(), vec![ValidationFailure::LineageInvalid]);
    assert!(matches!(
        attestation.into_result(),
        Err(KernelError::LineageInvalid(_))
    ));
}

#[test]
fn test_flipped_classical_signature_byte() {
    init_tracing();

    let authority = root_authority("SOVEREIGN_ROOT", false);
    let mut trust = issue_scored(&authority, "did:sov:sigflip", 85.0);
    trust.seal.classical_signature[0] ^= 0x01;

    let attestation = Verifier::default().verify(&trust).unwrap();

    assert!(!attestation.valid);
    assert!(!attestation.seal.classical_signature_valid);
    assert!(attestation
        .seal
        .failures
        .contains(&SealFailure::ClassicalSignatureMismatch));
    // the anchor commits to the signature bytes
    assert!(attestation.seal.failures.contains(&SealFailure::MerkleAnchorMismatch));
}

#[test]
fn test_flipped_anchor_byte_only_breaks_anchor() {
    init_tracing();

    let authority = root_authority("SOVEREIGN_ROOT", true);
    let mut trust = issue_scored(&authority, "did:sov:anchorflip", 85.0);
    let last = trust.seal.merkle_anchor.len() - 1;
    trust.seal.merkle_anchor[last] ^= 0x80;

    let attestation = Verifier::default().verify(&trust).unwrap();

    assert!(attestation.seal.classical_signature_valid);
    assert_eq!(attestation.seal.pq_signature_valid, Some(true));
    assert!(!attestation.seal.merkle_anchor_valid);
    assert_eq!(attestation.seal.failures, vec![SealFailure::MerkleAnchorMismatch]);
}

#[test]
fn test_flipped_pq_signature_byte() {
    init_tracing();

    let authority = root_authority("SOVEREIGN_ROOT", true);
    let mut trust = issue_scored(&authority, "did:sov:pqflip", 85.0);
    if let Some(signature) = trust.seal.pq_signature.as_mut() {
        signature[5] ^= 0xff;
    }

    let attestation = Verifier::default().verify(&trust).unwrap();

    assert!(attestation.seal.classical_signature_valid);
    assert_eq!(attestation.seal.pq_signature_valid, Some(false));
    assert!(attestation.seal.failures.contains(&SealFailure::PqSignatureMismatch));
}

#[test]
fn test_stripped_pq_signature_on_pq_object() {
    init_tracing();

    let authority = root_authority("SOVEREIGN_ROOT", true);
    let mut trust = issue_scored(&authority, "did:sov:pqstrip", 85.0);
    trust.seal.pq_signature = None;

    let attestation = Verifier::default().verify(&trust).unwrap();

    assert!(!attestation.valid);
    assert!(attestation.seal.failures.contains(&SealFailure::PqSignatureMissing));
}

#[test]
fn test_edited_policy_breaks_signatures_but_not_anchor() {
    init_tracing();

    let authority = root_authority("SOVEREIGN_ROOT", true);
    let mut trust = issue_scored(&authority, "did:sov:policyedit", 85.0);
    trust.policy.version = "9.9".to_string();

    let attestation = Verifier::default().verify(&trust).unwrap();

    assert!(!attestation.seal.classical_signature_valid);
    assert_eq!(attestation.seal.pq_signature_valid, Some(false));
    assert!(attestation.seal.merkle_anchor_valid);
}

#[test]
fn test_foreign_key_substitution_is_detected() {
    init_tracing();

    let authority = root_authority("SOVEREIGN_ROOT", false);
    let impostor = root_authority("IMPOSTOR", false);
    let mut trust = issue_scored(&authority, "did:sov:swap", 85.0);
    trust.identity.public_key = impostor.public_key();

    let attestation = Verifier::default().verify(&trust).unwrap();

    assert!(!attestation.valid);
    assert!(!attestation.seal.classical_signature_valid);
    assert!(!attestation.seal.merkle_anchor_valid);
}

#[test]
fn test_deny_rule_without_evaluator_fails_closed() {
    init_tracing();

    let authority = root_authority("SOVEREIGN_ROOT", false);
    let trust = authority
        .issue(IssueRequest::new(EntityKind::Service).with_policy(deny_policy()))
        .unwrap();

    let attestation = Verifier::default().verify(&trust).unwrap();

    assert!(attestation.seal.valid);
    assert_eq!(attestation.policy.status, PolicyStatus::Disabled);
    assert!(!attestation.policy.passed);
    assert_eq!(
        attestation.policy.unevaluated_rules,
        vec!["require-attested-boot", "prefer-recent-metric"]
    );
    assert!(matches!(
        attestation.failures().as_slice(),
        [ValidationFailure::PolicyUnevaluated { .. }]
    ));
}

#[test]
fn test_rule_table_drives_policy_outcome() {
    init_tracing();

    let authority = root_authority("SOVEREIGN_ROOT", false);
    let trust = authority
        .issue(IssueRequest::new(EntityKind::Service).with_policy(deny_policy()))
        .unwrap();

    let passing = RuleTable::new().with("attested-boot", |_: &TrustObject| true);
    let attestation = Verifier::default()
        .with_evaluator(Arc::new(passing))
        .verify(&trust)
        .unwrap();
    assert!(attestation.valid);
    assert_eq!(attestation.policy.status, PolicyStatus::Evaluated);
    // unregistered conditions evaluate to false, so the warn rule is reported
    assert_eq!(attestation.policy.warned_rules, vec!["prefer-recent-metric"]);

    let failing = RuleTable::new().with("attested-boot", |t: &TrustObject| {
        t.identity.kind == EntityKind::Device
    });
    let attestation = Verifier::default()
        .with_evaluator(Arc::new(failing))
        .verify(&trust)
        .unwrap();
    assert!(!attestation.valid);
    assert_eq!(attestation.policy.failed_rules, vec!["require-attested-boot"]);
    match attestation.into_result() {
        Err(KernelError::PolicyDenied { rules }) => {
            assert_eq!(rules, vec!["require-attested-boot".to_string()]);
        }
        other => panic!("expected PolicyDenied, got {other:?}"),
    }
}

#[test]
fn test_metric_gate() {
    init_tracing();

    let authority = root_authority("SOVEREIGN_ROOT", false);
    let verifier = Verifier::default();

    let low_score = authority
        .issue(scored_request("did:sov:weak", 30.0, RiskLevel::High))
        .unwrap();
    let attestation = verifier.verify(&low_score).unwrap();
    assert!(attestation.seal.valid);
    assert!(!attestation.metric_gate_passed);
    assert!(matches!(
        attestation.into_result(),
        Err(KernelError::MetricGateFailed { .. })
    ));

    let critical = authority
        .issue(scored_request("did:sov:critical", 90.0, RiskLevel::Critical))
        .unwrap();
    assert!(!verifier.verify(&critical).unwrap().metric_gate_passed);

    let lenient = Verifier::new(VerificationConfig {
        metric_min_score: 10.0,
        reject_critical_risk: false,
        ..VerificationConfig::default()
    });
    assert!(lenient.verify(&low_score).unwrap().valid);
    assert!(lenient.verify(&critical).unwrap().valid);
}

#[test]
fn test_expiry_is_enforced_against_check_time() {
    init_tracing();

    let authority = root_authority("SOVEREIGN_ROOT", false);
    let trust = authority
        .issue(
            scored_request("did:sov:expiring", 85.0, RiskLevel::Low).expires_at(1_000),
        )
        .unwrap();
    assert_eq!(trust.seal.expires_at, Some(1_000));

    let verifier = Verifier::default();
    let before = verifier.verify_at(&trust, 999).unwrap();
    assert!(before.valid);
    assert!(!before.expired);

    let after = verifier.verify_at(&trust, 1_001).unwrap();
    assert!(after.expired);
    assert!(!after.valid);
    assert_eq!(
        after.failures(),
        vec![ValidationFailure::Expired { expires_at: 1_000 }]
    );

    let relaxed = Verifier::new(VerificationConfig {
        enforce_expiry: false,
        ..VerificationConfig::default()
    });
    assert!(relaxed.verify_at(&trust, 1_001).unwrap().valid);
}

#[test]
fn test_unsealed_and_malformed_objects_are_errors() {
    init_tracing();

    let authority = root_authority("SOVEREIGN_ROOT", false);
    let mut trust = issue_scored(&authority, "did:sov:unsealed", 85.0);
    trust.seal = Default::default();
    assert!(matches!(
        Verifier::default().verify(&trust),
        Err(KernelError::InputMalformed { .. })
    ));

    let mut trust = issue_scored(&authority, "did:sov:noid", 85.0);
    trust.identity.id.clear();
    assert!(matches!(
        Verifier::default().verify(&trust),
        Err(KernelError::InputMalformed { .. })
    ));

    assert!(matches!(
        TrustObject::from_json(b"{\"version\":\"1.0\"}"),
        Err(KernelError::InputMalformed { .. })
    ));
}

#[test]
fn test_json_transport_preserves_seal() {
    init_tracing();

    let authority = root_authority("SOVEREIGN_ROOT", true);
    let trust = issue_scored(&authority, "did:sov:wire", 72.5);

    let bytes = trust.to_json().unwrap();
    let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(value["version"], "3.0-pq");
    assert_eq!(value["identity"]["kind"], "device");

    let received = TrustObject::from_json(&bytes).unwrap();
    assert_eq!(received, trust);
    assert!(Verifier::default().verify(&received).unwrap().valid);
}

#[test]
fn test_renewal_moves_object_under_new_authority() {
    init_tracing();

    let origin = root_authority("ORIGIN_ROOT", false);
    let successor = root_authority("SUCCESSOR_ROOT", false);
    let trust = issue_scored(&origin, "did:sov:migrating", 85.0);

    let renewed = successor.renew(trust.clone()).unwrap();

    assert_eq!(renewed.identity.id, trust.identity.id);
    assert_eq!(renewed.identity.authority_root, successor.id());
    assert_eq!(renewed.lineage.derived_root, successor.id());
    assert_eq!(renewed.lineage.parent_roots, vec![origin.id().to_string()]);
    assert_eq!(renewed.lineage.rotation_reason, "renewal");
    assert!(Verifier::default().verify(&renewed).unwrap().valid);
}

#[test]
fn test_realm_objects_carry_parent_lineage() {
    init_tracing();

    let parent = root_authority("SOVEREIGN_ROOT", true);
    let realm = Authority::derive_realm(&parent, "FIELD_REALM").unwrap();
    let trust = issue_scored(&realm, "did:sov:realm-device", 85.0);

    assert_eq!(trust.lineage.parent_roots, vec![parent.id().to_string()]);
    assert_eq!(trust.lineage.rotation_reason, "sovereign-derived");
    assert!(realm.root().verify_seal());
    assert!(Verifier::default().verify(&trust).unwrap().valid);
}
