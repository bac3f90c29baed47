//! Persistence through the store collaborator
//!
//! Covers the SQLite adapter end to end, corrupt stored bytes and a store
//! that goes away mid-session.

use crate::test_utils::{init_tracing, root_authority, scored_request, FlakyStore};
use sovereign_core::{KernelConfig, KernelError, SqliteStore, TrustStore};
use sovereign_identity::repository::{state_key, trust_key};
use sovereign_identity::{ActivationRequest, RiskLevel, TrustRepository, Verifier};
use sovereign_trust_mesh::{TrustKernel, TrustState, TrustStateProfile};
use std::collections::BTreeMap;

#[tokio::test]
async fn test_sqlite_store_semantics() {
    init_tracing();

    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(dir.path().join("kernel.db")).unwrap();

    assert!(store.get("missing").await.unwrap().is_none());

    store.put("k", b"first".to_vec()).await.unwrap();
    store.put("k", b"second".to_vec()).await.unwrap();
    assert_eq!(store.get("k").await.unwrap(), Some(b"second".to_vec()));
}

#[tokio::test]
async fn test_kernel_state_survives_reopen() {
    init_tracing();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trust").join("kernel.db");

    let id = {
        let store = SqliteStore::open(&path).unwrap();
        let kernel = TrustKernel::new(
            root_authority("PERSISTENT_ROOT", true),
            KernelConfig::default(),
            store,
        )
        .unwrap();

        let (trust, _) = kernel
            .issue(scored_request("did:sov:durable", 85.0, RiskLevel::Low))
            .await
            .unwrap();
        kernel.decay(trust.id()).await.unwrap();
        trust.identity.id
    };

    let reopened = SqliteStore::open(&path).unwrap();
    let repository = TrustRepository::new(reopened);

    let trust = repository.require_trust(&id).await.unwrap();
    assert!(Verifier::default().verify(&trust).unwrap().valid);

    let profile: TrustStateProfile = repository.get_state(&id).await.unwrap().unwrap();
    assert!(profile.verify_integrity());
    assert_eq!(profile.score, 83.0);
    assert_eq!(profile.state, TrustState::Sovereign);
    assert_eq!(profile.transitions.len(), 2);
}

#[tokio::test]
async fn test_garbage_bytes_are_corrupt_state() {
    init_tracing();

    let store = SqliteStore::open_in_memory().unwrap();
    let kernel = TrustKernel::new(
        root_authority("KERNEL_ROOT", false),
        KernelConfig::default(),
        store.clone(),
    )
    .unwrap();
    let (trust, _) = kernel
        .issue(scored_request("did:sov:victim", 70.0, RiskLevel::Low))
        .await
        .unwrap();

    store
        .put(&trust_key(trust.id()), b"\x00\x01not json".to_vec())
        .await
        .unwrap();
    assert!(matches!(
        kernel.verify(trust.id()).await,
        Err(KernelError::CorruptState { .. })
    ));

    // parses, but is not a valid trust object
    let mut hollow = trust.clone();
    hollow.identity.public_key.clear();
    store
        .put(&trust_key(trust.id()), serde_json::to_vec(&hollow).unwrap())
        .await
        .unwrap();
    assert!(matches!(
        kernel.verify(trust.id()).await,
        Err(KernelError::CorruptState { .. })
    ));

    store
        .put(&state_key(trust.id()), b"{}".to_vec())
        .await
        .unwrap();
    assert!(matches!(
        kernel.profile(trust.id()).await,
        Err(KernelError::CorruptState { .. })
    ));
}

#[tokio::test]
async fn test_edited_profile_fails_integrity() {
    init_tracing();

    let store = SqliteStore::open_in_memory().unwrap();
    let kernel = TrustKernel::new(
        root_authority("KERNEL_ROOT", false),
        KernelConfig::default(),
        store,
    )
    .unwrap();
    let (trust, mut profile) = kernel
        .issue(scored_request("did:sov:promoted", 30.0, RiskLevel::High))
        .await
        .unwrap();

    profile.state = TrustState::Sovereign;
    profile.score = 99.0;
    kernel
        .repository()
        .put_state(trust.id(), &profile)
        .await
        .unwrap();

    assert!(matches!(
        kernel.profile(trust.id()).await,
        Err(KernelError::CorruptState { .. })
    ));
    assert!(kernel.reinforce(trust.id()).await.is_err());
}

#[tokio::test]
async fn test_store_outage_is_a_store_error() {
    init_tracing();

    let store = FlakyStore::new();
    let kernel = TrustKernel::new(
        root_authority("KERNEL_ROOT", false),
        KernelConfig::default(),
        store.clone(),
    )
    .unwrap();
    let (trust, _) = kernel
        .issue(scored_request("did:sov:remote", 70.0, RiskLevel::Low))
        .await
        .unwrap();

    store.set_offline(true);
    assert!(matches!(
        kernel.verify(trust.id()).await,
        Err(KernelError::Store(_))
    ));
    assert!(matches!(
        kernel
            .issue(scored_request("did:sov:late", 70.0, RiskLevel::Low))
            .await,
        Err(KernelError::Store(_))
    ));

    store.set_offline(false);
    assert!(kernel.verify(trust.id()).await.unwrap().valid);
}

#[tokio::test]
async fn test_failed_issue_leaves_nothing_behind() {
    init_tracing();

    let store = FlakyStore::new();
    let kernel = TrustKernel::new(
        root_authority("KERNEL_ROOT", false),
        KernelConfig::default(),
        store.clone(),
    )
    .unwrap();
    let request = || scored_request("did:sov:partial", 70.0, RiskLevel::Low);

    for prefix in ["state:", "trust:"] {
        store.fail_puts_under(Some(prefix));
        assert!(matches!(
            kernel.issue(request()).await,
            Err(KernelError::Store(_))
        ));
        store.fail_puts_under(None);

        for result in [
            kernel.profile("did:sov:partial").await.map(|_| ()),
            kernel.decay("did:sov:partial").await.map(|_| ()),
            kernel.verify("did:sov:partial").await.map(|_| ()),
        ] {
            assert!(matches!(result, Err(KernelError::NotFound { .. })), "{prefix}");
        }
        assert!(kernel.graph().node("did:sov:partial").unwrap().is_none());
    }

    // once the store recovers the subject can still be issued
    let (trust, profile) = kernel.issue(request()).await.unwrap();
    assert_eq!(profile.transitions.len(), 1);
    assert_eq!(kernel.decay(trust.id()).await.unwrap().score, 68.0);
}

#[tokio::test]
async fn test_licence_activation_flow() {
    init_tracing();

    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(dir.path().join("licences.db")).unwrap();
    let kernel = TrustKernel::new(
        root_authority("LICENCE_ROOT", false),
        KernelConfig::default(),
        store,
    )
    .unwrap();

    assert!(kernel.verify_activation("LIC-0001").await.unwrap().is_none());

    let mut metadata = BTreeMap::new();
    metadata.insert("site".to_string(), "forward-base".to_string());
    let record = kernel
        .activate(
            "LIC-0001",
            ActivationRequest {
                device: Some("tablet-7".to_string()),
                metadata: metadata.clone(),
            },
        )
        .await
        .unwrap();
    assert!(record.activated);
    assert_eq!(record.device, "tablet-7");

    let stored = kernel.verify_activation("LIC-0001").await.unwrap().unwrap();
    assert_eq!(stored, record);
    assert_eq!(stored.metadata, metadata);

    let anonymous = kernel
        .activate("LIC-0002", ActivationRequest::default())
        .await
        .unwrap();
    assert_eq!(anonymous.device, "unknown");

    assert!(matches!(
        kernel.activate("", ActivationRequest::default()).await,
        Err(KernelError::InputMalformed { .. })
    ));
}
