//! The trust kernel facade.
//!
//! [`TrustKernel`] wires one explicitly constructed [`Authority`] and a
//! [`KernelConfig`] to the verification engine, the state machine, a shared
//! trust graph, the federation engine and a persistence collaborator.
//!
//! Issuance flow: issue and seal → initial state profile → persist the
//! profile, then the object → admit to the graph. A profile counts only once
//! its object is stored, so a failed issue leaves nothing observable. Every
//! later read re-verifies from persisted bytes.
//!
//! A subject is issued once. Its profile and transition log are kept for good,
//! including after revocation; later re-sealing goes through [`TrustKernel::renew`].

use crate::graph::TrustGraph;
use crate::shared::SharedTrustGraph;
use crate::state::{TrustState, TrustStateMachine, TrustStateProfile};
use sovereign_core::{KernelConfig, KernelError, Result, TrustStore};
use sovereign_identity::repository::{state_key, trust_key};
use sovereign_identity::{
    ActivationRecord, ActivationRequest, Attestation, Authority, AuthorityRoot, FederationEngine,
    FederationEnvelope, IssueRequest, PolicyEvaluator, TrustObject, TrustRepository, Verifier,
};
use std::sync::Arc;
use tracing::{info, warn};

pub struct TrustKernel<S> {
    authority: Authority,
    config: KernelConfig,
    verifier: Verifier,
    state_machine: TrustStateMachine,
    federation: FederationEngine,
    graph: SharedTrustGraph,
    repository: TrustRepository<S>,
}

impl<S: TrustStore> TrustKernel<S> {
    pub fn new(authority: Authority, config: KernelConfig, store: S) -> Result<Self> {
        config.validate()?;
        info!(
            authority = %authority.id(),
            pq_enabled = authority.pq_enabled(),
            "Trust kernel starting"
        );
        Ok(Self {
            verifier: Verifier::new(config.verification.clone()),
            state_machine: TrustStateMachine::new(config.state.clone()),
            federation: FederationEngine::new(config.federation.clone()),
            graph: SharedTrustGraph::new(TrustGraph::new(config.graph.default_score)),
            repository: TrustRepository::new(store),
            authority,
            config,
        })
    }

    /// Enable policy evaluation. Without an evaluator it stays disabled.
    pub fn with_policy_evaluator(mut self, evaluator: Arc<dyn PolicyEvaluator>) -> Self {
        self.verifier = self.verifier.with_evaluator(evaluator);
        self
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn graph(&self) -> &SharedTrustGraph {
        &self.graph
    }

    pub fn repository(&self) -> &TrustRepository<S> {
        &self.repository
    }

    /// Issue, seal, profile, persist and admit a new trust object.
    ///
    /// Fails with `InputMalformed` when the subject id was already issued.
    pub async fn issue(&self, request: IssueRequest) -> Result<(TrustObject, TrustStateProfile)> {
        let trust = self.authority.issue(request)?;
        if self.repository.get_trust(trust.id()).await?.is_some() {
            warn!(identity = %trust.id(), "Refusing to re-issue an existing subject");
            return Err(KernelError::malformed(
                "identity.id",
                format!("{} already issued, renew it instead", trust.id()),
            ));
        }
        let profile = self.state_machine.profile_for(&trust);

        self.repository.put_state(trust.id(), &profile).await?;
        self.repository.put_trust(&trust).await?;
        self.graph.add_node(trust.clone())?;

        info!(identity = %trust.id(), state = %profile.state, "Trust object admitted");
        Ok((trust, profile))
    }

    /// Verify an object presented directly.
    pub fn verify_object(&self, trust: &TrustObject) -> Result<Attestation> {
        self.verifier.verify(trust)
    }

    /// Load and verify a persisted object.
    pub async fn verify(&self, id: &str) -> Result<Attestation> {
        let trust = self.repository.require_trust(id).await?;
        self.verifier.verify(&trust)
    }

    /// Load a persisted profile, refusing one whose integrity hash is wrong.
    pub async fn profile(&self, id: &str) -> Result<TrustStateProfile> {
        // a profile whose object never landed is left over from a failed issue
        if self.repository.get_trust(id).await?.is_none() {
            return Err(KernelError::NotFound { key: trust_key(id) });
        }
        let profile: TrustStateProfile = self
            .repository
            .get_state(id)
            .await?
            .ok_or_else(|| KernelError::NotFound { key: state_key(id) })?;
        if !profile.verify_integrity() {
            warn!(identity = %id, "State profile integrity hash mismatch");
            return Err(KernelError::CorruptState {
                key: state_key(id),
                reason: "integrity hash mismatch".to_string(),
            });
        }
        Ok(profile)
    }

    async fn mutate_profile<F>(&self, id: &str, mutate: F) -> Result<TrustStateProfile>
    where
        F: FnOnce(&TrustStateMachine, &mut TrustStateProfile) -> Result<()> + Send,
    {
        let mut profile = self.profile(id).await?;
        mutate(&self.state_machine, &mut profile)?;
        self.repository.put_state(id, &profile).await?;
        if self.graph.node(id)?.is_some() {
            self.graph.set_score(id, profile.score)?;
        }
        Ok(profile)
    }

    /// Fold the object's metric and lineage into its profile.
    pub async fn evaluate(&self, id: &str) -> Result<TrustStateProfile> {
        let trust = self.repository.require_trust(id).await?;
        self.mutate_profile(id, |machine, profile| {
            machine.evaluate(&trust, profile).map_err(Into::into)
        })
        .await
    }

    pub async fn decay(&self, id: &str) -> Result<TrustStateProfile> {
        self.mutate_profile(id, |machine, profile| {
            machine.decay(profile).map_err(Into::into)
        })
        .await
    }

    pub async fn reinforce(&self, id: &str) -> Result<TrustStateProfile> {
        self.mutate_profile(id, |machine, profile| {
            machine.reinforce(profile).map_err(Into::into)
        })
        .await
    }

    pub async fn flag_anomaly(&self, id: &str, reason: &str) -> Result<TrustStateProfile> {
        self.mutate_profile(id, |machine, profile| {
            machine.flag_anomaly(profile, reason).map_err(Into::into)
        })
        .await
    }

    pub async fn override_state(
        &self,
        id: &str,
        state: TrustState,
        reason: &str,
    ) -> Result<TrustStateProfile> {
        self.mutate_profile(id, |_, profile| {
            profile.authority_override(state, reason).map_err(Into::into)
        })
        .await
    }

    /// Re-seal a persisted object under this kernel's authority.
    ///
    /// The profile is untouched and the graph node keeps its score.
    pub async fn renew(&self, id: &str) -> Result<TrustObject> {
        let trust = self.repository.require_trust(id).await?;
        let profile = self.profile(id).await?;
        let renewed = self.authority.renew(trust)?;
        self.repository.put_trust(&renewed).await?;
        if !self.graph.replace_object(renewed.clone())? {
            self.graph.add_node(renewed.clone())?;
            self.graph.set_score(id, profile.score)?;
        }
        Ok(renewed)
    }

    pub fn link(&self, from: &str, to: &str, weight: f64) -> Result<()> {
        self.graph.link(from, to, weight)?;
        Ok(())
    }

    pub fn propagate(&self) -> Result<f64> {
        Ok(self.graph.propagate()?)
    }

    /// Federate this kernel's authority with `peer` and persist the envelope.
    pub async fn federate(&self, peer: &AuthorityRoot) -> Result<FederationEnvelope> {
        let envelope = self.federation.federate(&self.authority, peer)?;
        self.repository.put_envelope(&envelope).await?;
        Ok(envelope)
    }

    pub async fn federate_all(
        &self,
        peers: &[AuthorityRoot],
        policy: &str,
    ) -> Result<FederationEnvelope> {
        let envelope = self.federation.federate_all(&self.authority, peers, policy)?;
        self.repository.put_envelope(&envelope).await?;
        Ok(envelope)
    }

    pub async fn activate(&self, key: &str, request: ActivationRequest) -> Result<ActivationRecord> {
        self.repository.activate(key, request).await
    }

    pub async fn verify_activation(&self, key: &str) -> Result<Option<ActivationRecord>> {
        self.repository.verify_activation(key).await
    }
}
