//! Trust state machine.
//!
//! A [`TrustStateProfile`] tracks one identity's categorical trust state and
//! score. Every mutation appends a transition (the log is never rewritten)
//! and recomputes the integrity hash over `{state, score, transitions}`.
//!
//! Score bands: `>=80 sovereign, >=60 trusted, >=40 caution, >=20 restricted,
//! otherwise compromised`. Decay alone never revokes: a score of 0 is only a
//! revocation *candidate*, and `revoked` is reachable solely through
//! [`TrustStateProfile::authority_override`].

use serde::{Deserialize, Serialize};
use sovereign_core::{current_timestamp_ms, KernelError, StateConfig, Timestamp};
use sovereign_crypto::hash::hex_digest;
use sovereign_crypto::{hash_parts, Digest};
use sovereign_identity::{RiskLevel, TrustObject};
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Categorical trust state. Declaration order gives the total order,
/// so `Sovereign` is the greatest and `Revoked` the least.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustState {
    Revoked,
    Compromised,
    Restricted,
    Caution,
    Trusted,
    Sovereign,
}

impl TrustState {
    /// The single score-to-state mapping. Never yields `Revoked`.
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            TrustState::Sovereign
        } else if score >= 60.0 {
            TrustState::Trusted
        } else if score >= 40.0 {
            TrustState::Caution
        } else if score >= 20.0 {
            TrustState::Restricted
        } else {
            TrustState::Compromised
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TrustState::Revoked => "revoked",
            TrustState::Compromised => "compromised",
            TrustState::Restricted => "restricted",
            TrustState::Caution => "caution",
            TrustState::Trusted => "trusted",
            TrustState::Sovereign => "sovereign",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TrustState::Revoked)
    }
}

impl fmt::Display for TrustState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("profile {subject} is revoked and cannot change")]
    Terminal { subject: String },

    #[error("invalid adjustment amount: {0}")]
    InvalidAmount(String),
}

impl From<StateError> for KernelError {
    fn from(err: StateError) -> Self {
        match err {
            StateError::Terminal { subject } => {
                KernelError::malformed("state", format!("profile {subject} is revoked"))
            }
            StateError::InvalidAmount(amount) => KernelError::malformed("amount", amount),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: TrustState,
    pub to: TrustState,
    pub reason: String,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustStateProfile {
    pub subject_id: String,
    pub state: TrustState,
    pub score: f64,
    pub transitions: Vec<StateTransition>,
    pub last_updated: Timestamp,
    #[serde(with = "hex_digest")]
    pub integrity_hash: Digest,
}

fn clamp_score(score: f64) -> f64 {
    score.clamp(0.0, 100.0)
}

fn check_amount(amount: f64) -> Result<f64, StateError> {
    if amount.is_finite() && amount >= 0.0 {
        Ok(amount)
    } else {
        Err(StateError::InvalidAmount(amount.to_string()))
    }
}

impl TrustStateProfile {
    /// New profile at `score`, with an initial "issued" transition.
    pub fn new(subject_id: impl Into<String>, score: f64) -> Self {
        let score = clamp_score(score);
        let state = TrustState::from_score(score);
        let now = current_timestamp_ms();
        let mut profile = Self {
            subject_id: subject_id.into(),
            state,
            score,
            transitions: vec![StateTransition {
                from: state,
                to: state,
                reason: "issued".to_string(),
                timestamp: now,
            }],
            last_updated: now,
            integrity_hash: [0u8; 32],
        };
        profile.integrity_hash = profile.compute_integrity_hash();
        profile
    }

    /// Hash over state, score and the full transition log.
    ///
    /// The score is rendered at fixed precision so the hash survives a JSON
    /// round trip.
    pub fn compute_integrity_hash(&self) -> Digest {
        let score = format!("{:.6}", self.score);
        let mut parts: Vec<String> = vec![self.state.as_str().to_string(), score];
        for t in &self.transitions {
            parts.push(format!("{}|{}|{}|{}", t.from, t.to, t.reason, t.timestamp));
        }
        hash_parts(&parts)
    }

    pub fn verify_integrity(&self) -> bool {
        self.integrity_hash == self.compute_integrity_hash()
    }

    /// Score has reached zero but nobody has revoked yet.
    pub fn is_revocation_candidate(&self) -> bool {
        self.score <= 0.0 && self.state != TrustState::Revoked
    }

    fn ensure_mutable(&self) -> Result<(), StateError> {
        if self.state.is_terminal() {
            warn!(subject = %self.subject_id, "Mutation attempted on revoked profile");
            return Err(StateError::Terminal {
                subject: self.subject_id.clone(),
            });
        }
        Ok(())
    }

    fn record(&mut self, to: TrustState, reason: String) {
        let now = current_timestamp_ms();
        let from = self.state;
        self.state = to;
        self.transitions.push(StateTransition {
            from,
            to,
            reason,
            timestamp: now,
        });
        self.last_updated = now;
        self.integrity_hash = self.compute_integrity_hash();
        debug!(
            subject = %self.subject_id,
            from = %from,
            to = %to,
            score = self.score,
            "Trust state transition"
        );
    }

    /// Shift the score by `delta` and re-derive the state from it.
    pub(crate) fn adjust(&mut self, delta: f64, reason: impl Into<String>) -> Result<(), StateError> {
        self.ensure_mutable()?;
        self.score = clamp_score(self.score + delta);
        self.record(TrustState::from_score(self.score), reason.into());
        Ok(())
    }

    pub fn apply_decay(&mut self, amount: f64) -> Result<(), StateError> {
        let amount = check_amount(amount)?;
        self.adjust(-amount, format!("decay -{amount}"))
    }

    pub fn reinforce(&mut self, amount: f64) -> Result<(), StateError> {
        let amount = check_amount(amount)?;
        self.adjust(amount, format!("reinforce +{amount}"))
    }

    /// Apply `penalty` and cap the state at `Restricted`.
    pub fn flag_anomaly(&mut self, reason: impl Into<String>, penalty: f64) -> Result<(), StateError> {
        let penalty = check_amount(penalty)?;
        self.ensure_mutable()?;
        let reason = reason.into();
        self.score = clamp_score(self.score - penalty);
        let to = TrustState::from_score(self.score).min(TrustState::Restricted);
        warn!(subject = %self.subject_id, reason = %reason, "Anomaly flagged");
        self.record(to, format!("anomaly: {reason}"));
        Ok(())
    }

    /// Force `new_state`. The only way to reach `Revoked`. The score is kept.
    pub fn authority_override(
        &mut self,
        new_state: TrustState,
        reason: impl Into<String>,
    ) -> Result<(), StateError> {
        self.ensure_mutable()?;
        let reason = reason.into();
        info!(
            subject = %self.subject_id,
            from = %self.state,
            to = %new_state,
            reason = %reason,
            "Authority override"
        );
        self.record(new_state, format!("override: {reason}"));
        Ok(())
    }
}

/// Applies configured amounts to profiles.
#[derive(Debug, Clone, Default)]
pub struct TrustStateMachine {
    config: StateConfig,
}

impl TrustStateMachine {
    pub fn new(config: StateConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StateConfig {
        &self.config
    }

    /// Initial profile for `trust`: its metric score, or the configured default.
    pub fn profile_for(&self, trust: &TrustObject) -> TrustStateProfile {
        let score = trust
            .metric
            .as_ref()
            .map_or(self.config.initial_score, |m| m.score);
        TrustStateProfile::new(trust.id(), score)
    }

    pub fn decay(&self, profile: &mut TrustStateProfile) -> Result<(), StateError> {
        profile.apply_decay(self.config.default_decay)
    }

    pub fn reinforce(&self, profile: &mut TrustStateProfile) -> Result<(), StateError> {
        profile.reinforce(self.config.default_reinforcement)
    }

    pub fn flag_anomaly(
        &self,
        profile: &mut TrustStateProfile,
        reason: impl Into<String>,
    ) -> Result<(), StateError> {
        profile.flag_anomaly(reason, self.config.anomaly_penalty)
    }

    /// Fold the object's metric and lineage history into `profile`.
    ///
    /// critical risk flags an anomaly, high risk decays by the high-risk
    /// penalty, low risk reinforces, medium leaves the score alone. A lineage
    /// with more parent roots than the continuity threshold reinforces again.
    pub fn evaluate(
        &self,
        trust: &TrustObject,
        profile: &mut TrustStateProfile,
    ) -> Result<(), StateError> {
        profile.ensure_mutable()?;

        if let Some(metric) = &trust.metric {
            match metric.risk_level {
                RiskLevel::Critical => {
                    profile.flag_anomaly(
                        format!("critical risk: {}", metric.reason),
                        self.config.anomaly_penalty,
                    )?;
                }
                RiskLevel::High => {
                    profile.adjust(-self.config.high_risk_penalty, "high risk metric")?;
                }
                RiskLevel::Low => {
                    profile.adjust(self.config.default_reinforcement, "low risk metric")?;
                }
                RiskLevel::Medium => {}
            }
        }

        if trust.lineage.depth() > self.config.lineage_continuity_threshold {
            profile.adjust(self.config.default_reinforcement, "lineage continuity")?;
        }
        Ok(())
    }
}
