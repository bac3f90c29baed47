//! End-to-end verification of sealed trust objects.
//!
//! Verification never fails on an untrustworthy object: every mismatch is
//! reported inside the returned [`Attestation`]. Only malformed input (missing
//! required fields, an unsealed object) produces an `Err`.

use crate::model::{RiskLevel, TrustObject};
use crate::policy::{evaluate_policy, PolicyEvaluator, PolicyOutcome, PolicyStatus};
use crate::seal::{check_seal, SealCheck, SealFailure};
use serde::{Deserialize, Serialize};
use sovereign_core::{current_timestamp_ms, KernelError, Result, Timestamp, VerificationConfig};
use sovereign_crypto::{PqScheme, SecondaryEd25519};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub score: f64,
    pub level: RiskLevel,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationDetails {
    pub object_id: String,
    pub authority_root: String,
    pub issued_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<Timestamp>,
    pub checked_at: Timestamp,
}

/// Result of verifying one trust object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attestation {
    pub valid: bool,
    pub seal: SealCheck,
    pub policy: PolicyOutcome,
    pub lineage_valid: bool,
    pub metric: Option<MetricSummary>,
    pub metric_gate_passed: bool,
    pub expired: bool,
    pub details: AttestationDetails,
}

/// One reason an attestation is not valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ValidationFailure {
    Seal { failure: SealFailure },
    PolicyDenied { rules: Vec<String> },
    PolicyUnevaluated { rules: Vec<String> },
    LineageInvalid,
    MetricGateFailed { score: f64, level: RiskLevel },
    Expired { expires_at: Timestamp },
}

impl From<ValidationFailure> for KernelError {
    fn from(failure: ValidationFailure) -> Self {
        match failure {
            ValidationFailure::Seal { failure } => KernelError::SealInvalid(failure.to_string()),
            ValidationFailure::PolicyDenied { rules }
            | ValidationFailure::PolicyUnevaluated { rules } => KernelError::PolicyDenied { rules },
            ValidationFailure::LineageInvalid => {
                KernelError::LineageInvalid("lineage is not well formed".to_string())
            }
            ValidationFailure::MetricGateFailed { score, level } => KernelError::MetricGateFailed {
                score,
                risk: level.to_string(),
            },
            ValidationFailure::Expired { expires_at } => {
                KernelError::SealInvalid(format!("seal expired at {expires_at}"))
            }
        }
    }
}

impl Attestation {
    /// Every failed sub-check, seal failures first.
    pub fn failures(&self) -> Vec<ValidationFailure> {
        let mut failures: Vec<ValidationFailure> = self
            .seal
            .failures
            .iter()
            .cloned()
            .map(|failure| ValidationFailure::Seal { failure })
            .collect();

        if let (true, Some(expires_at)) = (self.expired, self.details.expires_at) {
            failures.push(ValidationFailure::Expired { expires_at });
        }
        if !self.policy.passed {
            failures.push(match self.policy.status {
                PolicyStatus::Evaluated => ValidationFailure::PolicyDenied {
                    rules: self.policy.failed_rules.clone(),
                },
                PolicyStatus::Disabled => ValidationFailure::PolicyUnevaluated {
                    rules: self.policy.unevaluated_rules.clone(),
                },
            });
        }
        if !self.lineage_valid {
            failures.push(ValidationFailure::LineageInvalid);
        }
        if !self.metric_gate_passed {
            if let Some(metric) = &self.metric {
                failures.push(ValidationFailure::MetricGateFailed {
                    score: metric.score,
                    level: metric.level,
                });
            }
        }
        failures
    }

    /// Turn an invalid attestation into the error for its first failure.
    pub fn into_result(self) -> Result<Self> {
        if self.valid {
            return Ok(self);
        }
        match self.failures().into_iter().next() {
            Some(failure) => Err(failure.into()),
            None => Err(KernelError::SealInvalid("attestation is not valid".to_string())),
        }
    }
}

/// Lineage well-formedness: non-empty root, no self-reference.
pub fn verify_lineage(trust: &TrustObject) -> bool {
    match trust.lineage.check() {
        Ok(()) => true,
        Err(e) => {
            warn!(identity = %trust.identity.id, reason = %e, "Lineage check failed");
            false
        }
    }
}

/// Apply the metric gate. Objects without a metric pass.
pub fn evaluate_metric(
    trust: &TrustObject,
    config: &VerificationConfig,
) -> (bool, Option<MetricSummary>) {
    let Some(metric) = &trust.metric else {
        return (true, None);
    };

    let critical = config.reject_critical_risk && metric.risk_level == RiskLevel::Critical;
    let passed = metric.score >= config.metric_min_score && !critical;
    if !passed {
        warn!(
            identity = %trust.identity.id,
            score = metric.score,
            risk = %metric.risk_level,
            "Metric gate failed"
        );
    }

    (
        passed,
        Some(MetricSummary {
            score: metric.score,
            level: metric.risk_level,
            reason: metric.reason.clone(),
        }),
    )
}

/// Verification engine.
#[derive(Clone)]
pub struct Verifier {
    config: VerificationConfig,
    evaluator: Option<Arc<dyn PolicyEvaluator>>,
    pq_schemes: Vec<Arc<dyn PqScheme>>,
}

impl Verifier {
    /// A verifier with the built-in PQ scheme and policy evaluation disabled.
    pub fn new(config: VerificationConfig) -> Self {
        Self {
            config,
            evaluator: None,
            pq_schemes: vec![Arc::new(SecondaryEd25519)],
        }
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn PolicyEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    pub fn with_pq_scheme(mut self, scheme: Arc<dyn PqScheme>) -> Self {
        self.pq_schemes.push(scheme);
        self
    }

    pub fn config(&self) -> &VerificationConfig {
        &self.config
    }

    pub fn verify(&self, trust: &TrustObject) -> Result<Attestation> {
        self.verify_at(trust, current_timestamp_ms())
    }

    /// Verify as of `now`.
    pub fn verify_at(&self, trust: &TrustObject, now: Timestamp) -> Result<Attestation> {
        trust.validate()?;
        if !trust.seal.is_sealed() {
            return Err(KernelError::malformed("seal", "object has not been sealed"));
        }

        let seal = check_seal(trust, &self.pq_schemes)?;
        let policy = evaluate_policy(trust, self.evaluator.as_deref());
        let lineage_valid = verify_lineage(trust);
        let (metric_gate_passed, metric) = evaluate_metric(trust, &self.config);
        let expired = self.config.enforce_expiry
            && trust.seal.expires_at.is_some_and(|expires_at| expires_at < now);
        if expired {
            warn!(identity = %trust.identity.id, "Seal has expired");
        }

        let valid = seal.valid && policy.passed && lineage_valid && metric_gate_passed && !expired;
        info!(
            identity = %trust.identity.id,
            authority = %trust.identity.authority_root,
            valid,
            "Trust object verified"
        );

        Ok(Attestation {
            valid,
            seal,
            policy,
            lineage_valid,
            metric,
            metric_gate_passed,
            expired,
            details: AttestationDetails {
                object_id: trust.identity.id.clone(),
                authority_root: trust.identity.authority_root.clone(),
                issued_at: trust.seal.issued_at,
                expires_at: trust.seal.expires_at,
                checked_at: now,
            },
        })
    }
}

impl Default for Verifier {
    fn default() -> Self {
        Self::new(VerificationConfig::default())
    }
}

impl fmt::Debug for Verifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Verifier")
            .field("config", &self.config)
            .field("policy_evaluation", &self.evaluator.is_some())
            .field("pq_schemes", &self.pq_schemes)
            .finish()
    }
}
