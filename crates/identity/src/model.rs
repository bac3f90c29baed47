//! The trust object model.
//!
//! A [`TrustObject`] binds an [`Identity`] to a [`Policy`], an authority
//! [`Lineage`] and a [`SealEnvelope`]. Everything here is plain data; sealing
//! and verification live in [`crate::seal`] and [`crate::verify`].

use crate::error::LineageError;
use serde::{Deserialize, Serialize};
use sovereign_core::{KernelError, Result, Timestamp};
use sovereign_crypto::hash::{hex_bytes, hex_bytes_opt};
use sovereign_crypto::PqPublicKey;
use std::fmt;

/// Schema generation of a trust object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrustVersion {
    #[serde(rename = "1.0")]
    V1_0,
    #[serde(rename = "1.1")]
    V1_1,
    #[serde(rename = "2.0-sovereign")]
    Sovereign,
    #[serde(rename = "3.0-pq")]
    PostQuantum,
}

impl TrustVersion {
    pub fn for_pq(pq_enabled: bool) -> Self {
        if pq_enabled {
            TrustVersion::PostQuantum
        } else {
            TrustVersion::Sovereign
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityKind {
    Human,
    Organization,
    Device,
    Service,
    AutonomousAgent,
}

/// Immutable identity bound into a trust object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub kind: EntityKind,
    /// Id of the issuing authority
    pub authority_root: String,
    pub created_at: Timestamp,
    /// Ed25519 verification key of the issuing authority
    #[serde(with = "hex_bytes")]
    pub public_key: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pq_public_key: Option<PqPublicKey>,
}

/// Authority ancestry of a trust object or authority.
///
/// Append-only: every rotation pushes the previous `derived_root` onto
/// `parent_roots` before replacing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lineage {
    pub parent_roots: Vec<String>,
    pub derived_root: String,
    pub rotation_reason: String,
    pub timestamp: Timestamp,
}

impl Lineage {
    pub fn genesis(root: impl Into<String>, reason: impl Into<String>, timestamp: Timestamp) -> Self {
        Self {
            parent_roots: Vec::new(),
            derived_root: root.into(),
            rotation_reason: reason.into(),
            timestamp,
        }
    }

    /// Move to `new_root`, recording the current root as an ancestor.
    pub fn rotate(
        &mut self,
        new_root: impl Into<String>,
        reason: impl Into<String>,
        timestamp: Timestamp,
    ) -> std::result::Result<(), LineageError> {
        let new_root = new_root.into();
        if new_root.is_empty() {
            return Err(LineageError::EmptyRoot);
        }
        if new_root == self.derived_root || self.parent_roots.contains(&new_root) {
            return Err(LineageError::RootAlreadyInAncestry(new_root));
        }

        let previous = std::mem::replace(&mut self.derived_root, new_root);
        self.parent_roots.push(previous);
        self.rotation_reason = reason.into();
        self.timestamp = timestamp;
        Ok(())
    }

    /// Number of historical roots.
    pub fn depth(&self) -> usize {
        self.parent_roots.len()
    }

    pub fn check(&self) -> std::result::Result<(), LineageError> {
        if self.derived_root.is_empty() {
            return Err(LineageError::EmptyRoot);
        }
        if self.parent_roots.contains(&self.derived_root) {
            return Err(LineageError::SelfReference(self.derived_root.clone()));
        }
        Ok(())
    }

    pub fn is_well_formed(&self) -> bool {
        self.check().is_ok()
    }
}

/// Cryptographic integrity envelope of a trust object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealEnvelope {
    #[serde(with = "hex_bytes")]
    pub classical_signature: Vec<u8>,
    #[serde(default, with = "hex_bytes_opt", skip_serializing_if = "Option::is_none")]
    pub pq_signature: Option<Vec<u8>>,
    #[serde(with = "hex_bytes")]
    pub merkle_anchor: Vec<u8>,
    pub issued_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<Timestamp>,
}

impl SealEnvelope {
    /// An envelope that only carries an expiry, ready to be sealed.
    pub fn unsealed(expires_at: Option<Timestamp>) -> Self {
        Self {
            expires_at,
            ..Self::default()
        }
    }

    pub fn is_sealed(&self) -> bool {
        !self.classical_signature.is_empty() && !self.merkle_anchor.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warn,
    Deny,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    pub id: String,
    pub description: String,
    /// Opaque reference resolved by a policy evaluator
    pub condition: String,
    pub severity: Severity,
}

impl PolicyRule {
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        condition: impl Into<String>,
        severity: Severity,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            condition: condition.into(),
            severity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub version: String,
    pub rules: Vec<PolicyRule>,
}

impl Policy {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            rules: Vec::new(),
        }
    }

    pub fn with_rule(mut self, rule: PolicyRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn deny_rules(&self) -> impl Iterator<Item = &PolicyRule> {
        self.rules.iter().filter(|r| r.severity == Severity::Deny)
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self::new("1.0")
    }
}

/// Risk band. Ordered from least to most risky.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Band a 0-100 score: >=60 low, >=40 medium, >=20 high, else critical.
    pub fn from_score(score: f64) -> Self {
        if score >= 60.0 {
            RiskLevel::Low
        } else if score >= 40.0 {
            RiskLevel::Medium
        } else if score >= 20.0 {
            RiskLevel::High
        } else {
            RiskLevel::Critical
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }

    pub fn is_elevated(&self) -> bool {
        matches!(self, RiskLevel::High | RiskLevel::Critical)
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Externally produced risk score. Consumed, never computed, here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub score: f64,
    pub risk_level: RiskLevel,
    pub reason: String,
    pub updated_at: Timestamp,
}

impl Metric {
    pub fn new(score: f64, risk_level: RiskLevel, reason: impl Into<String>, updated_at: Timestamp) -> Self {
        Self {
            score,
            risk_level,
            reason: reason.into(),
            updated_at,
        }
    }
}

/// The sealed, versioned trust record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustObject {
    pub version: TrustVersion,
    pub identity: Identity,
    pub policy: Policy,
    pub lineage: Lineage,
    pub seal: SealEnvelope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<Metric>,
}

impl TrustObject {
    pub fn id(&self) -> &str {
        &self.identity.id
    }

    /// Parse a trust object, rejecting structurally invalid input.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let object: Self = serde_json::from_slice(bytes)
            .map_err(|e| KernelError::malformed("trust_object", e.to_string()))?;
        object.validate()?;
        Ok(object)
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| KernelError::malformed("trust_object", e.to_string()))
    }

    /// Check required fields. Trust-level problems (bad lineage, bad
    /// signatures) are not input errors and are left to verification.
    pub fn validate(&self) -> Result<()> {
        if self.identity.id.is_empty() {
            return Err(KernelError::malformed("identity.id", "must not be empty"));
        }
        if self.identity.authority_root.is_empty() {
            return Err(KernelError::malformed(
                "identity.authority_root",
                "must not be empty",
            ));
        }
        if self.identity.public_key.is_empty() {
            return Err(KernelError::malformed("identity.public_key", "must not be empty"));
        }
        if let Some(metric) = &self.metric {
            if !(0.0..=100.0).contains(&metric.score) {
                return Err(KernelError::malformed(
                    "metric.score",
                    format!("{} is outside [0, 100]", metric.score),
                ));
            }
        }
        Ok(())
    }
}
