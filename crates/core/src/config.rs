//! Configuration management for the trust kernel.
//!
//! Every section has a `Default` matching the reference thresholds, so an
//! empty TOML document is a valid configuration.

use crate::error::{KernelError, Result};
use serde::{Deserialize, Serialize};
#[cfg(feature = "toml")]
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    pub verification: VerificationConfig,
    pub state: StateConfig,
    pub federation: FederationConfig,
    pub graph: GraphConfig,
}

/// Thresholds applied by the verification engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    /// Minimum metric score for the metric gate to pass
    pub metric_min_score: f64,
    /// Whether a `critical` risk level fails the gate regardless of score
    pub reject_critical_risk: bool,
    /// Whether a seal past its `expires_at` invalidates the object
    pub enforce_expiry: bool,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            metric_min_score: 40.0,
            reject_critical_risk: true,
            enforce_expiry: true,
        }
    }
}

/// Trust state machine tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    pub initial_score: f64,
    pub default_decay: f64,
    pub default_reinforcement: f64,
    pub anomaly_penalty: f64,
    pub high_risk_penalty: f64,
    /// Parent roots required before lineage continuity reinforces trust
    pub lineage_continuity_threshold: usize,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            initial_score: 50.0,
            default_decay: 2.0,
            default_reinforcement: 3.0,
            anomaly_penalty: 15.0,
            high_risk_penalty: 10.0,
            lineage_continuity_threshold: 3,
        }
    }
}

/// Federation weight model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FederationConfig {
    pub base_weight: f64,
    pub depth_bonus: f64,
    pub pq_bonus: f64,
    /// Lineage depth that must be exceeded by both sides for the depth bonus
    pub depth_threshold: usize,
    pub default_policy: String,
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            base_weight: 0.7,
            depth_bonus: 0.1,
            pq_bonus: 0.1,
            depth_threshold: 2,
            default_policy: "sovereign-federation-v1".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Score given to nodes whose trust object carries no metric
    pub default_score: f64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            default_score: 50.0,
        }
    }
}

impl KernelConfig {
    #[cfg(feature = "toml")]
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        Ok(config)
    }

    #[cfg(feature = "toml")]
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| KernelError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values outside the ranges the kernel relies on.
    pub fn validate(&self) -> Result<()> {
        check_score("verification.metric_min_score", self.verification.metric_min_score)?;
        check_score("state.initial_score", self.state.initial_score)?;
        check_score("graph.default_score", self.graph.default_score)?;
        for (name, value) in [
            ("state.default_decay", self.state.default_decay),
            ("state.default_reinforcement", self.state.default_reinforcement),
            ("state.anomaly_penalty", self.state.anomaly_penalty),
            ("state.high_risk_penalty", self.state.high_risk_penalty),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(KernelError::Config(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }
        for (name, value) in [
            ("federation.base_weight", self.federation.base_weight),
            ("federation.depth_bonus", self.federation.depth_bonus),
            ("federation.pq_bonus", self.federation.pq_bonus),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(KernelError::Config(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if self.federation.default_policy.is_empty() {
            return Err(KernelError::Config(
                "federation.default_policy must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn check_score(name: &str, value: f64) -> Result<()> {
    if !(0.0..=100.0).contains(&value) {
        return Err(KernelError::Config(format!(
            "{name} must be within [0, 100], got {value}"
        )));
    }
    Ok(())
}
