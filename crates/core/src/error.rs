//! Error types for the sovereign trust kernel.
//!
//! The taxonomy separates *hard* caller-facing failures (`InputMalformed`,
//! `CorruptState`, `NotFound`, transport errors) from *trust-validation*
//! outcomes (`SealInvalid`, `PolicyDenied`, `LineageInvalid`,
//! `MetricGateFailed`). The latter are normally reported as data inside an
//! attestation and only become errors when a caller asks for it.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, KernelError>;

/// Failure of the persistence collaborator itself.
///
/// Absence of a key is not a store error; `get` returns `Ok(None)` for that.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store transport error: {0}")]
    Transport(String),

    #[error("Store backend unavailable: {0}")]
    Unavailable(String),

    #[cfg(feature = "sqlite")]
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

#[derive(Error, Debug)]
pub enum KernelError {
    #[error("Malformed input in '{field}': {reason}")]
    InputMalformed { field: String, reason: String },

    #[error("Seal invalid: {0}")]
    SealInvalid(String),

    #[error("Policy denied by rules: {}", rules.join(", "))]
    PolicyDenied { rules: Vec<String> },

    #[error("Lineage invalid: {0}")]
    LineageInvalid(String),

    #[error("Metric gate failed: score={score}, risk={risk}")]
    MetricGateFailed { score: f64, risk: String },

    #[error("Incompatible authorities: {0}")]
    IncompatibleAuthorities(String),

    #[error("Corrupt state at '{key}': {reason}")]
    CorruptState { key: String, reason: String },

    #[error("Not found: {key}")]
    NotFound { key: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl KernelError {
    /// Shorthand for an `InputMalformed` error.
    pub fn malformed(field: impl Into<String>, reason: impl Into<String>) -> Self {
        KernelError::InputMalformed {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error is a trust-validation outcome rather than a hard failure.
    pub fn is_validation_failure(&self) -> bool {
        matches!(
            self,
            KernelError::SealInvalid(_)
                | KernelError::PolicyDenied { .. }
                | KernelError::LineageInvalid(_)
                | KernelError::MetricGateFailed { .. }
        )
    }
}
