//! Trust objects, authorities, sealing, verification and federation.
//!
//! This crate is the trust object model of the sovereign trust kernel and
//! everything that operates on a single object or authority.
//!
//! # Core Concepts
//!
//! - **Trust Object**: an identity bound to a policy and an authority lineage,
//!   sealed with the issuer's Ed25519 key (and optionally the PQ slot)
//! - **Authority**: an explicitly constructed key holder that issues, renews
//!   and federates; realms are derived from a parent authority
//! - **Attestation**: the structured outcome of verifying an object. Every
//!   failed sub-check is reported as data, never as an error
//! - **Federation**: a signed envelope bridging two or more authority roots,
//!   verifiable offline
//!
//! # Security Model
//!
//! - Seals are real signatures checked against the issuer's public key
//! - Missing policy evaluation is treated as "disabled", never as "all pass"
//! - Lineage is append-only; a root never appears in its own ancestry

pub mod attestation;
pub mod authority;
pub mod error;
pub mod federation;
pub mod model;
pub mod policy;
pub mod repository;
pub mod seal;
pub mod verify;

pub use attestation::{
    AttestationOracle, AttestationRegistry, AttestationRequest, AttestationResponse,
    RegisteredNode,
};
pub use authority::{Authority, AuthorityRoot, IssueRequest};
pub use error::LineageError;
pub use federation::{merge_lineage, verify_envelope, FederationEngine, FederationEnvelope};
pub use model::{
    EntityKind, Identity, Lineage, Metric, Policy, PolicyRule, RiskLevel, SealEnvelope, Severity,
    TrustObject, TrustVersion,
};
pub use policy::{evaluate_policy, PolicyEvaluator, PolicyOutcome, PolicyStatus, RuleTable};
pub use repository::{ActivationRecord, ActivationRequest, TrustRepository};
pub use seal::{check_seal, seal, seal_at, SealCheck, SealFailure};
pub use verify::{
    evaluate_metric, verify_lineage, Attestation, AttestationDetails, MetricSummary,
    ValidationFailure, Verifier,
};

// Re-export core types for convenience
pub use sovereign_core::{KernelError, Result};
