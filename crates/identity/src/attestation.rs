//! Attestation oracle boundary.
//!
//! A remote oracle answers `{node_id, timestamp, signature}` requests with
//! `{ok, verified, message, state}`. The only contract this kernel relies on
//! is that `verified` is an equality check against signature material
//! registered earlier for `node_id`. [`AttestationRegistry`] is the offline
//! implementation used when no oracle is reachable.

use crate::authority::AuthorityRoot;
use crate::federation::FederationEnvelope;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sovereign_core::{current_timestamp_ms, KernelError, Result, Timestamp};
use sovereign_crypto::hash::hex_bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationRequest {
    pub node_id: String,
    pub timestamp: Timestamp,
    #[serde(with = "hex_bytes")]
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationResponse {
    pub ok: bool,
    pub verified: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<RegisteredNode>,
}

/// Signature material registered for a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredNode {
    pub node_id: String,
    #[serde(with = "hex_bytes")]
    pub material: Vec<u8>,
    pub registered_at: Timestamp,
    /// Where the material came from, e.g. an envelope id
    pub source: String,
}

#[async_trait]
pub trait AttestationOracle: Send + Sync {
    async fn attest(&self, request: &AttestationRequest) -> Result<AttestationResponse>;
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// In-process oracle over registered signature material.
#[derive(Debug, Clone, Default)]
pub struct AttestationRegistry {
    nodes: Arc<RwLock<HashMap<String, RegisteredNode>>>,
}

impl AttestationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the material for `node_id`.
    pub async fn register(
        &self,
        node_id: impl Into<String>,
        material: Vec<u8>,
        source: impl Into<String>,
    ) -> Result<()> {
        let node_id = node_id.into();
        if node_id.is_empty() {
            return Err(KernelError::malformed("node_id", "must not be empty"));
        }
        if material.is_empty() {
            return Err(KernelError::malformed("material", "must not be empty"));
        }
        let node = RegisteredNode {
            node_id: node_id.clone(),
            material,
            registered_at: current_timestamp_ms(),
            source: source.into(),
        };
        self.nodes.write().await.insert(node_id.clone(), node);
        debug!(node = %node_id, "Attestation material registered");
        Ok(())
    }

    /// Register an authority under its id with its authority seal as material.
    pub async fn register_root(&self, root: &AuthorityRoot, source: &str) -> Result<()> {
        self.register(root.id.clone(), root.authority_seal.clone(), source)
            .await
    }

    /// Register every authority of a federation envelope.
    pub async fn register_envelope(&self, envelope: &FederationEnvelope) -> Result<usize> {
        for root in &envelope.authorities {
            self.register_root(root, &envelope.id).await?;
        }
        info!(
            envelope = %envelope.id,
            authorities = envelope.authorities.len(),
            "Federation envelope registered for attestation"
        );
        Ok(envelope.authorities.len())
    }

    pub async fn get(&self, node_id: &str) -> Option<RegisteredNode> {
        self.nodes.read().await.get(node_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.nodes.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.nodes.read().await.is_empty()
    }
}

#[async_trait]
impl AttestationOracle for AttestationRegistry {
    async fn attest(&self, request: &AttestationRequest) -> Result<AttestationResponse> {
        if request.node_id.is_empty() {
            return Err(KernelError::malformed("node_id", "must not be empty"));
        }

        let Some(node) = self.get(&request.node_id).await else {
            warn!(node = %request.node_id, "Attestation for unregistered node");
            return Ok(AttestationResponse {
                ok: true,
                verified: false,
                message: "node not registered".to_string(),
                state: None,
            });
        };

        let verified = constant_time_eq(&node.material, &request.signature);
        if !verified {
            warn!(node = %request.node_id, "Attestation signature mismatch");
        }
        Ok(AttestationResponse {
            ok: true,
            verified,
            message: if verified {
                "signature matches registered material".to_string()
            } else {
                "signature mismatch".to_string()
            },
            state: Some(node),
        })
    }
}
