//! Typed persistence for trust records.
//!
//! Keys are namespaced by record type:
//!
//! | prefix | record |
//! |---|---|
//! | `trust:<id>` | [`TrustObject`] |
//! | `state:<id>` | trust state profile |
//! | `federation:<id>` | [`FederationEnvelope`] |
//! | `activation:<key>` | [`ActivationRecord`] |

use crate::federation::FederationEnvelope;
use crate::model::TrustObject;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sovereign_core::{current_timestamp_ms, JsonRepository, KernelError, Result, Timestamp, TrustStore};
use std::collections::BTreeMap;
use tracing::info;

pub fn trust_key(id: &str) -> String {
    format!("trust:{id}")
}

pub fn state_key(id: &str) -> String {
    format!("state:{id}")
}

pub fn federation_key(id: &str) -> String {
    format!("federation:{id}")
}

pub fn activation_key(key: &str) -> String {
    format!("activation:{key}")
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationRequest {
    pub device: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Stored proof that a licence key was activated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationRecord {
    pub activated: bool,
    pub device: String,
    pub metadata: BTreeMap<String, String>,
    pub timestamp: Timestamp,
}

/// Repository over any [`TrustStore`].
#[derive(Debug, Clone)]
pub struct TrustRepository<S> {
    inner: JsonRepository<S>,
}

impl<S: TrustStore> TrustRepository<S> {
    pub fn new(store: S) -> Self {
        Self {
            inner: JsonRepository::new(store),
        }
    }

    pub fn store(&self) -> &S {
        self.inner.store()
    }

    pub async fn put_trust(&self, trust: &TrustObject) -> Result<()> {
        trust.validate()?;
        self.inner.put_json(&trust_key(trust.id()), trust).await
    }

    /// Load a trust object. Stored bytes that parse but fail validation, or
    /// that belong to another identity, are reported as corrupt.
    pub async fn get_trust(&self, id: &str) -> Result<Option<TrustObject>> {
        let key = trust_key(id);
        let Some(trust) = self.inner.get_json::<TrustObject>(&key).await? else {
            return Ok(None);
        };
        trust.validate().map_err(|e| KernelError::CorruptState {
            key: key.clone(),
            reason: e.to_string(),
        })?;
        if trust.id() != id {
            return Err(KernelError::CorruptState {
                key,
                reason: format!("record belongs to {}", trust.id()),
            });
        }
        Ok(Some(trust))
    }

    pub async fn require_trust(&self, id: &str) -> Result<TrustObject> {
        self.get_trust(id).await?.ok_or_else(|| KernelError::NotFound { key: trust_key(id) })
    }

    pub async fn put_state<P: Serialize + Sync>(&self, id: &str, profile: &P) -> Result<()> {
        self.inner.put_json(&state_key(id), profile).await
    }

    pub async fn get_state<P: DeserializeOwned>(&self, id: &str) -> Result<Option<P>> {
        self.inner.get_json(&state_key(id)).await
    }

    pub async fn put_envelope(&self, envelope: &FederationEnvelope) -> Result<()> {
        self.inner.put_json(&federation_key(&envelope.id), envelope).await
    }

    pub async fn get_envelope(&self, id: &str) -> Result<Option<FederationEnvelope>> {
        self.inner.get_json(&federation_key(id)).await
    }

    /// Record an activation for `key`, replacing any previous record.
    pub async fn activate(&self, key: &str, request: ActivationRequest) -> Result<ActivationRecord> {
        if key.is_empty() {
            return Err(KernelError::malformed("key", "must not be empty"));
        }
        let record = ActivationRecord {
            activated: true,
            device: request.device.unwrap_or_else(|| "unknown".to_string()),
            metadata: request.metadata,
            timestamp: current_timestamp_ms(),
        };
        self.inner.put_json(&activation_key(key), &record).await?;
        info!(key = %key, device = %record.device, "Licence activated");
        Ok(record)
    }

    /// The activation record for `key`, or `None` if it was never activated.
    pub async fn verify_activation(&self, key: &str) -> Result<Option<ActivationRecord>> {
        self.inner.get_json(&activation_key(key)).await
    }
}
