//! Persistence collaborator contract.
//!
//! The kernel treats storage as an opaque key/value store. `get` distinguishes
//! absence (`Ok(None)`) from transport failure (`Err`). Retrying is the
//! caller's business; nothing here retries.

use crate::error::{KernelError, Result, StoreError};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Opaque key/value storage backend.
#[async_trait]
pub trait TrustStore: Send + Sync {
    /// Fetch the bytes stored under `key`, or `None` when absent.
    async fn get(&self, key: &str) -> std::result::Result<Option<Vec<u8>>, StoreError>;

    /// Store `value` under `key`, replacing any previous value.
    async fn put(&self, key: &str, value: Vec<u8>) -> std::result::Result<(), StoreError>;
}

#[async_trait]
impl<S: TrustStore + ?Sized> TrustStore for Arc<S> {
    async fn get(&self, key: &str) -> std::result::Result<Option<Vec<u8>>, StoreError> {
        (**self).get(key).await
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> std::result::Result<(), StoreError> {
        (**self).put(key, value).await
    }
}

/// In-process store, mostly for tests and single-node deployments.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl TrustStore for MemoryStore {
    async fn get(&self, key: &str) -> std::result::Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> std::result::Result<(), StoreError> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }
}

/// Typed JSON layer over any [`TrustStore`].
///
/// Bytes that fail to parse surface as [`KernelError::CorruptState`], never as absence.
#[derive(Debug, Clone)]
pub struct JsonRepository<S> {
    store: S,
}

impl<S: TrustStore> JsonRepository<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn put_json<T: Serialize + Sync>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value).map_err(|e| KernelError::InputMalformed {
            field: key.to_string(),
            reason: format!("not serializable: {e}"),
        })?;
        self.store.put(key, bytes).await?;
        debug!(key = %key, "Record stored");
        Ok(())
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(bytes) = self.store.get(key).await? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes).map(Some).map_err(|e| {
            warn!(key = %key, error = %e, "Stored bytes failed to parse");
            KernelError::CorruptState {
                key: key.to_string(),
                reason: e.to_string(),
            }
        })
    }

    /// Like [`get_json`](Self::get_json) but absence is [`KernelError::NotFound`].
    pub async fn require_json<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        self.get_json(key).await?.ok_or_else(|| KernelError::NotFound {
            key: key.to_string(),
        })
    }
}
