//! Thread-safe handle to a trust graph.
//!
//! Mutation and propagation take the write lock for their whole duration, so
//! readers never see a graph mid-propagation. Readers get cloned snapshots.

use crate::graph::{GraphError, TrustGraph, TrustNode};
use sovereign_crypto::Digest;
use sovereign_identity::TrustObject;
use std::collections::BTreeSet;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Clone, Default)]
pub struct SharedTrustGraph {
    inner: Arc<RwLock<TrustGraph>>,
}

impl SharedTrustGraph {
    pub fn new(graph: TrustGraph) -> Self {
        Self {
            inner: Arc::new(RwLock::new(graph)),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, TrustGraph>, GraphError> {
        self.inner.read().map_err(|_| GraphError::LockPoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, TrustGraph>, GraphError> {
        self.inner.write().map_err(|_| GraphError::LockPoisoned)
    }

    pub fn add_node(&self, trust: TrustObject) -> Result<(), GraphError> {
        self.write()?.add_node(trust);
        Ok(())
    }

    pub fn replace_object(&self, trust: TrustObject) -> Result<bool, GraphError> {
        Ok(self.write()?.replace_object(trust))
    }

    pub fn set_score(&self, id: &str, score: f64) -> Result<(), GraphError> {
        self.write()?.set_score(id, score)
    }

    pub fn link(&self, from: &str, to: &str, weight: f64) -> Result<(), GraphError> {
        self.write()?.link(from, to, weight)
    }

    pub fn remove_edge(&self, from: &str, to: &str) -> Result<bool, GraphError> {
        Ok(self.write()?.remove_edge(from, to))
    }

    pub fn propagate(&self) -> Result<f64, GraphError> {
        Ok(self.write()?.propagate())
    }

    /// Runs every pass under a single write lock.
    pub fn propagate_until_stable(&self, epsilon: f64, max_rounds: usize) -> Result<usize, GraphError> {
        Ok(self.write()?.propagate_until_stable(epsilon, max_rounds))
    }

    pub fn node(&self, id: &str) -> Result<Option<TrustNode>, GraphError> {
        Ok(self.read()?.node(id).cloned())
    }

    pub fn graph_hash(&self) -> Result<Digest, GraphError> {
        Ok(self.read()?.graph_hash())
    }

    pub fn detect_anomaly_clusters(&self) -> Result<BTreeSet<String>, GraphError> {
        Ok(self.read()?.detect_anomaly_clusters())
    }

    /// A consistent copy of the whole graph.
    pub fn snapshot(&self) -> Result<TrustGraph, GraphError> {
        Ok(self.read()?.clone())
    }
}
