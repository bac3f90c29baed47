//! Trust propagation graph.
//!
//! A directed weighted graph over entity ids. Nodes carry a trust score and
//! the trust object that backs them. Edges carry a weight in `[0, 1]`.
//!
//! [`TrustGraph::propagate`] is one synchronous pass: every node with incoming
//! edges takes `sum(source_score * weight) / incoming_edge_count`, reading
//! source scores from a snapshot taken before the pass. Callers that want
//! stable scores repeat it, see [`TrustGraph::propagate_until_stable`].
//!
//! The graph hash covers sorted node and edge summaries, so it depends only on
//! content and never on insertion order.

use sovereign_core::{current_timestamp_ms, KernelError, Timestamp};
use sovereign_crypto::{hash_parts, merkle_root, Digest};
use sovereign_identity::{RiskLevel, TrustObject};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    #[error("unknown node: {0}")]
    UnknownNode(String),

    #[error("self-loop on {0} is not allowed")]
    SelfLoop(String),

    #[error("edge weight {0} is outside [0, 1]")]
    InvalidWeight(f64),

    #[error("score {0} is outside [0, 100]")]
    InvalidScore(f64),

    #[error("graph lock poisoned")]
    LockPoisoned,
}

impl From<GraphError> for KernelError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::UnknownNode(id) => KernelError::NotFound {
                key: format!("node:{id}"),
            },
            GraphError::LockPoisoned => KernelError::CorruptState {
                key: "trust-graph".to_string(),
                reason: err.to_string(),
            },
            other => KernelError::malformed("graph", other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrustNode {
    pub id: String,
    pub trust_score: f64,
    pub risk_level: RiskLevel,
    pub last_updated: Timestamp,
    pub object: TrustObject,
}

impl TrustNode {
    fn summary(&self) -> String {
        format!("node:{}|{:.6}|{}", self.id, self.trust_score, self.risk_level)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrustEdge {
    pub from: String,
    pub to: String,
    pub weight: f64,
    pub last_updated: Timestamp,
}

impl TrustEdge {
    fn summary(&self) -> String {
        format!("edge:{}->{}|{:.6}", self.from, self.to, self.weight)
    }
}

#[derive(Debug, Clone)]
pub struct TrustGraph {
    nodes: BTreeMap<String, TrustNode>,
    edges: BTreeMap<(String, String), TrustEdge>,
    graph_hash: Digest,
    default_score: f64,
}

impl Default for TrustGraph {
    fn default() -> Self {
        Self::new(50.0)
    }
}

impl TrustGraph {
    /// Empty graph; nodes without a metric start at `default_score`.
    pub fn new(default_score: f64) -> Self {
        let mut graph = Self {
            nodes: BTreeMap::new(),
            edges: BTreeMap::new(),
            graph_hash: [0u8; 32],
            default_score,
        };
        graph.rehash();
        graph
    }

    pub fn graph_hash(&self) -> Digest {
        self.graph_hash
    }

    pub fn node(&self, id: &str) -> Option<&TrustNode> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &TrustNode> {
        self.nodes.values()
    }

    pub fn edges(&self) -> impl Iterator<Item = &TrustEdge> {
        self.edges.values()
    }

    pub fn edge(&self, from: &str, to: &str) -> Option<&TrustEdge> {
        self.edges.get(&(from.to_string(), to.to_string()))
    }

    pub fn edges_into<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a TrustEdge> + 'a {
        self.edges.values().filter(move |e| e.to == id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Insert or replace the node for `trust`.
    pub fn add_node(&mut self, trust: TrustObject) {
        let (trust_score, risk_level) = match &trust.metric {
            Some(metric) => (metric.score, metric.risk_level),
            None => (self.default_score, RiskLevel::from_score(self.default_score)),
        };
        let id = trust.id().to_string();
        debug!(node = %id, score = trust_score, "Graph node added");
        self.nodes.insert(
            id.clone(),
            TrustNode {
                id,
                trust_score,
                risk_level,
                last_updated: current_timestamp_ms(),
                object: trust,
            },
        );
        self.rehash();
    }

    /// Swap the object backing an existing node, keeping its score and risk
    /// level. Returns `false` when there is no such node.
    pub fn replace_object(&mut self, trust: TrustObject) -> bool {
        let Some(node) = self.nodes.get_mut(trust.id()) else {
            return false;
        };
        node.object = trust;
        node.last_updated = current_timestamp_ms();
        true
    }

    /// Set a node's score directly and re-derive its risk level.
    pub fn set_score(&mut self, id: &str, score: f64) -> Result<(), GraphError> {
        if !(0.0..=100.0).contains(&score) {
            return Err(GraphError::InvalidScore(score));
        }
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| GraphError::UnknownNode(id.to_string()))?;
        node.trust_score = score;
        node.risk_level = RiskLevel::from_score(score);
        node.last_updated = current_timestamp_ms();
        self.rehash();
        Ok(())
    }

    /// Create the edge `from -> to`, or replace its weight if it exists.
    pub fn link(&mut self, from: &str, to: &str, weight: f64) -> Result<(), GraphError> {
        if from == to {
            return Err(GraphError::SelfLoop(from.to_string()));
        }
        if !(0.0..=1.0).contains(&weight) {
            return Err(GraphError::InvalidWeight(weight));
        }
        for id in [from, to] {
            if !self.nodes.contains_key(id) {
                return Err(GraphError::UnknownNode(id.to_string()));
            }
        }

        self.edges.insert(
            (from.to_string(), to.to_string()),
            TrustEdge {
                from: from.to_string(),
                to: to.to_string(),
                weight,
                last_updated: current_timestamp_ms(),
            },
        );
        debug!(from = %from, to = %to, weight, "Graph edge linked");
        self.rehash();
        Ok(())
    }

    pub fn remove_edge(&mut self, from: &str, to: &str) -> bool {
        let removed = self
            .edges
            .remove(&(from.to_string(), to.to_string()))
            .is_some();
        if removed {
            self.rehash();
        }
        removed
    }

    /// One synchronous propagation pass. Returns the largest score change.
    pub fn propagate(&mut self) -> f64 {
        let snapshot: HashMap<&str, f64> = self
            .nodes
            .iter()
            .map(|(id, node)| (id.as_str(), node.trust_score))
            .collect();

        let mut incoming: HashMap<&str, (f64, usize)> = HashMap::new();
        for edge in self.edges.values() {
            let Some(source_score) = snapshot.get(edge.from.as_str()) else {
                continue;
            };
            let entry = incoming.entry(edge.to.as_str()).or_insert((0.0, 0));
            entry.0 += source_score * edge.weight;
            entry.1 += 1;
        }

        let updates: Vec<(String, f64)> = incoming
            .into_iter()
            .map(|(id, (sum, count))| (id.to_string(), (sum / count as f64).clamp(0.0, 100.0)))
            .collect();

        let now = current_timestamp_ms();
        let mut max_delta: f64 = 0.0;
        for (id, score) in updates {
            if let Some(node) = self.nodes.get_mut(&id) {
                max_delta = max_delta.max((node.trust_score - score).abs());
                node.trust_score = score;
                node.risk_level = RiskLevel::from_score(score);
                node.last_updated = now;
            }
        }

        self.rehash();
        debug!(max_delta, "Trust propagated");
        max_delta
    }

    /// Repeat [`propagate`](Self::propagate) until the largest change is
    /// below `epsilon` or `max_rounds` passes have run. Returns the passes run.
    pub fn propagate_until_stable(&mut self, epsilon: f64, max_rounds: usize) -> usize {
        for round in 1..=max_rounds {
            if self.propagate() < epsilon {
                return round;
            }
        }
        max_rounds
    }

    /// Ids of every node currently at high or critical risk.
    pub fn detect_anomaly_clusters(&self) -> BTreeSet<String> {
        self.nodes
            .values()
            .filter(|n| n.risk_level.is_elevated())
            .map(|n| n.id.clone())
            .collect()
    }

    fn rehash(&mut self) {
        let mut node_summaries: Vec<String> = self.nodes.values().map(TrustNode::summary).collect();
        let mut edge_summaries: Vec<String> = self.edges.values().map(TrustEdge::summary).collect();
        node_summaries.sort();
        edge_summaries.sort();

        self.graph_hash = if node_summaries.is_empty() && edge_summaries.is_empty() {
            merkle_root(&[])
        } else {
            hash_parts(node_summaries.iter().chain(edge_summaries.iter()))
        };
    }
}
