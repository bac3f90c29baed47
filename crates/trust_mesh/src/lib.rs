//! Trust Mesh
//!
//! This crate implements the evolving side of the sovereign trust kernel:
//! - The trust state machine (decay, reinforcement, anomaly response, override)
//! - The trust propagation graph and its serialized shared handle
//! - The [`TrustKernel`] facade tying issuance, verification, state, graph,
//!   federation and persistence together around one explicit authority

pub mod graph;
pub mod kernel;
pub mod shared;
pub mod state;

pub use graph::{GraphError, TrustEdge, TrustGraph, TrustNode};
pub use kernel::TrustKernel;
pub use shared::SharedTrustGraph;
pub use state::{StateError, StateTransition, TrustState, TrustStateMachine, TrustStateProfile};
