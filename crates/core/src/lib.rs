//! Core functionality for the sovereign trust kernel.
//!
//! This crate provides the fundamental types, error taxonomy, configuration,
//! logging and persistence contracts shared by every other kernel crate.
//!
//! # Persistence
//!
//! The kernel never owns a storage backend. It talks to an opaque key/value
//! collaborator through [`TrustStore`] and serializes every record to JSON
//! before calling `put`. [`MemoryStore`] and (with the `sqlite` feature)
//! [`SqliteStore`] are the two adapters shipped here.

pub mod config;
pub mod error;
pub mod logging;
pub mod store;
pub mod types;

#[cfg(feature = "sqlite")]
pub mod sqlite_store;

pub use config::{FederationConfig, GraphConfig, KernelConfig, StateConfig, VerificationConfig};
pub use error::{KernelError, Result, StoreError};
pub use store::{JsonRepository, MemoryStore, TrustStore};
pub use types::{current_timestamp_ms, Timestamp};

#[cfg(feature = "sqlite")]
pub use sqlite_store::SqliteStore;
