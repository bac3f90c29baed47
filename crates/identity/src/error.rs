//! Error types for identity and lineage operations.

use sovereign_core::KernelError;
use thiserror::Error;

/// Structural problems with an authority lineage.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LineageError {
    #[error("derived root is empty")]
    EmptyRoot,

    #[error("derived root {0} appears in its own parent roots")]
    SelfReference(String),

    #[error("root {0} is already part of this lineage")]
    RootAlreadyInAncestry(String),
}

impl From<LineageError> for KernelError {
    fn from(err: LineageError) -> Self {
        KernelError::LineageInvalid(err.to_string())
    }
}
