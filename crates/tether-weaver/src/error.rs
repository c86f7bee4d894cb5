//! Fatal weaver errors
//!
//! These indicate an engine defect or an environment problem, never bad
//! author input. Author mistakes are reported as [`crate::Diagnostic`]s.

use std::path::PathBuf;
use tether_bytecode::{BuildError, DecodeError, ModuleError, VerifyError};
use thiserror::Error;

/// Errors that abort processing of a module
#[derive(Debug, Error)]
pub enum WeaveError {
    /// A type reached the processing stage twice
    #[error("Type '{0}' was processed twice")]
    DuplicateProcessing(String),

    /// Struct embedding or class inheritance forms a cycle
    #[error("Dependency cycle detected: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),

    /// A derived type was hashed before the type it depends on
    #[error("Hash for '{dependency}' is not available while hashing '{dependent}'")]
    MissingDependencyHash { dependent: String, dependency: String },

    /// A runtime type the generated code relies on cannot be found
    #[error("Required runtime type '{0}' was not found in the module or its search paths")]
    MissingCollaborator(String),

    /// An element that must be unique was missing or duplicated
    #[error("Expected exactly one {what} on '{owner}', found {count}")]
    Cardinality {
        what: &'static str,
        owner: String,
        count: usize,
    },

    /// A binding referenced a type or member that no longer exists
    #[error("Internal inconsistency: {0}")]
    Inconsistent(String),

    /// A synthesized or rewritten body failed verification
    #[error("Rewritten body '{method}' failed verification: {source}")]
    Verification {
        method: String,
        #[source]
        source: VerifyError,
    },

    /// Body construction failed
    #[error("Failed to build method body: {0}")]
    Build(#[from] BuildError),

    /// Existing body failed to decode
    #[error("Failed to decode method body: {0}")]
    Decode(#[from] DecodeError),

    /// Module failed to decode
    #[error("Failed to read module: {0}")]
    Module(#[from] ModuleError),

    /// I/O failure
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Sidecar serialization failure
    #[error("Failed to serialize weave report: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl WeaveError {
    /// Wrap an I/O error with the path it occurred on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        WeaveError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for fatal weaver operations
pub type WeaveResult<T> = Result<T, WeaveError>;
