//! Store errors

use crate::retry::Cancelled;
use thiserror::Error;

/// Errors returned by a [`ResourceStore`](crate::ResourceStore) and the
/// retrying helpers built on top of it
#[derive(Debug, Error)]
pub enum StoreError {
    /// Object does not exist
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: String,
        namespace: String,
        name: String,
    },

    /// Conditional write lost against a concurrent writer
    #[error("conflict writing {kind} {namespace}/{name}: {message}")]
    Conflict {
        kind: String,
        namespace: String,
        name: String,
        message: String,
    },

    /// Create of an object that already exists
    #[error("{kind} {namespace}/{name} already exists")]
    AlreadyExists {
        kind: String,
        namespace: String,
        name: String,
    },

    /// Object rejected before reaching the store
    #[error("invalid object: {0}")]
    Invalid(String),

    /// Metadata mutation named a map other than labels/annotations
    #[error("unsupported meta type: {0}")]
    UnsupportedMetaType(String),

    /// Metadata mutation named an operation other than add/remove
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Caller cancelled the operation
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

impl StoreError {
    /// Whether the error is a resource-version conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    /// Whether the object was not found
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    /// Conflicts and momentary not-found during propagation
    pub fn is_transient(&self) -> bool {
        self.is_conflict() || self.is_not_found()
    }

    /// Whether the caller cancelled
    pub fn is_cancelled(&self) -> bool {
        matches!(self, StoreError::Cancelled(_))
    }

    pub(crate) fn not_found(kind: &str, namespace: &str, name: &str) -> Self {
        StoreError::NotFound {
            kind: kind.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    pub(crate) fn conflict(kind: &str, namespace: &str, name: &str, message: impl Into<String>) -> Self {
        StoreError::Conflict {
            kind: kind.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn already_exists(kind: &str, namespace: &str, name: &str) -> Self {
        StoreError::AlreadyExists {
            kind: kind.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}
