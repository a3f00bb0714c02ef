//! Controller-specific error types.
//!
//! Input errors are terminal for the attempt: the request is marked Failed
//! and not requeued until it changes. Everything else is retried through the
//! watcher's error policy.

use crate::node_doc::NodeDocumentError;
use kube::Error as KubeError;
use resource_store::StoreError;
use thiserror::Error;

/// Errors that can occur in the Provisioning Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Object store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Request, template or cluster input is invalid
    #[error("{0}")]
    InputError(String),

    /// A hardware condition has not been reported and was never requested
    #[error("condition {0} does not exist")]
    ConditionDoesNotExist(String),

    /// Status carries no NodeAllocationRequest reference yet
    #[error("ProvisioningRequest {0} has no NodeAllocationRequest reference")]
    MissingReference(String),

    /// Some ClusterInstance node slots found no allocated host
    #[error("failed to find matches for the following nodes: {0}")]
    UnmatchedNodes(String),

    /// Malformed ClusterInstance node document
    #[error("{0}")]
    NodeDocument(#[from] NodeDocumentError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}

impl ControllerError {
    /// Whether retrying without a change to the inputs cannot help
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            ControllerError::InputError(_) | ControllerError::UnmatchedNodes(_) | ControllerError::NodeDocument(_)
        )
    }
}
