//! Controller-specific error types.

use hwmgr_plugins::PluginError;
use kube::Error as KubeError;
use resource_store::StoreError;
use thiserror::Error;

/// Errors that can occur in the Hardware Plugin Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Object store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Hardware plugin error
    #[error("Plugin error: {0}")]
    Plugin(#[from] PluginError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}
