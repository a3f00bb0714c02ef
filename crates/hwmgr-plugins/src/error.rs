//! Plugin errors

use resource_store::StoreError;
use thiserror::Error;

/// Errors returned by hardware plugins
#[derive(Debug, Error)]
pub enum PluginError {
    /// Store error
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Host was never inspected
    #[error("bareMetalHost.status.hardwareDetails should not be nil (host {0})")]
    MissingHardwareDetails(String),

    /// AllocatedNode points at a host that does not exist
    #[error("unable to find BMH ({namespace}/{name}) for node {node}")]
    HostNotFound {
        node: String,
        namespace: String,
        name: String,
    },

    /// Another AllocatedNode won the race for a host
    #[error("host {host} is already claimed by {owner}")]
    HostClaimed { host: String, owner: String },

    /// Request or inventory content is invalid
    #[error("validation error: {0}")]
    Validation(String),

    /// No plugin registered under this id
    #[error("unknown hardware plugin: {0}")]
    UnknownPlugin(String),

    /// Inventory file could not be read
    #[error("failed to read inventory: {0}")]
    Io(#[from] std::io::Error),

    /// Inventory file could not be parsed
    #[error("failed to parse inventory: {0}")]
    Inventory(#[from] serde_yaml::Error),
}

impl PluginError {
    /// Whether the error is caused by bad input rather than infrastructure
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            PluginError::Validation(_) | PluginError::MissingHardwareDetails(_)
        )
    }
}
