//! Controller configuration from environment variables

use crate::error::ControllerError;
use hwmgr_plugins::{DEFAULT_HOST_NAMESPACE, LOOPBACK_PLUGIN_ID};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_REQUEUE_SECONDS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Plugin serving this controller's requests (`HWMGR_PLUGIN_ID`)
    pub plugin_id: String,
    /// Namespace watched for NodeAllocationRequests, `None` for the default
    pub namespace: Option<String>,
    /// Inventory file of the loopback plugin
    pub loopback_inventory: Option<PathBuf>,
    /// Namespace holding BareMetalHosts
    pub host_namespace: String,
    /// Requeue interval while a request is in progress
    pub requeue: Duration,
}

impl Settings {
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ControllerError> {
        let plugin_id = lookup("HWMGR_PLUGIN_ID")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                ControllerError::InvalidConfig("HWMGR_PLUGIN_ID environment variable is required".to_string())
            })?;

        let loopback_inventory = lookup("LOOPBACK_INVENTORY")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        if plugin_id == LOOPBACK_PLUGIN_ID && loopback_inventory.is_none() {
            return Err(ControllerError::InvalidConfig(format!(
                "LOOPBACK_INVENTORY environment variable is required for {}",
                LOOPBACK_PLUGIN_ID
            )));
        }

        let requeue_seconds = match lookup("RECONCILE_REQUEUE_SECONDS") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => secs,
                _ => {
                    return Err(ControllerError::InvalidConfig(format!(
                        "RECONCILE_REQUEUE_SECONDS must be a positive number of seconds, got {:?}",
                        raw
                    )));
                }
            },
            None => DEFAULT_REQUEUE_SECONDS,
        };

        Ok(Self {
            plugin_id,
            namespace: lookup("WATCH_NAMESPACE").filter(|v| !v.is_empty()),
            loopback_inventory,
            host_namespace: lookup("METAL3_HOST_NAMESPACE")
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_HOST_NAMESPACE.to_string()),
            requeue: Duration::from_secs(requeue_seconds),
        })
    }

    /// Namespace the controller's APIs are bound to
    pub fn watch_namespace(&self) -> &str {
        self.namespace.as_deref().unwrap_or("default")
    }
}
