//! Static host inventory of the loopback plugin

use crate::error::PluginError;
use crate::plugin::Host;
use crds::{BmcInfo, Interface, NodeGroupData};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Inventory file contents
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Inventory {
    #[serde(default)]
    pub hosts: Vec<InventoryHost>,
}

/// One host of the inventory
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InventoryHost {
    pub id: String,
    pub site_id: String,
    pub resource_pool_id: String,
    /// Labels matched against a node group's resource selector
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub bmc: Option<BmcInfo>,
    #[serde(default)]
    pub boot_mac_address: Option<String>,
    #[serde(default)]
    pub interfaces: Vec<Interface>,
}

impl InventoryHost {
    /// Whether the host is at `site` and fits the group's pool and selector
    pub fn matches(&self, site: &str, group: &NodeGroupData) -> bool {
        self.site_id == site
            && (group.resource_pool_id.is_empty() || self.resource_pool_id == group.resource_pool_id)
            && group
                .resource_selector
                .iter()
                .all(|(k, v)| self.labels.get(k) == Some(v))
    }

    /// Backend-neutral view
    pub fn to_host(&self, allocated: bool) -> Host {
        Host {
            id: self.id.clone(),
            namespace: String::new(),
            site_id: Some(self.site_id.clone()),
            resource_pool_id: Some(self.resource_pool_id.clone()),
            available: !allocated,
            allocated,
            allocated_node: None,
            bmc: self.bmc.clone(),
            boot_mac_address: self.boot_mac_address.clone(),
            network_data_ref: None,
        }
    }

    /// Interfaces with the boot NIC relabelled for the request
    pub fn interfaces_for(&self, boot_interface_label: &str) -> Vec<Interface> {
        let boot_mac = self.boot_mac_address.as_deref().unwrap_or_default();
        self.interfaces
            .iter()
            .map(|i| {
                let mut interface = i.clone();
                if !boot_mac.is_empty() && interface.mac_address.eq_ignore_ascii_case(boot_mac) {
                    interface.label = boot_interface_label.to_string();
                }
                interface
            })
            .collect()
    }
}

impl Inventory {
    pub fn from_yaml(content: &str) -> Result<Self, PluginError> {
        let inventory: Inventory = serde_yaml::from_str(content)?;
        inventory.validate()?;
        Ok(inventory)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self, PluginError> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::from_yaml(&content)
    }

    fn validate(&self) -> Result<(), PluginError> {
        let mut seen = BTreeSet::new();
        for host in &self.hosts {
            if host.id.is_empty() {
                return Err(PluginError::Validation("inventory host without id".to_string()));
            }
            if !seen.insert(host.id.as_str()) {
                return Err(PluginError::Validation(format!("duplicate inventory host id: {}", host.id)));
            }
        }
        Ok(())
    }

    pub fn host(&self, id: &str) -> Option<&InventoryHost> {
        self.hosts.iter().find(|h| h.id == id)
    }
}
