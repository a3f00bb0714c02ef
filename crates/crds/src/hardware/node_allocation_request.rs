//! NodeAllocationRequest CRD
//!
//! Asks a hardware plugin for a set of hosts, grouped by node group.
//! Immutable once submitted except for `nodeGroup` (hwProfile changes drive
//! a reconfiguration).

use crate::condition::{find_condition, hardware_condition, Condition};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[kube(
    group = "plugins.clcm.openshift.io",
    version = "v1alpha1",
    kind = "NodeAllocationRequest",
    namespaced,
    status = "NodeAllocationRequestStatus",
    shortname = "nar"
)]
#[serde(rename_all = "camelCase")]
pub struct NodeAllocationRequestSpec {
    /// Identifier of the requesting cluster
    pub cloud_id: String,

    /// Site the hosts must belong to
    pub site: String,

    /// Hardware plugin that serves this request (e.g. "metal3-hwplugin")
    pub hw_mgr_id: String,

    /// Free-form plugin extensions copied from the HardwareTemplate
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extensions: BTreeMap<String, String>,

    /// Requested node groups
    #[serde(default)]
    pub node_group: Vec<NodeGroup>,

    /// Label identifying the boot interface on every host
    #[serde(default)]
    pub boot_interface_label: String,
}

/// A node group plus the number of hosts requested for it
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct NodeGroup {
    /// Group definition
    pub node_group_data: NodeGroupData,

    /// Number of hosts requested
    pub size: u32,
}

/// Node group definition as it appears in a HardwareTemplate
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct NodeGroupData {
    /// Group name (e.g. "controller")
    pub name: String,

    /// Cluster role served by this group (e.g. "master", "worker")
    pub role: String,

    /// Resource pool the hosts are drawn from
    #[serde(default)]
    pub resource_pool_id: String,

    /// Additional label selector applied to candidate hosts
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub resource_selector: BTreeMap<String, String>,

    /// Hardware profile applied to every host in the group
    #[serde(default)]
    pub hw_profile: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct NodeAllocationRequestStatus {
    /// Provisioned / Configured conditions reported by the plugin
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Names of the AllocatedNodes created for this request
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub node_names: Vec<String>,

    /// Generation last acted upon by the plugin
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl NodeAllocationRequest {
    /// Look up a condition reported by the plugin
    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.status
            .as_ref()
            .and_then(|s| find_condition(&s.conditions, type_))
    }

    /// Whether the plugin reports the request as provisioned
    pub fn is_provisioned(&self) -> bool {
        self.condition(hardware_condition::PROVISIONED)
            .is_some_and(Condition::is_true)
    }

    /// Map of cluster role to node group name
    pub fn role_to_group_name(&self) -> BTreeMap<String, String> {
        self.spec
            .node_group
            .iter()
            .map(|g| (g.node_group_data.role.clone(), g.node_group_data.name.clone()))
            .collect()
    }

    /// Find a node group by name
    pub fn node_group(&self, name: &str) -> Option<&NodeGroup> {
        self.spec.node_group.iter().find(|g| g.node_group_data.name == name)
    }
}
