//! AllocatedNode CRD
//!
//! One record per host claimed by a hardware plugin. Carries the facts the
//! provisioning side needs to stitch the host into a ClusterInstance: BMC
//! address/credentials and the labelled interface list.

use crate::condition::Condition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[kube(
    group = "plugins.clcm.openshift.io",
    version = "v1alpha1",
    kind = "AllocatedNode",
    namespaced,
    status = "AllocatedNodeStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct AllocatedNodeSpec {
    /// Name of the owning NodeAllocationRequest
    pub node_allocation_request: String,

    /// Node group this node was allocated for
    pub group_name: String,

    /// Hardware profile currently applied to the host
    #[serde(default)]
    pub hw_profile: String,

    /// Hardware plugin that owns the host
    pub hw_mgr_id: String,

    /// Backend identifier of the host (BareMetalHost name for metal3)
    pub hw_mgr_node_id: String,

    /// Backend namespace of the host
    #[serde(default)]
    pub hw_mgr_node_ns: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct AllocatedNodeStatus {
    /// BMC details of the host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bmc: Option<BmcInfo>,

    /// Discovered interfaces
    #[serde(default)]
    pub interfaces: Vec<Interface>,

    /// Hostname assigned by the ClusterInstance once the node is matched to a slot
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hostname: String,

    /// Conditions for this node
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// BMC address and credentials reference
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct BmcInfo {
    /// BMC URL (e.g. "redfish+https://10.0.0.1/redfish/v1/Systems/1")
    pub address: String,

    /// Name of the Secret holding BMC credentials
    pub credentials_name: String,
}

/// A physical interface of a host
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Interface {
    /// Interface name reported by the hardware (e.g. "eno1")
    pub name: String,

    /// Logical label (e.g. "bootable-interface", "data-interface")
    #[serde(default)]
    pub label: String,

    /// MAC address in colon-separated form
    pub mac_address: String,
}

impl Interface {
    /// Whether this is the boot interface for the given boot label
    pub fn is_boot(&self, boot_interface_label: &str) -> bool {
        !boot_interface_label.is_empty() && self.label == boot_interface_label
    }
}

impl AllocatedNode {
    /// Interfaces reported in status, empty when no status yet
    pub fn interfaces(&self) -> &[Interface] {
        self.status.as_ref().map_or(&[], |s| s.interfaces.as_slice())
    }
}
