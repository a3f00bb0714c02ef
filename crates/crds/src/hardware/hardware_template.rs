//! HardwareTemplate CRD
//!
//! Describes how a cluster's node roles map onto hardware node groups and
//! which plugin serves them.

use crate::condition::Condition;
use crate::hardware::NodeGroupData;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[kube(
    group = "clcm.openshift.io",
    version = "v1alpha1",
    kind = "HardwareTemplate",
    namespaced,
    status = "HardwareTemplateStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct HardwareTemplateSpec {
    /// Hardware plugin identifier
    pub hw_mgr_id: String,

    /// Label of the interface hosts boot from
    pub boot_interface_label: String,

    /// Node group definitions, one NodeGroup is requested per entry
    pub node_group_data: Vec<NodeGroupData>,

    /// Plugin-specific extensions passed through to the request
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extensions: BTreeMap<String, String>,

    /// Override for the hardware provisioning timeout (e.g. "90m", "1h", "300s")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hardware_provisioning_timeout: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct HardwareTemplateStatus {
    /// Validation condition
    #[serde(default)]
    pub conditions: Vec<Condition>,
}
