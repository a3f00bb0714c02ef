//! ClusterInstance (siteconfig.open-cluster-management.io/v1alpha1)
//!
//! Only `clusterName` and the node list are typed. Each node is kept as an
//! untyped document because the installer owns its schema; everything else
//! under `spec` is carried through untouched.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[kube(
    group = "siteconfig.open-cluster-management.io",
    version = "v1alpha1",
    kind = "ClusterInstance",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterInstanceSpec {
    /// Cluster name
    pub cluster_name: String,

    /// Node slots; each carries at least `role` and `hostName`
    #[serde(default)]
    #[schemars(schema_with = "crate::schema::array_of_unknown_objects")]
    pub nodes: Vec<serde_json::Value>,

    /// Remaining spec fields, preserved on write
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}
