//! ProvisioningRequest CRD
//!
//! A request to deploy a cluster. The hardware lifecycle section of its
//! status (conditions, provisioning status and the NodeAllocationRequest
//! reference with its phase clocks) is owned by the provisioning controller.

use crate::condition::{find_condition, Condition};
use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Template parameter holding the O-Cloud site identifier
pub const TEMPLATE_PARAM_OCLOUD_SITE_ID: &str = "oCloudSiteId";

/// Label set on generated objects naming their ProvisioningRequest
pub const PROVISIONING_REQUEST_NAME_LABEL: &str = "provisioningrequest.clcm.openshift.io/name";

/// Finalizer guarding NodeAllocationRequest cleanup
pub const PROVISIONING_REQUEST_FINALIZER: &str = "provisioningrequest.clcm.openshift.io/finalizer";

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[kube(
    group = "clcm.openshift.io",
    version = "v1alpha1",
    kind = "ProvisioningRequest",
    namespaced,
    status = "ProvisioningRequestStatus",
    shortname = "pr"
)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningRequestSpec {
    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Cluster template name
    pub template_name: String,

    /// Cluster template version
    pub template_version: String,

    /// HardwareTemplate (same namespace) used to build the NodeAllocationRequest
    pub hardware_template: String,

    /// Rendered ClusterInstance (same namespace) receiving host identity
    pub cluster_instance: String,

    /// Free-form template parameters
    #[serde(default)]
    #[schemars(schema_with = "crate::schema::preserve_unknown_fields")]
    pub template_parameters: serde_json::Value,
}

/// Template parameter lookup errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateParameterError {
    #[error("templateParameters does not contain {0}")]
    Missing(String),

    #[error("templateParameters.{0} is not a string")]
    NotAString(String),
}

impl ProvisioningRequestSpec {
    /// Read a string-valued template parameter
    pub fn template_parameter_str(&self, key: &str) -> Result<&str, TemplateParameterError> {
        match self.template_parameters.get(key) {
            None | Some(serde_json::Value::Null) => Err(TemplateParameterError::Missing(key.to_string())),
            Some(serde_json::Value::String(s)) => Ok(s.as_str()),
            Some(_) => Err(TemplateParameterError::NotAString(key.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningRequestStatus {
    /// Hardware lifecycle conditions
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Overall provisioning progress
    #[serde(default)]
    pub provisioning_status: ProvisioningStatus,

    /// Hardware references and bookkeeping
    #[serde(default)]
    pub extensions: Extensions,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningStatus {
    #[serde(default)]
    pub provisioning_phase: ProvisioningPhase,

    #[serde(default)]
    pub provisioning_details: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_time: Option<DateTime<Utc>>,
}

/// Overall provisioning phase
///
/// Serializes as PascalCase but accepts lowercase for objects written by
/// older tooling.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "PascalCase")]
pub enum ProvisioningPhase {
    #[default]
    #[serde(alias = "pending")]
    Pending,

    #[serde(alias = "progressing", alias = "inProgress")]
    InProgress,

    #[serde(alias = "fulfilled")]
    Fulfilled,

    #[serde(alias = "failed")]
    Failed,

    #[serde(alias = "deleting")]
    Deleting,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Extensions {
    /// Reference to the generated NodeAllocationRequest and its phase clocks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_allocation_request_ref: Option<NodeAllocationRequestRef>,

    /// AllocatedNode name to ClusterInstance host name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub allocated_node_host_map: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct NodeAllocationRequestRef {
    /// NodeAllocationRequest name
    pub node_allocation_request_id: String,

    /// NodeAllocationRequest namespace (the plugin namespace)
    #[serde(default)]
    pub namespace: String,

    /// Set once when the request is created
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hardware_provisioning_check_start: Option<DateTime<Utc>>,

    /// Set when a configuration change starts, cleared once Configured is True
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hardware_configuring_check_start: Option<DateTime<Utc>>,
}

impl ProvisioningRequest {
    /// Look up a condition on the request status
    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.status
            .as_ref()
            .and_then(|s| find_condition(&s.conditions, type_))
    }

    /// Reference to the generated NodeAllocationRequest, if one was created
    pub fn node_allocation_request_ref(&self) -> Option<&NodeAllocationRequestRef> {
        self.status
            .as_ref()
            .and_then(|s| s.extensions.node_allocation_request_ref.as_ref())
    }
}

impl ProvisioningStatus {
    /// Set phase and details, returning true when anything changed
    pub fn set(&mut self, phase: ProvisioningPhase, details: &str) -> bool {
        if self.provisioning_phase == phase && self.provisioning_details == details {
            return false;
        }
        self.provisioning_phase = phase;
        self.provisioning_details = details.to_string();
        self.updated_time = Some(Utc::now());
        true
    }
}
