//! Backend capability interface
//!
//! Every hardware backend answers the same questions: which hosts could serve
//! a node group, claim hosts for a request, release them, describe a host's
//! interfaces, and summarise a request's state. The plugin controller only
//! talks to backends through [`HardwarePlugin`].

use crate::error::PluginError;
use crds::{
    hardware_condition, reason, BmcInfo, Condition, ConditionStatus, Interface, NodeAllocationRequest,
    NodeGroupData,
};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::str::FromStr;

/// Which hosts a candidate query returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AllocationScope {
    #[default]
    All,
    Unallocated,
    Allocated,
}

impl AllocationScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            AllocationScope::All => "all",
            AllocationScope::Unallocated => "unallocated",
            AllocationScope::Allocated => "allocated",
        }
    }
}

impl fmt::Display for AllocationScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AllocationScope {
    type Err = PluginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(AllocationScope::All),
            "unallocated" => Ok(AllocationScope::Unallocated),
            "allocated" => Ok(AllocationScope::Allocated),
            other => Err(PluginError::Validation(format!("unknown allocation scope: {}", other))),
        }
    }
}

/// Backend-neutral view of a host
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Host {
    /// Backend identifier (BareMetalHost name, inventory id)
    pub id: String,
    /// Backend namespace, empty for backends without one
    pub namespace: String,
    pub site_id: Option<String>,
    pub resource_pool_id: Option<String>,
    /// Ready to be claimed as far as the backend is concerned
    pub available: bool,
    pub allocated: bool,
    /// AllocatedNode holding the host, for backends that record it on the host
    pub allocated_node: Option<String>,
    pub bmc: Option<BmcInfo>,
    pub boot_mac_address: Option<String>,
    /// Name of the network data record the host boots with
    pub network_data_ref: Option<String>,
}

/// Hosts grouped by resource pool, each pool in list order
pub type HostPool<T> = BTreeMap<String, VecDeque<T>>;

/// Conditions a plugin wants on a NodeAllocationRequest after a pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestStatus {
    pub provisioned: Condition,
    /// `None` when no configuration change was ever requested
    pub configured: Option<Condition>,
    /// AllocatedNode names owned by the request, sorted
    pub node_names: Vec<String>,
}

impl RequestStatus {
    /// Provisioned True/Completed
    pub fn provisioned(node_names: Vec<String>) -> Self {
        Self {
            provisioned: Condition::new(
                hardware_condition::PROVISIONED,
                ConditionStatus::True,
                reason::COMPLETED,
                "Created",
            ),
            configured: None,
            node_names,
        }
    }

    /// Provisioned False/InProgress
    pub fn in_progress(node_names: Vec<String>, message: impl Into<String>) -> Self {
        Self {
            provisioned: Condition::new(
                hardware_condition::PROVISIONED,
                ConditionStatus::False,
                reason::IN_PROGRESS,
                message,
            ),
            configured: None,
            node_names,
        }
    }

    /// Provisioned False/Failed
    pub fn failed(node_names: Vec<String>, message: impl Into<String>) -> Self {
        Self {
            provisioned: Condition::new(
                hardware_condition::PROVISIONED,
                ConditionStatus::False,
                reason::FAILED,
                message,
            ),
            configured: None,
            node_names,
        }
    }

    #[must_use]
    pub fn with_configured(mut self, configured: Option<Condition>) -> Self {
        self.configured = configured;
        self
    }

    pub fn is_provisioned(&self) -> bool {
        self.provisioned.is_true()
    }
}

/// A hardware backend
#[async_trait::async_trait]
pub trait HardwarePlugin: Send + Sync {
    /// Identifier matched against `hwMgrId`
    fn id(&self) -> &str;

    /// Hosts at `site` matching a node group's pool and selector
    async fn list_candidates(
        &self,
        site: &str,
        group: &NodeGroupData,
        scope: AllocationScope,
    ) -> Result<Vec<Host>, PluginError>;

    /// Claim and configure hosts until the request is satisfied. Idempotent.
    async fn allocate(&self, request: &NodeAllocationRequest) -> Result<RequestStatus, PluginError>;

    /// Release every host held by the request and delete its AllocatedNodes. Idempotent.
    async fn deallocate(&self, request: &NodeAllocationRequest) -> Result<(), PluginError>;

    /// Interfaces of a host, labelled for the request
    async fn build_interfaces(
        &self,
        request: &NodeAllocationRequest,
        host: &Host,
    ) -> Result<Vec<Interface>, PluginError>;

    /// Summarise the request without changing anything
    async fn status(&self, request: &NodeAllocationRequest) -> Result<RequestStatus, PluginError>;
}

/// Number of hosts still missing for each node group, in request order
pub(crate) fn missing_per_group(
    request: &NodeAllocationRequest,
    existing: impl Fn(&str) -> usize,
) -> Vec<(String, usize)> {
    request
        .spec
        .node_group
        .iter()
        .map(|g| {
            let have = existing(&g.node_group_data.name);
            (g.node_group_data.name.clone(), (g.size as usize).saturating_sub(have))
        })
        .collect()
}
