//! AllocatedNode bookkeeping shared by the backends

use crate::error::PluginError;
use crate::plugin::{missing_per_group, RequestStatus};
use crds::{
    hardware_condition, AllocatedNode, AllocatedNodeSpec, BmcInfo, Interface, NodeAllocationRequest,
    NodeGroupData, NODE_ALLOCATION_REQUEST_LABEL,
};
use kube::api::ObjectMeta;
use kube::{Resource, ResourceExt};
use resource_store::{update_status_with_retry, LabelSelector, ResourceStore, RetryContext, StoreError};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Name of the AllocatedNode created for `host_id` on behalf of `request`
pub fn allocated_node_name(request: &str, host_id: &str) -> String {
    format!("{}-{}", request, host_id)
}

/// AllocatedNodes labelled with the request name, ordered by name
pub async fn request_nodes(
    store: &dyn ResourceStore<AllocatedNode>,
    request: &NodeAllocationRequest,
) -> Result<Vec<AllocatedNode>, PluginError> {
    let namespace = request.namespace().unwrap_or_default();
    let selector = LabelSelector::new().eq(NODE_ALLOCATION_REQUEST_LABEL, request.name_any());
    Ok(store.list(&namespace, &selector).await?)
}

/// Number of nodes per group name
pub fn count_by_group(nodes: &[AllocatedNode]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for node in nodes {
        *counts.entry(node.spec.group_name.clone()).or_insert(0) += 1;
    }
    counts
}

/// Build (but do not create) the AllocatedNode for a claimed host
pub fn new_allocated_node(
    request: &NodeAllocationRequest,
    group: &NodeGroupData,
    hw_mgr_id: &str,
    host_id: &str,
    host_namespace: &str,
) -> AllocatedNode {
    let request_name = request.name_any();
    AllocatedNode {
        metadata: ObjectMeta {
            name: Some(allocated_node_name(&request_name, host_id)),
            namespace: request.namespace(),
            labels: Some(BTreeMap::from([(
                NODE_ALLOCATION_REQUEST_LABEL.to_string(),
                request_name.clone(),
            )])),
            owner_references: request.controller_owner_ref(&()).map(|o| vec![o]),
            ..Default::default()
        },
        spec: AllocatedNodeSpec {
            node_allocation_request: request_name,
            group_name: group.name.clone(),
            hw_profile: group.hw_profile.clone(),
            hw_mgr_id: hw_mgr_id.to_string(),
            hw_mgr_node_id: host_id.to_string(),
            hw_mgr_node_ns: host_namespace.to_string(),
        },
        status: None,
    }
}

/// Create the AllocatedNode if needed, then record the host's BMC and interfaces in its status
pub async fn record_allocated_node(
    store: &dyn ResourceStore<AllocatedNode>,
    retry: &RetryContext,
    node: AllocatedNode,
    bmc: Option<BmcInfo>,
    interfaces: Vec<Interface>,
) -> Result<AllocatedNode, PluginError> {
    let namespace = node.namespace().unwrap_or_default();
    let name = node.name_any();
    match store.create(&namespace, &node).await {
        Ok(_) => info!("Created AllocatedNode {}/{} for host {}", namespace, name, node.spec.hw_mgr_node_id),
        Err(StoreError::AlreadyExists { .. }) => debug!("AllocatedNode {}/{} already exists", namespace, name),
        Err(e) => return Err(e.into()),
    }

    let updated = update_status_with_retry(store, retry, &namespace, &name, |n: &mut AllocatedNode| {
        let status = n.status.get_or_insert_with(Default::default);
        if status.bmc == bmc && status.interfaces == interfaces {
            return false;
        }
        status.bmc = bmc.clone();
        status.interfaces = interfaces.clone();
        true
    })
    .await?;
    Ok(updated)
}

/// Read-only summary of a request from its AllocatedNodes.
///
/// Provisioned once every group has its requested size; the Configured
/// condition already on the request is carried over unchanged.
pub fn summarize(request: &NodeAllocationRequest, nodes: &[AllocatedNode]) -> RequestStatus {
    let counts = count_by_group(nodes);
    let node_names = nodes.iter().map(|n| n.name_any()).collect();
    let missing: usize = missing_per_group(request, |g| counts.get(g).copied().unwrap_or(0))
        .iter()
        .map(|(_, m)| m)
        .sum();
    let status = if missing == 0 {
        RequestStatus::provisioned(node_names)
    } else {
        RequestStatus::in_progress(node_names, format!("Waiting for {} more node(s) to be allocated", missing))
    };
    status.with_configured(request.condition(hardware_condition::CONFIGURED).cloned())
}
