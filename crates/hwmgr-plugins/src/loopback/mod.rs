//! Loopback hardware plugin
//!
//! Serves requests from a static inventory file. No host objects exist in
//! the cluster: a host counts as allocated while a loopback AllocatedNode
//! references it. Useful for exercising the provisioning flow without
//! hardware.

pub mod inventory;

pub use inventory::*;

use crate::error::PluginError;
use crate::nodes::{count_by_group, new_allocated_node, record_allocated_node, request_nodes, summarize};
use crate::plugin::{missing_per_group, AllocationScope, HardwarePlugin, Host, RequestStatus};
use crds::{
    hardware_condition, reason, AllocatedNode, Condition, ConditionStatus, Interface, NodeAllocationRequest,
    NodeGroupData,
};
use kube::ResourceExt;
use resource_store::{update_with_retry, LabelSelector, ResourceStore, RetryContext};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Plugin identifier
pub const LOOPBACK_PLUGIN_ID: &str = "loopback-hwplugin";

pub struct LoopbackPlugin {
    inventory: Inventory,
    nodes: Arc<dyn ResourceStore<AllocatedNode>>,
    /// Namespace holding the plugin's AllocatedNodes
    namespace: String,
    retry: RetryContext,
    /// Serializes allocation so two requests never pick the same host
    lock: Mutex<()>,
}

impl std::fmt::Debug for LoopbackPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackPlugin")
            .field("hosts", &self.inventory.hosts.len())
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl LoopbackPlugin {
    pub fn new(
        inventory: Inventory,
        nodes: Arc<dyn ResourceStore<AllocatedNode>>,
        namespace: impl Into<String>,
        retry: RetryContext,
    ) -> Self {
        Self {
            inventory,
            nodes,
            namespace: namespace.into(),
            retry,
            lock: Mutex::new(()),
        }
    }

    /// Host ids referenced by any loopback AllocatedNode
    async fn allocated_ids(&self) -> Result<BTreeSet<String>, PluginError> {
        let nodes = self.nodes.list(&self.namespace, &LabelSelector::new()).await?;
        Ok(nodes
            .into_iter()
            .filter(|n| n.spec.hw_mgr_id == LOOPBACK_PLUGIN_ID)
            .map(|n| n.spec.hw_mgr_node_id)
            .collect())
    }

    /// Apply hwProfile changes directly, nothing to wait for
    async fn apply_profiles(
        &self,
        request: &NodeAllocationRequest,
        nodes: &[AllocatedNode],
    ) -> Result<Option<Condition>, PluginError> {
        let mut applied = false;
        for node in nodes {
            let Some(group) = request.node_group(&node.spec.group_name) else {
                continue;
            };
            let desired = &group.node_group_data.hw_profile;
            if node.spec.hw_profile == *desired {
                continue;
            }
            let ns = node.namespace().unwrap_or_default();
            update_with_retry(self.nodes.as_ref(), &self.retry, &ns, &node.name_any(), |n: &mut AllocatedNode| {
                if n.spec.hw_profile == *desired {
                    return false;
                }
                n.spec.hw_profile = desired.clone();
                true
            })
            .await?;
            info!("Applied hwProfile {} to node {}", desired, node.name_any());
            applied = true;
        }

        if applied || request.condition(hardware_condition::CONFIGURED).is_some() {
            return Ok(Some(Condition::new(
                hardware_condition::CONFIGURED,
                ConditionStatus::True,
                reason::CONFIG_APPLIED,
                "Configuration has been applied to all nodes",
            )));
        }
        Ok(None)
    }
}

#[async_trait::async_trait]
impl HardwarePlugin for LoopbackPlugin {
    fn id(&self) -> &str {
        LOOPBACK_PLUGIN_ID
    }

    async fn list_candidates(
        &self,
        site: &str,
        group: &NodeGroupData,
        scope: AllocationScope,
    ) -> Result<Vec<Host>, PluginError> {
        let allocated = self.allocated_ids().await?;
        Ok(self
            .inventory
            .hosts
            .iter()
            .filter(|h| h.matches(site, group))
            .map(|h| h.to_host(allocated.contains(&h.id)))
            .filter(|h| match scope {
                AllocationScope::All => true,
                AllocationScope::Allocated => h.allocated,
                AllocationScope::Unallocated => !h.allocated,
            })
            .collect())
    }

    async fn allocate(&self, request: &NodeAllocationRequest) -> Result<RequestStatus, PluginError> {
        let _guard = self.lock.lock().await;
        let nodes = request_nodes(self.nodes.as_ref(), request).await?;
        let counts = count_by_group(&nodes);

        let mut picked = BTreeSet::new();
        let mut picks = Vec::new();
        for (group_name, missing) in missing_per_group(request, |g| counts.get(g).copied().unwrap_or(0)) {
            let Some(group) = request.node_group(&group_name) else {
                continue;
            };
            let group = &group.node_group_data;
            let free: Vec<Host> = self
                .list_candidates(&request.spec.site, group, AllocationScope::Unallocated)
                .await?
                .into_iter()
                .filter(|h| !picked.contains(&h.id))
                .take(missing)
                .collect();
            if free.len() < missing {
                let message = format!(
                    "insufficient free hosts for group {} in site {} resource pool {}: need {}, found {}",
                    group.name,
                    request.spec.site,
                    group.resource_pool_id,
                    missing,
                    free.len()
                );
                warn!("NodeAllocationRequest {}: {}", request.name_any(), message);
                return Ok(RequestStatus::failed(nodes.iter().map(|n| n.name_any()).collect(), message));
            }
            for host in free {
                picked.insert(host.id.clone());
                picks.push((group.clone(), host));
            }
        }

        for (group, host) in picks {
            let interfaces = self.build_interfaces(request, &host).await?;
            let node = new_allocated_node(request, &group, LOOPBACK_PLUGIN_ID, &host.id, &host.namespace);
            record_allocated_node(self.nodes.as_ref(), &self.retry, node, host.bmc.clone(), interfaces).await?;
            info!("Allocated loopback host {} to {} group {}", host.id, request.name_any(), group.name);
        }

        let nodes = request_nodes(self.nodes.as_ref(), request).await?;
        let configured = self.apply_profiles(request, &nodes).await?;
        let node_names = nodes.iter().map(|n| n.name_any()).collect();
        Ok(RequestStatus::provisioned(node_names).with_configured(configured))
    }

    async fn deallocate(&self, request: &NodeAllocationRequest) -> Result<(), PluginError> {
        for node in request_nodes(self.nodes.as_ref(), request).await? {
            self.nodes
                .delete(&node.namespace().unwrap_or_default(), &node.name_any())
                .await?;
            info!("Released loopback host {} ({})", node.spec.hw_mgr_node_id, node.name_any());
        }
        Ok(())
    }

    async fn build_interfaces(
        &self,
        request: &NodeAllocationRequest,
        host: &Host,
    ) -> Result<Vec<Interface>, PluginError> {
        let entry = self
            .inventory
            .host(&host.id)
            .ok_or_else(|| PluginError::Validation(format!("host {} is not in the loopback inventory", host.id)))?;
        Ok(entry.interfaces_for(&request.spec.boot_interface_label))
    }

    async fn status(&self, request: &NodeAllocationRequest) -> Result<RequestStatus, PluginError> {
        let nodes = request_nodes(self.nodes.as_ref(), request).await?;
        Ok(summarize(request, &nodes))
    }
}
