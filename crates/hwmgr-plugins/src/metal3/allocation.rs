//! Request-level flows of the metal3 plugin: allocation, configuration
//! changes and release.

use super::constants::*;
use super::host_manager::{filter_available, group_by_resource_pool, host_view};
use super::Metal3Plugin;
use crate::error::PluginError;
use crate::nodes::{allocated_node_name, count_by_group, new_allocated_node, record_allocated_node, request_nodes};
use crate::plugin::{missing_per_group, AllocationScope, HardwarePlugin, RequestStatus};
use crds::{
    hardware_condition, reason, AllocatedNode, BareMetalHost, Condition, ConditionStatus, NodeAllocationRequest,
    NodeGroupData, OperationalStatus,
};
use kube::ResourceExt;
use resource_store::update_with_retry;
use std::collections::{BTreeSet, VecDeque};
use tracing::{debug, info, warn};

/// Hosts picked for one node group in a pass
struct GroupPlan {
    group: NodeGroupData,
    /// Hosts already labelled for this request in an earlier pass
    resumed: Vec<BareMetalHost>,
    /// Free hosts in claim order, may be longer than needed
    free: VecDeque<BareMetalHost>,
    needed: usize,
}

fn owned_by(host: &BareMetalHost, request: &str) -> bool {
    host.labels()
        .get(ALLOCATED_NODE_LABEL)
        .is_some_and(|owner| *owner == allocated_node_name(request, &host.name_any()))
}

impl Metal3Plugin {
    /// Claim hosts for every node group short of its size, then drive any
    /// pending configuration change.
    ///
    /// Availability is checked for all groups before anything is claimed, so
    /// an unsatisfiable request leaves no host labelled. Groups drawing from
    /// the same pool are planned against one shared reservation, so a host
    /// is never counted as free for two groups.
    pub async fn process_request(&self, request: &NodeAllocationRequest) -> Result<RequestStatus, PluginError> {
        let request_name = request.name_any();
        let manager = self.manager();
        let nodes = request_nodes(manager.nodes(), request).await?;
        let counts = count_by_group(&nodes);
        let known_hosts: BTreeSet<&str> = nodes.iter().map(|n| n.spec.hw_mgr_node_id.as_str()).collect();

        let mut plans = Vec::new();
        let mut reserved = BTreeSet::new();
        for (group_name, missing) in missing_per_group(request, |g| counts.get(g).copied().unwrap_or(0)) {
            if missing == 0 {
                continue;
            }
            let Some(group) = request.node_group(&group_name).map(|g| g.node_group_data.clone()) else {
                continue;
            };

            let resumed: Vec<BareMetalHost> = manager
                .fetch_candidates(&request.spec.site, &group, AllocationScope::All, self.host_namespace())
                .await?
                .into_iter()
                .filter(|h| owned_by(h, &request_name) && !known_hosts.contains(h.name_any().as_str()))
                .filter(|h| !reserved.contains(&h.name_any()))
                .take(missing)
                .collect();
            let needed = missing - resumed.len();

            let free = filter_available(
                manager
                    .fetch_candidates(&request.spec.site, &group, AllocationScope::Unallocated, self.host_namespace())
                    .await?,
            )
            .into_iter()
            .filter(|h| !h.labels().contains_key(ALLOCATED_NODE_LABEL) && !reserved.contains(&h.name_any()));
            let free: VecDeque<BareMetalHost> = if group.resource_pool_id.is_empty() {
                free.collect()
            } else {
                group_by_resource_pool(free)
                    .remove(&group.resource_pool_id)
                    .unwrap_or_default()
            };

            if free.len() < needed {
                let message = format!(
                    "insufficient free hosts for group {} in site {} resource pool {}: need {}, found {}",
                    group.name,
                    request.spec.site,
                    group.resource_pool_id,
                    needed,
                    free.len()
                );
                warn!("NodeAllocationRequest {}: {}", request_name, message);
                return Ok(RequestStatus::failed(nodes.iter().map(|n| n.name_any()).collect(), message));
            }

            reserved.extend(resumed.iter().map(|h| h.name_any()));
            reserved.extend(free.iter().take(needed).map(|h| h.name_any()));
            plans.push(GroupPlan {
                group,
                resumed,
                free,
                needed,
            });
        }

        let mut short = 0;
        let mut taken = BTreeSet::new();
        for plan in plans {
            for host in &plan.resumed {
                info!("Resuming allocation of BareMetalHost {} for {}", host.name_any(), request_name);
                self.allocate_host(request, &plan.group, host).await?;
                taken.insert(host.name_any());
            }
            let mut claimed = 0;
            for host in &plan.free {
                if claimed == plan.needed {
                    break;
                }
                // An earlier group may have fallen back to a spare from a shared pool
                if taken.contains(&host.name_any()) {
                    continue;
                }
                match self.allocate_host(request, &plan.group, host).await {
                    Ok(()) => {
                        claimed += 1;
                        taken.insert(host.name_any());
                    }
                    Err(PluginError::HostClaimed { host, owner }) => {
                        debug!("BareMetalHost {} was claimed by {}, trying the next one", host, owner)
                    }
                    Err(e) => return Err(e),
                }
            }
            short += plan.needed - claimed;
        }

        let nodes = request_nodes(manager.nodes(), request).await?;
        let node_names: Vec<String> = nodes.iter().map(|n| n.name_any()).collect();
        if short > 0 {
            return Ok(RequestStatus::in_progress(
                node_names,
                format!("{} host(s) were claimed concurrently, retrying", short),
            ));
        }

        let configured = self.configure_nodes(request, &nodes).await?;
        Ok(RequestStatus::provisioned(node_names).with_configured(configured))
    }

    /// Claim one host and record it as an AllocatedNode
    async fn allocate_host(
        &self,
        request: &NodeAllocationRequest,
        group: &NodeGroupData,
        host: &BareMetalHost,
    ) -> Result<(), PluginError> {
        let manager = self.manager();
        let node_name = allocated_node_name(&request.name_any(), &host.name_any());
        let host = manager.claim_host(host, &node_name).await?;
        manager.allow_host_management(&host).await?;

        let view = host_view(&host);
        let interfaces = self.build_interfaces(request, &view).await?;
        let node = new_allocated_node(request, group, METAL3_PLUGIN_ID, &view.id, &view.namespace);
        record_allocated_node(manager.nodes(), manager.retry(), node, view.bmc, interfaces).await?;
        info!(
            "Allocated BareMetalHost {}/{} to {} group {}",
            view.namespace,
            view.id,
            request.name_any(),
            group.name
        );
        Ok(())
    }

    /// Push hwProfile changes down to hosts.
    ///
    /// Returns the Configured condition to report, `None` when no change was
    /// ever requested for this request.
    pub async fn configure_nodes(
        &self,
        request: &NodeAllocationRequest,
        nodes: &[AllocatedNode],
    ) -> Result<Option<Condition>, PluginError> {
        let manager = self.manager();
        let mut in_progress = Vec::new();
        let mut failed = Vec::new();
        let mut applied = false;

        for node in nodes {
            let Some(group) = request.node_group(&node.spec.group_name) else {
                warn!("AllocatedNode {} belongs to unknown group {}", node.name_any(), node.spec.group_name);
                continue;
            };
            let desired = &group.node_group_data.hw_profile;
            let ns = node.namespace().unwrap_or_default();
            let name = node.name_any();

            if !node.annotations().contains_key(CONFIG_ANNOTATION) {
                if node.spec.hw_profile == *desired {
                    continue;
                }
                let host = manager.get_host_for_node(node).await?;
                info!(
                    "Requesting hwProfile {} -> {} on BareMetalHost {} for node {}",
                    node.spec.hw_profile,
                    desired,
                    host.name_any(),
                    name
                );
                manager.add_bios_update_annotation(&host).await?;
                manager.add_reboot_annotation(&host).await?;
                manager
                    .annotate_node_config_in_progress(&ns, &name, UPDATE_REASON_BIOS_SETTINGS)
                    .await?;
                in_progress.push(name);
                continue;
            }

            let host = manager.get_host_for_node(node).await?;
            match host.operational_status() {
                Some(OperationalStatus::Error) => {
                    warn!("BareMetalHost {} reported an error while servicing node {}", host.name_any(), name);
                    failed.push(name);
                }
                Some(OperationalStatus::Ok) if !host.annotations().contains_key(REBOOT_ANNOTATION) => {
                    manager.clear_update_annotations(&host).await?;
                    update_with_retry(manager.nodes(), manager.retry(), &ns, &name, |n: &mut AllocatedNode| {
                        if n.spec.hw_profile == *desired {
                            return false;
                        }
                        n.spec.hw_profile = desired.clone();
                        true
                    })
                    .await?;
                    manager.clear_node_config_in_progress(&ns, &name).await?;
                    info!("Applied hwProfile {} to node {}", desired, name);
                    applied = true;
                }
                _ => in_progress.push(name),
            }
        }

        let condition = if !failed.is_empty() {
            Some(Condition::new(
                hardware_condition::CONFIGURED,
                ConditionStatus::False,
                reason::FAILED,
                format!("{}: {}", BMH_SERVICING_ERR, failed.join(", ")),
            ))
        } else if !in_progress.is_empty() {
            Some(Condition::new(
                hardware_condition::CONFIGURED,
                ConditionStatus::False,
                reason::IN_PROGRESS,
                format!("Configuration in progress for nodes: {}", in_progress.join(", ")),
            ))
        } else if applied || request.condition(hardware_condition::CONFIGURED).is_some() {
            Some(Condition::new(
                hardware_condition::CONFIGURED,
                ConditionStatus::True,
                reason::CONFIG_APPLIED,
                "Configuration has been applied to all nodes",
            ))
        } else {
            None
        };
        Ok(condition)
    }

    /// Return every host held by the request to the free pool and delete its
    /// AllocatedNodes. Safe to run repeatedly.
    pub async fn release_request(&self, request: &NodeAllocationRequest) -> Result<(), PluginError> {
        let request_name = request.name_any();
        let manager = self.manager();

        for node in request_nodes(manager.nodes(), request).await? {
            self.release_host(&node.spec.hw_mgr_node_ns, &node.spec.hw_mgr_node_id)
                .await?;
            manager
                .nodes()
                .delete(&node.namespace().unwrap_or_default(), &node.name_any())
                .await?;
            info!("Deleted AllocatedNode {}", node.name_any());
        }

        // Hosts labelled in a pass that never got as far as creating the node
        for group in &request.spec.node_group {
            let hosts = self
                .list_candidates(&request.spec.site, &group.node_group_data, AllocationScope::All)
                .await?;
            for host in hosts
                .iter()
                .filter(|h| h.allocated_node.as_deref() == Some(allocated_node_name(&request_name, &h.id).as_str()))
            {
                self.release_host(&host.namespace, &host.id).await?;
            }
        }
        Ok(())
    }

    async fn release_host(&self, namespace: &str, name: &str) -> Result<(), PluginError> {
        let manager = self.manager();
        match manager.hosts().get_opt(namespace, name).await? {
            Some(host) => manager.finalize_deallocation(&host).await?,
            None => warn!("BareMetalHost {}/{} is gone", namespace, name),
        }
        manager.remove_infra_env_label(namespace, name).await
    }
}

#[cfg(test)]
#[path = "allocation_test.rs"]
mod tests;
