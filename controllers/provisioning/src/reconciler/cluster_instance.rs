//! ClusterInstance node configuration
//!
//! Once the hardware is provisioned every node slot of the ClusterInstance is
//! matched to an AllocatedNode of the slot role's group and receives its BMC
//! address and credentials, host reference, boot MAC and per-interface MACs.
//! Slots that find no host are reported together after the matched slots
//! were committed.

use crate::error::ControllerError;
use crate::node_doc::{NodeDocument, NodeDocumentError};
use crate::reconciler::{ProvisioningTask, Reconciler};
use crds::{
    provisioning_condition, reason, AllocatedNode, BmcInfo, ClusterInstance, ConditionStatus, Interface, NamespacedName,
    NodeAllocationRequest, ProvisioningPhase, NODE_ALLOCATION_REQUEST_LABEL,
};
use kube::ResourceExt;
use resource_store::{update_status_with_retry, update_with_retry, LabelSelector};
use serde_json::{json, Value};
use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, info, warn};

/// Facts about one allocated host needed to fill a node slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    /// AllocatedNode name
    pub node_name: String,
    /// AllocatedNode namespace
    pub namespace: String,
    pub bmc: Option<BmcInfo>,
    pub hw_mgr_node_id: String,
    pub hw_mgr_node_ns: String,
    pub interfaces: Vec<Interface>,
}

impl From<&AllocatedNode> for NodeInfo {
    fn from(node: &AllocatedNode) -> Self {
        Self {
            node_name: node.name_any(),
            namespace: node.namespace().unwrap_or_default(),
            bmc: node.status.as_ref().and_then(|s| s.bmc.clone()),
            hw_mgr_node_id: node.spec.hw_mgr_node_id.clone(),
            hw_mgr_node_ns: node.spec.hw_mgr_node_ns.clone(),
            interfaces: node.interfaces().to_vec(),
        }
    }
}

/// Hosts per node group, consumed front to back
pub type NodeInfoPool = BTreeMap<String, VecDeque<NodeInfo>>;

/// Group AllocatedNodes by node group, ordered by name within a group
pub fn build_node_info_pool(mut nodes: Vec<AllocatedNode>) -> NodeInfoPool {
    nodes.sort_by_key(|n| n.name_any());
    let mut pool = NodeInfoPool::new();
    for node in &nodes {
        pool.entry(node.spec.group_name.clone())
            .or_default()
            .push_back(NodeInfo::from(node));
    }
    pool
}

/// Write one host's identity into a node slot
pub fn configure_node_slot(
    slot: &mut NodeDocument,
    info: &NodeInfo,
    host_name: &str,
    boot_interface_label: &str,
) -> Result<(), ControllerError> {
    if let Some(bmc) = &info.bmc {
        slot.set(&["bmcAddress"], json!(bmc.address))?;
        slot.set(&["bmcCredentialsName", "name"], json!(bmc.credentials_name))?;
    }

    if !info.hw_mgr_node_id.is_empty() && !info.hw_mgr_node_ns.is_empty() {
        slot.set(
            &["hostRef"],
            json!(NamespacedName::new(&info.hw_mgr_node_ns, &info.hw_mgr_node_id)),
        )?;
    }

    let boot_mac = info
        .interfaces
        .iter()
        .find(|i| i.is_boot(boot_interface_label))
        .map(|i| i.mac_address.clone())
        .ok_or_else(|| {
            ControllerError::InputError(format!(
                "failed to get boot MAC for node '{}': no interface labelled '{}' on {}",
                host_name, boot_interface_label, info.node_name
            ))
        })?;
    slot.set(&["bootMACAddress"], json!(boot_mac))?;

    let interfaces = match slot.list_mut(&["nodeNetwork", "interfaces"]) {
        Ok(interfaces) => interfaces,
        Err(NodeDocumentError::PathNotFound(_)) => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    for interface in interfaces.iter_mut() {
        let Some(fields) = interface.as_object_mut() else {
            continue;
        };
        let Some(label) = fields
            .get("label")
            .and_then(Value::as_str)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
        else {
            continue;
        };
        let mac = info
            .interfaces
            .iter()
            .find(|i| i.label == label)
            .map(|i| i.mac_address.clone())
            .ok_or_else(|| ControllerError::InputError(format!("mac address not found for interface label {}", label)))?;
        fields.insert("macAddress".to_string(), json!(mac));
    }
    Ok(())
}

impl Reconciler {
    /// Apply node configuration unless it was already applied, recording the
    /// outcome as `HardwareNodeConfigApplied`
    pub(crate) async fn update_cluster_instance(
        &self,
        task: &mut ProvisioningTask,
        nar: &NodeAllocationRequest,
    ) -> Result<(), ControllerError> {
        if task
            .condition(provisioning_condition::HARDWARE_NODE_CONFIG_APPLIED)
            .is_some_and(|c| c.is_true())
        {
            debug!("Node configuration already applied for {}", task.key());
            return Ok(());
        }

        match self.apply_node_configuration(task, nar).await {
            Ok(()) => {
                info!("Applied node configuration to ClusterInstance of {}", task.key());
                task.set_condition(
                    provisioning_condition::HARDWARE_NODE_CONFIG_APPLIED,
                    ConditionStatus::True,
                    reason::COMPLETED,
                    "Node configuration has been applied to the rendered ClusterInstance",
                );
                Ok(())
            }
            Err(e) => {
                let message = format!("Failed to apply node configuration to the rendered ClusterInstance: {}", e);
                warn!("{}: {}", task.key(), message);
                task.set_condition(
                    provisioning_condition::HARDWARE_NODE_CONFIG_APPLIED,
                    ConditionStatus::False,
                    reason::NOT_APPLIED,
                    &message,
                );
                task.set_phase(ProvisioningPhase::Failed, &message);
                Err(e)
            }
        }
    }

    /// Fill every node slot from the request's AllocatedNodes and commit the
    /// ClusterInstance once
    pub(crate) async fn apply_node_configuration(
        &self,
        task: &mut ProvisioningTask,
        nar: &NodeAllocationRequest,
    ) -> Result<(), ControllerError> {
        let namespace = task.namespace.clone();
        let cluster_name = task.request.spec.cluster_instance.clone();
        let cluster = self.stores.cluster_instances.get(&namespace, &cluster_name).await?;
        if cluster.spec.nodes.is_empty() {
            return Err(NodeDocumentError::PathNotFound("spec.nodes".to_string()).into());
        }

        let selector = LabelSelector::new().eq(NODE_ALLOCATION_REQUEST_LABEL, nar.name_any());
        let nodes = self
            .stores
            .allocated_nodes
            .list(&nar.namespace().unwrap_or_default(), &selector)
            .await?;
        let mut pool = build_node_info_pool(nodes);
        let role_to_group = nar.role_to_group_name();
        let boot_interface_label = nar.spec.boot_interface_label.as_str();

        let mut slots = cluster.spec.nodes.clone();
        let mut unmatched: Vec<(usize, String)> = Vec::new();
        for (index, slot) in slots.iter_mut().enumerate() {
            let mut doc = NodeDocument::from_value(index, slot)?;
            let host_name = doc.str_or_default("hostName").to_string();
            let info = role_to_group
                .get(doc.str_or_default("role"))
                .and_then(|group| pool.get_mut(group))
                .and_then(VecDeque::pop_front);
            let Some(info) = info else {
                unmatched.push((index, host_name));
                continue;
            };

            configure_node_slot(&mut doc, &info, &host_name, boot_interface_label)?;
            self.set_allocated_node_hostname(&info, &host_name).await?;
            task.status_mut()
                .extensions
                .allocated_node_host_map
                .insert(info.node_name.clone(), host_name.clone());
            debug!("Matched {} to node slot {} ({})", info.node_name, index, host_name);
            *slot = doc.into_value();
        }

        update_with_retry(
            self.stores.cluster_instances.as_ref(),
            &self.retry,
            &namespace,
            &cluster_name,
            |ci: &mut ClusterInstance| {
                if ci.spec.nodes == slots {
                    return false;
                }
                ci.spec.nodes = slots.clone();
                true
            },
        )
        .await?;

        if unmatched.is_empty() {
            return Ok(());
        }
        unmatched.sort_by_key(|(index, _)| *index);
        let list = unmatched
            .iter()
            .map(|(index, host)| format!("Index: {}, Host Name: {}", index, host))
            .collect::<Vec<_>>()
            .join("; ");
        Err(ControllerError::UnmatchedNodes(list))
    }

    async fn set_allocated_node_hostname(&self, info: &NodeInfo, host_name: &str) -> Result<(), ControllerError> {
        update_status_with_retry(
            self.stores.allocated_nodes.as_ref(),
            &self.retry,
            &info.namespace,
            &info.node_name,
            |node: &mut AllocatedNode| {
                let status = node.status.get_or_insert_with(Default::default);
                if status.hostname == host_name {
                    return false;
                }
                status.hostname = host_name.to_string();
                true
            },
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "cluster_instance_test.rs"]
mod tests;
