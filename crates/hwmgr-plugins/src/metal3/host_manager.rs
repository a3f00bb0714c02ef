//! BareMetalHost allocation state machine
//!
//! A host moves `Unallocated -> Allocated -> (configuration annotations
//! added/removed)* -> Deallocating -> Unallocated`. Only the labels and
//! annotations listed in [`constants`](super::constants) are owned here; the
//! host itself belongs to the Bare Metal Operator. Every write goes through the
//! conflict-retrying helpers of `resource_store`, and every step is
//! idempotent so an interrupted deallocation can simply be run again.

use super::constants::*;
use crate::error::PluginError;
use crate::plugin::{AllocationScope, Host, HostPool};
use crds::{
    AllocatedNode, BareMetalHost, BmcInfo, CleaningMode, HostProvisioningState, Interface, NodeAllocationRequest,
    NodeGroupData, PreprovisioningImage,
};
use kube::ResourceExt;
use resource_store::{
    update_meta_with_retry, update_with_retry, LabelSelector, MetaMutation, ResourceStore, RetryContext,
    StoreError,
};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info};

/// Whether the host carries `allocated=true`
pub fn is_allocated(host: &BareMetalHost) -> bool {
    host.labels().get(ALLOCATED_LABEL).is_some_and(|v| v == VALUE_TRUE)
}

/// Whether the host is in the given provisioning state
pub fn check_host_state(host: &BareMetalHost, state: HostProvisioningState) -> bool {
    let current = host.provisioning_state();
    if current != state {
        debug!(
            "BareMetalHost {}/{} is in state {:?}, waiting for {:?}",
            host.namespace().unwrap_or_default(),
            host.name_any(),
            current,
            state
        );
        return false;
    }
    true
}

/// Keep hosts in the `available` provisioning state, preserving order
pub fn filter_available(hosts: Vec<BareMetalHost>) -> Vec<BareMetalHost> {
    hosts
        .into_iter()
        .filter(|h| check_host_state(h, HostProvisioningState::Available))
        .collect()
}

/// Group hosts by their resource pool label; unlabelled hosts are dropped
pub fn group_by_resource_pool(hosts: impl IntoIterator<Item = BareMetalHost>) -> HostPool<BareMetalHost> {
    let mut grouped = HostPool::new();
    for host in hosts {
        let Some(pool) = host.labels().get(RESOURCE_POOL_ID_LABEL).cloned() else {
            continue;
        };
        grouped.entry(pool).or_insert_with(VecDeque::new).push_back(host);
    }
    grouped
}

/// `aa-bb-cc-dd-ee-ff` -> `aa:bb:cc:dd:ee:ff`
fn normalize_mac(mac: &str) -> String {
    mac.replace('-', ":")
}

/// Build the interface list of a host for a request.
///
/// The NIC whose MAC equals the host's boot MAC gets the request's boot
/// interface label; other NICs take the label named by a matching
/// `interfacelabel.clcm.openshift.io/<label>` host label.
pub fn build_interfaces(
    request: &NodeAllocationRequest,
    host: &BareMetalHost,
) -> Result<Vec<Interface>, PluginError> {
    let details = host
        .hardware_details()
        .ok_or_else(|| PluginError::MissingHardwareDetails(host.name_any()))?;
    let boot_mac = host.spec.boot_mac_address.as_deref().unwrap_or_default();

    let interfaces = details
        .nics
        .iter()
        .map(|nic| {
            let label = if !boot_mac.is_empty() && nic.mac.eq_ignore_ascii_case(boot_mac) {
                request.spec.boot_interface_label.clone()
            } else {
                host.labels()
                    .iter()
                    .filter_map(|(key, value)| {
                        key.strip_prefix(INTERFACE_LABEL_PREFIX)
                            .filter(|_| normalize_mac(value).eq_ignore_ascii_case(&nic.mac))
                    })
                    .next()
                    .unwrap_or_default()
                    .to_string()
            };
            Interface {
                name: nic.name.clone(),
                label,
                mac_address: nic.mac.clone(),
            }
        })
        .collect();
    Ok(interfaces)
}

/// Backend-neutral view of a BareMetalHost
pub fn host_view(host: &BareMetalHost) -> Host {
    let labels = host.labels();
    Host {
        id: host.name_any(),
        namespace: host.namespace().unwrap_or_default(),
        site_id: labels.get(SITE_ID_LABEL).cloned(),
        resource_pool_id: labels.get(RESOURCE_POOL_ID_LABEL).cloned(),
        available: host.provisioning_state() == HostProvisioningState::Available,
        allocated: is_allocated(host),
        allocated_node: labels.get(ALLOCATED_NODE_LABEL).cloned(),
        bmc: host.spec.bmc.as_ref().map(|b| BmcInfo {
            address: b.address.clone(),
            credentials_name: b.credentials_name.clone(),
        }),
        boot_mac_address: host.spec.boot_mac_address.clone(),
        network_data_ref: host.spec.preprovisioning_network_data_name.clone(),
    }
}

/// Label selector for a node group's candidates at a site
pub fn candidate_selector(site: &str, group: &NodeGroupData, scope: AllocationScope) -> LabelSelector {
    let mut selector = LabelSelector::new().eq(SITE_ID_LABEL, site);
    if !group.resource_pool_id.is_empty() {
        selector = selector.eq(RESOURCE_POOL_ID_LABEL, group.resource_pool_id.clone());
    }
    selector = selector.match_labels(&group.resource_selector);
    match scope {
        AllocationScope::All => selector,
        AllocationScope::Allocated => selector.eq(ALLOCATED_LABEL, VALUE_TRUE),
        AllocationScope::Unallocated => selector.not_eq(ALLOCATED_LABEL, VALUE_TRUE),
    }
}

fn host_name(host: &BareMetalHost) -> (String, String) {
    (host.namespace().unwrap_or_default(), host.name_any())
}

/// Claims, configures and releases BareMetalHosts
pub struct HostManager {
    hosts: Arc<dyn ResourceStore<BareMetalHost>>,
    images: Arc<dyn ResourceStore<PreprovisioningImage>>,
    nodes: Arc<dyn ResourceStore<AllocatedNode>>,
    retry: RetryContext,
}

impl std::fmt::Debug for HostManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostManager").field("retry", &self.retry).finish_non_exhaustive()
    }
}

impl HostManager {
    pub fn new(
        hosts: Arc<dyn ResourceStore<BareMetalHost>>,
        images: Arc<dyn ResourceStore<PreprovisioningImage>>,
        nodes: Arc<dyn ResourceStore<AllocatedNode>>,
        retry: RetryContext,
    ) -> Self {
        Self {
            hosts,
            images,
            nodes,
            retry,
        }
    }

    pub(crate) fn hosts(&self) -> &dyn ResourceStore<BareMetalHost> {
        self.hosts.as_ref()
    }

    pub(crate) fn nodes(&self) -> &dyn ResourceStore<AllocatedNode> {
        self.nodes.as_ref()
    }

    pub(crate) fn retry(&self) -> &RetryContext {
        &self.retry
    }

    async fn mutate_host(&self, namespace: &str, name: &str, mutation: MetaMutation) -> Result<BareMetalHost, PluginError> {
        Ok(update_meta_with_retry(self.hosts.as_ref(), &self.retry, namespace, name, &mutation).await?)
    }

    /// Hosts at `site` matching the group's pool, selector and allocation scope, ordered by name
    pub async fn fetch_candidates(
        &self,
        site: &str,
        group: &NodeGroupData,
        scope: AllocationScope,
        namespace: &str,
    ) -> Result<Vec<BareMetalHost>, PluginError> {
        let selector = candidate_selector(site, group, scope);
        let hosts = self.hosts.list(namespace, &selector).await?;
        debug!(
            "Found {} {} BareMetalHosts in {} for site {} pool {}",
            hosts.len(),
            scope,
            namespace,
            site,
            group.resource_pool_id
        );
        Ok(hosts)
    }

    /// Set `allocated=true`; no write when already set
    pub async fn mark_allocated(&self, host: &BareMetalHost) -> Result<(), PluginError> {
        let (ns, name) = host_name(host);
        if is_allocated(host) {
            debug!("BareMetalHost {}/{} already allocated", ns, name);
            return Ok(());
        }
        self.mutate_host(&ns, &name, MetaMutation::add_label(ALLOCATED_LABEL, VALUE_TRUE))
            .await?;
        info!("Marked BareMetalHost {}/{} allocated", ns, name);
        Ok(())
    }

    /// Record `node_name` as the owner of the host.
    ///
    /// Fails with [`PluginError::HostClaimed`] when another node got there first.
    pub async fn claim_host(&self, host: &BareMetalHost, node_name: &str) -> Result<BareMetalHost, PluginError> {
        let (ns, name) = host_name(host);
        let updated = update_with_retry(self.hosts.as_ref(), &self.retry, &ns, &name, |h: &mut BareMetalHost| {
            let labels = h.labels_mut();
            if labels.contains_key(ALLOCATED_NODE_LABEL) {
                return false;
            }
            labels.insert(ALLOCATED_NODE_LABEL.to_string(), node_name.to_string());
            true
        })
        .await?;

        match updated.labels().get(ALLOCATED_NODE_LABEL) {
            Some(owner) if owner == node_name => {
                self.mark_allocated(&updated).await?;
                Ok(updated)
            }
            Some(owner) => Err(PluginError::HostClaimed {
                host: format!("{}/{}", ns, name),
                owner: owner.clone(),
            }),
            None => Err(PluginError::Validation(format!(
                "BareMetalHost {}/{} lost its {} label",
                ns, name, ALLOCATED_NODE_LABEL
            ))),
        }
    }

    /// Add the host-management annotation; a present key (even empty) is left alone
    pub async fn allow_host_management(&self, host: &BareMetalHost) -> Result<(), PluginError> {
        let (ns, name) = host_name(host);
        update_with_retry(self.hosts.as_ref(), &self.retry, &ns, &name, |h: &mut BareMetalHost| {
            let annotations = h.annotations_mut();
            if annotations.contains_key(HOST_MGMT_ANNOTATION) {
                return false;
            }
            annotations.insert(HOST_MGMT_ANNOTATION.to_string(), String::new());
            true
        })
        .await?;
        Ok(())
    }

    /// Request a reboot; always written since presence is the trigger
    pub async fn add_reboot_annotation(&self, host: &BareMetalHost) -> Result<(), PluginError> {
        let (ns, name) = host_name(host);
        update_with_retry(self.hosts.as_ref(), &self.retry, &ns, &name, |h: &mut BareMetalHost| {
            h.annotations_mut().insert(REBOOT_ANNOTATION.to_string(), String::new());
            true
        })
        .await?;
        info!("Requested reboot of BareMetalHost {}/{}", ns, name);
        Ok(())
    }

    /// Flag a pending BIOS settings update on the host
    pub async fn add_bios_update_annotation(&self, host: &BareMetalHost) -> Result<(), PluginError> {
        let (ns, name) = host_name(host);
        self.mutate_host(&ns, &name, MetaMutation::add_annotation(BIOS_UPDATE_NEEDED_ANNOTATION, VALUE_TRUE))
            .await?;
        Ok(())
    }

    /// Drop the BIOS and firmware update flags
    pub async fn clear_update_annotations(&self, host: &BareMetalHost) -> Result<(), PluginError> {
        let (ns, name) = host_name(host);
        for key in [BIOS_UPDATE_NEEDED_ANNOTATION, FIRMWARE_UPDATE_NEEDED_ANNOTATION] {
            self.mutate_host(&ns, &name, MetaMutation::remove_annotation(key)).await?;
        }
        Ok(())
    }

    /// Blank the pre-provisioning network data reference
    pub async fn clear_network_data(&self, host: &BareMetalHost) -> Result<(), PluginError> {
        let (ns, name) = host_name(host);
        update_with_retry(self.hosts.as_ref(), &self.retry, &ns, &name, |h: &mut BareMetalHost| {
            if h.spec.preprovisioning_network_data_name.as_deref().unwrap_or_default().is_empty() {
                return false;
            }
            h.spec.preprovisioning_network_data_name = None;
            true
        })
        .await?;
        Ok(())
    }

    /// Return the host to the unallocated pool.
    ///
    /// Removes the allocation labels and update annotations, unsets
    /// customDeploy/image and powers the host off. A host that was
    /// provisioned gets metadata cleaning so it is wiped before reuse.
    ///
    /// The pre-provisioning network data reference is cleared, not reset to
    /// a per-host `network-data-<host>` default; whoever enrolls the host
    /// again is expected to set it.
    pub async fn finalize_deallocation(&self, host: &BareMetalHost) -> Result<(), PluginError> {
        let (ns, name) = host_name(host);
        info!("Deallocating BareMetalHost {}/{}", ns, name);

        for label in [SITE_CONFIG_OWNED_BY_LABEL, ALLOCATED_LABEL, ALLOCATED_NODE_LABEL] {
            self.mutate_host(&ns, &name, MetaMutation::remove_label(label)).await?;
        }
        self.clear_update_annotations(host).await?;
        self.clear_network_data(host).await?;

        update_with_retry(self.hosts.as_ref(), &self.retry, &ns, &name, |h: &mut BareMetalHost| {
            let mut changed = false;
            if h.spec.custom_deploy.is_some() {
                h.spec.custom_deploy = None;
                changed = true;
            }
            if h.spec.image.is_some() {
                h.spec.image = None;
                changed = true;
            }
            if h.spec.online {
                h.spec.online = false;
                changed = true;
            }
            if h.provisioning_state() == HostProvisioningState::Provisioned
                && h.spec.automated_cleaning_mode != Some(CleaningMode::Metadata)
            {
                h.spec.automated_cleaning_mode = Some(CleaningMode::Metadata);
                changed = true;
            }
            changed
        })
        .await?;
        Ok(())
    }

    /// Remove the InfraEnv label from a host and its PreprovisioningImage.
    ///
    /// Either object being absent is fine.
    pub async fn remove_infra_env_label(&self, namespace: &str, name: &str) -> Result<(), PluginError> {
        let mutation = MetaMutation::remove_label(INFRA_ENV_LABEL);
        match update_meta_with_retry(self.hosts.as_ref(), &self.retry, namespace, name, &mutation).await {
            Ok(_) => {}
            Err(e) if e.is_not_found() => debug!("BareMetalHost {}/{} not found", namespace, name),
            Err(e) => return Err(e.into()),
        }
        match update_meta_with_retry(self.images.as_ref(), &self.retry, namespace, name, &mutation).await {
            Ok(_) => {}
            Err(e) if e.is_not_found() => debug!("PreprovisioningImage {}/{} not found", namespace, name),
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    /// Resolve an AllocatedNode to its BareMetalHost
    pub async fn get_host_for_node(&self, node: &AllocatedNode) -> Result<BareMetalHost, PluginError> {
        let ns = &node.spec.hw_mgr_node_ns;
        let name = &node.spec.hw_mgr_node_id;
        match self.hosts.get(ns, name).await {
            Ok(host) => Ok(host),
            Err(StoreError::NotFound { .. }) => Err(PluginError::HostNotFound {
                node: node.name_any(),
                namespace: ns.clone(),
                name: name.clone(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Mark an AllocatedNode as being reconfigured for `reason`
    pub async fn annotate_node_config_in_progress(
        &self,
        namespace: &str,
        node_name: &str,
        reason: &str,
    ) -> Result<(), PluginError> {
        update_meta_with_retry(
            self.nodes.as_ref(),
            &self.retry,
            namespace,
            node_name,
            &MetaMutation::add_annotation(CONFIG_ANNOTATION, reason),
        )
        .await?;
        Ok(())
    }

    pub async fn clear_node_config_in_progress(&self, namespace: &str, node_name: &str) -> Result<(), PluginError> {
        update_meta_with_retry(
            self.nodes.as_ref(),
            &self.retry,
            namespace,
            node_name,
            &MetaMutation::remove_annotation(CONFIG_ANNOTATION),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "host_manager_test.rs"]
mod tests;
