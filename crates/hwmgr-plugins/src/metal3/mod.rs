//! Metal3 hardware plugin
//!
//! Serves NodeAllocationRequests from BareMetalHosts managed by the Bare
//! Metal Operator. Hosts are claimed by labelling them, configuration
//! changes are requested through host annotations, and hosts are wiped and
//! powered off when released.

pub mod allocation;
pub mod constants;
pub mod host_manager;

pub use constants::*;
pub use host_manager::*;

use crate::error::PluginError;
use crate::nodes::{request_nodes, summarize};
use crate::plugin::{AllocationScope, HardwarePlugin, Host, RequestStatus};
use crds::{AllocatedNode, BareMetalHost, Interface, NodeAllocationRequest, NodeGroupData, PreprovisioningImage};
use kube::Client;
use resource_store::{KubeStore, RetryContext};
use std::sync::Arc;

/// Namespace the Bare Metal Operator keeps hosts in by default
pub const DEFAULT_HOST_NAMESPACE: &str = "openshift-machine-api";

/// BareMetalHost-backed plugin
#[derive(Debug)]
pub struct Metal3Plugin {
    manager: HostManager,
    host_namespace: String,
}

impl Metal3Plugin {
    pub fn new(manager: HostManager, host_namespace: impl Into<String>) -> Self {
        Self {
            manager,
            host_namespace: host_namespace.into(),
        }
    }

    /// Plugin talking to the cluster through `client`
    pub fn from_client(client: Client, host_namespace: impl Into<String>, retry: RetryContext) -> Self {
        let manager = HostManager::new(
            Arc::new(KubeStore::<BareMetalHost>::new(client.clone())),
            Arc::new(KubeStore::<PreprovisioningImage>::new(client.clone())),
            Arc::new(KubeStore::<AllocatedNode>::new(client)),
            retry,
        );
        Self::new(manager, host_namespace)
    }

    pub fn manager(&self) -> &HostManager {
        &self.manager
    }

    pub fn host_namespace(&self) -> &str {
        &self.host_namespace
    }
}

#[async_trait::async_trait]
impl HardwarePlugin for Metal3Plugin {
    fn id(&self) -> &str {
        METAL3_PLUGIN_ID
    }

    async fn list_candidates(
        &self,
        site: &str,
        group: &NodeGroupData,
        scope: AllocationScope,
    ) -> Result<Vec<Host>, PluginError> {
        let hosts = self
            .manager
            .fetch_candidates(site, group, scope, &self.host_namespace)
            .await?;
        Ok(hosts.iter().map(host_view).collect())
    }

    async fn allocate(&self, request: &NodeAllocationRequest) -> Result<RequestStatus, PluginError> {
        self.process_request(request).await
    }

    async fn deallocate(&self, request: &NodeAllocationRequest) -> Result<(), PluginError> {
        self.release_request(request).await
    }

    async fn build_interfaces(
        &self,
        request: &NodeAllocationRequest,
        host: &Host,
    ) -> Result<Vec<Interface>, PluginError> {
        let bmh = self.manager.hosts().get(&host.namespace, &host.id).await?;
        build_interfaces(request, &bmh)
    }

    async fn status(&self, request: &NodeAllocationRequest) -> Result<RequestStatus, PluginError> {
        let nodes = request_nodes(self.manager.nodes(), request).await?;
        Ok(summarize(request, &nodes))
    }
}
