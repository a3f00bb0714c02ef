//! Main controller implementation.
//!
//! Wires the object stores into the reconciler and runs the
//! ProvisioningRequest watcher until shutdown.

use crate::config::Settings;
use crate::error::ControllerError;
use crate::reconciler::{Reconciler, Stores};
use crate::watcher::Watcher;
use crds::{AllocatedNode, ClusterInstance, HardwareTemplate, NodeAllocationRequest, ProvisioningRequest};
use kube::{Api, Client};
use resource_store::{KubeStore, RetryContext};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Main controller for ProvisioningRequests.
pub struct Controller {
    provisioning_request_watcher: JoinHandle<Result<(), ControllerError>>,
    shutdown: CancellationToken,
}

impl Controller {
    /// Creates a new controller instance.
    pub async fn new(settings: Settings) -> Result<Self, ControllerError> {
        info!("Initializing Provisioning Controller");

        let kube_client = Client::try_default().await
            .map_err(|e| ControllerError::Kube(e.into()))?;

        let shutdown = CancellationToken::new();
        let retry = RetryContext {
            cancel: shutdown.clone(),
            ..Default::default()
        };

        let stores = Stores {
            provisioning_requests: Arc::new(KubeStore::<ProvisioningRequest>::new(kube_client.clone())),
            node_allocation_requests: Arc::new(KubeStore::<NodeAllocationRequest>::new(kube_client.clone())),
            hardware_templates: Arc::new(KubeStore::<HardwareTemplate>::new(kube_client.clone())),
            cluster_instances: Arc::new(KubeStore::<ClusterInstance>::new(kube_client.clone())),
            allocated_nodes: Arc::new(KubeStore::<AllocatedNode>::new(kube_client.clone())),
        };

        let provisioning_request_api: Api<ProvisioningRequest> =
            Api::namespaced(kube_client, settings.watch_namespace());

        let reconciler = Arc::new(Reconciler::new(stores, settings, retry));
        let watcher_instance = Arc::new(Watcher::new(reconciler, provisioning_request_api));

        let provisioning_request_watcher = {
            let watcher = watcher_instance;
            tokio::spawn(async move {
                watcher.watch_provisioning_requests().await
            })
        };

        Ok(Self {
            provisioning_request_watcher,
            shutdown,
        })
    }

    /// Runs the controller until the watcher exits or the process is interrupted.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("Provisioning Controller running");

        tokio::select! {
            result = &mut self.provisioning_request_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("ProvisioningRequest watcher panicked: {}", e)))?
                    .map_err(|e| ControllerError::Watch(format!("ProvisioningRequest watcher error: {}", e)))?;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested, cancelling in-flight retries");
                self.shutdown.cancel();
            }
        }

        Ok(())
    }
}
