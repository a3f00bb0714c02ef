//! Main controller implementation.
//!
//! Builds the plugin registry, selects the configured plugin and runs the
//! NodeAllocationRequest watcher.

use crate::config::Settings;
use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crate::watcher::Watcher;
use crds::{AllocatedNode, NodeAllocationRequest};
use hwmgr_plugins::{Inventory, LoopbackPlugin, Metal3Plugin, PluginRegistry};
use kube::{Api, Client};
use resource_store::{KubeStore, RetryContext};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Main controller for hardware plugin requests.
pub struct Controller {
    node_allocation_request_watcher: JoinHandle<Result<(), ControllerError>>,
    shutdown: CancellationToken,
}

/// Every plugin that can be built from the settings
pub(crate) async fn build_registry(
    client: &Client,
    settings: &Settings,
    retry: &RetryContext,
) -> Result<PluginRegistry, ControllerError> {
    let mut registry = PluginRegistry::new();
    registry.register(Arc::new(Metal3Plugin::from_client(
        client.clone(),
        settings.host_namespace.clone(),
        retry.clone(),
    )));

    if let Some(path) = &settings.loopback_inventory {
        let inventory = Inventory::load(path).await?;
        info!("Loaded {} loopback hosts from {}", inventory.hosts.len(), path.display());
        registry.register(Arc::new(LoopbackPlugin::new(
            inventory,
            Arc::new(KubeStore::<AllocatedNode>::new(client.clone())),
            settings.watch_namespace(),
            retry.clone(),
        )));
    }
    Ok(registry)
}

impl Controller {
    /// Creates a new controller instance.
    pub async fn new(settings: Settings) -> Result<Self, ControllerError> {
        info!("Initializing Hardware Plugin Controller");

        let kube_client = Client::try_default().await
            .map_err(|e| ControllerError::Kube(e.into()))?;

        let shutdown = CancellationToken::new();
        let retry = RetryContext {
            cancel: shutdown.clone(),
            ..Default::default()
        };

        let registry = build_registry(&kube_client, &settings, &retry).await?;
        let plugin = registry.get(&settings.plugin_id)?;
        info!(
            "Serving {} (registered plugins: {})",
            plugin.id(),
            registry.ids().collect::<Vec<_>>().join(", ")
        );

        let node_allocation_request_api: Api<NodeAllocationRequest> =
            Api::namespaced(kube_client.clone(), settings.watch_namespace());

        let reconciler = Arc::new(Reconciler::new(
            plugin,
            Arc::new(KubeStore::<NodeAllocationRequest>::new(kube_client)),
            retry,
            settings.requeue,
        ));
        let watcher_instance = Arc::new(Watcher::new(reconciler, node_allocation_request_api));

        let node_allocation_request_watcher = {
            let watcher = watcher_instance;
            tokio::spawn(async move {
                watcher.watch_node_allocation_requests().await
            })
        };

        Ok(Self {
            node_allocation_request_watcher,
            shutdown,
        })
    }

    /// Runs the controller until the watcher exits or the process is interrupted.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("Hardware Plugin Controller running");

        tokio::select! {
            result = &mut self.node_allocation_request_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("NodeAllocationRequest watcher panicked: {}", e)))?
                    .map_err(|e| ControllerError::Watch(format!("NodeAllocationRequest watcher error: {}", e)))?;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested, cancelling in-flight retries");
                self.shutdown.cancel();
            }
        }

        Ok(())
    }
}
