//! NodeAllocationRequest watcher.

use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use controller_common::watch_resource;
use crds::NodeAllocationRequest;
use kube::Api;
use std::sync::Arc;

/// Watches NodeAllocationRequests for changes.
pub struct Watcher {
    reconciler: Arc<Reconciler>,
    node_allocation_request_api: Api<NodeAllocationRequest>,
}

impl Watcher {
    pub fn new(reconciler: Arc<Reconciler>, node_allocation_request_api: Api<NodeAllocationRequest>) -> Self {
        Self {
            reconciler,
            node_allocation_request_api,
        }
    }

    pub async fn watch_node_allocation_requests(&self) -> Result<(), ControllerError> {
        watch_resource(
            self.node_allocation_request_api.clone(),
            self.reconciler.clone(),
            |reconciler: Arc<Reconciler>, resource: Arc<NodeAllocationRequest>| async move {
                reconciler.reconcile_node_allocation_request(&resource).await
            },
            "NodeAllocationRequest",
        )
        .await;
        Ok(())
    }
}
