//! ProvisioningRequest watcher.

use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use controller_common::watch_resource;
use crds::ProvisioningRequest;
use kube::Api;
use std::sync::Arc;

/// Watches ProvisioningRequests for changes.
pub struct Watcher {
    reconciler: Arc<Reconciler>,
    provisioning_request_api: Api<ProvisioningRequest>,
}

impl Watcher {
    pub fn new(reconciler: Arc<Reconciler>, provisioning_request_api: Api<ProvisioningRequest>) -> Self {
        Self {
            reconciler,
            provisioning_request_api,
        }
    }

    pub async fn watch_provisioning_requests(&self) -> Result<(), ControllerError> {
        watch_resource(
            self.provisioning_request_api.clone(),
            self.reconciler.clone(),
            |reconciler: Arc<Reconciler>, resource: Arc<ProvisioningRequest>| async move {
                reconciler.reconcile_provisioning_request(&resource).await
            },
            "ProvisioningRequest",
        )
        .await;
        Ok(())
    }
}
