//! ProvisioningRequest reconciliation
//!
//! One pass:
//! 1. on deletion, delete the NodeAllocationRequest and wait for the plugin
//!    to release it before dropping the finalizer
//! 2. wait for the ClusterInstance to be rendered
//! 3. render the HardwareTemplate and create or update the NodeAllocationRequest
//! 4. poll Provisioned, then Configured, and settle the provisioning phase
//!
//! Input errors mark the request Failed and wait for it to change.

use crate::error::ControllerError;
use crate::reconciler::{ProvisioningTask, Reconciler};
use crds::{ProvisioningPhase, ProvisioningRequest, PROVISIONING_REQUEST_FINALIZER};
use kube::ResourceExt;
use kube_runtime::controller::Action;
use resource_store::update_with_retry;
use tracing::{debug, info, warn};

impl Reconciler {
    pub async fn reconcile_provisioning_request(
        &self,
        request: &ProvisioningRequest,
    ) -> Result<Action, ControllerError> {
        let mut task = ProvisioningTask::new(request.clone(), self.settings.hardware_provisioning_timeout);
        let resource_key = task.key();

        if request.metadata.deletion_timestamp.is_some() {
            let action = self.finalize_request(&mut task).await?;
            self.reset_error(&resource_key);
            return Ok(action);
        }

        self.ensure_finalizer(&task).await?;

        match self.provision_hardware(&mut task).await {
            Ok(action) => {
                self.reset_error(&resource_key);
                Ok(action)
            }
            Err(e) if e.is_input_error() => {
                warn!("ProvisioningRequest {} failed: {}", resource_key, e);
                if task.phase() != ProvisioningPhase::Failed {
                    task.set_phase(ProvisioningPhase::Failed, &e.to_string());
                }
                self.persist_status(&task).await?;
                self.reset_error(&resource_key);
                Ok(Action::await_change())
            }
            Err(e) => Err(e),
        }
    }

    async fn provision_hardware(&self, task: &mut ProvisioningTask) -> Result<Action, ControllerError> {
        let cluster_name = task.request.spec.cluster_instance.clone();
        let Some(cluster) = self.stores.cluster_instances.get_opt(&task.namespace, &cluster_name).await? else {
            let message = format!("Waiting for ClusterInstance ({}) to be rendered", cluster_name);
            debug!("{}: {}", task.key(), message);
            if task.set_phase(ProvisioningPhase::Pending, &message) {
                self.persist_status(task).await?;
            }
            return Ok(Action::requeue(self.settings.requeue));
        };

        let generation = task.request.metadata.generation;
        task.status_mut().observed_generation = generation;

        let desired = self.render_hardware_template(task, &cluster).await?;
        self.create_or_update_node_allocation_request(task, desired).await?;

        let data = self.wait_for_hardware_data(task).await?;
        if data.timed_out_or_failed {
            return Ok(Action::await_change());
        }
        if data.provisioned && data.configured.unwrap_or(true) {
            if task.set_phase(ProvisioningPhase::Fulfilled, "Hardware provisioning is complete") {
                info!("Hardware provisioning of {} is complete", task.key());
                self.persist_status(task).await?;
            }
            return Ok(Action::await_change());
        }

        debug!(
            "Hardware of {} not ready, requeue in {}s",
            task.key(),
            self.settings.requeue.as_secs()
        );
        Ok(Action::requeue(self.settings.requeue))
    }

    async fn ensure_finalizer(&self, task: &ProvisioningTask) -> Result<(), ControllerError> {
        if has_finalizer(&task.request) {
            return Ok(());
        }
        update_with_retry(
            self.stores.provisioning_requests.as_ref(),
            &self.retry,
            &task.namespace,
            &task.name,
            |pr: &mut ProvisioningRequest| {
                if has_finalizer(pr) {
                    return false;
                }
                pr.finalizers_mut().push(PROVISIONING_REQUEST_FINALIZER.to_string());
                true
            },
        )
        .await?;
        debug!("Added finalizer to ProvisioningRequest {}", task.key());
        Ok(())
    }

    /// Delete the NodeAllocationRequest; the finalizer goes once it is gone
    async fn finalize_request(&self, task: &mut ProvisioningTask) -> Result<Action, ControllerError> {
        if !has_finalizer(&task.request) {
            return Ok(Action::await_change());
        }

        if task.set_phase(ProvisioningPhase::Deleting, "Deletion is in progress") {
            self.persist_status(task).await?;
        }

        if let Some(nar_ref) = task.node_allocation_request_ref() {
            let namespace = if nar_ref.namespace.is_empty() {
                self.settings.plugin_namespace.clone()
            } else {
                nar_ref.namespace.clone()
            };
            let name = nar_ref.node_allocation_request_id.clone();
            let store = self.stores.node_allocation_requests.as_ref();

            if store.get_opt(&namespace, &name).await?.is_some() {
                info!("Deleting NodeAllocationRequest {}/{} of {}", namespace, name, task.key());
                store.delete(&namespace, &name).await?;
                if store.get_opt(&namespace, &name).await?.is_some() {
                    debug!("Waiting for NodeAllocationRequest {}/{} to be released", namespace, name);
                    return Ok(Action::requeue(self.settings.requeue));
                }
            }
        }

        let removed = update_with_retry(
            self.stores.provisioning_requests.as_ref(),
            &self.retry,
            &task.namespace,
            &task.name,
            |pr: &mut ProvisioningRequest| {
                let before = pr.finalizers().len();
                pr.finalizers_mut().retain(|f| f != PROVISIONING_REQUEST_FINALIZER);
                pr.finalizers().len() != before
            },
        )
        .await;
        match removed {
            Ok(_) => {
                info!("Released ProvisioningRequest {}", task.key());
                Ok(Action::await_change())
            }
            Err(e) if e.is_not_found() => Ok(Action::await_change()),
            Err(e) => Err(e.into()),
        }
    }
}

fn has_finalizer(request: &ProvisioningRequest) -> bool {
    request
        .finalizers()
        .iter()
        .any(|f| f == PROVISIONING_REQUEST_FINALIZER)
}

#[cfg(test)]
#[path = "provisioning_request_test.rs"]
mod tests;
