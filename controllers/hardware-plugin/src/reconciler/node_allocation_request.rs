//! NodeAllocationRequest reconciliation
//!
//! One pass:
//! 1. ignore requests addressed to another plugin
//! 2. on deletion, release the hardware and drop the finalizer
//! 3. otherwise make sure the finalizer is present
//! 4. ask the plugin to allocate (spec changed, not yet provisioned, or a
//!    configuration change still running) or just to summarise
//! 5. write the plugin's answer back as conditions

use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crds::{
    hardware_condition, reason, set_condition, Condition, ConditionStatus, NodeAllocationRequest,
    NODE_ALLOCATION_REQUEST_FINALIZER,
};
use hwmgr_plugins::RequestStatus;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use resource_store::{update_status_with_retry, update_with_retry};
use tracing::{debug, info, warn};

impl Reconciler {
    pub async fn reconcile_node_allocation_request(
        &self,
        request: &NodeAllocationRequest,
    ) -> Result<Action, ControllerError> {
        let name = request.name_any();
        let namespace = request.namespace().unwrap_or_else(|| "default".to_string());
        let resource_key = format!("{}/{}", namespace, name);

        if request.spec.hw_mgr_id != self.plugin.id() {
            debug!(
                "NodeAllocationRequest {} is served by {}, not {}",
                resource_key,
                request.spec.hw_mgr_id,
                self.plugin.id()
            );
            return Ok(Action::await_change());
        }

        if request.metadata.deletion_timestamp.is_some() {
            self.finalize_request(request, &namespace, &name).await?;
            self.reset_error(&resource_key);
            return Ok(Action::await_change());
        }

        self.ensure_finalizer(request, &namespace, &name).await?;

        if is_failed_for_generation(request) {
            debug!("NodeAllocationRequest {} failed for its current generation", resource_key);
            self.reset_error(&resource_key);
            return Ok(Action::await_change());
        }

        let result = if needs_allocation(request) {
            info!("Allocating hardware for NodeAllocationRequest {}", resource_key);
            self.plugin.allocate(request).await
        } else {
            self.plugin.status(request).await
        };

        let status = match result {
            Ok(status) => status,
            Err(e) if e.is_validation() => {
                warn!("NodeAllocationRequest {} rejected: {}", resource_key, e);
                let node_names = request
                    .status
                    .as_ref()
                    .map(|s| s.node_names.clone())
                    .unwrap_or_default();
                RequestStatus::failed(node_names, e.to_string())
            }
            Err(e) => return Err(e.into()),
        };

        self.write_status(request, &namespace, &name, &status).await?;
        self.reset_error(&resource_key);

        if is_in_progress(&status) {
            debug!(
                "NodeAllocationRequest {} in progress, requeue in {}s",
                resource_key,
                self.requeue.as_secs()
            );
            Ok(Action::requeue(self.requeue))
        } else {
            Ok(Action::await_change())
        }
    }

    async fn ensure_finalizer(
        &self,
        request: &NodeAllocationRequest,
        namespace: &str,
        name: &str,
    ) -> Result<(), ControllerError> {
        if has_finalizer(request) {
            return Ok(());
        }
        update_with_retry(self.requests.as_ref(), &self.retry, namespace, name, |r: &mut NodeAllocationRequest| {
            if has_finalizer(r) {
                return false;
            }
            r.finalizers_mut().push(NODE_ALLOCATION_REQUEST_FINALIZER.to_string());
            true
        })
        .await?;
        debug!("Added finalizer to NodeAllocationRequest {}/{}", namespace, name);
        Ok(())
    }

    async fn finalize_request(
        &self,
        request: &NodeAllocationRequest,
        namespace: &str,
        name: &str,
    ) -> Result<(), ControllerError> {
        if !has_finalizer(request) {
            return Ok(());
        }

        info!("Releasing hardware of NodeAllocationRequest {}/{}", namespace, name);
        self.plugin.deallocate(request).await?;

        let removed = update_with_retry(self.requests.as_ref(), &self.retry, namespace, name, |r: &mut NodeAllocationRequest| {
            let before = r.finalizers().len();
            r.finalizers_mut().retain(|f| f != NODE_ALLOCATION_REQUEST_FINALIZER);
            r.finalizers().len() != before
        })
        .await;
        match removed {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_status(
        &self,
        request: &NodeAllocationRequest,
        namespace: &str,
        name: &str,
        result: &RequestStatus,
    ) -> Result<(), ControllerError> {
        let generation = request.metadata.generation;
        update_status_with_retry(self.requests.as_ref(), &self.retry, namespace, name, |r: &mut NodeAllocationRequest| {
            let status = r.status.get_or_insert_with(Default::default);
            let mut changed = apply_condition(&mut status.conditions, &result.provisioned);
            if let Some(configured) = &result.configured {
                changed |= apply_condition(&mut status.conditions, configured);
            }
            if status.node_names != result.node_names {
                status.node_names = result.node_names.clone();
                changed = true;
            }
            if status.observed_generation != generation {
                status.observed_generation = generation;
                changed = true;
            }
            changed
        })
        .await?;
        Ok(())
    }
}

fn has_finalizer(request: &NodeAllocationRequest) -> bool {
    request
        .finalizers()
        .iter()
        .any(|f| f == NODE_ALLOCATION_REQUEST_FINALIZER)
}

fn apply_condition(conditions: &mut Vec<Condition>, condition: &Condition) -> bool {
    set_condition(
        conditions,
        &condition.type_,
        condition.status,
        &condition.reason,
        &condition.message,
    )
}

fn observed_current_generation(request: &NodeAllocationRequest) -> bool {
    request.status.as_ref().and_then(|s| s.observed_generation) == request.metadata.generation
}

/// Provisioning failed and the request generation has not changed since
pub(crate) fn is_failed_for_generation(request: &NodeAllocationRequest) -> bool {
    observed_current_generation(request)
        && request
            .condition(hardware_condition::PROVISIONED)
            .is_some_and(|c| c.status == ConditionStatus::False && c.reason == reason::FAILED)
}

/// Whether the plugin has to act on the request rather than only report on it
pub(crate) fn needs_allocation(request: &NodeAllocationRequest) -> bool {
    if !observed_current_generation(request) || !request.is_provisioned() {
        return true;
    }
    request
        .condition(hardware_condition::CONFIGURED)
        .is_some_and(|c| c.status == ConditionStatus::False && c.reason == reason::IN_PROGRESS)
}

pub(crate) fn is_in_progress(status: &RequestStatus) -> bool {
    status.provisioned.reason == reason::IN_PROGRESS
        || status
            .configured
            .as_ref()
            .is_some_and(|c| c.reason == reason::IN_PROGRESS)
}

#[cfg(test)]
#[path = "node_allocation_request_test.rs"]
mod tests;
