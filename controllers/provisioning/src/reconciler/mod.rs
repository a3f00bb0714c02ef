//! Reconciliation logic for ProvisioningRequests.
//!
//! A pass works on a [`ProvisioningTask`], a working copy of the request.
//! Steps record conditions, phase and bookkeeping on the copy and persist it
//! through the status subresource, so every step is safe to repeat.

pub mod cluster_instance;
pub mod hardware_status;
pub mod node_allocation;
pub mod provisioning_request;

use crate::config::Settings;
use crate::error::ControllerError;
use controller_common::ErrorPolicy;
use crds::{
    find_condition, set_condition, AllocatedNode, ClusterInstance, Condition, ConditionStatus, HardwareTemplate,
    NodeAllocationRequest, NodeAllocationRequestRef, ProvisioningPhase, ProvisioningRequest,
    ProvisioningRequestStatus,
};
use kube::ResourceExt;
use resource_store::{update_status_with_retry, ErrorBackoff, ResourceStore, RetryContext};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Object stores the reconciler reads and writes
#[derive(Clone)]
pub struct Stores {
    pub provisioning_requests: Arc<dyn ResourceStore<ProvisioningRequest>>,
    pub node_allocation_requests: Arc<dyn ResourceStore<NodeAllocationRequest>>,
    pub hardware_templates: Arc<dyn ResourceStore<HardwareTemplate>>,
    pub cluster_instances: Arc<dyn ResourceStore<ClusterInstance>>,
    pub allocated_nodes: Arc<dyn ResourceStore<AllocatedNode>>,
}

/// Reconciles ProvisioningRequests.
pub struct Reconciler {
    pub(crate) stores: Stores,
    pub(crate) settings: Settings,
    pub(crate) retry: RetryContext,
    backoff: ErrorBackoff,
}

impl Reconciler {
    /// Creates a new reconciler instance.
    pub fn new(stores: Stores, settings: Settings, retry: RetryContext) -> Self {
        Self {
            stores,
            settings,
            retry,
            backoff: ErrorBackoff::new(),
        }
    }

    /// Reset error tracking for a resource (on successful reconciliation)
    pub fn reset_error(&self, resource_key: &str) {
        self.backoff.reset(resource_key);
    }

    /// Write the task's status if it differs from the stored one
    pub(crate) async fn persist_status(&self, task: &ProvisioningTask) -> Result<(), ControllerError> {
        let desired = task.request.status.clone();
        update_status_with_retry(
            self.stores.provisioning_requests.as_ref(),
            &self.retry,
            &task.namespace,
            &task.name,
            |pr: &mut ProvisioningRequest| {
                if pr.status == desired {
                    return false;
                }
                pr.status = desired.clone();
                true
            },
        )
        .await?;
        debug!("Persisted status of ProvisioningRequest {}", task.key());
        Ok(())
    }
}

impl ErrorPolicy for Reconciler {
    /// Record a failed reconcile of `resource_key` and return the requeue delay
    fn requeue_after_error(&self, resource_key: &str) -> Duration {
        let (delay, error_count) = self.backoff.on_error(resource_key);
        if error_count > 3 {
            warn!(
                "{} failed {} consecutive reconciles, next attempt in {}s",
                resource_key,
                error_count,
                delay.as_secs()
            );
        }
        delay
    }
}

/// Working copy of a ProvisioningRequest for one reconcile pass
#[derive(Debug, Clone)]
pub struct ProvisioningTask {
    pub request: ProvisioningRequest,
    pub namespace: String,
    pub name: String,
    /// Window for each hardware phase
    pub timeout: Duration,
}

impl ProvisioningTask {
    pub fn new(request: ProvisioningRequest, timeout: Duration) -> Self {
        let namespace = request.namespace().unwrap_or_else(|| "default".to_string());
        let name = request.name_any();
        Self {
            request,
            namespace,
            name,
            timeout,
        }
    }

    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    pub fn status_mut(&mut self) -> &mut ProvisioningRequestStatus {
        self.request.status.get_or_insert_with(Default::default)
    }

    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.request
            .status
            .as_ref()
            .and_then(|s| find_condition(&s.conditions, type_))
    }

    pub fn set_condition(&mut self, type_: &str, status: ConditionStatus, reason: &str, message: &str) -> bool {
        set_condition(&mut self.status_mut().conditions, type_, status, reason, message)
    }

    pub fn phase(&self) -> ProvisioningPhase {
        self.request
            .status
            .as_ref()
            .map(|s| s.provisioning_status.provisioning_phase)
            .unwrap_or_default()
    }

    pub fn set_phase(&mut self, phase: ProvisioningPhase, details: &str) -> bool {
        self.status_mut().provisioning_status.set(phase, details)
    }

    pub fn node_allocation_request_ref(&self) -> Option<&NodeAllocationRequestRef> {
        self.request.node_allocation_request_ref()
    }

    pub fn node_allocation_request_ref_mut(&mut self) -> Option<&mut NodeAllocationRequestRef> {
        self.status_mut().extensions.node_allocation_request_ref.as_mut()
    }
}
