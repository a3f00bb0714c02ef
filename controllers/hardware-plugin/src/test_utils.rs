//! Test utilities for unit testing the reconciler
//!
//! Provides request builders and a scripted plugin that records calls.

#[cfg(test)]
use crate::reconciler::Reconciler;
#[cfg(test)]
use crds::*;
#[cfg(test)]
use hwmgr_plugins::{AllocationScope, HardwarePlugin, Host, PluginError, RequestStatus};
#[cfg(test)]
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
#[cfg(test)]
use resource_store::{MockStore, RetryConfig, RetryContext, StoreError};
#[cfg(test)]
use std::sync::{Arc, Mutex};
#[cfg(test)]
use std::time::Duration;
#[cfg(test)]
use tokio_util::sync::CancellationToken;

/// Requeue interval used by test reconcilers
#[cfg(test)]
pub const TEST_REQUEUE: Duration = Duration::from_secs(30);

/// Helper to create a test NodeAllocationRequest with one controller group
#[cfg(test)]
pub fn create_test_node_allocation_request(
    name: &str,
    namespace: &str,
    hw_mgr_id: &str,
    size: u32,
) -> NodeAllocationRequest {
    NodeAllocationRequest {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            generation: Some(1),
            ..Default::default()
        },
        spec: NodeAllocationRequestSpec {
            cloud_id: name.to_string(),
            site: "site1".to_string(),
            hw_mgr_id: hw_mgr_id.to_string(),
            boot_interface_label: "bootable-interface".to_string(),
            node_group: vec![NodeGroup {
                node_group_data: NodeGroupData {
                    name: "controller".to_string(),
                    role: "master".to_string(),
                    resource_pool_id: "pool1".to_string(),
                    hw_profile: "profile-a".to_string(),
                    ..Default::default()
                },
                size,
            }],
            ..Default::default()
        },
        status: None,
    }
}

/// Helper to create a reconciler over a mock request store
#[cfg(test)]
pub fn create_test_reconciler(
    plugin: Arc<dyn HardwarePlugin>,
    requests: &MockStore<NodeAllocationRequest>,
) -> Reconciler {
    Reconciler::new(
        plugin,
        Arc::new(requests.clone()),
        RetryContext::new(RetryConfig::immediate(3), CancellationToken::new()),
        TEST_REQUEUE,
    )
}

/// What the scripted plugin answers to allocate/status
#[cfg(test)]
#[derive(Debug, Clone)]
pub enum Answer {
    Status(RequestStatus),
    Invalid(String),
    Unavailable,
}

#[cfg(test)]
impl Answer {
    fn to_result(&self) -> Result<RequestStatus, PluginError> {
        match self {
            Answer::Status(status) => Ok(status.clone()),
            Answer::Invalid(message) => Err(PluginError::Validation(message.clone())),
            Answer::Unavailable => Err(PluginError::Store(StoreError::Conflict {
                kind: "BareMetalHost".to_string(),
                namespace: "hosts".to_string(),
                name: "bmh-1".to_string(),
                message: "retries exhausted".to_string(),
            })),
        }
    }
}

/// Plugin returning a fixed answer and recording which operations ran
#[cfg(test)]
pub struct ScriptedPlugin {
    id: String,
    answer: Mutex<Answer>,
    calls: Mutex<Vec<&'static str>>,
}

#[cfg(test)]
impl ScriptedPlugin {
    pub fn new(id: &str, answer: Answer) -> Self {
        Self {
            id: id.to_string(),
            answer: Mutex::new(answer),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn set_answer(&self, answer: Answer) {
        *self.answer.lock().unwrap() = answer;
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }
}

#[cfg(test)]
#[async_trait::async_trait]
impl HardwarePlugin for ScriptedPlugin {
    fn id(&self) -> &str {
        &self.id
    }

    async fn list_candidates(
        &self,
        _site: &str,
        _group: &NodeGroupData,
        _scope: AllocationScope,
    ) -> Result<Vec<Host>, PluginError> {
        self.record("list_candidates");
        Ok(Vec::new())
    }

    async fn allocate(&self, _request: &NodeAllocationRequest) -> Result<RequestStatus, PluginError> {
        self.record("allocate");
        self.answer.lock().unwrap().to_result()
    }

    async fn deallocate(&self, _request: &NodeAllocationRequest) -> Result<(), PluginError> {
        self.record("deallocate");
        Ok(())
    }

    async fn build_interfaces(
        &self,
        _request: &NodeAllocationRequest,
        _host: &Host,
    ) -> Result<Vec<Interface>, PluginError> {
        self.record("build_interfaces");
        Ok(Vec::new())
    }

    async fn status(&self, _request: &NodeAllocationRequest) -> Result<RequestStatus, PluginError> {
        self.record("status");
        self.answer.lock().unwrap().to_result()
    }
}
