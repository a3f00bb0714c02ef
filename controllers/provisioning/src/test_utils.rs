//! Test utilities for unit testing the reconciler
//!
//! Provides object builders and a [`TestEnv`] bundling one mock store per
//! kind with a reconciler over them.

#[cfg(test)]
use crate::config::Settings;
#[cfg(test)]
use crate::reconciler::{ProvisioningTask, Reconciler, Stores};
#[cfg(test)]
use crds::*;
#[cfg(test)]
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
#[cfg(test)]
use resource_store::{MockStore, RetryConfig, RetryContext};
#[cfg(test)]
use serde_json::{json, Value};
#[cfg(test)]
use std::collections::BTreeMap;
#[cfg(test)]
use std::sync::Arc;
#[cfg(test)]
use std::time::Duration;
#[cfg(test)]
use tokio_util::sync::CancellationToken;

#[cfg(test)]
pub const TEST_NS: &str = "clusters";
#[cfg(test)]
pub const PLUGIN_NS: &str = "hwmgr";
#[cfg(test)]
pub const TEST_REQUEUE: Duration = Duration::from_secs(30);
#[cfg(test)]
pub const BOOT_LABEL: &str = "bootable-interface";

#[cfg(test)]
fn meta(name: &str, namespace: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        generation: Some(1),
        ..Default::default()
    }
}

/// Helper to create a ProvisioningRequest for cluster `cluster1` at site1
#[cfg(test)]
pub fn create_test_provisioning_request(name: &str) -> ProvisioningRequest {
    ProvisioningRequest {
        metadata: meta(name, TEST_NS),
        spec: ProvisioningRequestSpec {
            name: None,
            template_name: "sno-ran-du".to_string(),
            template_version: "v4-16-1".to_string(),
            hardware_template: "hwtmpl".to_string(),
            cluster_instance: "cluster1".to_string(),
            template_parameters: json!({"oCloudSiteId": "site1"}),
        },
        status: None,
    }
}

/// Helper to create a HardwareTemplate with a controller and a worker group
#[cfg(test)]
pub fn create_test_hardware_template(name: &str) -> HardwareTemplate {
    let group = |name: &str, role: &str| NodeGroupData {
        name: name.to_string(),
        role: role.to_string(),
        resource_pool_id: format!("{}-pool", name),
        hw_profile: "profile-a".to_string(),
        ..Default::default()
    };
    HardwareTemplate {
        metadata: meta(name, TEST_NS),
        spec: HardwareTemplateSpec {
            hw_mgr_id: "metal3-hwplugin".to_string(),
            boot_interface_label: BOOT_LABEL.to_string(),
            node_group_data: vec![group("controller", "master"), group("worker", "worker")],
            extensions: BTreeMap::new(),
            hardware_provisioning_timeout: None,
        },
        status: None,
    }
}

/// One ClusterInstance node slot with a boot and a data interface
#[cfg(test)]
pub fn node_slot(role: &str, host_name: &str) -> Value {
    json!({
        "role": role,
        "hostName": host_name,
        "nodeNetwork": {
            "interfaces": [
                {"name": "eno1", "label": BOOT_LABEL},
                {"name": "eno2", "label": "data-interface"},
            ],
        },
    })
}

/// Helper to create a ClusterInstance from (role, hostName) slots
#[cfg(test)]
pub fn create_test_cluster_instance(name: &str, slots: &[(&str, &str)]) -> ClusterInstance {
    ClusterInstance {
        metadata: meta(name, TEST_NS),
        spec: ClusterInstanceSpec {
            cluster_name: name.to_string(),
            nodes: slots.iter().map(|(role, host)| node_slot(role, host)).collect(),
            extra: BTreeMap::from([("baseDomain".to_string(), json!("example.com"))]),
        },
    }
}

/// Helper to create an AllocatedNode backed by BareMetalHost `host`
#[cfg(test)]
pub fn create_test_allocated_node(name: &str, nar: &str, group: &str, host: &str, mac_suffix: u8) -> AllocatedNode {
    let mut metadata = meta(name, PLUGIN_NS);
    metadata.labels = Some(BTreeMap::from([(
        NODE_ALLOCATION_REQUEST_LABEL.to_string(),
        nar.to_string(),
    )]));
    AllocatedNode {
        metadata,
        spec: AllocatedNodeSpec {
            node_allocation_request: nar.to_string(),
            group_name: group.to_string(),
            hw_profile: "profile-a".to_string(),
            hw_mgr_id: "metal3-hwplugin".to_string(),
            hw_mgr_node_id: host.to_string(),
            hw_mgr_node_ns: "hosts".to_string(),
        },
        status: Some(AllocatedNodeStatus {
            bmc: Some(BmcInfo {
                address: format!("redfish+https://10.0.0.{}/redfish/v1/Systems/1", mac_suffix),
                credentials_name: format!("{}-bmc-secret", host),
            }),
            interfaces: vec![
                Interface {
                    name: "eno1".to_string(),
                    label: BOOT_LABEL.to_string(),
                    mac_address: format!("00:00:00:01:00:{:02x}", mac_suffix),
                },
                Interface {
                    name: "eno2".to_string(),
                    label: "data-interface".to_string(),
                    mac_address: format!("00:00:00:02:00:{:02x}", mac_suffix),
                },
            ],
            ..Default::default()
        }),
    }
}

/// Mock stores for every kind the reconciler touches
#[cfg(test)]
#[derive(Clone, Default)]
pub struct TestEnv {
    pub provisioning_requests: MockStore<ProvisioningRequest>,
    pub node_allocation_requests: MockStore<NodeAllocationRequest>,
    pub hardware_templates: MockStore<HardwareTemplate>,
    pub cluster_instances: MockStore<ClusterInstance>,
    pub allocated_nodes: MockStore<AllocatedNode>,
}

#[cfg(test)]
impl TestEnv {
    /// Environment seeded with request `pr1`, template `hwtmpl` and a
    /// ClusterInstance with the given slots
    pub fn with_cluster(slots: &[(&str, &str)]) -> Self {
        let env = Self::default();
        env.provisioning_requests.insert(create_test_provisioning_request("pr1"));
        env.hardware_templates.insert(create_test_hardware_template("hwtmpl"));
        env.cluster_instances.insert(create_test_cluster_instance("cluster1", slots));
        env
    }

    pub fn settings() -> Settings {
        Settings {
            namespace: Some(TEST_NS.to_string()),
            plugin_namespace: PLUGIN_NS.to_string(),
            requeue: TEST_REQUEUE,
            ..Default::default()
        }
    }

    pub fn reconciler(&self) -> Reconciler {
        Reconciler::new(
            Stores {
                provisioning_requests: Arc::new(self.provisioning_requests.clone()),
                node_allocation_requests: Arc::new(self.node_allocation_requests.clone()),
                hardware_templates: Arc::new(self.hardware_templates.clone()),
                cluster_instances: Arc::new(self.cluster_instances.clone()),
                allocated_nodes: Arc::new(self.allocated_nodes.clone()),
            },
            Self::settings(),
            RetryContext::new(RetryConfig::immediate(3), CancellationToken::new()),
        )
    }

    pub fn request(&self, name: &str) -> ProvisioningRequest {
        self.provisioning_requests.get_object(TEST_NS, name).unwrap()
    }

    pub fn task(&self, name: &str) -> ProvisioningTask {
        ProvisioningTask::new(self.request(name), Self::settings().hardware_provisioning_timeout)
    }

    pub fn node_allocation_request(&self, name: &str) -> Option<NodeAllocationRequest> {
        self.node_allocation_requests.get_object(PLUGIN_NS, name)
    }

    pub fn cluster_instance(&self, name: &str) -> ClusterInstance {
        self.cluster_instances.get_object(TEST_NS, name).unwrap()
    }

    /// Report a plugin condition on a NodeAllocationRequest
    pub fn set_plugin_condition(&self, nar: &str, type_: &str, status: ConditionStatus, reason: &str) {
        let mut request = self.node_allocation_request(nar).unwrap();
        set_condition(
            &mut request.status.get_or_insert_with(Default::default).conditions,
            type_,
            status,
            reason,
            "reported by plugin",
        );
        self.node_allocation_requests.insert(request);
    }
}
