//! NodeAllocationRequest rendering and submission
//!
//! The HardwareTemplate's node groups are sized from the roles found in the
//! rendered ClusterInstance. The result is created in the plugin namespace,
//! or, when it already exists, checked against the fields a plugin cannot
//! follow once submitted and updated in place.

use crate::config::parse_duration;
use crate::error::ControllerError;
use crate::node_doc::{NodeDocument, NodeDocumentError};
use crate::reconciler::{ProvisioningTask, Reconciler};
use chrono::Utc;
use crds::{
    hardware_condition, provisioning_condition, reason, set_condition, ClusterInstance, ConditionStatus,
    HardwareTemplate, NodeAllocationRequest, NodeAllocationRequestRef, NodeAllocationRequestSpec, NodeGroup,
    ProvisioningRequest, BOOT_INTERFACE_LABEL_ANNOTATION, PROVISIONING_REQUEST_NAME_LABEL,
    TEMPLATE_PARAM_OCLOUD_SITE_ID,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use resource_store::{update_status_with_retry, update_with_retry};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Build the NodeAllocationRequest for a rendered ClusterInstance.
///
/// Each template group is sized by the number of ClusterInstance nodes with
/// its role. Nodes without a role are not counted, so a template group with
/// an empty role always gets size 0.
pub fn build_node_allocation_request(
    request: &ProvisioningRequest,
    cluster: &ClusterInstance,
    template: &HardwareTemplate,
    plugin_namespace: &str,
) -> Result<NodeAllocationRequest, ControllerError> {
    if cluster.spec.nodes.is_empty() {
        return Err(NodeDocumentError::PathNotFound("spec.nodes".to_string()).into());
    }

    let mut role_counts: BTreeMap<String, u32> = BTreeMap::new();
    for (index, node) in cluster.spec.nodes.iter().enumerate() {
        let node = NodeDocument::from_value(index, node)?;
        let role = node.str_or_default("role");
        if !role.is_empty() {
            *role_counts.entry(role.to_string()).or_default() += 1;
        }
    }

    let site = request
        .spec
        .template_parameter_str(TEMPLATE_PARAM_OCLOUD_SITE_ID)
        .map_err(|e| ControllerError::InputError(format!("failed to get oCloudSiteId from templateParameters: {}", e)))?;

    let node_group = template
        .spec
        .node_group_data
        .iter()
        .map(|data| NodeGroup {
            node_group_data: data.clone(),
            size: role_counts.get(&data.role).copied().unwrap_or(0),
        })
        .collect();

    let cluster_name = cluster.name_any();
    Ok(NodeAllocationRequest {
        metadata: ObjectMeta {
            name: Some(cluster_name.clone()),
            namespace: Some(plugin_namespace.to_string()),
            labels: Some(BTreeMap::from([(
                PROVISIONING_REQUEST_NAME_LABEL.to_string(),
                request.name_any(),
            )])),
            annotations: Some(BTreeMap::from([(
                BOOT_INTERFACE_LABEL_ANNOTATION.to_string(),
                template.spec.boot_interface_label.clone(),
            )])),
            ..Default::default()
        },
        spec: NodeAllocationRequestSpec {
            cloud_id: cluster_name,
            site: site.to_string(),
            hw_mgr_id: template.spec.hw_mgr_id.clone(),
            extensions: template.spec.extensions.clone(),
            node_group,
            boot_interface_label: template.spec.boot_interface_label.clone(),
        },
        status: None,
    })
}

/// Reject changes a plugin cannot act on once the request was submitted
pub fn validate_template_change(
    existing: &NodeAllocationRequest,
    desired: &NodeAllocationRequest,
) -> Result<(), ControllerError> {
    if existing.spec.hw_mgr_id != desired.spec.hw_mgr_id {
        return Err(ControllerError::InputError(format!(
            "hwMgrId cannot be changed from {} to {}",
            existing.spec.hw_mgr_id, desired.spec.hw_mgr_id
        )));
    }
    if existing.spec.boot_interface_label != desired.spec.boot_interface_label {
        return Err(ControllerError::InputError(format!(
            "bootInterfaceLabel cannot be changed from {} to {}",
            existing.spec.boot_interface_label, desired.spec.boot_interface_label
        )));
    }
    Ok(())
}

/// Node groups compared by name, ignoring order
pub fn same_node_groups(a: &[NodeGroup], b: &[NodeGroup]) -> bool {
    let by_name = |groups: &[NodeGroup]| -> BTreeMap<String, NodeGroup> {
        groups
            .iter()
            .map(|g| (g.node_group_data.name.clone(), g.clone()))
            .collect()
    };
    a.len() == b.len() && by_name(a) == by_name(b)
}

impl Reconciler {
    /// Render the HardwareTemplate into the desired NodeAllocationRequest.
    ///
    /// Records `HardwareTemplateRendered` on the request and the validation
    /// outcome on the template; a template override of the hardware timeout
    /// is applied to the task.
    pub(crate) async fn render_hardware_template(
        &self,
        task: &mut ProvisioningTask,
        cluster: &ClusterInstance,
    ) -> Result<NodeAllocationRequest, ControllerError> {
        let template_name = task.request.spec.hardware_template.clone();
        let template = match self.stores.hardware_templates.get_opt(&task.namespace, &template_name).await? {
            Some(template) => template,
            None => {
                let err = ControllerError::InputError(format!(
                    "failed to get HardwareTemplate {}/{}",
                    task.namespace, template_name
                ));
                self.record_rendered(task, &err).await?;
                return Err(err);
            }
        };

        let rendered = self.render(task, cluster, &template).await;
        if let Err(e) = &rendered {
            if e.is_input_error() {
                self.record_template_validation(&template, Some(e)).await?;
            }
            self.record_rendered(task, e).await?;
            return rendered;
        }

        self.record_template_validation(&template, None).await?;
        task.set_condition(
            provisioning_condition::HARDWARE_TEMPLATE_RENDERED,
            ConditionStatus::True,
            reason::COMPLETED,
            "Rendered Hardware template successfully",
        );
        rendered
    }

    async fn render(
        &self,
        task: &mut ProvisioningTask,
        cluster: &ClusterInstance,
        template: &HardwareTemplate,
    ) -> Result<NodeAllocationRequest, ControllerError> {
        if let Some(raw) = &template.spec.hardware_provisioning_timeout {
            task.timeout = parse_duration(raw).map_err(|e| {
                ControllerError::InputError(format!("invalid hardwareProvisioningTimeout in HardwareTemplate: {}", e))
            })?;
        }

        let desired = build_node_allocation_request(&task.request, cluster, template, &self.settings.plugin_namespace)?;
        let existing = self
            .stores
            .node_allocation_requests
            .get_opt(&self.settings.plugin_namespace, &desired.name_any())
            .await?;
        if let Some(existing) = existing {
            validate_template_change(&existing, &desired)?;
        }
        Ok(desired)
    }

    async fn record_rendered(&self, task: &mut ProvisioningTask, err: &ControllerError) -> Result<(), ControllerError> {
        warn!("Failed to render HardwareTemplate for {}: {}", task.key(), err);
        task.set_condition(
            provisioning_condition::HARDWARE_TEMPLATE_RENDERED,
            ConditionStatus::False,
            reason::FAILED,
            &err.to_string(),
        );
        self.persist_status(task).await
    }

    async fn record_template_validation(
        &self,
        template: &HardwareTemplate,
        err: Option<&ControllerError>,
    ) -> Result<(), ControllerError> {
        let (status, cause, message) = match err {
            Some(e) => (ConditionStatus::False, reason::FAILED, e.to_string()),
            None => (ConditionStatus::True, reason::COMPLETED, "Validated".to_string()),
        };
        update_status_with_retry(
            self.stores.hardware_templates.as_ref(),
            &self.retry,
            &template.namespace().unwrap_or_default(),
            &template.name_any(),
            |t: &mut HardwareTemplate| {
                let conditions = &mut t.status.get_or_insert_with(Default::default).conditions;
                set_condition(conditions, hardware_condition::VALIDATION, status, cause, &message)
            },
        )
        .await?;
        Ok(())
    }

    /// Create the NodeAllocationRequest, or bring its node groups in line
    pub(crate) async fn create_or_update_node_allocation_request(
        &self,
        task: &mut ProvisioningTask,
        desired: NodeAllocationRequest,
    ) -> Result<(), ControllerError> {
        let namespace = self.settings.plugin_namespace.clone();
        let name = desired.name_any();
        let store = self.stores.node_allocation_requests.as_ref();

        match store.get_opt(&namespace, &name).await? {
            None => {
                store.create(&namespace, &desired).await?;
                info!("Created NodeAllocationRequest {}/{} for {}", namespace, name, task.key());
                task.status_mut().extensions.node_allocation_request_ref = Some(NodeAllocationRequestRef {
                    node_allocation_request_id: name,
                    namespace,
                    hardware_provisioning_check_start: Some(Utc::now()),
                    hardware_configuring_check_start: None,
                });
            }
            Some(existing) => {
                if task.node_allocation_request_ref().is_none() {
                    task.status_mut().extensions.node_allocation_request_ref = Some(NodeAllocationRequestRef {
                        node_allocation_request_id: name.clone(),
                        namespace: namespace.clone(),
                        hardware_provisioning_check_start: Some(Utc::now()),
                        hardware_configuring_check_start: None,
                    });
                }

                if same_node_groups(&existing.spec.node_group, &desired.spec.node_group) {
                    debug!("NodeAllocationRequest {}/{} is up to date", namespace, name);
                } else {
                    let node_group = desired.spec.node_group;
                    update_with_retry(store, &self.retry, &namespace, &name, |nar: &mut NodeAllocationRequest| {
                        if same_node_groups(&nar.spec.node_group, &node_group) {
                            return false;
                        }
                        nar.spec.node_group = node_group.clone();
                        true
                    })
                    .await?;
                    info!("Updated node groups of NodeAllocationRequest {}/{}", namespace, name);

                    if let Some(nar_ref) = task.node_allocation_request_ref_mut() {
                        nar_ref.hardware_configuring_check_start.get_or_insert_with(Utc::now);
                    }
                }
            }
        }

        self.persist_status(task).await
    }
}

#[cfg(test)]
#[path = "node_allocation_test.rs"]
mod tests;
