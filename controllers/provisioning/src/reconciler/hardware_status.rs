//! Hardware status tracking
//!
//! Maps the `Provisioned`/`Configured` conditions a plugin reports on the
//! NodeAllocationRequest onto the ProvisioningRequest, with a timeout per
//! phase:
//!
//! ```text
//! Unknown -> InProgress -> Succeeded
//!                       -> Failed
//!    \------------------\-> TimedOut
//! ```
//!
//! The phase clocks live in the request's NodeAllocationRequest reference.
//! The provisioning clock is set when the request is created, the
//! configuring clock when a configuration change starts; polling never
//! resets either of them.

use crate::error::ControllerError;
use crate::reconciler::{ProvisioningTask, Reconciler};
use chrono::{DateTime, Utc};
use crds::{
    hardware_condition, provisioning_condition, reason, ConditionStatus, NodeAllocationRequest, ProvisioningPhase,
};
use kube::ResourceExt;
use resource_store::{retry_with_backoff, StoreError};
use tracing::{debug, info, warn};

/// Hardware condition tracked on a NodeAllocationRequest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareCondition {
    Provisioned,
    Configured,
}

impl HardwareCondition {
    /// Phase name used in status messages
    pub fn phase(self) -> &'static str {
        match self {
            HardwareCondition::Provisioned => "provisioning",
            HardwareCondition::Configured => "configuring",
        }
    }

    /// Condition type reported by the plugin
    pub fn plugin_condition(self) -> &'static str {
        match self {
            HardwareCondition::Provisioned => hardware_condition::PROVISIONED,
            HardwareCondition::Configured => hardware_condition::CONFIGURED,
        }
    }

    /// Condition type mirrored onto the ProvisioningRequest
    pub fn request_condition(self) -> &'static str {
        match self {
            HardwareCondition::Provisioned => provisioning_condition::HARDWARE_PROVISIONED,
            HardwareCondition::Configured => provisioning_condition::HARDWARE_CONFIGURED,
        }
    }
}

/// Result of one check of the Configured condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigurationOutcome {
    /// `None` when no configuration was ever requested
    pub configured: Option<bool>,
    pub timed_out_or_failed: bool,
}

/// What a pass learned about the hardware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardwareData {
    pub provisioned: bool,
    pub configured: Option<bool>,
    pub timed_out_or_failed: bool,
}

/// Map the plugin's condition onto the task at time `now`.
///
/// Returns `(succeeded, timed_out_or_failed)`. An absent Configured
/// condition with no configuring clock yields
/// [`ControllerError::ConditionDoesNotExist`] and leaves the task untouched.
pub fn evaluate_condition(
    task: &mut ProvisioningTask,
    nar: &NodeAllocationRequest,
    kind: HardwareCondition,
    now: DateTime<Utc>,
) -> Result<(bool, bool), ControllerError> {
    let phase = kind.phase();
    let mut timed_out_or_failed = false;

    let (status, mut cause, mut message) = match nar.condition(kind.plugin_condition()) {
        None => {
            let configuring_started = task
                .node_allocation_request_ref()
                .is_some_and(|r| r.hardware_configuring_check_start.is_some());
            if kind == HardwareCondition::Configured && !configuring_started {
                return Err(ControllerError::ConditionDoesNotExist(kind.plugin_condition().to_string()));
            }
            let message = format!("Waiting for NodeAllocationRequest ({}) to be processed", nar.name_any());
            task.set_phase(ProvisioningPhase::InProgress, &message);
            (ConditionStatus::Unknown, reason::UNKNOWN.to_string(), message)
        }
        Some(condition) => {
            let mut message = condition.message.clone();
            if kind == HardwareCondition::Configured {
                if let Some(nar_ref) = task.node_allocation_request_ref_mut() {
                    if condition.is_true() {
                        nar_ref.hardware_configuring_check_start = None;
                    } else {
                        nar_ref.hardware_configuring_check_start.get_or_insert(now);
                    }
                }
            }
            if condition.status == ConditionStatus::False {
                if condition.reason == reason::FAILED {
                    message = format!("Hardware {} failed", phase);
                    timed_out_or_failed = true;
                    task.set_phase(ProvisioningPhase::Failed, &message);
                } else {
                    message = format!("Hardware {} is in progress", phase);
                    task.set_phase(ProvisioningPhase::InProgress, &message);
                }
            }
            (condition.status, condition.reason.clone(), message)
        }
    };

    if status != ConditionStatus::True && cause != reason::FAILED && phase_expired(task, now) {
        cause = reason::TIMED_OUT.to_string();
        message = format!("Hardware {} timed out", phase);
        timed_out_or_failed = true;
        task.set_phase(ProvisioningPhase::Failed, &message);
    }

    task.set_condition(kind.request_condition(), status, &cause, &message);
    Ok((status == ConditionStatus::True, timed_out_or_failed))
}

/// Whether the later of the two phase clocks is older than the task timeout
fn phase_expired(task: &ProvisioningTask, now: DateTime<Utc>) -> bool {
    let Some(nar_ref) = task.node_allocation_request_ref() else {
        return false;
    };
    let start = match (nar_ref.hardware_provisioning_check_start, nar_ref.hardware_configuring_check_start) {
        (Some(a), Some(b)) => a.max(b),
        (Some(a), None) | (None, Some(a)) => a,
        (None, None) => return false,
    };
    now.signed_duration_since(start)
        .to_std()
        .is_ok_and(|elapsed| elapsed > task.timeout)
}

impl Reconciler {
    /// Fetch the request's NodeAllocationRequest, riding out propagation delays
    pub(crate) async fn fetch_node_allocation_request(
        &self,
        task: &ProvisioningTask,
    ) -> Result<NodeAllocationRequest, ControllerError> {
        let nar_ref = task
            .node_allocation_request_ref()
            .ok_or_else(|| ControllerError::MissingReference(task.key()))?;
        let namespace = if nar_ref.namespace.is_empty() {
            self.settings.plugin_namespace.as_str()
        } else {
            nar_ref.namespace.as_str()
        };
        let name = nar_ref.node_allocation_request_id.as_str();
        let store = self.stores.node_allocation_requests.as_ref();

        let nar = retry_with_backoff(
            &self.retry.config,
            &self.retry.cancel,
            &format!("get NodeAllocationRequest {}/{}", namespace, name),
            StoreError::is_transient,
            || store.get(namespace, name),
        )
        .await?;
        Ok(nar)
    }

    /// Poll one hardware condition and persist the mirrored condition.
    ///
    /// Once provisioning succeeds the allocated hosts are written into the
    /// ClusterInstance before returning.
    pub(crate) async fn check_hardware_condition(
        &self,
        task: &mut ProvisioningTask,
        kind: HardwareCondition,
    ) -> Result<(bool, bool), ControllerError> {
        let nar = self.fetch_node_allocation_request(task).await?;
        let (succeeded, timed_out_or_failed) = evaluate_condition(task, &nar, kind, Utc::now())?;
        debug!(
            "Hardware {} of {}: succeeded={}, timed_out_or_failed={}",
            kind.phase(),
            task.key(),
            succeeded,
            timed_out_or_failed
        );

        if kind == HardwareCondition::Provisioned && succeeded {
            let applied = self.update_cluster_instance(task, &nar).await;
            self.persist_status(task).await?;
            applied?;
        } else {
            self.persist_status(task).await?;
        }

        if timed_out_or_failed {
            warn!("Hardware {} of {} did not complete", kind.phase(), task.key());
        }
        Ok((succeeded, timed_out_or_failed))
    }

    /// Check the Configured condition; an absent, never requested one is `None`
    pub(crate) async fn check_configured(&self, task: &mut ProvisioningTask) -> Result<ConfigurationOutcome, ControllerError> {
        match self.check_hardware_condition(task, HardwareCondition::Configured).await {
            Ok((configured, timed_out_or_failed)) => Ok(ConfigurationOutcome {
                configured: Some(configured),
                timed_out_or_failed,
            }),
            Err(ControllerError::ConditionDoesNotExist(_)) => Ok(ConfigurationOutcome {
                configured: None,
                timed_out_or_failed: false,
            }),
            Err(e) => Err(e),
        }
    }

    /// Provisioned first, Configured only once provisioned
    pub(crate) async fn wait_for_hardware_data(&self, task: &mut ProvisioningTask) -> Result<HardwareData, ControllerError> {
        let (provisioned, timed_out_or_failed) = self
            .check_hardware_condition(task, HardwareCondition::Provisioned)
            .await?;
        let mut data = HardwareData {
            provisioned,
            configured: None,
            timed_out_or_failed,
        };
        if provisioned {
            let outcome = self.check_configured(task).await?;
            data.configured = outcome.configured;
            data.timed_out_or_failed = outcome.timed_out_or_failed;
        }
        if data.provisioned && data.configured.unwrap_or(true) {
            info!("Hardware of {} is ready", task.key());
        }
        Ok(data)
    }
}

#[cfg(test)]
#[path = "hardware_status_test.rs"]
mod tests;
