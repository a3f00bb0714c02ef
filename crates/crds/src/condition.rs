//! Status conditions shared by the hardware lifecycle CRDs
//!
//! Mirrors the Kubernetes `metav1.Condition` shape (type, status, reason,
//! message, lastTransitionTime) so that conditions written by the hardware
//! plugins and by the provisioning controller read the same way in `kubectl`.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition types reported on a NodeAllocationRequest / AllocatedNode by a hardware plugin
pub mod hardware_condition {
    /// Hosts reserved and network-identified
    pub const PROVISIONED: &str = "Provisioned";
    /// Hosts fully configured (BIOS, firmware, ...)
    pub const CONFIGURED: &str = "Configured";
    /// HardwareTemplate validation
    pub const VALIDATION: &str = "Validation";
}

/// Condition types written on a ProvisioningRequest
pub mod provisioning_condition {
    /// Mirrors the backend's Provisioned condition
    pub const HARDWARE_PROVISIONED: &str = "HardwareProvisioned";
    /// Mirrors the backend's Configured condition
    pub const HARDWARE_CONFIGURED: &str = "HardwareConfigured";
    /// BMC/network identity applied to the ClusterInstance
    pub const HARDWARE_NODE_CONFIG_APPLIED: &str = "HardwareNodeConfigApplied";
    /// HardwareTemplate could be rendered into a NodeAllocationRequest
    pub const HARDWARE_TEMPLATE_RENDERED: &str = "HardwareTemplateRendered";
}

/// Condition reasons
pub mod reason {
    pub const UNKNOWN: &str = "Unknown";
    pub const IN_PROGRESS: &str = "InProgress";
    pub const COMPLETED: &str = "Completed";
    pub const FAILED: &str = "Failed";
    pub const TIMED_OUT: &str = "TimedOut";
    pub const NOT_APPLIED: &str = "NotApplied";
    pub const CONFIG_APPLIED: &str = "ConfigurationApplied";
}

/// Tri-state condition status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "PascalCase")]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

/// A single status condition
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type (e.g. "Provisioned")
    #[serde(rename = "type")]
    pub type_: String,

    /// True, False or Unknown
    pub status: ConditionStatus,

    /// Machine-readable reason in CamelCase
    #[serde(default)]
    pub reason: String,

    /// Human-readable message
    #[serde(default)]
    pub message: String,

    /// Last time the status changed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,
}

impl Condition {
    /// Create a condition stamped with the current time
    pub fn new(type_: &str, status: ConditionStatus, reason: &str, message: impl Into<String>) -> Self {
        Self {
            type_: type_.to_string(),
            status,
            reason: reason.to_string(),
            message: message.into(),
            last_transition_time: Some(Utc::now()),
        }
    }

    /// Whether the condition status is True
    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }
}

/// Find a condition by type
pub fn find_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

/// Insert or update a condition, returning true when anything changed.
///
/// `lastTransitionTime` only moves when the status flips, so re-applying the
/// same triple is a no-op and does not cause a status write.
pub fn set_condition(
    conditions: &mut Vec<Condition>,
    type_: &str,
    status: ConditionStatus,
    reason: &str,
    message: &str,
) -> bool {
    match conditions.iter_mut().find(|c| c.type_ == type_) {
        Some(existing) => {
            if existing.status == status && existing.reason == reason && existing.message == message {
                return false;
            }
            if existing.status != status {
                existing.last_transition_time = Some(Utc::now());
            }
            existing.status = status;
            existing.reason = reason.to_string();
            existing.message = message.to_string();
            true
        }
        None => {
            conditions.push(Condition::new(type_, status, reason, message));
            true
        }
    }
}
