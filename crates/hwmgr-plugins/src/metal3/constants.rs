//! Label and annotation keys shared with the Bare Metal Operator and the
//! assisted installer. These must match bit-exactly.

/// Plugin identifier
pub const METAL3_PLUGIN_ID: &str = "metal3-hwplugin";

/// Host label: claimed by a NodeAllocationRequest
pub const ALLOCATED_LABEL: &str = "clcm.openshift.io/allocated";
/// Host label: name of the AllocatedNode holding the host
pub const ALLOCATED_NODE_LABEL: &str = "clcm.openshift.io/allocated-node";
/// Host label: site membership
pub const SITE_ID_LABEL: &str = "resources.clcm.openshift.io/siteId";
/// Host label: resource pool membership
pub const RESOURCE_POOL_ID_LABEL: &str = "resources.clcm.openshift.io/resourcePoolId";
/// Host label set by the cluster installer on hosts it owns
pub const SITE_CONFIG_OWNED_BY_LABEL: &str = "siteconfig.open-cluster-management.io/owned-by";
/// Host label associating the host with an InfraEnv
pub const INFRA_ENV_LABEL: &str = "infraenvs.agent-install.openshift.io";
/// Host label prefix; the suffix names the interface label, the value is a dash-separated MAC
pub const INTERFACE_LABEL_PREFIX: &str = "interfacelabel.clcm.openshift.io/";

/// Host annotation requesting a BIOS settings update
pub const BIOS_UPDATE_NEEDED_ANNOTATION: &str = "clcm.openshift.io/bios-update-needed";
/// Host annotation requesting a firmware update
pub const FIRMWARE_UPDATE_NEEDED_ANNOTATION: &str = "clcm.openshift.io/firmware-update-needed";
/// Host annotation letting the installer manage an already provisioned host
pub const HOST_MGMT_ANNOTATION: &str = "bmac.agent-install.openshift.io/allow-provisioned-host-management";
/// Host annotation that makes the Bare Metal Operator reboot the host; presence is the trigger
pub const REBOOT_ANNOTATION: &str = "reboot.metal3.io";

/// AllocatedNode annotation: configuration change in progress, value is the reason
pub const CONFIG_ANNOTATION: &str = "clcm.openshift.io/config-in-progress";

pub const UPDATE_REASON_BIOS_SETTINGS: &str = "bios-settings-update";
pub const UPDATE_REASON_FIRMWARE: &str = "firmware-update";

pub const VALUE_TRUE: &str = "true";

/// Message reported when a host fails while servicing a configuration change
pub const BMH_SERVICING_ERR: &str = "BMH Servicing Error";
