//! Controller configuration from environment variables

use crate::error::ControllerError;
use std::time::Duration;

/// Namespace hardware plugins watch for NodeAllocationRequests
pub const DEFAULT_PLUGIN_NAMESPACE: &str = "oran-hwmgr-plugin";

/// Window for a hardware phase before it is reported as timed out
pub const DEFAULT_HARDWARE_PROVISIONING_TIMEOUT: Duration = Duration::from_secs(90 * 60);

const DEFAULT_REQUEUE_SECONDS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Namespace watched for ProvisioningRequests, `None` for the default
    pub namespace: Option<String>,
    /// Namespace NodeAllocationRequests are created in
    pub plugin_namespace: String,
    pub hardware_provisioning_timeout: Duration,
    /// Requeue interval while hardware is in progress
    pub requeue: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            namespace: None,
            plugin_namespace: DEFAULT_PLUGIN_NAMESPACE.to_string(),
            hardware_provisioning_timeout: DEFAULT_HARDWARE_PROVISIONING_TIMEOUT,
            requeue: Duration::from_secs(DEFAULT_REQUEUE_SECONDS),
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ControllerError> {
        let mut settings = Settings::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        settings.namespace = get("WATCH_NAMESPACE");
        if let Some(ns) = get("HWMGR_PLUGIN_NAMESPACE") {
            settings.plugin_namespace = ns;
        }
        if let Some(raw) = get("HARDWARE_PROVISIONING_TIMEOUT") {
            settings.hardware_provisioning_timeout = parse_duration(&raw).map_err(|e| {
                ControllerError::InvalidConfig(format!("HARDWARE_PROVISIONING_TIMEOUT: {}", e))
            })?;
        }
        if let Some(raw) = get("RECONCILE_REQUEUE_SECONDS") {
            settings.requeue = match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ControllerError::InvalidConfig(format!(
                        "RECONCILE_REQUEUE_SECONDS must be a positive number of seconds, got {:?}",
                        raw
                    )));
                }
            };
        }
        Ok(settings)
    }

    /// Namespace the controller's APIs are bound to
    pub fn watch_namespace(&self) -> &str {
        self.namespace.as_deref().unwrap_or("default")
    }
}

/// Parse "90m", "1h", "300s" or a plain number of seconds
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    let (digits, unit) = match raw.char_indices().find(|(_, c)| !c.is_ascii_digit()) {
        Some((idx, _)) => raw.split_at(idx),
        None => (raw, "s"),
    };
    let value: u64 = digits
        .parse()
        .map_err(|_| format!("invalid duration {:?}", raw))?;
    let multiplier = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        _ => return Err(format!("invalid duration unit in {:?}, expected s, m or h", raw)),
    };
    let secs = value
        .checked_mul(multiplier)
        .ok_or_else(|| format!("invalid duration {:?}", raw))?;
    if secs == 0 {
        return Err(format!("duration {:?} must be positive", raw));
    }
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings, ControllerError> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let s = settings(&[]).unwrap();
        assert_eq!(s, Settings::default());
        assert_eq!(s.plugin_namespace, "oran-hwmgr-plugin");
        assert_eq!(s.hardware_provisioning_timeout, Duration::from_secs(5400));
        assert_eq!(s.watch_namespace(), "default");
    }

    #[test]
    fn test_overrides() {
        let s = settings(&[
            ("WATCH_NAMESPACE", "clusters"),
            ("HWMGR_PLUGIN_NAMESPACE", "hwmgr"),
            ("HARDWARE_PROVISIONING_TIMEOUT", "2h"),
            ("RECONCILE_REQUEUE_SECONDS", "15"),
        ])
        .unwrap();
        assert_eq!(s.watch_namespace(), "clusters");
        assert_eq!(s.plugin_namespace, "hwmgr");
        assert_eq!(s.hardware_provisioning_timeout, Duration::from_secs(7200));
        assert_eq!(s.requeue, Duration::from_secs(15));
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            settings(&[("HARDWARE_PROVISIONING_TIMEOUT", "soon")]),
            Err(ControllerError::InvalidConfig(_))
        ));
        assert!(settings(&[("RECONCILE_REQUEUE_SECONDS", "0")]).is_err());
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("90m"), Ok(Duration::from_secs(5400)));
        assert_eq!(parse_duration("1h"), Ok(Duration::from_secs(3600)));
        assert_eq!(parse_duration("300s"), Ok(Duration::from_secs(300)));
        assert_eq!(parse_duration("45"), Ok(Duration::from_secs(45)));
        assert!(parse_duration("0m").is_err());
        assert!(parse_duration("10d").is_err());
        assert!(parse_duration("m").is_err());
    }

    #[test]
    fn test_parse_duration_rejects_overflow() {
        assert!(parse_duration("99999999999999999h").is_err());
        assert!(parse_duration("999999999999999999m").is_err());
        assert!(parse_duration("99999999999999999999").is_err());
        assert_eq!(parse_duration("5124095576030431h"), Ok(Duration::from_secs(5124095576030431 * 3600)));
    }
}
