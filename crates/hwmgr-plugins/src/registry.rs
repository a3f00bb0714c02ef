//! Plugin selection by id

use crate::error::PluginError;
use crate::plugin::HardwarePlugin;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Plugins keyed by the id requests carry in `hwMgrId`
#[derive(Default, Clone)]
pub struct PluginRegistry {
    plugins: BTreeMap<String, Arc<dyn HardwarePlugin>>,
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.plugins.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin under its own id, replacing any previous one
    pub fn register(&mut self, plugin: Arc<dyn HardwarePlugin>) {
        self.plugins.insert(plugin.id().to_string(), plugin);
    }

    #[must_use]
    pub fn with(mut self, plugin: Arc<dyn HardwarePlugin>) -> Self {
        self.register(plugin);
        self
    }

    pub fn get(&self, id: &str) -> Result<Arc<dyn HardwarePlugin>, PluginError> {
        self.plugins
            .get(id)
            .cloned()
            .ok_or_else(|| PluginError::UnknownPlugin(id.to_string()))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.plugins.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback::{Inventory, LoopbackPlugin, LOOPBACK_PLUGIN_ID};
    use crds::AllocatedNode;
    use resource_store::{MockStore, RetryConfig, RetryContext};
    use tokio_util::sync::CancellationToken;

    #[test]
    fn test_lookup_by_id() {
        let loopback = LoopbackPlugin::new(
            Inventory::default(),
            Arc::new(MockStore::<AllocatedNode>::new()),
            "hwmgr",
            RetryContext::new(RetryConfig::default(), CancellationToken::new()),
        );
        let registry = PluginRegistry::new().with(Arc::new(loopback));

        assert_eq!(registry.get(LOOPBACK_PLUGIN_ID).unwrap().id(), LOOPBACK_PLUGIN_ID);
        assert_eq!(registry.ids().collect::<Vec<_>>(), vec![LOOPBACK_PLUGIN_ID]);

        let err = registry.get("metal3-hwplugin").err().unwrap();
        assert!(matches!(err, PluginError::UnknownPlugin(ref id) if id == "metal3-hwplugin"));
    }
}
