//! Reconciliation logic for NodeAllocationRequests.
//!
//! The reconciler owns no hardware knowledge: every request addressed to the
//! configured plugin is handed to it, and the plugin's answer is written back
//! as `Provisioned`/`Configured` conditions.

pub mod node_allocation_request;

use controller_common::ErrorPolicy;
use crds::NodeAllocationRequest;
use hwmgr_plugins::HardwarePlugin;
use resource_store::{ErrorBackoff, ResourceStore, RetryContext};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Reconciles NodeAllocationRequests through one hardware plugin.
pub struct Reconciler {
    pub(crate) plugin: Arc<dyn HardwarePlugin>,
    pub(crate) requests: Arc<dyn ResourceStore<NodeAllocationRequest>>,
    pub(crate) retry: RetryContext,
    /// Requeue interval while a request is in progress
    pub(crate) requeue: Duration,
    backoff: ErrorBackoff,
}

impl Reconciler {
    /// Creates a new reconciler instance.
    pub fn new(
        plugin: Arc<dyn HardwarePlugin>,
        requests: Arc<dyn ResourceStore<NodeAllocationRequest>>,
        retry: RetryContext,
        requeue: Duration,
    ) -> Self {
        Self {
            plugin,
            requests,
            retry,
            requeue,
            backoff: ErrorBackoff::new(),
        }
    }

    /// Reset error tracking for a resource (on successful reconciliation)
    pub fn reset_error(&self, resource_key: &str) {
        self.backoff.reset(resource_key);
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
