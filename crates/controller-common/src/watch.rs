//! Kubernetes resource watchers.
//!
//! Wraps `kube_runtime::Controller`, which handles reconnection, event
//! batching and requeues.

use crds::NamespacedName;
use futures::StreamExt;
use kube::{Api, Resource, ResourceExt};
use kube_runtime::{controller::{Action, Config as ControllerConfig}, watcher, Controller};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Requeue delay for objects whose reconcile failed
pub trait ErrorPolicy: Send + Sync + 'static {
    /// Delay before the object `key` (`namespace/name`) is retried
    fn requeue_after_error(&self, key: &str) -> Duration;
}

fn requeue_on_error<K, E, C>(obj: &K, error: &E, ctx: &C, resource_name: &str) -> Action
where
    K: Resource,
    E: std::fmt::Display,
    C: ErrorPolicy,
{
    let key = NamespacedName::of(obj).to_string();
    let delay = ctx.requeue_after_error(&key);
    error!(
        "Reconciliation error for {} {}: {} (retry in {}s)",
        resource_name,
        key,
        error,
        delay.as_secs()
    );
    Action::requeue(delay)
}

/// Run a controller for one resource kind until its watch stream ends.
///
/// Failed reconciles are requeued after the delay `ctx` picks for the object.
pub async fn watch_resource<K, C, E, F, Fut>(api: Api<K>, ctx: Arc<C>, reconcile_fn: F, resource_name: &str)
where
    K: Resource + Clone + Send + Sync + 'static + Debug + DeserializeOwned,
    K::DynamicType: Default + Eq + Hash + Clone + Debug + Unpin,
    C: ErrorPolicy,
    E: std::error::Error + Send + 'static,
    F: Fn(Arc<C>, Arc<K>) -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = Result<Action, E>> + Send + 'static,
{
    info!("Starting {} watcher", resource_name);

    let error_policy =
        |obj: Arc<K>, error: &E, ctx: Arc<C>| requeue_on_error(obj.as_ref(), error, ctx.as_ref(), resource_name);

    let reconcile = move |obj: Arc<K>, ctx: Arc<C>| {
        debug!("Reconciling {} {}", resource_name, obj.name_any());
        reconcile_fn(ctx, obj)
    };

    // Debounce batches our own status writes; concurrency bounds API load
    let controller_config = ControllerConfig::default()
        .debounce(Duration::from_secs(5))
        .concurrency(3);

    Controller::new(api, watcher::Config::default())
        .with_config(controller_config)
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            if let Err(e) = res {
                error!("Controller error for {}: {}", resource_name, e);
            }
        })
        .await;
}
