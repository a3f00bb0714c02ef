//! Read-modify-write helpers
//!
//! Fetch the latest revision, apply a mutation, write it back conditionally,
//! and start over on a conflict. The mutation reports whether it changed
//! anything; unchanged objects are never written.

use crate::error::StoreError;
use crate::retry::{retry_with_backoff, RetryContext};
use crate::store_trait::{ResourceStore, StoreObject};
use tracing::debug;

/// Which part of the object a read-modify-write targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteTarget {
    Object,
    Status,
}

/// Apply `mutate` to the latest revision of `namespace/name` and replace it,
/// retrying on conflict within the context's budget.
///
/// Returns the stored object (the written revision, or the fetched one when
/// `mutate` returned false).
pub async fn update_with_retry<K, F>(
    store: &dyn ResourceStore<K>,
    ctx: &RetryContext,
    namespace: &str,
    name: &str,
    mutate: F,
) -> Result<K, StoreError>
where
    K: StoreObject,
    F: Fn(&mut K) -> bool + Send + Sync,
{
    read_modify_write(store, ctx, namespace, name, WriteTarget::Object, mutate).await
}

/// Same as [`update_with_retry`] but writes the status subresource
pub async fn update_status_with_retry<K, F>(
    store: &dyn ResourceStore<K>,
    ctx: &RetryContext,
    namespace: &str,
    name: &str,
    mutate: F,
) -> Result<K, StoreError>
where
    K: StoreObject,
    F: Fn(&mut K) -> bool + Send + Sync,
{
    read_modify_write(store, ctx, namespace, name, WriteTarget::Status, mutate).await
}

async fn read_modify_write<K, F>(
    store: &dyn ResourceStore<K>,
    ctx: &RetryContext,
    namespace: &str,
    name: &str,
    target: WriteTarget,
    mutate: F,
) -> Result<K, StoreError>
where
    K: StoreObject,
    F: Fn(&mut K) -> bool + Send + Sync,
{
    let kind = K::kind(&());
    let operation_name = format!("update {} {}/{}", kind, namespace, name);
    let mutate = &mutate;

    retry_with_backoff(
        &ctx.config,
        &ctx.cancel,
        &operation_name,
        StoreError::is_conflict,
        move || async move {
            let mut obj = store.get(namespace, name).await?;
            if !mutate(&mut obj) {
                debug!("{} {}/{} unchanged, skipping write", K::kind(&()), namespace, name);
                return Ok(obj);
            }
            match target {
                WriteTarget::Object => store.replace(namespace, &obj).await,
                WriteTarget::Status => store.replace_status(namespace, &obj).await,
            }
        },
    )
    .await
}
