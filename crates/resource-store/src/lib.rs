//! Versioned object store for hardware lifecycle controllers
//!
//! Every controller in the workspace talks to Kubernetes through the
//! [`ResourceStore`] trait instead of `kube::Api` directly. Writes are
//! conditional on `metadata.resourceVersion`; the helpers in [`update`] and
//! [`meta`] wrap them in a read-modify-write loop that retries on conflict
//! and skips writes that would change nothing.
//!
//! # Example
//!
//! ```no_run
//! use resource_store::{KubeStore, MetaMutation, RetryContext, update_meta_with_retry};
//! use k8s_openapi::api::core::v1::ConfigMap;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = kube::Client::try_default().await?;
//! let store: KubeStore<ConfigMap> = KubeStore::new(client);
//! let ctx = RetryContext::default();
//!
//! update_meta_with_retry(
//!     &store,
//!     &ctx,
//!     "hosts",
//!     "inventory",
//!     &MetaMutation::add_label("clcm.openshift.io/allocated", "true"),
//! )
//! .await?;
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod error;
pub mod kube_store;
pub mod meta;
pub mod retry;
pub mod selector;
#[path = "trait.rs"]
pub mod store_trait;
pub mod update;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use backoff::{ErrorBackoff, FibonacciBackoff};
pub use error::StoreError;
pub use kube_store::KubeStore;
pub use meta::{update_meta_with_retry, MetaMutation, MetaOp, MetaType};
pub use retry::{retry_with_backoff, Cancelled, RetryConfig, RetryContext};
pub use selector::LabelSelector;
pub use store_trait::{ResourceStore, StoreObject};
pub use update::{update_status_with_retry, update_with_retry};
#[cfg(any(test, feature = "test-util"))]
pub use mock::MockStore;
