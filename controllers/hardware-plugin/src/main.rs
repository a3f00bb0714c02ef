//! Hardware Plugin Controller
//!
//! Serves NodeAllocationRequests addressed to one hardware plugin:
//! - metal3-hwplugin: claims BareMetalHosts managed by the Bare Metal Operator
//! - loopback-hwplugin: hands out hosts from a static inventory file
//!
//! Each request is answered with one AllocatedNode per host and
//! `Provisioned`/`Configured` conditions.

mod config;
mod controller;
mod error;
mod reconciler;
mod watcher;
#[cfg(test)]
mod test_utils;

use crate::config::Settings;
use crate::error::ControllerError;
use controller::Controller;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting Hardware Plugin Controller");

    let settings = Settings::from_env()?;

    info!("Configuration:");
    info!("  Plugin: {}", settings.plugin_id);
    info!("  Namespace: {}", settings.watch_namespace());
    info!("  Host namespace: {}", settings.host_namespace);
    if let Some(inventory) = &settings.loopback_inventory {
        info!("  Loopback inventory: {}", inventory.display());
    }
    info!("  Requeue interval: {}s", settings.requeue.as_secs());

    let controller = Controller::new(settings).await?;
    controller.run().await?;

    Ok(())
}
