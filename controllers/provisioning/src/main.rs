//! Provisioning Controller
//!
//! Drives the hardware side of a ProvisioningRequest:
//! - renders the HardwareTemplate into a NodeAllocationRequest for the plugin
//! - tracks the plugin's Provisioned/Configured conditions with a timeout
//! - writes BMC and network identity of the allocated hosts into the
//!   rendered ClusterInstance

mod config;
mod controller;
mod error;
mod node_doc;
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

    info!("Starting Provisioning Controller");

    let settings = Settings::from_env()?;

    info!("Configuration:");
    info!("  Namespace: {}", settings.watch_namespace());
    info!("  Plugin namespace: {}", settings.plugin_namespace);
    info!(
        "  Hardware provisioning timeout: {}m",
        settings.hardware_provisioning_timeout.as_secs() / 60
    );
    info!("  Requeue interval: {}s", settings.requeue.as_secs());

    let controller = Controller::new(settings).await?;
    controller.run().await?;

    Ok(())
}
