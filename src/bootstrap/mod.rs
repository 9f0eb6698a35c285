//! Host configuration bootstrap.
//!
//! The builder hands freshly provisioned servers to a [`Bootstrapper`], which
//! turns the control server into a salt master, enrols the workers and
//! finally applies the salt states.

mod salt_cloud;
mod ssh;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::error::{BootstrapError, Result};

pub use salt_cloud::{CloudProvider, PROVIDER_CONFIG_PATH, ProviderAuth, ProviderNetwork};
pub use ssh::{SshBootstrapper, SshOptions};

/// Path of the keepalived pillar on the control server.
pub const HA_PILLAR_PATH: &str = "/srv/pillar/keepalived.sls";

/// Addresses the load-balancer pair needs for keepalived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HaConfig {
    /// Public address shared by the pair.
    pub floating_address: String,
    /// Fixed address the shared floating address maps to.
    pub virtual_address: Option<String>,
    /// Port address of the primary instance.
    pub primary_address: Option<String>,
    /// Port address of the secondary instance.
    pub secondary_address: Option<String>,
}

impl HaConfig {
    /// Renders the keepalived pillar.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be serialized.
    pub fn render(&self) -> Result<String> {
        #[derive(Serialize)]
        struct Pillar<'a> {
            keepalived: &'a HaConfig,
        }

        serde_yaml::to_string(&Pillar { keepalived: self }).map_err(|e| {
            BootstrapError::Render {
                document: HA_PILLAR_PATH.to_string(),
                message: e.to_string(),
            }
            .into()
        })
    }
}

/// Configures servers once they are reachable.
///
/// Addresses are public (floating) addresses.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Bootstrapper: Send + Sync {
    /// Installs the salt master and the salt states on the control server.
    async fn bootstrap_control_server(&self, address: &str) -> Result<()>;

    /// Writes the salt-cloud provider file for the topology's network.
    async fn configure_cloud_provider(&self, control_address: &str, network_name: &str)
    -> Result<()>;

    /// Installs the salt-cloud private key as root's key on the control server.
    async fn install_private_key(&self, control_address: &str, private_key: &str) -> Result<()>;

    /// Installs a salt minion pointing at the control server.
    async fn bootstrap_worker(&self, address: &str, control_address: &str) -> Result<()>;

    /// Accepts the workers' minion keys on the control server.
    async fn register_workers(&self, control_address: &str, worker_ids: &[String]) -> Result<()>;

    /// Places the load-balancer pair's keepalived pillar on the control server.
    async fn place_ha_config(&self, control_address: &str, config: &HaConfig) -> Result<()>;

    /// Applies the salt states to every minion.
    async fn apply_configuration(&self, control_address: &str) -> Result<()>;
}

/// Bootstrapper that only logs what it would do.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBootstrapper;

#[async_trait]
impl Bootstrapper for NoopBootstrapper {
    async fn bootstrap_control_server(&self, address: &str) -> Result<()> {
        debug!("Skipping control server bootstrap on {address}");
        Ok(())
    }

    async fn configure_cloud_provider(
        &self,
        control_address: &str,
        network_name: &str,
    ) -> Result<()> {
        debug!("Skipping cloud provider for {network_name} on {control_address}");
        Ok(())
    }

    async fn install_private_key(&self, control_address: &str, _private_key: &str) -> Result<()> {
        debug!("Skipping private key install on {control_address}");
        Ok(())
    }

    async fn bootstrap_worker(&self, address: &str, control_address: &str) -> Result<()> {
        debug!("Skipping worker bootstrap on {address} (master {control_address})");
        Ok(())
    }

    async fn register_workers(&self, control_address: &str, worker_ids: &[String]) -> Result<()> {
        debug!(
            "Skipping registration of {} worker(s) on {control_address}",
            worker_ids.len()
        );
        Ok(())
    }

    async fn place_ha_config(&self, control_address: &str, config: &HaConfig) -> Result<()> {
        debug!(
            "Skipping HA config for {} on {control_address}",
            config.floating_address
        );
        Ok(())
    }

    async fn apply_configuration(&self, control_address: &str) -> Result<()> {
        debug!("Skipping state apply on {control_address}");
        Ok(())
    }
}
