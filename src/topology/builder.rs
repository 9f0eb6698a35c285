//! Topology build and teardown sequencing.
//!
//! The builder drives the facade through a fixed order: router, network,
//! subnet, port, router interface, control server, app servers, then the
//! optional load-balancer pair and its shared address. Teardown walks the
//! same resources in reverse dependency order.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};

use crate::bootstrap::{Bootstrapper, HaConfig};
use crate::error::{BuildError, Result, TopologyError};
use crate::naming::{DeployParams, ServerRole};
use crate::openstack::{
    AddressRole, CloudConnection, FloatingIp, KeyPairOutcome, Placement, ResourceFacade, Server,
    ServerSpec,
};

use super::ha::choose_ha_address;

/// Default name of the key pair salt-cloud uses.
pub const SALT_CLOUD_KEY_PAIR: &str = "salt-cloud";

/// Build progress, in the order the stages are reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStage {
    /// Nothing created yet.
    Init,
    /// Router exists.
    RouterReady,
    /// Network exists.
    NetworkReady,
    /// Subnet exists.
    SubnetReady,
    /// Router-facing port exists.
    PortReady,
    /// Subnet attached to the router.
    RouterWired,
    /// Control server running and bootstrapped.
    ControlServerReady,
    /// App servers running and registered.
    AppServersReady,
    /// Load-balancer pair running.
    LoadBalancersReady,
    /// Shared address chosen and handed over.
    HaConfigured,
    /// Configuration applied.
    Done,
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::RouterReady => "router ready",
            Self::NetworkReady => "network ready",
            Self::SubnetReady => "subnet ready",
            Self::PortReady => "port ready",
            Self::RouterWired => "router wired",
            Self::ControlServerReady => "control server ready",
            Self::AppServersReady => "app servers ready",
            Self::LoadBalancersReady => "load balancers ready",
            Self::HaConfigured => "HA configured",
            Self::Done => "done",
        };
        write!(f, "{name}")
    }
}

/// One server in the build report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerSummary {
    /// Server name.
    pub name: String,
    /// Role prefix, e.g. `salt` or `app-0`.
    pub role: String,
    /// Floating addresses seen right after the server was ensured.
    pub public_addresses: Vec<String>,
}

/// Outcome of a successful build.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    /// Sanitized application identifier.
    pub app: String,
    /// Sanitized environment identifier.
    pub environment: String,
    /// Servers in creation order.
    pub servers: Vec<ServerSummary>,
    /// Shared load-balancer address, when the pair is part of the topology.
    pub ha_address: Option<String>,
    /// Final stage reached.
    pub stage: BuildStage,
    /// When the build finished.
    pub completed_at: DateTime<Utc>,
}

/// Picks the address a server is reached at: its primary-tagged address,
/// else the first one.
fn reachable_address(addresses: &[FloatingIp]) -> Option<&FloatingIp> {
    addresses
        .iter()
        .find(|ip| ip.role() == AddressRole::Primary)
        .or_else(|| addresses.first())
}

/// Builds and destroys one application environment.
pub struct TopologyBuilder<C: CloudConnection, B: Bootstrapper> {
    facade: ResourceFacade<C>,
    bootstrapper: B,
    params: DeployParams,
    key_pair_name: String,
    stage: BuildStage,
}

impl<C: CloudConnection, B: Bootstrapper> fmt::Debug for TopologyBuilder<C, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopologyBuilder")
            .field("facade", &self.facade)
            .field("params", &self.params)
            .field("stage", &self.stage)
            .finish_non_exhaustive()
    }
}

impl<C: CloudConnection, B: Bootstrapper> TopologyBuilder<C, B> {
    /// Creates a builder for the given environment.
    pub fn new(facade: ResourceFacade<C>, bootstrapper: B, params: DeployParams) -> Self {
        Self {
            facade,
            bootstrapper,
            params,
            key_pair_name: String::from(SALT_CLOUD_KEY_PAIR),
            stage: BuildStage::Init,
        }
    }

    /// Sets the salt-cloud key pair name.
    #[must_use]
    pub fn with_key_pair_name(mut self, name: impl Into<String>) -> Self {
        self.key_pair_name = name.into();
        self
    }

    /// Stage reached by the last build.
    pub const fn stage(&self) -> BuildStage {
        self.stage
    }

    /// The facade in use.
    pub const fn facade(&self) -> &ResourceFacade<C> {
        &self.facade
    }

    /// Build parameters.
    pub const fn params(&self) -> &DeployParams {
        &self.params
    }

    fn advance(&mut self, stage: BuildStage) {
        debug!("Stage {} -> {stage}", self.stage);
        self.stage = stage;
    }

    /// Checks that the image and flavor exist. Returns the undersized-flavor
    /// warning, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the image or flavor is missing.
    pub async fn validate(&self) -> Result<Option<String>> {
        let image = self
            .facade
            .get_image(&self.params.image_name)
            .await?
            .ok_or_else(|| BuildError::ImageNotFound {
                name: self.params.image_name.clone(),
            })?;

        let flavor = self
            .facade
            .get_flavor(&self.params.server_size)
            .await?
            .ok_or_else(|| BuildError::FlavorNotFound {
                name: self.params.server_size.clone(),
            })?;

        Ok(ResourceFacade::<C>::validate_image_flavor_combination(
            &image, &flavor,
        ))
    }

    async fn prepare(&self) -> Result<()> {
        if let Some(message) = self.validate().await? {
            warn!("{message}");
        }
        Ok(())
    }

    /// Builds the whole topology.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails, a new server ends up without a
    /// public address, bootstrapping fails, or an API call fails.
    pub async fn build(&mut self) -> Result<BuildReport> {
        self.stage = BuildStage::Init;
        info!(
            "Building {} ({} app server(s))",
            self.params.names.server_base_name, self.params.num_servers
        );

        self.prepare().await?;

        let names = self.params.names.clone();
        let router = self.facade.find_or_create_router(&names.router_name).await?;
        self.advance(BuildStage::RouterReady);

        let network = self
            .facade
            .find_or_create_network(&names.network_name)
            .await?;
        self.advance(BuildStage::NetworkReady);

        let subnet = self
            .facade
            .find_or_create_subnet(&names.subnet_name, &network)
            .await?;
        self.advance(BuildStage::SubnetReady);

        let port = self.facade.find_or_create_port(&network, &subnet).await?;
        self.advance(BuildStage::PortReady);

        self.facade
            .add_interface_to_router(&router, &subnet, &port)
            .await?;
        self.advance(BuildStage::RouterWired);

        let placement = Placement {
            network,
            subnet,
            port,
        };
        let mut servers = Vec::new();

        let control_address = self.create_control_server(&placement, &mut servers).await?;
        self.advance(BuildStage::ControlServerReady);

        let workers = self
            .create_app_servers(&placement, &control_address, &mut servers)
            .await?;
        self.bootstrapper
            .register_workers(&control_address, &workers)
            .await?;
        self.advance(BuildStage::AppServersReady);

        let ha_address = if self.params.load_balancers {
            Some(
                self.create_load_balancers(&placement, &control_address, &mut servers)
                    .await?,
            )
        } else {
            debug!("Load balancers disabled");
            None
        };

        self.bootstrapper
            .apply_configuration(&control_address)
            .await?;
        self.advance(BuildStage::Done);

        info!("Built {}", names.server_base_name);
        Ok(BuildReport {
            app: names.app,
            environment: names.environment,
            servers,
            ha_address,
            stage: self.stage,
            completed_at: Utc::now(),
        })
    }

    /// Ensures one server and records its public addresses.
    async fn ensure_server(
        &self,
        placement: &Placement,
        role: ServerRole,
        security_groups: Vec<String>,
        servers: &mut Vec<ServerSummary>,
    ) -> Result<(Server, Vec<FloatingIp>)> {
        let name = self.params.names.server_name_for(role);
        let spec = ServerSpec::new(&name, &self.params.image_name, &self.params.server_size)
            .with_security_groups(security_groups);

        let server = self.facade.find_or_create_server(&spec, placement).await?;
        let addresses = self
            .facade
            .get_public_addresses(&server, &placement.network.name)
            .await?
            .unwrap_or_default();

        servers.push(ServerSummary {
            name,
            role: role.to_string(),
            public_addresses: addresses
                .iter()
                .map(|ip| ip.floating_ip_address.clone())
                .collect(),
        });

        Ok((server, addresses))
    }

    /// Creates and bootstraps the salt master. Returns its public address.
    async fn create_control_server(
        &self,
        placement: &Placement,
        servers: &mut Vec<ServerSummary>,
    ) -> Result<String> {
        let (server, addresses) = self
            .ensure_server(placement, ServerRole::Control, Vec::new(), servers)
            .await?;

        let address = reachable_address(&addresses)
            .map(|ip| ip.floating_ip_address.clone())
            .ok_or_else(|| BuildError::NoPublicAddress {
                server: server.name.clone(),
            })?;

        self.bootstrapper.bootstrap_control_server(&address).await?;
        self.bootstrapper
            .configure_cloud_provider(&address, &placement.network.name)
            .await?;

        match self.facade.get_or_create_key_pair(&self.key_pair_name).await? {
            KeyPairOutcome::Created(created) => match created.private_key.as_deref() {
                Some(private_key) => {
                    info!("Writing private key for {}", created.name);
                    self.bootstrapper
                        .install_private_key(&address, private_key)
                        .await?;
                }
                None => warn!("Key pair {} was created without a private key", created.name),
            },
            KeyPairOutcome::Found(found) => {
                info!("Private key for {} is already configured", found.name);
            }
        }

        Ok(address)
    }

    /// Creates the app servers as minions of the control server. Returns their names.
    async fn create_app_servers(
        &self,
        placement: &Placement,
        control_address: &str,
        servers: &mut Vec<ServerSummary>,
    ) -> Result<Vec<String>> {
        let mut names = Vec::with_capacity(self.params.num_servers);

        for index in 0..self.params.num_servers {
            let (server, addresses) = self
                .ensure_server(placement, ServerRole::App(index), Vec::new(), servers)
                .await?;
            let address = reachable_address(&addresses).ok_or_else(|| {
                BuildError::NoPublicAddress {
                    server: server.name.clone(),
                }
            })?;

            self.bootstrapper
                .bootstrap_worker(&address.floating_ip_address, control_address)
                .await?;
            names.push(server.name);
        }

        Ok(names)
    }

    /// Creates the load-balancer pair and settles their shared address.
    /// Returns the shared address.
    async fn create_load_balancers(
        &mut self,
        placement: &Placement,
        control_address: &str,
        servers: &mut Vec<ServerSummary>,
    ) -> Result<String> {
        let vrrp = self.facade.get_or_create_vrrp_security_group().await?;
        let groups = vec![
            self.facade.settings().default_security_group.clone(),
            vrrp.name,
        ];

        let mut pair = Vec::with_capacity(2);
        for role in [ServerRole::PrimaryBalancer, ServerRole::SecondaryBalancer] {
            let (server, addresses) = self
                .ensure_server(placement, role, groups.clone(), servers)
                .await?;
            let address = reachable_address(&addresses).ok_or_else(|| {
                BuildError::NoPublicAddress {
                    server: server.name.clone(),
                }
            })?;
            self.bootstrapper
                .bootstrap_worker(&address.floating_ip_address, control_address)
                .await?;
            pair.push((server, addresses));
        }

        let balancer_names: Vec<String> = pair.iter().map(|(s, _)| s.name.clone()).collect();
        self.bootstrapper
            .register_workers(control_address, &balancer_names)
            .await?;
        self.advance(BuildStage::LoadBalancersReady);

        let (secondary, secondary_addresses) = pair
            .pop()
            .ok_or_else(|| TopologyError::internal("secondary balancer missing"))?;
        let (primary, primary_addresses) = pair
            .pop()
            .ok_or_else(|| TopologyError::internal("primary balancer missing"))?;

        let primary_port = self.facade.get_ports_for_server(&primary).await?;
        let secondary_port = self.facade.get_ports_for_server(&secondary).await?;

        let choice = choose_ha_address(&primary_addresses, &secondary_addresses);
        let shared = match choice.reused() {
            Some(ip) => {
                debug!("Reusing shared address {}", ip.floating_ip_address);
                ip.clone()
            }
            None => {
                self.facade
                    .assign_floating_ip(placement, &primary, AddressRole::HaShared)
                    .await?
            }
        };

        let config = HaConfig {
            floating_address: shared.floating_ip_address.clone(),
            virtual_address: shared.fixed_ip_address.clone(),
            primary_address: primary_port
                .first()
                .and_then(|p| p.first_address())
                .map(ToString::to_string),
            secondary_address: secondary_port
                .first()
                .and_then(|p| p.first_address())
                .map(ToString::to_string),
        };
        self.bootstrapper
            .place_ha_config(control_address, &config)
            .await?;
        self.advance(BuildStage::HaConfigured);

        info!("Shared address is {}", shared.floating_ip_address);
        Ok(shared.floating_ip_address)
    }

    /// Tears the topology down. Resources already gone are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error for API failures other than "not there".
    pub async fn destroy(&self) -> Result<()> {
        let names = &self.params.names;
        let network = &names.network_name;
        info!("Destroying {}", names.server_base_name);

        for role in [ServerRole::PrimaryBalancer, ServerRole::SecondaryBalancer] {
            self.facade
                .delete_server(&names.server_name_for(role), network)
                .await?;
        }
        self.facade.delete_key_pair(&self.key_pair_name).await?;
        let vrrp_group = self.facade.settings().vrrp_security_group.clone();
        self.facade.delete_security_group(&vrrp_group).await?;

        for name in names.app_server_names(self.params.num_servers) {
            self.facade.delete_server(&name, network).await?;
        }

        self.facade
            .delete_server(&names.server_name_for(ServerRole::Control), network)
            .await?;

        self.facade
            .delete_subnet(&names.subnet_name, &names.router_name)
            .await?;
        self.facade.delete_network(network).await?;
        self.facade.delete_router(&names.router_name).await?;

        info!("Destroyed {}", names.server_base_name);
        Ok(())
    }
}
