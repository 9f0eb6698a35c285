//! Read-only inspection of an environment.
//!
//! Looks up every resource a build would create for the environment and
//! reports which of them exist, without creating or deleting anything.

use serde::Serialize;
use tracing::{debug, info};

use crate::config::CloudSettings;
use crate::error::Result;
use crate::naming::{DeployParams, ServerRole};
use crate::openstack::{CloudConnection, FloatingIp, ServerStatus};

/// A named resource and whether it exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObservedResource {
    /// Resource kind.
    pub kind: String,
    /// Expected name.
    pub name: String,
    /// Id when the resource exists.
    pub id: Option<String>,
}

impl ObservedResource {
    fn new(kind: &str, name: &str, id: Option<String>) -> Self {
        Self {
            kind: kind.to_string(),
            name: name.to_string(),
            id,
        }
    }

    /// Returns true if the resource exists.
    #[must_use]
    pub const fn exists(&self) -> bool {
        self.id.is_some()
    }
}

/// A server slot of the environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObservedServer {
    /// Expected name.
    pub name: String,
    /// Role prefix.
    pub role: String,
    /// Id when the server exists.
    pub id: Option<String>,
    /// Status when the server exists.
    pub status: Option<ServerStatus>,
    /// Floating addresses mapped to the server.
    pub public_addresses: Vec<String>,
}

impl ObservedServer {
    /// Returns true if the server exists.
    #[must_use]
    pub const fn exists(&self) -> bool {
        self.id.is_some()
    }
}

/// What exists of one environment.
#[derive(Debug, Clone, Serialize)]
pub struct EnvironmentStatus {
    /// Sanitized application identifier.
    pub app: String,
    /// Sanitized environment identifier.
    pub environment: String,
    /// Network-side resources and security groups, in build order.
    pub resources: Vec<ObservedResource>,
    /// Server slots, in build order.
    pub servers: Vec<ObservedServer>,
}

impl EnvironmentStatus {
    /// Number of resources and servers present.
    #[must_use]
    pub fn present_count(&self) -> usize {
        self.resources.iter().filter(|r| r.exists()).count()
            + self.servers.iter().filter(|s| s.exists()).count()
    }

    /// Number of resources and servers expected.
    #[must_use]
    pub fn expected_count(&self) -> usize {
        self.resources.len() + self.servers.len()
    }

    /// Returns true if nothing of the environment exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.present_count() == 0
    }

    /// Returns true if everything exists and every server is active.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.present_count() == self.expected_count()
            && self
                .servers
                .iter()
                .all(|s| s.status == Some(ServerStatus::Active))
    }
}

/// Inspects environments through a connection.
#[derive(Debug)]
pub struct EnvironmentInspector<'a, C: CloudConnection> {
    conn: &'a C,
    settings: &'a CloudSettings,
}

impl<'a, C: CloudConnection> EnvironmentInspector<'a, C> {
    /// Creates an inspector.
    #[must_use]
    pub const fn new(conn: &'a C, settings: &'a CloudSettings) -> Self {
        Self { conn, settings }
    }

    /// Looks up every resource the environment is made of.
    ///
    /// # Errors
    ///
    /// Returns an error if a lookup fails.
    pub async fn inspect(&self, params: &DeployParams) -> Result<EnvironmentStatus> {
        let names = &params.names;
        info!("Inspecting {}", names.server_base_name);

        let router = self.conn.find_router(&names.router_name).await?;
        let network = self.conn.find_network(&names.network_name).await?;
        let subnet = self.conn.find_subnet(&names.subnet_name).await?;

        let mut resources = vec![
            ObservedResource::new("router", &names.router_name, router.map(|r| r.id)),
            ObservedResource::new("network", &names.network_name, network.map(|n| n.id)),
            ObservedResource::new("subnet", &names.subnet_name, subnet.map(|s| s.id)),
        ];

        let mut roles = vec![ServerRole::Control];
        roles.extend((0..params.num_servers).map(ServerRole::App));

        if params.load_balancers {
            let group = &self.settings.vrrp_security_group;
            let found = self.conn.find_security_group(group).await?;
            resources.push(ObservedResource::new("security group", group, found.map(|g| g.id)));
            roles.push(ServerRole::PrimaryBalancer);
            roles.push(ServerRole::SecondaryBalancer);
        }

        let floating_ips = self.conn.list_floating_ips().await?;
        let mut servers = Vec::with_capacity(roles.len());
        for role in roles {
            let name = names.server_name_for(role);
            servers.push(
                self.observe_server(&name, role, &names.network_name, &floating_ips)
                    .await?,
            );
        }

        let status = EnvironmentStatus {
            app: names.app.clone(),
            environment: names.environment.clone(),
            resources,
            servers,
        };
        debug!(
            "{} of {} resources present",
            status.present_count(),
            status.expected_count()
        );
        Ok(status)
    }

    async fn observe_server(
        &self,
        name: &str,
        role: ServerRole,
        network_name: &str,
        floating_ips: &[FloatingIp],
    ) -> Result<ObservedServer> {
        let Some(server) = self.conn.find_server(name).await? else {
            return Ok(ObservedServer {
                name: name.to_string(),
                role: role.to_string(),
                id: None,
                status: None,
                public_addresses: Vec::new(),
            });
        };

        let public_addresses = server
            .fixed_address(network_name)
            .map(|fixed| {
                floating_ips
                    .iter()
                    .filter(|ip| ip.fixed_ip_address.as_deref() == Some(fixed))
                    .map(|ip| ip.floating_ip_address.clone())
                    .collect()
            })
            .unwrap_or_default();

        Ok(ObservedServer {
            name: name.to_string(),
            role: role.to_string(),
            id: Some(server.id),
            status: Some(server.status),
            public_addresses,
        })
    }
}
