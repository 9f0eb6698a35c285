//! Idempotent resource operations on top of a [`CloudConnection`].
//!
//! Every build operation looks a resource up by name first and only creates
//! it when absent. Every teardown operation looks the resource up, reports
//! and returns when it is missing, and treats API faults that mean "not
//! there" the same way.

use std::sync::Arc;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::config::{CloudSettings, WaitPolicy};
use crate::error::{BuildError, CloudError, Result, TopologyError};

use super::connection::CloudConnection;
use super::reporter::Reporter;
use super::types::{
    AddressRole, CreateFloatingIpRequest, CreatePortRequest, CreateRouterRequest,
    CreateSecurityGroupRuleRequest, CreateServerRequest, CreateSubnetRequest, ExternalGateway,
    Flavor, FloatingIp, Image, KeyPairOutcome, Network, Port, Router, SecurityGroup, Server,
    ServerStatus, Subnet, VRRP_PROTOCOL, is_private_ipv4,
};

/// Where a server is attached: its network, the subnet addresses come from
/// and the port floating addresses are bound through.
#[derive(Debug, Clone)]
pub struct Placement {
    /// Private network.
    pub network: Network,
    /// Private subnet.
    pub subnet: Subnet,
    /// Router-facing port.
    pub port: Port,
}

/// What a server should look like when it has to be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSpec {
    /// Server name.
    pub name: String,
    /// Image name.
    pub image_name: String,
    /// Flavor name.
    pub flavor_name: String,
    /// Security group names. Empty means the cloud default.
    pub security_groups: Vec<String>,
}

impl ServerSpec {
    /// Creates a spec with the cloud's default security group.
    #[must_use]
    pub fn new(name: impl Into<String>, image_name: &str, flavor_name: &str) -> Self {
        Self {
            name: name.into(),
            image_name: image_name.to_string(),
            flavor_name: flavor_name.to_string(),
            security_groups: Vec::new(),
        }
    }

    /// Sets the security groups.
    #[must_use]
    pub fn with_security_groups(mut self, groups: Vec<String>) -> Self {
        self.security_groups = groups;
        self
    }
}

/// Find-or-create and find-or-delete operations for the topology resources.
pub struct ResourceFacade<C: CloudConnection> {
    conn: C,
    settings: CloudSettings,
    wait: WaitPolicy,
    reporter: Arc<dyn Reporter>,
}

impl<C: CloudConnection> std::fmt::Debug for ResourceFacade<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceFacade")
            .field("settings", &self.settings)
            .field("wait", &self.wait)
            .finish_non_exhaustive()
    }
}

impl<C: CloudConnection> ResourceFacade<C> {
    /// Creates a facade over a connection.
    pub fn new(
        conn: C,
        settings: CloudSettings,
        wait: WaitPolicy,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            conn,
            settings,
            wait,
            reporter,
        }
    }

    /// The underlying connection.
    pub const fn connection(&self) -> &C {
        &self.conn
    }

    /// Cloud settings in use.
    pub const fn settings(&self) -> &CloudSettings {
        &self.settings
    }

    fn report(&self, label: &str) {
        self.reporter.display(label, None);
    }

    fn report_with(&self, label: &str, detail: &dyn std::fmt::Debug) {
        self.reporter.display(label, Some(detail));
    }

    async fn public_network(&self) -> Result<Network> {
        self.conn
            .find_network(&self.settings.public_network)
            .await?
            .ok_or_else(|| {
                TopologyError::Cloud(CloudError::PublicNetworkMissing {
                    name: self.settings.public_network.clone(),
                })
            })
    }

    // --------------------------------------------------------------------
    // Build operations
    // --------------------------------------------------------------------

    /// Finds the named router or creates it with a gateway on the public network.
    ///
    /// # Errors
    ///
    /// Returns an error if the public network is missing or an API call fails.
    pub async fn find_or_create_router(&self, name: &str) -> Result<Router> {
        if let Some(router) = self.conn.find_router(name).await? {
            self.report_with(&format!("Found router {name}"), &router);
            return Ok(router);
        }

        let public = self.public_network().await?;
        let request = CreateRouterRequest {
            name: name.to_string(),
            external_gateway_info: ExternalGateway {
                network_id: public.id,
            },
        };
        let router = self.conn.create_router(&request).await?;
        info!("Created router {name} ({})", router.id);
        self.report_with(&format!("Created router {name}"), &router);
        Ok(router)
    }

    /// Finds or creates the named network.
    ///
    /// # Errors
    ///
    /// Returns an error if an API call fails.
    pub async fn find_or_create_network(&self, name: &str) -> Result<Network> {
        if let Some(network) = self.conn.find_network(name).await? {
            self.report_with(&format!("Found network {name}"), &network);
            return Ok(network);
        }

        let network = self.conn.create_network(name).await?;
        info!("Created network {name} ({})", network.id);
        self.report_with(&format!("Created network {name}"), &network);
        Ok(network)
    }

    /// Finds the named subnet or creates it on the network.
    ///
    /// # Errors
    ///
    /// Returns an error if an API call fails.
    pub async fn find_or_create_subnet(&self, name: &str, network: &Network) -> Result<Subnet> {
        if let Some(subnet) = self.conn.find_subnet(name).await? {
            self.report_with(&format!("Found subnet {name}"), &subnet);
            return Ok(subnet);
        }

        let request = CreateSubnetRequest::new(name, &network.id, &self.settings.subnet_cidr)
            .with_dns_nameservers(&self.settings.dns_nameservers);
        let subnet = self.conn.create_subnet(&request).await?;
        info!("Created subnet {name} ({})", subnet.id);
        self.report_with(&format!("Created subnet {name}"), &subnet);
        Ok(subnet)
    }

    /// Finds a port on the network with an address from the subnet, or creates one.
    ///
    /// # Errors
    ///
    /// Returns an error if the default security group is missing or an API call fails.
    pub async fn find_or_create_port(&self, network: &Network, subnet: &Subnet) -> Result<Port> {
        let mut candidates: Vec<Port> = self
            .conn
            .list_ports()
            .await?
            .into_iter()
            .filter(|port| port.network_id == network.id && port.is_on_subnet(&subnet.id))
            .collect();

        if candidates.len() > 1 {
            warn!(
                "{} ports found on network {} and subnet {}, using the first",
                candidates.len(),
                network.name,
                subnet.name
            );
        }

        if !candidates.is_empty() {
            let port = candidates.swap_remove(0);
            self.report_with(&format!("Found port {}", port.id), &port);
            return Ok(port);
        }

        let group_name = &self.settings.default_security_group;
        let group = self
            .conn
            .find_security_group(group_name)
            .await?
            .ok_or_else(|| BuildError::SecurityGroupMissing {
                name: group_name.clone(),
            })?;

        let request = CreatePortRequest {
            network_id: network.id.clone(),
            security_groups: vec![group.id],
        };
        let port = self.conn.create_port(&request).await?;
        info!("Created port {} on network {}", port.id, network.name);
        self.report_with(&format!("Created port {}", port.id), &port);
        Ok(port)
    }

    /// Attaches the subnet to the router through the port. Repeating is harmless.
    ///
    /// # Errors
    ///
    /// Returns an error if the attachment is rejected for another reason.
    pub async fn add_interface_to_router(
        &self,
        router: &Router,
        subnet: &Subnet,
        port: &Port,
    ) -> Result<()> {
        if port.device_id.as_deref() == Some(router.id.as_str()) {
            self.report(&format!("Found interface on router {}", router.name));
            return Ok(());
        }

        match self
            .conn
            .add_router_interface(&router.id, &subnet.id, Some(port.id.clone()))
            .await
        {
            Ok(()) => {}
            Err(TopologyError::Cloud(CloudError::ApiRequestFailed { status: 409, .. })) => {
                debug!("Port {} is already attached to router {}", port.id, router.name);
            }
            Err(e) => return Err(e),
        }

        self.report_with(&format!("Added interface to router {}", router.name), router);
        Ok(())
    }

    /// Finds the named server, or creates it, waits for it to run and gives it
    /// a primary floating address.
    ///
    /// An existing server is returned as-is.
    ///
    /// # Errors
    ///
    /// Returns an error if the image or flavor is missing, the server fails or
    /// does not become active in time, or an API call fails.
    pub async fn find_or_create_server(
        &self,
        spec: &ServerSpec,
        placement: &Placement,
    ) -> Result<Server> {
        if let Some(found) = self.conn.find_server(&spec.name).await? {
            let server = self.conn.get_server(&found.id).await?;
            self.report_with(&format!("Found server {}", spec.name), &server);
            return Ok(server);
        }

        let image = self.get_image(&spec.image_name).await?.ok_or_else(|| {
            BuildError::ImageNotFound {
                name: spec.image_name.clone(),
            }
        })?;
        let flavor = self.get_flavor(&spec.flavor_name).await?.ok_or_else(|| {
            BuildError::FlavorNotFound {
                name: spec.flavor_name.clone(),
            }
        })?;
        let key_name = self.get_name_of_first_key_pair().await?;

        let request = CreateServerRequest::new(&spec.name, &image.id, &flavor.id, &placement.network.id)
            .with_key_name(key_name)
            .with_security_groups(&spec.security_groups);

        self.report(&format!("Creating server {}", spec.name));
        let created = self.conn.create_server(&request).await?;
        let server = self
            .wait_for_server_status(&created.id, &spec.name, ServerStatus::Active)
            .await?;

        self.assign_floating_ip(placement, &server, AddressRole::Primary)
            .await?;

        let server = self.conn.get_server(&server.id).await?;
        info!("Created server {} ({})", spec.name, server.id);
        self.report_with(&format!("Created server {}", spec.name), &server);
        Ok(server)
    }

    /// Allocates a new floating address for the server's fixed address on the
    /// placement network and attaches it.
    ///
    /// # Errors
    ///
    /// Returns an error if the server has no address on the network or an API call fails.
    pub async fn assign_floating_ip(
        &self,
        placement: &Placement,
        server: &Server,
        role: AddressRole,
    ) -> Result<FloatingIp> {
        let network_name = &placement.network.name;
        let fixed_address = server.fixed_address(network_name).ok_or_else(|| {
            BuildError::NoFixedAddress {
                server: server.name.clone(),
                network: network_name.clone(),
            }
        })?;

        let public = self.public_network().await?;
        let request = CreateFloatingIpRequest {
            floating_network_id: public.id,
            port_id: placement.port.id.clone(),
            subnet_id: placement.subnet.id.clone(),
            fixed_ip_address: fixed_address.to_string(),
            description: role.tag().to_string(),
        };

        let floating_ip = self.conn.create_floating_ip(&request).await?;
        self.conn
            .add_floating_ip_to_server(&server.id, &floating_ip.floating_ip_address)
            .await?;

        info!(
            "Assigned floating address {} to server {}",
            floating_ip.floating_ip_address, server.name
        );
        self.report_with(
            &format!("Assigned floating address {}", floating_ip.floating_ip_address),
            &floating_ip,
        );
        Ok(floating_ip)
    }

    /// Finds the named key pair or generates it.
    ///
    /// # Errors
    ///
    /// Returns an error if an API call fails.
    pub async fn get_or_create_key_pair(&self, name: &str) -> Result<KeyPairOutcome> {
        if let Some(key_pair) = self.conn.find_key_pair(name).await? {
            self.report_with(&format!("Found key pair {name}"), &key_pair);
            return Ok(KeyPairOutcome::Found(key_pair));
        }

        let created = self.conn.create_key_pair(name).await?;
        self.report_with(&format!("Created key pair {name}"), &created);
        Ok(KeyPairOutcome::Created(created))
    }

    /// Finds or creates the VRRP security group with its single ingress rule.
    ///
    /// # Errors
    ///
    /// Returns an error if an API call fails.
    pub async fn get_or_create_vrrp_security_group(&self) -> Result<SecurityGroup> {
        let name = &self.settings.vrrp_security_group;

        let mut group = match self.conn.find_security_group(name).await? {
            Some(group) => {
                self.report_with(&format!("Found security group {name}"), &group);
                group
            }
            None => {
                let group = self
                    .conn
                    .create_security_group(name, "Allow VRRP between the load balancers")
                    .await?;
                self.report_with(&format!("Created security group {name}"), &group);
                group
            }
        };

        let has_vrrp_rule = group.security_group_rules.iter().any(|rule| {
            rule.direction == "ingress" && rule.protocol.as_deref() == Some(VRRP_PROTOCOL)
        });

        if !has_vrrp_rule {
            let rule = self
                .conn
                .create_security_group_rule(&CreateSecurityGroupRuleRequest::vrrp_ingress(&group.id))
                .await?;
            debug!("Added VRRP rule {} to security group {name}", rule.id);
            group.security_group_rules.push(rule);
        }

        Ok(group)
    }

    // --------------------------------------------------------------------
    // Lookups
    // --------------------------------------------------------------------

    /// Floating addresses mapped to the server's fixed address on the network.
    ///
    /// Returns `None` when the server has no address on that network.
    ///
    /// # Errors
    ///
    /// Returns an error if the floating IPs cannot be listed.
    pub async fn get_public_addresses(
        &self,
        server: &Server,
        network_name: &str,
    ) -> Result<Option<Vec<FloatingIp>>> {
        let Some(fixed_address) = server.fixed_address(network_name) else {
            return Ok(None);
        };

        if !is_private_ipv4(fixed_address) {
            warn!(
                "Server {} has non-private fixed address {fixed_address} on {network_name}",
                server.name
            );
        }

        let addresses = self
            .conn
            .list_floating_ips()
            .await?
            .into_iter()
            .filter(|ip| ip.fixed_ip_address.as_deref() == Some(fixed_address))
            .collect();

        Ok(Some(addresses))
    }

    /// Ports attached to the server.
    ///
    /// # Errors
    ///
    /// Returns an error if the ports cannot be listed.
    pub async fn get_ports_for_server(&self, server: &Server) -> Result<Vec<Port>> {
        self.conn.list_ports_for_device(&server.id).await
    }

    /// Name of the first key pair in the project, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the key pairs cannot be listed.
    pub async fn get_name_of_first_key_pair(&self) -> Result<Option<String>> {
        Ok(self
            .conn
            .list_key_pairs()
            .await?
            .into_iter()
            .next()
            .map(|key_pair| key_pair.name))
    }

    /// Looks an image up by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    pub async fn get_image(&self, name: &str) -> Result<Option<Image>> {
        self.conn.find_image(name).await
    }

    /// Looks a flavor up by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    pub async fn get_flavor(&self, name: &str) -> Result<Option<Flavor>> {
        self.conn.find_flavor(name).await
    }

    /// Checks the flavor against the image minimums. `None` means it fits.
    #[must_use]
    pub fn validate_image_flavor_combination(image: &Image, flavor: &Flavor) -> Option<String> {
        let ram_ok = flavor.ram >= image.min_ram;
        let disk_ok = flavor.disk >= image.min_disk;

        let shortfall = match (ram_ok, disk_ok) {
            (true, true) => return None,
            (false, false) => "RAM or disk",
            (false, true) => "RAM",
            (true, false) => "disk",
        };

        Some(format!(
            "{} does not have the minimum recommended {shortfall} for {}",
            flavor.name, image.name
        ))
    }

    // --------------------------------------------------------------------
    // Waiting
    // --------------------------------------------------------------------

    async fn wait_for_server_status(
        &self,
        server_id: &str,
        name: &str,
        target: ServerStatus,
    ) -> Result<Server> {
        let started = Instant::now();
        let deadline = started + self.wait.status_timeout();

        loop {
            let server = self.conn.get_server(server_id).await?;

            if server.status == target {
                debug!("Server {name} reached {target}");
                return Ok(server);
            }

            if server.status == ServerStatus::Error {
                return Err(CloudError::ResourceFailed {
                    resource: format!("server {name}"),
                    status: server.status.to_string(),
                }
                .into());
            }

            if Instant::now() >= deadline {
                return Err(CloudError::Timeout {
                    resource: format!("server {name}"),
                    expected_state: target.to_string(),
                    waited_secs: started.elapsed().as_secs(),
                }
                .into());
            }

            debug!("Server {name} is {}, waiting for {target}", server.status);
            sleep(self.wait.status_poll_interval()).await;
        }
    }

    async fn wait_for_server_deletion(&self, server_id: &str, name: &str) -> Result<()> {
        for attempt in 1..=self.wait.deletion_attempts {
            if self.conn.find_server(server_id).await?.is_none() {
                self.report(&format!("Deleted server {name}"));
                return Ok(());
            }
            debug!(
                "Server {name} still present (attempt {attempt}/{})",
                self.wait.deletion_attempts
            );
            sleep(self.wait.deletion_interval()).await;
        }

        warn!(
            "Server {name} still present after {} checks, continuing",
            self.wait.deletion_attempts
        );
        Ok(())
    }

    // --------------------------------------------------------------------
    // Teardown operations
    // --------------------------------------------------------------------

    /// Converts "not there" faults into a warning.
    fn tolerate(&self, step: &str, result: Result<()>) -> Result<()> {
        match result {
            Err(e) if e.is_wire_fault() => {
                warn!("{step}: {e}");
                self.report(&format!("Skipped {step}: {e}"));
                Ok(())
            }
            other => other,
        }
    }

    /// Stops, releases and deletes the named server, then waits for it to vanish.
    ///
    /// # Errors
    ///
    /// Returns an error for API failures other than "not there".
    pub async fn delete_server(&self, name: &str, network_name: &str) -> Result<()> {
        let result = self.delete_server_inner(name, network_name).await;
        self.tolerate(&format!("deleting server {name}"), result)
    }

    async fn delete_server_inner(&self, name: &str, network_name: &str) -> Result<()> {
        let Some(found) = self.conn.find_server(name).await? else {
            self.report(&format!("Could not find server {name}"));
            return Ok(());
        };

        let server = self.conn.get_server(&found.id).await?;
        self.report_with(&format!("Found server {name}"), &server);

        if server.is_active() {
            self.report(&format!("Stopping server {name}"));
            self.conn.stop_server(&server.id).await?;
            self.wait_for_server_status(&server.id, name, ServerStatus::Shutoff)
                .await?;
            self.report(&format!("Stopped server {name}"));
        }

        self.delete_floating_ips(&server, network_name).await?;

        self.report(&format!("Deleting server {name}"));
        self.conn.delete_server(&server.id).await?;
        self.wait_for_server_deletion(&server.id, name).await
    }

    async fn delete_floating_ips(&self, server: &Server, network_name: &str) -> Result<()> {
        let addresses = self
            .get_public_addresses(server, network_name)
            .await?
            .unwrap_or_default();

        if addresses.is_empty() {
            self.report(&format!("No floating addresses found for server {}", server.name));
            return Ok(());
        }

        for address in addresses {
            self.report(&format!(
                "Deleting floating address {}",
                address.floating_ip_address
            ));
            self.conn.delete_floating_ip(&address.id).await?;
        }
        Ok(())
    }

    /// Deletes every port on the subnet, detaching each from the router, then
    /// deletes the subnet.
    ///
    /// # Errors
    ///
    /// Returns an error for API failures other than "not there".
    pub async fn delete_subnet(&self, name: &str, router_name: &str) -> Result<()> {
        let result = self.delete_subnet_inner(name, router_name).await;
        self.tolerate(&format!("deleting subnet {name}"), result)
    }

    async fn delete_subnet_inner(&self, name: &str, router_name: &str) -> Result<()> {
        let Some(subnet) = self.conn.find_subnet(name).await? else {
            self.report(&format!("Could not find subnet {name}"));
            return Ok(());
        };
        self.report_with(&format!("Found subnet {name}"), &subnet);

        let Some(router) = self.conn.find_router(router_name).await? else {
            self.report(&format!("Could not find router {router_name}"));
            return Ok(());
        };

        self.delete_ports(&subnet, &router).await?;

        self.report(&format!("Deleting subnet {name}"));
        self.conn.delete_subnet(&subnet.id).await?;
        self.report(&format!("Deleted subnet {name}"));
        Ok(())
    }

    async fn delete_ports(&self, subnet: &Subnet, router: &Router) -> Result<()> {
        let ports: Vec<Port> = self
            .conn
            .list_ports()
            .await?
            .into_iter()
            .filter(|port| port.is_on_subnet(&subnet.id))
            .collect();

        if ports.is_empty() {
            self.report(&format!("Could not find any ports on subnet {}", subnet.name));
            return Ok(());
        }

        self.report(&format!("Deleting {} port(s) on subnet {}", ports.len(), subnet.name));
        for port in ports {
            let detached = self
                .conn
                .remove_router_interface(&router.id, &subnet.id, Some(port.id.clone()))
                .await;
            if let Err(e) = detached {
                if !e.is_wire_fault() {
                    return Err(e);
                }
                debug!("Port {} was not a router interface: {e}", port.id);
            }

            // Detaching a router interface may already have removed the port.
            if let Err(e) = self.conn.delete_port(&port.id).await {
                if !e.is_wire_fault() {
                    return Err(e);
                }
                debug!("Port {} already gone: {e}", port.id);
            }
        }
        Ok(())
    }

    /// Deletes the named network if present.
    ///
    /// # Errors
    ///
    /// Returns an error for API failures other than "not there".
    pub async fn delete_network(&self, name: &str) -> Result<()> {
        let result = self.delete_network_inner(name).await;
        self.tolerate(&format!("deleting network {name}"), result)
    }

    async fn delete_network_inner(&self, name: &str) -> Result<()> {
        let Some(network) = self.conn.find_network(name).await? else {
            self.report(&format!("Could not find network {name}"));
            return Ok(());
        };
        self.report(&format!("Deleting network {name}"));
        self.conn.delete_network(&network.id).await?;
        self.report(&format!("Deleted network {name}"));
        Ok(())
    }

    /// Deletes the named router if present.
    ///
    /// # Errors
    ///
    /// Returns an error for API failures other than "not there".
    pub async fn delete_router(&self, name: &str) -> Result<()> {
        let result = self.delete_router_inner(name).await;
        self.tolerate(&format!("deleting router {name}"), result)
    }

    async fn delete_router_inner(&self, name: &str) -> Result<()> {
        let Some(router) = self.conn.find_router(name).await? else {
            self.report(&format!("Could not find router {name}"));
            return Ok(());
        };
        self.report(&format!("Deleting router {name}"));
        self.conn.delete_router(&router.id).await?;
        self.report(&format!("Deleted router {name}"));
        Ok(())
    }

    /// Deletes the named security group if present.
    ///
    /// # Errors
    ///
    /// Returns an error for API failures other than "not there".
    pub async fn delete_security_group(&self, name: &str) -> Result<()> {
        let result = self.delete_security_group_inner(name).await;
        self.tolerate(&format!("deleting security group {name}"), result)
    }

    async fn delete_security_group_inner(&self, name: &str) -> Result<()> {
        let Some(group) = self.conn.find_security_group(name).await? else {
            self.report(&format!("Could not find security group {name}"));
            return Ok(());
        };
        self.report(&format!("Deleting security group {name}"));
        self.conn.delete_security_group(&group.id).await?;
        self.report(&format!("Deleted security group {name}"));
        Ok(())
    }

    /// Deletes the named key pair if present.
    ///
    /// # Errors
    ///
    /// Returns an error for API failures other than "not there".
    pub async fn delete_key_pair(&self, name: &str) -> Result<()> {
        let result = self.delete_key_pair_inner(name).await;
        self.tolerate(&format!("deleting key pair {name}"), result)
    }

    async fn delete_key_pair_inner(&self, name: &str) -> Result<()> {
        if self.conn.find_key_pair(name).await?.is_none() {
            self.report(&format!("Could not find key pair {name}"));
            return Ok(());
        }
        self.report(&format!("Deleting key pair {name}"));
        self.conn.delete_key_pair(name).await?;
        self.report(&format!("Deleted key pair {name}"));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openstack::connection::MockCloudConnection;
    use crate::openstack::reporter::testing::RecordingReporter;
    use crate::openstack::types::{FixedIp, KeyPair, NewKeyPair, SecurityGroupRule, ServerAddress};
    use std::collections::HashMap;

    fn facade(mock: MockCloudConnection) -> (ResourceFacade<MockCloudConnection>, Arc<RecordingReporter>) {
        let reporter = Arc::new(RecordingReporter::default());
        let facade = ResourceFacade::new(
            mock,
            CloudSettings::default(),
            WaitPolicy::immediate(),
            reporter.clone(),
        );
        (facade, reporter)
    }

    fn public_network() -> Network {
        Network {
            id: String::from("public-id"),
            name: String::from("public"),
            subnets: Vec::new(),
            status: None,
        }
    }

    fn router(name: &str) -> Router {
        Router {
            id: format!("{name}-id"),
            name: name.to_string(),
            status: None,
            external_gateway_info: Some(ExternalGateway {
                network_id: String::from("public-id"),
            }),
        }
    }

    fn network() -> Network {
        Network {
            id: String::from("net-id"),
            name: String::from("network-blog-dev"),
            subnets: vec![String::from("subnet-id")],
            status: None,
        }
    }

    fn subnet() -> Subnet {
        Subnet {
            id: String::from("subnet-id"),
            name: String::from("subnet-blog-dev"),
            network_id: String::from("net-id"),
            cidr: String::from("10.0.0.0/24"),
            ip_version: 4,
            enable_dhcp: true,
            dns_nameservers: vec![String::from("8.8.8.8")],
        }
    }

    fn port(id: &str, network_id: &str, subnet_id: &str) -> Port {
        Port {
            id: id.to_string(),
            name: String::new(),
            network_id: network_id.to_string(),
            fixed_ips: vec![FixedIp {
                subnet_id: subnet_id.to_string(),
                ip_address: Some(String::from("10.0.0.1")),
            }],
            device_id: None,
            security_groups: Vec::new(),
        }
    }

    fn server(name: &str, status: ServerStatus, fixed: Option<&str>) -> Server {
        let mut addresses = HashMap::new();
        if let Some(addr) = fixed {
            addresses.insert(
                String::from("network-blog-dev"),
                vec![ServerAddress {
                    addr: addr.to_string(),
                    version: 4,
                    kind: Some(String::from("fixed")),
                }],
            );
        }
        Server {
            id: format!("{name}-id"),
            name: name.to_string(),
            status,
            addresses,
            key_name: None,
        }
    }

    fn floating(id: &str, address: &str, fixed: &str, role: AddressRole) -> FloatingIp {
        FloatingIp {
            id: id.to_string(),
            floating_ip_address: address.to_string(),
            fixed_ip_address: Some(fixed.to_string()),
            port_id: Some(String::from("port-id")),
            floating_network_id: String::from("public-id"),
            description: role.tag().to_string(),
        }
    }

    fn image(min_ram: u64, min_disk: u64) -> Image {
        Image {
            id: String::from("img"),
            name: String::from("Ubuntu 16.04 LTS"),
            min_ram,
            min_disk,
        }
    }

    fn flavor(ram: u64, disk: u64) -> Flavor {
        Flavor {
            id: String::from("flv"),
            name: String::from("t1.small"),
            ram,
            disk,
            vcpus: 1,
        }
    }

    fn placement() -> Placement {
        Placement {
            network: network(),
            subnet: subnet(),
            port: port("port-id", "net-id", "subnet-id"),
        }
    }

    #[tokio::test]
    async fn test_find_or_create_router_is_idempotent() {
        let mut mock = MockCloudConnection::new();
        let mut lookups = 0;
        mock.expect_find_router()
            .withf(|name| name == "router-blog-dev")
            .times(2)
            .returning(move |name| {
                lookups += 1;
                if lookups == 1 {
                    Ok(None)
                } else {
                    Ok(Some(router(name)))
                }
            });
        mock.expect_find_network()
            .withf(|name| name == "public")
            .times(1)
            .returning(|_| Ok(Some(public_network())));
        mock.expect_create_router()
            .withf(|req| req.name == "router-blog-dev" && req.external_gateway_info.network_id == "public-id")
            .times(1)
            .returning(|req| Ok(router(&req.name)));

        let (facade, reporter) = facade(mock);
        let first = facade.find_or_create_router("router-blog-dev").await.expect("create");
        let second = facade.find_or_create_router("router-blog-dev").await.expect("find");

        assert_eq!(first.id, second.id);
        assert_eq!(
            reporter.labels(),
            vec![
                String::from("Created router router-blog-dev"),
                String::from("Found router router-blog-dev")
            ]
        );
    }

    #[tokio::test]
    async fn test_router_requires_public_network() {
        let mut mock = MockCloudConnection::new();
        mock.expect_find_router().returning(|_| Ok(None));
        mock.expect_find_network().returning(|_| Ok(None));
        mock.expect_create_router().never();

        let (facade, _) = facade(mock);
        let err = facade.find_or_create_router("r").await.expect_err("no public network");
        assert!(matches!(err, TopologyError::Cloud(CloudError::PublicNetworkMissing { .. })));
    }

    #[tokio::test]
    async fn test_subnet_created_with_configured_defaults() {
        let mut mock = MockCloudConnection::new();
        mock.expect_find_subnet().times(1).returning(|_| Ok(None));
        mock.expect_create_subnet()
            .withf(|req| {
                req.cidr == "10.0.0.0/24"
                    && req.ip_version == 4
                    && req.enable_dhcp
                    && req.dns_nameservers == vec![String::from("8.8.8.8")]
                    && req.network_id == "net-id"
            })
            .times(1)
            .returning(|_| Ok(subnet()));

        let (facade, _) = facade(mock);
        let created = facade
            .find_or_create_subnet("subnet-blog-dev", &network())
            .await
            .expect("subnet");
        assert_eq!(created.id, "subnet-id");
    }

    #[tokio::test]
    async fn test_find_port_takes_first_match() {
        let mut mock = MockCloudConnection::new();
        mock.expect_list_ports().times(1).returning(|| {
            Ok(vec![
                port("other-net", "elsewhere", "subnet-id"),
                port("p1", "net-id", "subnet-id"),
                port("p2", "net-id", "subnet-id"),
            ])
        });
        mock.expect_create_port().never();

        let (facade, _) = facade(mock);
        let found = facade.find_or_create_port(&network(), &subnet()).await.expect("port");
        assert_eq!(found.id, "p1");
    }

    #[tokio::test]
    async fn test_create_port_uses_default_group() {
        let mut mock = MockCloudConnection::new();
        mock.expect_list_ports().returning(|| Ok(Vec::new()));
        mock.expect_find_security_group()
            .withf(|name| name == "default")
            .returning(|name| {
                Ok(Some(SecurityGroup {
                    id: String::from("sg-default"),
                    name: name.to_string(),
                    description: String::new(),
                    security_group_rules: Vec::new(),
                }))
            });
        mock.expect_create_port()
            .withf(|req| req.network_id == "net-id" && req.security_groups == vec![String::from("sg-default")])
            .times(1)
            .returning(|_| Ok(port("new-port", "net-id", "subnet-id")));

        let (facade, reporter) = facade(mock);
        let created = facade.find_or_create_port(&network(), &subnet()).await.expect("port");
        assert_eq!(created.id, "new-port");
        assert!(reporter.contains("Created port new-port"));
    }

    #[tokio::test]
    async fn test_add_interface_skips_attached_port() {
        let mut mock = MockCloudConnection::new();
        mock.expect_add_router_interface().never();

        let (facade, _) = facade(mock);
        let r = router("r");
        let mut p = port("p1", "net-id", "subnet-id");
        p.device_id = Some(r.id.clone());
        facade.add_interface_to_router(&r, &subnet(), &p).await.expect("attached");
    }

    #[tokio::test]
    async fn test_add_interface_conflict_is_harmless() {
        let mut mock = MockCloudConnection::new();
        mock.expect_add_router_interface()
            .withf(|router_id, subnet_id, port_id| {
                router_id == "r-id" && subnet_id == "subnet-id" && port_id.as_deref() == Some("p1")
            })
            .times(1)
            .returning(|_, _, _| Err(CloudError::api_error(409, "port in use").into()));

        let (facade, _) = facade(mock);
        facade
            .add_interface_to_router(&router("r"), &subnet(), &port("p1", "net-id", "subnet-id"))
            .await
            .expect("conflict is tolerated");
    }

    #[tokio::test]
    async fn test_existing_server_is_returned_as_is() {
        let mut mock = MockCloudConnection::new();
        mock.expect_find_server()
            .returning(|name| Ok(Some(server(name, ServerStatus::Shutoff, None))));
        mock.expect_get_server()
            .returning(|id| Ok(server(id.trim_end_matches("-id"), ServerStatus::Shutoff, None)));
        mock.expect_create_server().never();
        mock.expect_find_image().never();

        let (facade, _) = facade(mock);
        let spec = ServerSpec::new("salt-blog-dev", "Ubuntu 16.04 LTS", "t1.small");
        let found = facade.find_or_create_server(&spec, &placement()).await.expect("found");
        assert_eq!(found.status, ServerStatus::Shutoff);
    }

    #[tokio::test]
    async fn test_create_server_assigns_primary_address() {
        let mut mock = MockCloudConnection::new();
        mock.expect_find_server().returning(|_| Ok(None));
        mock.expect_find_image().returning(|_| Ok(Some(image(512, 10))));
        mock.expect_find_flavor().returning(|_| Ok(Some(flavor(1024, 20))));
        mock.expect_list_key_pairs().returning(|| {
            Ok(vec![KeyPair {
                name: String::from("mykey"),
                fingerprint: String::new(),
                public_key: String::new(),
            }])
        });
        mock.expect_create_server()
            .withf(|req| {
                req.name == "app-0-blog-dev"
                    && req.key_name.as_deref() == Some("mykey")
                    && req.networks == vec![String::from("net-id")]
            })
            .times(1)
            .returning(|req| Ok(server(&req.name, ServerStatus::Build, None)));
        mock.expect_get_server()
            .times(2)
            .returning(|id| Ok(server(id.trim_end_matches("-id"), ServerStatus::Active, Some("10.0.0.5"))));
        mock.expect_find_network().returning(|_| Ok(Some(public_network())));
        mock.expect_create_floating_ip()
            .withf(|req| {
                req.fixed_ip_address == "10.0.0.5"
                    && req.description == "role:primary"
                    && req.port_id == "port-id"
                    && req.subnet_id == "subnet-id"
            })
            .times(1)
            .returning(|req| Ok(floating("f1", "87.254.4.145", &req.fixed_ip_address, AddressRole::Primary)));
        mock.expect_add_floating_ip_to_server()
            .withf(|id, address| id == "app-0-blog-dev-id" && address == "87.254.4.145")
            .times(1)
            .returning(|_, _| Ok(()));

        let (facade, reporter) = facade(mock);
        let spec = ServerSpec::new("app-0-blog-dev", "Ubuntu 16.04 LTS", "t1.small");
        let created = facade.find_or_create_server(&spec, &placement()).await.expect("created");
        assert!(created.is_active());
        assert!(reporter.contains("Created server app-0-blog-dev"));
    }

    #[tokio::test]
    async fn test_missing_image_and_flavor_are_fatal() {
        let mut mock = MockCloudConnection::new();
        mock.expect_find_server().returning(|_| Ok(None));
        mock.expect_find_image()
            .returning(|name| Ok((name == "Ubuntu 16.04 LTS").then(|| image(0, 0))));
        mock.expect_find_flavor().returning(|_| Ok(None));
        mock.expect_create_server().never();

        let (facade, _) = facade(mock);
        let missing_image = ServerSpec::new("s", "Windows 95", "t1.small");
        let err = facade
            .find_or_create_server(&missing_image, &placement())
            .await
            .expect_err("image is missing");
        assert!(matches!(err, TopologyError::Build(BuildError::ImageNotFound { .. })));

        let missing_flavor = ServerSpec::new("s", "Ubuntu 16.04 LTS", "huge");
        let err = facade
            .find_or_create_server(&missing_flavor, &placement())
            .await
            .expect_err("flavor is missing");
        assert!(matches!(err, TopologyError::Build(BuildError::FlavorNotFound { .. })));
    }

    #[tokio::test]
    async fn test_server_error_status_is_fatal() {
        let mut mock = MockCloudConnection::new();
        mock.expect_find_server().returning(|_| Ok(None));
        mock.expect_find_image().returning(|_| Ok(Some(image(0, 0))));
        mock.expect_find_flavor().returning(|_| Ok(Some(flavor(512, 10))));
        mock.expect_list_key_pairs().returning(|| Ok(Vec::new()));
        mock.expect_create_server()
            .withf(|req| req.key_name.is_none())
            .returning(|req| Ok(server(&req.name, ServerStatus::Build, None)));
        mock.expect_get_server()
            .returning(|id| Ok(server(id, ServerStatus::Error, None)));
        mock.expect_create_floating_ip().never();

        let (facade, _) = facade(mock);
        let spec = ServerSpec::new("s", "Ubuntu 16.04 LTS", "t1.small");
        let err = facade.find_or_create_server(&spec, &placement()).await.expect_err("error status");
        assert!(matches!(err, TopologyError::Cloud(CloudError::ResourceFailed { .. })));
    }

    #[tokio::test]
    async fn test_server_status_timeout_is_fatal() {
        let mut mock = MockCloudConnection::new();
        mock.expect_find_server().returning(|_| Ok(None));
        mock.expect_find_image().returning(|_| Ok(Some(image(0, 0))));
        mock.expect_find_flavor().returning(|_| Ok(Some(flavor(512, 10))));
        mock.expect_list_key_pairs().returning(|| Ok(Vec::new()));
        mock.expect_create_server()
            .returning(|req| Ok(server(&req.name, ServerStatus::Build, None)));
        mock.expect_get_server()
            .returning(|id| Ok(server(id, ServerStatus::Build, None)));

        let (facade, _) = facade(mock);
        let spec = ServerSpec::new("s", "Ubuntu 16.04 LTS", "t1.small");
        let err = facade.find_or_create_server(&spec, &placement()).await.expect_err("timeout");
        assert!(matches!(err, TopologyError::Cloud(CloudError::Timeout { .. })));
    }

    #[test]
    fn test_validate_image_flavor_combination() {
        type Facade = ResourceFacade<MockCloudConnection>;
        let img = image(1024, 20);

        assert_eq!(Facade::validate_image_flavor_combination(&img, &flavor(1024, 20)), None);
        assert_eq!(Facade::validate_image_flavor_combination(&img, &flavor(4096, 80)), None);
        assert_eq!(
            Facade::validate_image_flavor_combination(&img, &flavor(512, 10)).as_deref(),
            Some("t1.small does not have the minimum recommended RAM or disk for Ubuntu 16.04 LTS")
        );
        assert_eq!(
            Facade::validate_image_flavor_combination(&img, &flavor(512, 20)).as_deref(),
            Some("t1.small does not have the minimum recommended RAM for Ubuntu 16.04 LTS")
        );
        assert_eq!(
            Facade::validate_image_flavor_combination(&img, &flavor(1024, 10)).as_deref(),
            Some("t1.small does not have the minimum recommended disk for Ubuntu 16.04 LTS")
        );
    }

    #[tokio::test]
    async fn test_public_addresses() {
        let mut mock = MockCloudConnection::new();
        mock.expect_list_floating_ips().times(1).returning(|| {
            Ok(vec![
                floating("f1", "87.254.4.145", "10.0.0.5", AddressRole::Primary),
                floating("f2", "87.254.4.146", "10.0.0.6", AddressRole::Primary),
                floating("f3", "87.254.4.147", "10.0.0.5", AddressRole::HaShared),
            ])
        });

        let (facade, _) = facade(mock);
        let without = server("s", ServerStatus::Active, None);
        assert!(facade
            .get_public_addresses(&without, "network-blog-dev")
            .await
            .expect("lookup")
            .is_none());

        let with = server("s", ServerStatus::Active, Some("10.0.0.5"));
        let addresses = facade
            .get_public_addresses(&with, "network-blog-dev")
            .await
            .expect("lookup")
            .expect("server is on the network");
        let ids: Vec<&str> = addresses.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["f1", "f3"]);
    }

    #[tokio::test]
    async fn test_key_pair_outcomes() {
        let mut mock = MockCloudConnection::new();
        mock.expect_find_key_pair().times(1).returning(|_| Ok(None));
        mock.expect_create_key_pair().times(1).returning(|name| {
            Ok(NewKeyPair {
                name: name.to_string(),
                fingerprint: String::new(),
                public_key: String::new(),
                private_key: Some(String::from("PRIVATE")),
            })
        });

        let (facade, _) = facade(mock);
        let outcome = facade.get_or_create_key_pair("salt-cloud").await.expect("key pair");
        assert_eq!(outcome.private_key(), Some("PRIVATE"));
    }

    #[tokio::test]
    async fn test_vrrp_group_created_with_rule() {
        let mut mock = MockCloudConnection::new();
        mock.expect_find_security_group()
            .withf(|name| name == "vrrp")
            .returning(|_| Ok(None));
        mock.expect_create_security_group().times(1).returning(|name, _| {
            Ok(SecurityGroup {
                id: String::from("sg-vrrp"),
                name: name.to_string(),
                description: String::new(),
                security_group_rules: Vec::new(),
            })
        });
        mock.expect_create_security_group_rule()
            .withf(|req| req.protocol == "112" && req.direction == "ingress" && req.security_group_id == "sg-vrrp")
            .times(1)
            .returning(|req| {
                Ok(SecurityGroupRule {
                    id: String::from("rule-1"),
                    direction: req.direction.clone(),
                    protocol: Some(req.protocol.clone()),
                    ethertype: req.ethertype.clone(),
                    security_group_id: req.security_group_id.clone(),
                    remote_ip_prefix: None,
                })
            });

        let (facade, _) = facade(mock);
        let group = facade.get_or_create_vrrp_security_group().await.expect("group");
        assert_eq!(group.security_group_rules.len(), 1);
    }

    #[tokio::test]
    async fn test_destroy_tolerates_absent_resources() {
        let mut mock = MockCloudConnection::new();
        mock.expect_find_router().returning(|_| Ok(None));
        mock.expect_find_network().returning(|_| Ok(None));
        mock.expect_find_subnet().returning(|_| Ok(None));
        mock.expect_find_server().returning(|_| Ok(None));
        mock.expect_find_security_group().returning(|_| Ok(None));
        mock.expect_find_key_pair().returning(|_| Ok(None));
        mock.expect_delete_router().never();
        mock.expect_delete_network().never();
        mock.expect_delete_subnet().never();
        mock.expect_delete_server().never();

        let (facade, reporter) = facade(mock);
        facade.delete_server("salt-blog-dev", "network-blog-dev").await.expect("server");
        facade.delete_subnet("subnet-blog-dev", "router-blog-dev").await.expect("subnet");
        facade.delete_network("network-blog-dev").await.expect("network");
        facade.delete_router("router-blog-dev").await.expect("router");
        facade.delete_security_group("vrrp").await.expect("group");
        facade.delete_key_pair("salt-cloud").await.expect("key pair");

        assert!(reporter.contains("Could not find server salt-blog-dev"));
        assert!(reporter.contains("Could not find subnet subnet-blog-dev"));
        assert!(reporter.contains("Could not find network network-blog-dev"));
        assert!(reporter.contains("Could not find router router-blog-dev"));
    }

    #[tokio::test]
    async fn test_destroy_converts_wire_faults() {
        let mut mock = MockCloudConnection::new();
        mock.expect_find_network()
            .returning(|_| Err(CloudError::InvalidRequest { message: String::from("bad name") }.into()));
        mock.expect_find_router()
            .returning(|name| Ok(Some(router(name))));
        mock.expect_delete_router()
            .returning(|_| Err(CloudError::api_error(404, "gone").into()));

        let (facade, reporter) = facade(mock);
        facade.delete_network("network-blog-dev").await.expect("tolerated");
        facade.delete_router("router-blog-dev").await.expect("tolerated");
        assert!(reporter.contains("Skipped deleting network network-blog-dev"));
        assert!(reporter.contains("Skipped deleting router router-blog-dev"));
    }

    #[tokio::test]
    async fn test_destroy_propagates_other_faults() {
        let mut mock = MockCloudConnection::new();
        mock.expect_find_network()
            .returning(|_| Err(CloudError::api_error(500, "boom").into()));

        let (facade, _) = facade(mock);
        assert!(facade.delete_network("network-blog-dev").await.is_err());
    }

    #[tokio::test]
    async fn test_delete_active_server() {
        let mut mock = MockCloudConnection::new();
        let mut finds = 0;
        mock.expect_find_server().returning(move |name| {
            finds += 1;
            match finds {
                1 => Ok(Some(server(name, ServerStatus::Active, Some("10.0.0.5")))),
                2 => Ok(Some(server("salt-blog-dev", ServerStatus::Deleted, None))),
                _ => Ok(None),
            }
        });
        let mut reads = 0;
        mock.expect_get_server().returning(move |_| {
            reads += 1;
            let status = if reads == 1 { ServerStatus::Active } else { ServerStatus::Shutoff };
            Ok(server("salt-blog-dev", status, Some("10.0.0.5")))
        });
        mock.expect_stop_server().times(1).returning(|_| Ok(()));
        mock.expect_list_floating_ips().returning(|| {
            Ok(vec![
                floating("f1", "87.254.4.145", "10.0.0.5", AddressRole::Primary),
                floating("f9", "87.254.4.200", "10.0.0.9", AddressRole::Primary),
            ])
        });
        mock.expect_delete_floating_ip()
            .withf(|id| id == "f1")
            .times(1)
            .returning(|_| Ok(()));
        mock.expect_delete_server().times(1).returning(|_| Ok(()));

        let (facade, reporter) = facade(mock);
        facade.delete_server("salt-blog-dev", "network-blog-dev").await.expect("deleted");
        assert!(reporter.contains("Stopped server salt-blog-dev"));
        assert!(reporter.contains("Deleted server salt-blog-dev"));
    }

    #[tokio::test]
    async fn test_server_that_never_vanishes_is_a_warning() {
        let attempts = WaitPolicy::immediate().deletion_attempts;
        assert_eq!(attempts, 3);

        let mut mock = MockCloudConnection::new();
        mock.expect_find_server()
            .withf(|name| name == "salt-blog-dev")
            .times(1)
            .returning(|name| Ok(Some(server(name, ServerStatus::Shutoff, Some("10.0.0.5")))));
        mock.expect_find_server()
            .withf(|id| id == "salt-blog-dev-id")
            .times(3)
            .returning(|_| Ok(Some(server("salt-blog-dev", ServerStatus::Deleted, None))));
        mock.expect_get_server()
            .returning(|_| Ok(server("salt-blog-dev", ServerStatus::Shutoff, Some("10.0.0.5"))));
        mock.expect_stop_server().never();
        mock.expect_list_floating_ips().returning(|| Ok(Vec::new()));
        mock.expect_delete_server().times(1).returning(|_| Ok(()));

        let (facade, reporter) = facade(mock);
        facade
            .delete_server("salt-blog-dev", "network-blog-dev")
            .await
            .expect("vanish timeout is not fatal");
        assert!(reporter.contains("Deleting server salt-blog-dev"));
        assert!(!reporter.contains("Deleted server salt-blog-dev"));
    }

    #[tokio::test]
    async fn test_delete_subnet_detaches_ports() {
        let mut mock = MockCloudConnection::new();
        mock.expect_find_subnet().returning(|_| Ok(Some(subnet())));
        mock.expect_find_router().returning(|name| Ok(Some(router(name))));
        mock.expect_list_ports().returning(|| {
            Ok(vec![
                port("p1", "net-id", "subnet-id"),
                port("p2", "net-id", "subnet-id"),
                port("elsewhere", "other", "other-subnet"),
            ])
        });
        mock.expect_remove_router_interface()
            .times(2)
            .returning(|_, _, port_id| {
                if port_id.as_deref() == Some("p2") {
                    Err(CloudError::not_found("router interface", "p2").into())
                } else {
                    Ok(())
                }
            });
        mock.expect_delete_port()
            .withf(|id| id == "p1" || id == "p2")
            .times(2)
            .returning(|_| Ok(()));
        mock.expect_delete_subnet()
            .withf(|id| id == "subnet-id")
            .times(1)
            .returning(|_| Ok(()));

        let (facade, reporter) = facade(mock);
        facade
            .delete_subnet("subnet-blog-dev", "router-blog-dev")
            .await
            .expect("deleted");
        assert!(reporter.contains("Deleted subnet subnet-blog-dev"));
    }
}
