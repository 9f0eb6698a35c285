//! Cloud connection trait definition.
//!
//! This module defines the raw per-resource operations the facade builds on.
//! Lookups return `Ok(None)` when nothing matches; every other failure is an
//! error.

use async_trait::async_trait;

use crate::error::Result;

use super::types::{
    CreateFloatingIpRequest, CreatePortRequest, CreateRouterRequest,
    CreateSecurityGroupRuleRequest, CreateServerRequest, CreateSubnetRequest, Flavor, FloatingIp,
    Image, KeyPair, Network, NewKeyPair, Port, Router, SecurityGroup, SecurityGroupRule, Server,
    Subnet,
};

/// Trait for OpenStack API backends.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CloudConnection: Send + Sync {
    /// Finds a router by name or id.
    async fn find_router(&self, name_or_id: &str) -> Result<Option<Router>>;

    /// Creates a router.
    async fn create_router(&self, request: &CreateRouterRequest) -> Result<Router>;

    /// Deletes a router.
    async fn delete_router(&self, router_id: &str) -> Result<()>;

    /// Attaches a subnet to a router, through the port when one is given.
    async fn add_router_interface(
        &self,
        router_id: &str,
        subnet_id: &str,
        port_id: Option<String>,
    ) -> Result<()>;

    /// Detaches a subnet or port from a router.
    async fn remove_router_interface(
        &self,
        router_id: &str,
        subnet_id: &str,
        port_id: Option<String>,
    ) -> Result<()>;

    /// Finds a network by name or id.
    async fn find_network(&self, name_or_id: &str) -> Result<Option<Network>>;

    /// Creates a network.
    async fn create_network(&self, name: &str) -> Result<Network>;

    /// Deletes a network.
    async fn delete_network(&self, network_id: &str) -> Result<()>;

    /// Finds a subnet by name or id.
    async fn find_subnet(&self, name_or_id: &str) -> Result<Option<Subnet>>;

    /// Creates a subnet.
    async fn create_subnet(&self, request: &CreateSubnetRequest) -> Result<Subnet>;

    /// Deletes a subnet.
    async fn delete_subnet(&self, subnet_id: &str) -> Result<()>;

    /// Lists every port in the project.
    async fn list_ports(&self) -> Result<Vec<Port>>;

    /// Lists the ports owned by a device.
    async fn list_ports_for_device(&self, device_id: &str) -> Result<Vec<Port>>;

    /// Creates a port.
    async fn create_port(&self, request: &CreatePortRequest) -> Result<Port>;

    /// Deletes a port.
    async fn delete_port(&self, port_id: &str) -> Result<()>;

    /// Finds a server by name or id.
    async fn find_server(&self, name_or_id: &str) -> Result<Option<Server>>;

    /// Reads a server by id.
    async fn get_server(&self, server_id: &str) -> Result<Server>;

    /// Creates a server. The returned record may still be building.
    async fn create_server(&self, request: &CreateServerRequest) -> Result<Server>;

    /// Requests a server stop.
    async fn stop_server(&self, server_id: &str) -> Result<()>;

    /// Requests a server deletion.
    async fn delete_server(&self, server_id: &str) -> Result<()>;

    /// Associates an allocated floating address with a server.
    async fn add_floating_ip_to_server(&self, server_id: &str, address: &str) -> Result<()>;

    /// Lists every floating IP in the project.
    async fn list_floating_ips(&self) -> Result<Vec<FloatingIp>>;

    /// Allocates a floating IP.
    async fn create_floating_ip(&self, request: &CreateFloatingIpRequest) -> Result<FloatingIp>;

    /// Releases a floating IP.
    async fn delete_floating_ip(&self, floating_ip_id: &str) -> Result<()>;

    /// Finds an image by name or id.
    async fn find_image(&self, name_or_id: &str) -> Result<Option<Image>>;

    /// Finds a flavor by name or id.
    async fn find_flavor(&self, name_or_id: &str) -> Result<Option<Flavor>>;

    /// Lists key pairs.
    async fn list_key_pairs(&self) -> Result<Vec<KeyPair>>;

    /// Finds a key pair by name.
    async fn find_key_pair(&self, name: &str) -> Result<Option<KeyPair>>;

    /// Generates a key pair.
    async fn create_key_pair(&self, name: &str) -> Result<NewKeyPair>;

    /// Deletes a key pair.
    async fn delete_key_pair(&self, name: &str) -> Result<()>;

    /// Finds a security group by name or id.
    async fn find_security_group(&self, name_or_id: &str) -> Result<Option<SecurityGroup>>;

    /// Creates a security group.
    async fn create_security_group(&self, name: &str, description: &str) -> Result<SecurityGroup>;

    /// Deletes a security group.
    async fn delete_security_group(&self, security_group_id: &str) -> Result<()>;

    /// Adds a rule to a security group.
    async fn create_security_group_rule(
        &self,
        request: &CreateSecurityGroupRuleRequest,
    ) -> Result<SecurityGroupRule>;
}
