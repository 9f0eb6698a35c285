//! OpenStack resource types and request payloads.
//!
//! Field names follow the Neutron, Nova and Glance JSON representations so
//! the same structs deserialize API responses directly.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::net::Ipv4Addr;

/// IP protocol number of VRRP.
pub const VRRP_PROTOCOL: &str = "112";

/// Router external gateway information.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExternalGateway {
    /// External network the gateway is bound to.
    pub network_id: String,
}

/// A Neutron router.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Router {
    /// Router id.
    pub id: String,
    /// Router name.
    #[serde(default)]
    pub name: String,
    /// Router status.
    #[serde(default)]
    pub status: Option<String>,
    /// External gateway, if set.
    #[serde(default)]
    pub external_gateway_info: Option<ExternalGateway>,
}

/// A Neutron network.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Network {
    /// Network id.
    pub id: String,
    /// Network name.
    #[serde(default)]
    pub name: String,
    /// Ids of the subnets on this network.
    #[serde(default)]
    pub subnets: Vec<String>,
    /// Network status.
    #[serde(default)]
    pub status: Option<String>,
}

/// A Neutron subnet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subnet {
    /// Subnet id.
    pub id: String,
    /// Subnet name.
    #[serde(default)]
    pub name: String,
    /// Owning network.
    pub network_id: String,
    /// Address block.
    #[serde(default)]
    pub cidr: String,
    /// IP version (4 or 6).
    #[serde(default = "default_ip_version")]
    pub ip_version: u8,
    /// Whether DHCP is enabled.
    #[serde(default)]
    pub enable_dhcp: bool,
    /// DNS nameservers handed out by DHCP.
    #[serde(default)]
    pub dns_nameservers: Vec<String>,
}

const fn default_ip_version() -> u8 {
    4
}

/// A fixed address held by a port.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FixedIp {
    /// Subnet the address was drawn from.
    pub subnet_id: String,
    /// The address itself.
    #[serde(default)]
    pub ip_address: Option<String>,
}

/// A Neutron port.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Port {
    /// Port id.
    pub id: String,
    /// Port name.
    #[serde(default)]
    pub name: String,
    /// Owning network.
    pub network_id: String,
    /// Fixed addresses.
    #[serde(default)]
    pub fixed_ips: Vec<FixedIp>,
    /// Device (server or router) using the port.
    #[serde(default)]
    pub device_id: Option<String>,
    /// Security group ids.
    #[serde(default)]
    pub security_groups: Vec<String>,
}

impl Port {
    /// Returns true if any fixed address of this port comes from the subnet.
    #[must_use]
    pub fn is_on_subnet(&self, subnet_id: &str) -> bool {
        self.fixed_ips.iter().any(|ip| ip.subnet_id == subnet_id)
    }

    /// First fixed address of the port, if any.
    #[must_use]
    pub fn first_address(&self) -> Option<&str> {
        self.fixed_ips.iter().find_map(|ip| ip.ip_address.as_deref())
    }
}

/// Nova server status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerStatus {
    /// Server is running.
    Active,
    /// Server is being built.
    Build,
    /// Server is stopped.
    Shutoff,
    /// Server failed.
    Error,
    /// Server is being rebooted.
    Reboot,
    /// Server was deleted.
    Deleted,
    /// Any other status.
    #[default]
    #[serde(other)]
    Unknown,
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self {
            Self::Active => "ACTIVE",
            Self::Build => "BUILD",
            Self::Shutoff => "SHUTOFF",
            Self::Error => "ERROR",
            Self::Reboot => "REBOOT",
            Self::Deleted => "DELETED",
            Self::Unknown => "UNKNOWN",
        };
        write!(f, "{status}")
    }
}

/// One address entry of a server on a network.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerAddress {
    /// The address.
    pub addr: String,
    /// IP version.
    #[serde(default = "default_ip_version")]
    pub version: u8,
    /// `fixed` or `floating`.
    #[serde(rename = "OS-EXT-IPS:type", default)]
    pub kind: Option<String>,
}

/// A Nova server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Server {
    /// Server id.
    pub id: String,
    /// Server name.
    #[serde(default)]
    pub name: String,
    /// Current status.
    #[serde(default)]
    pub status: ServerStatus,
    /// Addresses keyed by network name.
    #[serde(default)]
    pub addresses: HashMap<String, Vec<ServerAddress>>,
    /// Key pair injected at boot.
    #[serde(default)]
    pub key_name: Option<String>,
}

impl Server {
    /// The server's private fixed address on the named network.
    #[must_use]
    pub fn fixed_address(&self, network_name: &str) -> Option<&str> {
        let entries = self.addresses.get(network_name)?;
        entries
            .iter()
            .find(|a| a.kind.as_deref() != Some("floating"))
            .map(|a| a.addr.as_str())
    }

    /// Returns true if the server is running.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self.status, ServerStatus::Active)
    }
}

/// Meaning of a floating address, recorded at allocation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AddressRole {
    /// The address assigned when the server was created.
    Primary,
    /// The address shared by the load-balancer pair.
    HaShared,
    /// No role was recorded (allocated outside this tool or by an older run).
    Unassigned,
}

impl AddressRole {
    /// Text stored in the floating IP description.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Primary => "role:primary",
            Self::HaShared => "role:ha-shared",
            Self::Unassigned => "",
        }
    }

    /// Reads the role back from a floating IP description.
    #[must_use]
    pub fn from_description(description: &str) -> Self {
        match description.trim() {
            "role:primary" => Self::Primary,
            "role:ha-shared" => Self::HaShared,
            _ => Self::Unassigned,
        }
    }
}

/// A Neutron floating IP.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FloatingIp {
    /// Floating IP id.
    pub id: String,
    /// The public address.
    pub floating_ip_address: String,
    /// The private address it maps to.
    #[serde(default)]
    pub fixed_ip_address: Option<String>,
    /// Port it is bound to.
    #[serde(default)]
    pub port_id: Option<String>,
    /// Pool network.
    #[serde(default)]
    pub floating_network_id: String,
    /// Free-form description; carries the role tag.
    #[serde(default)]
    pub description: String,
}

impl FloatingIp {
    /// Role recorded for this address.
    #[must_use]
    pub fn role(&self) -> AddressRole {
        AddressRole::from_description(&self.description)
    }
}

/// A Glance image.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Image {
    /// Image id.
    pub id: String,
    /// Image name.
    #[serde(default)]
    pub name: String,
    /// Minimum RAM in MB.
    #[serde(default)]
    pub min_ram: u64,
    /// Minimum disk in GB.
    #[serde(default)]
    pub min_disk: u64,
}

/// A Nova flavor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Flavor {
    /// Flavor id.
    pub id: String,
    /// Flavor name.
    #[serde(default)]
    pub name: String,
    /// RAM in MB.
    #[serde(default)]
    pub ram: u64,
    /// Disk in GB.
    #[serde(default)]
    pub disk: u64,
    /// Virtual CPUs.
    #[serde(default)]
    pub vcpus: u32,
}

/// Public metadata of an existing key pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyPair {
    /// Key pair name.
    pub name: String,
    /// Key fingerprint.
    #[serde(default)]
    pub fingerprint: String,
    /// Public key material.
    #[serde(default)]
    pub public_key: String,
}

/// A freshly generated key pair. The private key is only ever returned here.
#[derive(Clone, Deserialize, PartialEq, Eq)]
pub struct NewKeyPair {
    /// Key pair name.
    pub name: String,
    /// Key fingerprint.
    #[serde(default)]
    pub fingerprint: String,
    /// Public key material.
    #[serde(default)]
    pub public_key: String,
    /// Private key material, present when the cloud generated the key.
    #[serde(default)]
    pub private_key: Option<String>,
}

impl fmt::Debug for NewKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewKeyPair")
            .field("name", &self.name)
            .field("fingerprint", &self.fingerprint)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

impl From<NewKeyPair> for KeyPair {
    fn from(created: NewKeyPair) -> Self {
        Self {
            name: created.name,
            fingerprint: created.fingerprint,
            public_key: created.public_key,
        }
    }
}

/// Outcome of a key pair find-or-create.
#[derive(Debug, Clone)]
pub enum KeyPairOutcome {
    /// The key pair already existed; no private key is available.
    Found(KeyPair),
    /// The key pair was generated by this call.
    Created(NewKeyPair),
}

impl KeyPairOutcome {
    /// Key pair name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Found(found) => &found.name,
            Self::Created(created) => &created.name,
        }
    }

    /// The one-shot private key, only present right after creation.
    #[must_use]
    pub fn private_key(&self) -> Option<&str> {
        match self {
            Self::Found(_) => None,
            Self::Created(created) => created.private_key.as_deref(),
        }
    }
}

/// A security group rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SecurityGroupRule {
    /// Rule id.
    pub id: String,
    /// `ingress` or `egress`.
    pub direction: String,
    /// Protocol name or number.
    #[serde(default)]
    pub protocol: Option<String>,
    /// `IPv4` or `IPv6`.
    #[serde(default)]
    pub ethertype: String,
    /// Owning group.
    pub security_group_id: String,
    /// Remote prefix, if restricted.
    #[serde(default)]
    pub remote_ip_prefix: Option<String>,
}

/// A security group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SecurityGroup {
    /// Group id.
    pub id: String,
    /// Group name.
    #[serde(default)]
    pub name: String,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// Rules in the group.
    #[serde(default)]
    pub security_group_rules: Vec<SecurityGroupRule>,
}

/// Request to create a router.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CreateRouterRequest {
    /// Router name.
    pub name: String,
    /// External gateway.
    pub external_gateway_info: ExternalGateway,
}

/// Request to create a subnet.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CreateSubnetRequest {
    /// Subnet name.
    pub name: String,
    /// Owning network.
    pub network_id: String,
    /// Address block.
    pub cidr: String,
    /// IP version.
    pub ip_version: u8,
    /// DHCP on/off.
    pub enable_dhcp: bool,
    /// DNS nameservers.
    pub dns_nameservers: Vec<String>,
}

impl CreateSubnetRequest {
    /// Creates an IPv4 subnet request with DHCP enabled.
    #[must_use]
    pub fn new(name: &str, network_id: &str, cidr: &str) -> Self {
        Self {
            name: name.to_string(),
            network_id: network_id.to_string(),
            cidr: cidr.to_string(),
            ip_version: 4,
            enable_dhcp: true,
            dns_nameservers: Vec::new(),
        }
    }

    /// Sets the DNS nameservers.
    #[must_use]
    pub fn with_dns_nameservers(mut self, nameservers: &[String]) -> Self {
        self.dns_nameservers = nameservers.to_vec();
        self
    }
}

/// Request to create a port.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CreatePortRequest {
    /// Network to create the port on.
    pub network_id: String,
    /// Security group ids.
    pub security_groups: Vec<String>,
}

/// Request to create a server.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CreateServerRequest {
    /// Server name.
    pub name: String,
    /// Image id.
    pub image_ref: String,
    /// Flavor id.
    pub flavor_ref: String,
    /// Network ids to attach.
    pub networks: Vec<String>,
    /// Key pair to inject.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_name: Option<String>,
    /// Security group names.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub security_groups: Vec<String>,
}

impl CreateServerRequest {
    /// Creates a server request on a single network.
    #[must_use]
    pub fn new(name: &str, image_id: &str, flavor_id: &str, network_id: &str) -> Self {
        Self {
            name: name.to_string(),
            image_ref: image_id.to_string(),
            flavor_ref: flavor_id.to_string(),
            networks: vec![network_id.to_string()],
            key_name: None,
            security_groups: Vec::new(),
        }
    }

    /// Sets the key pair.
    #[must_use]
    pub fn with_key_name(mut self, key_name: Option<String>) -> Self {
        self.key_name = key_name;
        self
    }

    /// Sets the security groups.
    #[must_use]
    pub fn with_security_groups(mut self, groups: &[String]) -> Self {
        self.security_groups = groups.to_vec();
        self
    }
}

/// Request to allocate a floating IP.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CreateFloatingIpRequest {
    /// Pool network.
    pub floating_network_id: String,
    /// Port to bind.
    pub port_id: String,
    /// Subnet of the port. Neutron reads `subnet_id` as the pool subnet, so it
    /// stays off the wire.
    #[serde(skip_serializing)]
    pub subnet_id: String,
    /// Fixed address to map to.
    pub fixed_ip_address: String,
    /// Description, carrying the role tag.
    pub description: String,
}

/// Request to create a security group rule.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CreateSecurityGroupRuleRequest {
    /// Owning group.
    pub security_group_id: String,
    /// `ingress` or `egress`.
    pub direction: String,
    /// Protocol name or number.
    pub protocol: String,
    /// `IPv4` or `IPv6`.
    pub ethertype: String,
}

impl CreateSecurityGroupRuleRequest {
    /// Ingress rule admitting VRRP over IPv4.
    #[must_use]
    pub fn vrrp_ingress(security_group_id: &str) -> Self {
        Self {
            security_group_id: security_group_id.to_string(),
            direction: String::from("ingress"),
            protocol: String::from(VRRP_PROTOCOL),
            ethertype: String::from("IPv4"),
        }
    }
}

/// Returns true if the text parses as a private IPv4 address.
#[must_use]
pub fn is_private_ipv4(address: &str) -> bool {
    address
        .parse::<Ipv4Addr>()
        .is_ok_and(|ip| ip.is_private())
}
