//! OpenStack API integration module.
//!
//! This module provides the raw REST client, the idempotent resource facade
//! built on it, and the progress reporters the facade narrates through.

mod client;
mod connection;
mod facade;
mod reporter;
mod types;

#[cfg(test)]
pub(crate) mod fake;

pub use client::{OpenStackClient, ServiceEndpoints};
pub use connection::CloudConnection;
pub use facade::{Placement, ResourceFacade, ServerSpec};
pub use reporter::{Reporter, SilentReporter, VerboseReporter};
pub use types::{
    AddressRole, CreateFloatingIpRequest, CreatePortRequest, CreateRouterRequest,
    CreateSecurityGroupRuleRequest, CreateServerRequest, CreateSubnetRequest, ExternalGateway,
    FixedIp, Flavor, FloatingIp, Image, KeyPair, KeyPairOutcome, Network, NewKeyPair, Port,
    Router, SecurityGroup, SecurityGroupRule, Server, ServerAddress, ServerStatus, Subnet,
    VRRP_PROTOCOL, is_private_ipv4,
};

#[cfg(test)]
pub(crate) use connection::MockCloudConnection;
#[cfg(test)]
pub(crate) use reporter::testing::RecordingReporter;
