//! Settings types mapping to the optional `topology.yaml` file.
//!
//! Every field has a default, so an empty or missing file yields a working
//! configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root settings structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Cloud-side resource defaults.
    pub cloud: CloudSettings,
    /// Polling parameters.
    pub wait: WaitPolicy,
    /// Deployment defaults.
    pub deployment: DeploymentSettings,
}

/// Cloud-side resource defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CloudSettings {
    /// External network used for router gateways and floating addresses.
    pub public_network: String,
    /// Address block of the private subnet.
    pub subnet_cidr: String,
    /// DNS nameservers handed out on the private subnet.
    pub dns_nameservers: Vec<String>,
    /// Security group applied to new ports and servers.
    pub default_security_group: String,
    /// Security group admitting VRRP between the load balancers.
    pub vrrp_security_group: String,
    /// Catalog interface used to pick service endpoints.
    pub endpoint_interface: String,
}

impl Default for CloudSettings {
    fn default() -> Self {
        Self {
            public_network: String::from("public"),
            subnet_cidr: String::from("10.0.0.0/24"),
            dns_nameservers: vec![String::from("8.8.8.8")],
            default_security_group: String::from("default"),
            vrrp_security_group: String::from("vrrp"),
            endpoint_interface: String::from("public"),
        }
    }
}

/// Bounds for the two polling loops.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WaitPolicy {
    /// Upper bound on waiting for a server status.
    pub status_timeout_secs: u64,
    /// Delay between status polls.
    pub status_poll_interval_secs: u64,
    /// Number of polls while waiting for a deleted server to vanish.
    pub deletion_attempts: u32,
    /// Delay between deletion polls.
    pub deletion_interval_secs: u64,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            status_timeout_secs: 300,
            status_poll_interval_secs: 5,
            deletion_attempts: 10,
            deletion_interval_secs: 10,
        }
    }
}

impl WaitPolicy {
    /// A policy that never sleeps. Status waits get a single poll.
    #[must_use]
    pub const fn immediate() -> Self {
        Self {
            status_timeout_secs: 0,
            status_poll_interval_secs: 0,
            deletion_attempts: 3,
            deletion_interval_secs: 0,
        }
    }

    /// Status timeout as a duration.
    #[must_use]
    pub const fn status_timeout(&self) -> Duration {
        Duration::from_secs(self.status_timeout_secs)
    }

    /// Status poll interval as a duration.
    #[must_use]
    pub const fn status_poll_interval(&self) -> Duration {
        Duration::from_secs(self.status_poll_interval_secs)
    }

    /// Deletion poll interval as a duration.
    #[must_use]
    pub const fn deletion_interval(&self) -> Duration {
        Duration::from_secs(self.deletion_interval_secs)
    }
}

/// Deployment defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DeploymentSettings {
    /// Image every server boots from.
    pub image_name: String,
    /// Whether the load-balancer pair is provisioned.
    pub load_balancers: bool,
    /// Key pair salt-cloud uses to reach the load balancers.
    pub key_pair_name: String,
    /// Login user on the servers.
    pub ssh_user: String,
    /// Git repository holding the salt states.
    pub salt_states_repo: String,
}

impl Default for DeploymentSettings {
    fn default() -> Self {
        Self {
            image_name: String::from("Ubuntu 16.04 LTS"),
            load_balancers: true,
            key_pair_name: String::from("salt-cloud"),
            ssh_user: String::from("ubuntu"),
            salt_states_repo: String::from("https://github.com/maharg101/gdl-100-salt"),
        }
    }
}
