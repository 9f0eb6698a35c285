//! Salt-cloud provider configuration.
//!
//! The control server uses salt-cloud to reach the same OpenStack project,
//! so the provider file carries the operator's credentials and the private
//! network the topology lives on.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::OpenStackCredentials;
use crate::error::{BootstrapError, Result};

/// Path of the provider file on the control server.
pub const PROVIDER_CONFIG_PATH: &str = "/etc/salt/cloud.providers.d/openstack.conf";

/// Name of the provider entry.
pub const PROVIDER_NAME: &str = "openstack";

/// Authentication block of the provider.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProviderAuth {
    pub username: String,
    pub password: String,
    pub project_id: String,
    pub auth_url: String,
    pub user_domain_name: String,
    pub project_domain_name: String,
}

/// One network the provider attaches instances to.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProviderNetwork {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nat_source: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routes_externally: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routes_ipv4_externally: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nat_destination: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_interface: Option<bool>,
}

/// The `openstack` provider entry.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CloudProvider {
    pub driver: String,
    pub region_name: String,
    pub auth: ProviderAuth,
    pub networks: Vec<ProviderNetwork>,
}

impl CloudProvider {
    /// Builds the provider from credentials, the public pool network and the
    /// topology's private network.
    #[must_use]
    pub fn new(credentials: &OpenStackCredentials, public_network: &str, network_name: &str) -> Self {
        Self {
            driver: String::from("openstack"),
            region_name: credentials.region_name.clone(),
            auth: ProviderAuth {
                username: credentials.username.clone(),
                password: credentials.password.clone(),
                project_id: credentials.project_id.clone(),
                auth_url: credentials.auth_url.clone(),
                user_domain_name: credentials.user_domain_name.clone(),
                project_domain_name: credentials.project_domain_name.clone(),
            },
            networks: vec![
                ProviderNetwork {
                    name: public_network.to_string(),
                    nat_source: Some(true),
                    routes_externally: Some(true),
                    routes_ipv4_externally: Some(true),
                    nat_destination: None,
                    default_interface: None,
                },
                ProviderNetwork {
                    name: network_name.to_string(),
                    nat_source: None,
                    routes_externally: None,
                    routes_ipv4_externally: None,
                    nat_destination: Some(true),
                    default_interface: Some(true),
                },
            ],
        }
    }

    /// Renders the provider file.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be serialized.
    pub fn render(&self) -> Result<String> {
        let mut document = BTreeMap::new();
        document.insert(PROVIDER_NAME, self);
        serde_yaml::to_string(&document).map_err(|e| {
            BootstrapError::Render {
                document: PROVIDER_CONFIG_PATH.to_string(),
                message: e.to_string(),
            }
            .into()
        })
    }
}
