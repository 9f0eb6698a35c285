//! Deterministic resource naming.
//!
//! Every cloud resource belonging to an (application, environment) pair is
//! named from that pair alone, so a later run (build or destroy) finds exactly
//! the resources an earlier run created.

use serde::Serialize;
use std::fmt;

/// Prefix used for the control-plane (salt master) server.
pub const CONTROL_SERVER_PREFIX: &str = "salt";

/// Prefix used for application servers, followed by the zero-based index.
pub const APP_SERVER_PREFIX: &str = "app";

/// Canonical names for one logical environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvironmentNames {
    /// Sanitized application identifier.
    pub app: String,
    /// Sanitized environment identifier.
    pub environment: String,
    /// Router name.
    pub router_name: String,
    /// Network name.
    pub network_name: String,
    /// Subnet name.
    pub subnet_name: String,
    /// Base name that every server name ends with.
    pub server_base_name: String,
}

/// The role a server plays in the topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerRole {
    /// The salt master that configures every other instance.
    Control,
    /// An application server, by zero-based index.
    App(usize),
    /// The active member of the load-balancer pair.
    PrimaryBalancer,
    /// The standby member of the load-balancer pair.
    SecondaryBalancer,
}

impl fmt::Display for ServerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Control => write!(f, "{CONTROL_SERVER_PREFIX}"),
            Self::App(index) => write!(f, "{APP_SERVER_PREFIX}-{index}"),
            Self::PrimaryBalancer => write!(f, "lb-primary"),
            Self::SecondaryBalancer => write!(f, "lb-secondary"),
        }
    }
}

/// Strips everything except alphanumerics, underscore, dash and space, then
/// turns spaces and underscores into dashes.
#[must_use]
pub fn sanitize_identifier(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | ' '))
        .map(|c| if matches!(c, '_' | ' ') { '-' } else { c })
        .collect()
}

impl EnvironmentNames {
    /// Derives every resource name for the given raw identifiers.
    #[must_use]
    pub fn derive(app: &str, environment: &str) -> Self {
        let app = sanitize_identifier(app);
        let environment = sanitize_identifier(environment);

        Self {
            router_name: format!("router-{app}-{environment}"),
            network_name: format!("network-{app}-{environment}"),
            subnet_name: format!("subnet-{app}-{environment}"),
            server_base_name: format!("{app}-{environment}"),
            app,
            environment,
        }
    }

    /// Builds a server name from a positional index or role tag.
    #[must_use]
    pub fn server_name(&self, prefix: impl fmt::Display) -> String {
        format!("{prefix}-{}", self.server_base_name)
    }

    /// Builds the server name for a topology role.
    #[must_use]
    pub fn server_name_for(&self, role: ServerRole) -> String {
        self.server_name(role)
    }

    /// Names of all application servers for the given count.
    #[must_use]
    pub fn app_server_names(&self, count: usize) -> Vec<String> {
        (0..count)
            .map(|index| self.server_name_for(ServerRole::App(index)))
            .collect()
    }
}

/// Everything a build or destroy run needs to know about its target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployParams {
    /// Derived resource names.
    pub names: EnvironmentNames,
    /// Number of application servers.
    pub num_servers: usize,
    /// Flavor name used for every server.
    pub server_size: String,
    /// Image name used for every server.
    pub image_name: String,
    /// Whether the load-balancer pair is part of the topology.
    pub load_balancers: bool,
}

impl DeployParams {
    /// Creates parameters from the raw command-line identifiers.
    #[must_use]
    pub fn new(
        app: &str,
        environment: &str,
        num_servers: usize,
        server_size: &str,
        image_name: &str,
    ) -> Self {
        Self {
            names: EnvironmentNames::derive(app, environment),
            num_servers,
            server_size: server_size.to_string(),
            image_name: image_name.to_string(),
            load_balancers: true,
        }
    }

    /// Enables or disables the load-balancer pair.
    #[must_use]
    pub const fn with_load_balancers(mut self, enabled: bool) -> Self {
        self.load_balancers = enabled;
        self
    }
}
