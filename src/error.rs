//! Error types for the topology deployment system.
//!
//! This module provides the error hierarchy for every stage of a run:
//! configuration, cloud API access, topology building and host bootstrapping.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the topology deployment system.
#[derive(Debug, Error)]
pub enum TopologyError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Cloud API errors.
    #[error("Cloud API error: {0}")]
    Cloud(#[from] CloudError),

    /// Topology build errors.
    #[error("Build error: {0}")]
    Build(#[from] BuildError),

    /// Host bootstrap errors.
    #[error("Bootstrap error: {0}")]
    Bootstrap(#[from] BootstrapError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Environment variable is missing.
    #[error("Missing environment variable: {name}")]
    MissingEnvVar {
        /// Name of the missing variable.
        name: String,
    },
}

/// OpenStack API errors.
#[derive(Debug, Error)]
pub enum CloudError {
    /// Authentication failed.
    #[error("OpenStack authentication failed: {message}")]
    AuthenticationFailed {
        /// Description of the auth failure.
        message: String,
    },

    /// API request failed.
    #[error("OpenStack API request failed: {status} - {message}")]
    ApiRequestFailed {
        /// HTTP status code.
        status: u16,
        /// Error message from API.
        message: String,
    },

    /// The request was rejected as malformed, e.g. a name that is not a valid id.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Description of the rejected request.
        message: String,
    },

    /// Resource not found at the wire-protocol level.
    #[error("{kind} not found: {name}")]
    NotFound {
        /// Resource kind (router, server, ...).
        kind: String,
        /// Name or id that was looked up.
        name: String,
    },

    /// More than one resource matched a lookup that must be unique.
    #[error("{count} {kind}s named '{name}' exist; names must be unique")]
    Ambiguous {
        /// Resource kind.
        kind: String,
        /// The duplicated name.
        name: String,
        /// Number of matches.
        count: usize,
    },

    /// Rate limited.
    #[error("OpenStack API rate limited, retry after {retry_after_secs} seconds")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// Network error.
    #[error("Network error communicating with OpenStack: {message}")]
    NetworkError {
        /// Description of the network error.
        message: String,
    },

    /// Invalid response from API.
    #[error("Invalid response from OpenStack API: {message}")]
    InvalidResponse {
        /// Description of the response issue.
        message: String,
    },

    /// A service type is missing from the catalog.
    #[error("Service '{service}' not found in the catalog for region {region}")]
    ServiceNotInCatalog {
        /// Service type (network, compute, image).
        service: String,
        /// Requested region.
        region: String,
    },

    /// The external network used for gateways and floating addresses is missing.
    #[error("Public network '{name}' does not exist")]
    PublicNetworkMissing {
        /// Configured public network name.
        name: String,
    },

    /// Timeout waiting for a resource status.
    #[error("Timeout after {waited_secs}s waiting for {resource} to reach state {expected_state}")]
    Timeout {
        /// Name of the resource.
        resource: String,
        /// Expected state that was not reached.
        expected_state: String,
        /// Seconds waited.
        waited_secs: u64,
    },

    /// The resource entered a terminal failure status while being waited on.
    #[error("{resource} entered status {status}")]
    ResourceFailed {
        /// Name of the resource.
        resource: String,
        /// The failure status reported.
        status: String,
    },
}

/// Topology build errors.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The requested image does not exist.
    #[error("image {name} does not exist")]
    ImageNotFound {
        /// Image name.
        name: String,
    },

    /// The requested flavor does not exist.
    #[error("flavor {name} does not exist")]
    FlavorNotFound {
        /// Flavor name.
        name: String,
    },

    /// A newly created server ended up without a public address.
    #[error("no public address found for server {server}")]
    NoPublicAddress {
        /// Server name.
        server: String,
    },

    /// A server has no fixed address on the network it was placed on.
    #[error("server {server} has no fixed address on network {network}")]
    NoFixedAddress {
        /// Server name.
        server: String,
        /// Network name.
        network: String,
    },

    /// The default security group for new ports is missing.
    #[error("security group {name} does not exist")]
    SecurityGroupMissing {
        /// Security group name.
        name: String,
    },
}

/// Host bootstrap errors.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// A remote command exited unsuccessfully.
    #[error("command on {host} failed with status {status}: {stderr}")]
    CommandFailed {
        /// Target host address.
        host: String,
        /// Exit status (-1 when terminated by signal).
        status: i32,
        /// Captured standard error.
        stderr: String,
    },

    /// The remote shell could not be started.
    #[error("failed to start remote shell for {host}: {message}")]
    Spawn {
        /// Target host address.
        host: String,
        /// Description of the failure.
        message: String,
    },

    /// A configuration document for the control server could not be rendered.
    #[error("failed to render {document}: {message}")]
    Render {
        /// Document being rendered.
        document: String,
        /// Description of the failure.
        message: String,
    },
}

/// Result type alias for topology operations.
pub type Result<T> = std::result::Result<T, TopologyError>;

impl TopologyError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Cloud(CloudError::RateLimited { .. } | CloudError::NetworkError { .. })
        )
    }

    /// Returns true for faults where the API rejected or could not resolve
    /// the request. Teardown treats these like an absent resource.
    #[must_use]
    pub const fn is_wire_fault(&self) -> bool {
        matches!(
            self,
            Self::Cloud(
                CloudError::InvalidRequest { .. }
                    | CloudError::NotFound { .. }
                    | CloudError::ApiRequestFailed {
                        status: 400 | 404,
                        ..
                    }
            )
        )
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

impl CloudError {
    /// Creates an API request error.
    #[must_use]
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiRequestFailed {
            status,
            message: message.into(),
        }
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }

    /// Creates a not-found error for the given resource kind.
    #[must_use]
    pub fn not_found(kind: &str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.to_string(),
            name: name.into(),
        }
    }
}
