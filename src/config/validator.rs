//! Validation of settings and deployment parameters.
//!
//! Everything is checked before the first cloud call so a bad invocation
//! never leaves half a topology behind.

use crate::error::{ConfigError, Result, TopologyError};
use crate::naming::DeployParams;
use std::net::Ipv4Addr;
use tracing::debug;

use super::settings::{CloudSettings, Settings, WaitPolicy};

/// Worker counts above this trigger a warning.
const LARGE_WORKER_COUNT: usize = 20;

/// Validator for settings and deploy parameters.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates settings together with the parameters of one run.
    ///
    /// # Errors
    ///
    /// Returns the first error if validation fails.
    pub fn validate(&self, settings: &Settings, params: &DeployParams) -> Result<ValidationResult> {
        let mut result = ValidationResult::default();

        Self::validate_cloud(&settings.cloud, &mut result);
        Self::validate_wait(&settings.wait, &mut result);
        Self::validate_params(params, &mut result);

        if result.errors.is_empty() {
            debug!("Configuration validation passed");
            Ok(result)
        } else {
            let first_error = &result.errors[0];
            Err(TopologyError::Config(ConfigError::ValidationError {
                message: first_error.message.clone(),
                field: Some(first_error.field.clone()),
            }))
        }
    }

    fn validate_cloud(cloud: &CloudSettings, result: &mut ValidationResult) {
        if cloud.public_network.trim().is_empty() {
            result.errors.push(ValidationError {
                field: String::from("cloud.public_network"),
                message: String::from("Public network name cannot be empty"),
            });
        }

        if !is_valid_ipv4_cidr(&cloud.subnet_cidr) {
            result.errors.push(ValidationError {
                field: String::from("cloud.subnet_cidr"),
                message: format!("'{}' is not an IPv4 CIDR block", cloud.subnet_cidr),
            });
        }

        for server in &cloud.dns_nameservers {
            if server.parse::<Ipv4Addr>().is_err() {
                result.errors.push(ValidationError {
                    field: String::from("cloud.dns_nameservers"),
                    message: format!("'{server}' is not an IPv4 address"),
                });
            }
        }

        if cloud.dns_nameservers.is_empty() {
            result
                .warnings
                .push(String::from("No DNS nameservers configured for the private subnet"));
        }
    }

    fn validate_wait(wait: &WaitPolicy, result: &mut ValidationResult) {
        if wait.status_timeout_secs == 0 {
            result.errors.push(ValidationError {
                field: String::from("wait.status_timeout_secs"),
                message: String::from("Status timeout must be at least 1 second"),
            });
        }

        if wait.deletion_attempts == 0 {
            result.errors.push(ValidationError {
                field: String::from("wait.deletion_attempts"),
                message: String::from("Deletion attempts must be at least 1"),
            });
        }

        if wait.status_poll_interval_secs > wait.status_timeout_secs {
            result.warnings.push(format!(
                "Status poll interval ({}s) exceeds the timeout ({}s)",
                wait.status_poll_interval_secs, wait.status_timeout_secs
            ));
        }
    }

    fn validate_params(params: &DeployParams, result: &mut ValidationResult) {
        if params.names.app.is_empty() {
            result.errors.push(ValidationError {
                field: String::from("app"),
                message: String::from("Application id is empty after removing disallowed characters"),
            });
        }

        if params.names.environment.is_empty() {
            result.errors.push(ValidationError {
                field: String::from("environment"),
                message: String::from("Environment id is empty after removing disallowed characters"),
            });
        }

        if params.server_size.trim().is_empty() {
            result.errors.push(ValidationError {
                field: String::from("server_size"),
                message: String::from("Server size cannot be empty"),
            });
        }

        if params.num_servers > LARGE_WORKER_COUNT {
            result.warnings.push(format!(
                "{} application servers requested; each is created and bootstrapped in turn",
                params.num_servers
            ));
        }
    }
}

/// Returns true for `a.b.c.d/n` with `n <= 32`.
fn is_valid_ipv4_cidr(cidr: &str) -> bool {
    let Some((address, prefix)) = cidr.split_once('/') else {
        return false;
    };

    address.parse::<Ipv4Addr>().is_ok() && prefix.parse::<u8>().is_ok_and(|p| p <= 32)
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}
