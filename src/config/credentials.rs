//! OpenStack credentials read from the `OS_*` environment variables.

use serde::Serialize;
use std::fmt;

use crate::error::{ConfigError, Result, TopologyError};

/// Variables that must be present.
pub const REQUIRED_VARS: &[&str] = &[
    "OS_AUTH_URL",
    "OS_REGION_NAME",
    "OS_USERNAME",
    "OS_PASSWORD",
    "OS_PROJECT_ID",
];

/// Password-authentication credentials for a single project.
#[derive(Clone, Serialize, PartialEq, Eq)]
pub struct OpenStackCredentials {
    /// Identity endpoint.
    pub auth_url: String,
    /// Region to pick endpoints from.
    pub region_name: String,
    /// User name.
    pub username: String,
    /// Password.
    pub password: String,
    /// Project scope.
    pub project_id: String,
    /// User domain.
    pub user_domain_name: String,
    /// Project domain.
    pub project_domain_name: String,
    /// Identity API version; only `3` is supported.
    pub identity_api_version: String,
}

impl fmt::Debug for OpenStackCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenStackCredentials")
            .field("auth_url", &self.auth_url)
            .field("region_name", &self.region_name)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("project_id", &self.project_id)
            .field("user_domain_name", &self.user_domain_name)
            .field("project_domain_name", &self.project_domain_name)
            .field("identity_api_version", &self.identity_api_version)
            .finish()
    }
}

impl OpenStackCredentials {
    /// Loads credentials from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads credentials through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or empty.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| -> Result<String> {
            lookup(name).filter(|v| !v.is_empty()).ok_or_else(|| {
                TopologyError::Config(ConfigError::MissingEnvVar {
                    name: name.to_string(),
                })
            })
        };
        let optional = |name: &str, default: &str| {
            lookup(name)
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Ok(Self {
            auth_url: required("OS_AUTH_URL")?,
            region_name: required("OS_REGION_NAME")?,
            username: required("OS_USERNAME")?,
            password: required("OS_PASSWORD")?,
            project_id: required("OS_PROJECT_ID")?,
            user_domain_name: optional("OS_USER_DOMAIN_NAME", "Default"),
            project_domain_name: optional("OS_PROJECT_DOMAIN_NAME", "Default"),
            identity_api_version: optional("OS_IDENTITY_API_VERSION", "3"),
        })
    }

    /// Identity endpoint with a `/v3` suffix.
    #[must_use]
    pub fn identity_v3_url(&self) -> String {
        let base = self.auth_url.trim_end_matches('/');
        if base.ends_with("/v3") {
            base.to_string()
        } else {
            format!("{base}/v3")
        }
    }
}
