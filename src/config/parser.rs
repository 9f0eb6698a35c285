//! Settings parser for loading and merging configuration files.
//!
//! This module handles loading settings from YAML files and environment
//! variables, with proper precedence and error handling.

use crate::error::{ConfigError, Result, TopologyError};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::settings::Settings;

/// Parser for the optional settings file.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving `.env`.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads settings from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<Settings> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(TopologyError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            TopologyError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses settings from a YAML string. Empty input yields defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<Settings> {
        debug!("Parsing YAML configuration");

        if content.trim().is_empty() {
            return Ok(Settings::default());
        }

        serde_yaml::from_str(content).map_err(|e| {
            let location = source.map(|p| p.display().to_string());
            TopologyError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location,
            })
        })
    }

    /// Resolves and loads settings, then applies environment overrides.
    ///
    /// An explicit path must exist. Without one the usual locations are
    /// searched and defaults are used when nothing is found.
    ///
    /// # Errors
    ///
    /// Returns an error if a file is found but cannot be read or parsed.
    pub fn load(&self, explicit: Option<&Path>) -> Result<Settings> {
        let mut settings = match explicit {
            Some(path) => self.load_file(path)?,
            None => {
                let start = self
                    .base_path
                    .clone()
                    .map_or_else(std::env::current_dir, Ok)?;
                match find_config_file(&start) {
                    Some(path) => self.load_file(path)?,
                    None => {
                        debug!("No configuration file found, using defaults");
                        Settings::default()
                    }
                }
            }
        };

        Self::apply_overrides(&mut settings, |name| std::env::var(name).ok());
        Ok(settings)
    }

    /// Applies `TOPOLOGY_*` overrides to the settings.
    fn apply_overrides<F>(settings: &mut Settings, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(network) = lookup("TOPOLOGY_PUBLIC_NETWORK") {
            debug!("Overriding cloud.public_network from environment");
            settings.cloud.public_network = network;
        }

        if let Some(image) = lookup("TOPOLOGY_IMAGE_NAME") {
            debug!("Overriding deployment.image_name from environment");
            settings.deployment.image_name = image;
        }

        if let Some(user) = lookup("TOPOLOGY_SSH_USER") {
            debug!("Overriding deployment.ssh_user from environment");
            settings.deployment.ssh_user = user;
        }

        if let Some(timeout) = lookup("TOPOLOGY_STATUS_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            debug!("Overriding wait.status_timeout_secs from environment");
            settings.wait.status_timeout_secs = timeout;
        }
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                TopologyError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }
}

/// Default configuration file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["topology.yaml", "topology.yml"];

/// Finds the settings file in the start directory, its parents, or the user
/// configuration directory.
#[must_use]
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Option<PathBuf> {
    let mut current = start_dir.as_ref().to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found configuration file: {}", config_path.display());
                return Some(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    dirs::config_dir()
        .map(|dir| dir.join("openstack-topology").join("config.yaml"))
        .filter(|path| path.exists())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_parse_empty_config() {
        let parser = ConfigParser::new();
        let settings = parser.parse_yaml("  \n", None).expect("empty is valid");
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
cloud:
  public_network: internet
  subnet_cidr: 192.168.10.0/24
  dns_nameservers: ["1.1.1.1", "9.9.9.9"]
  default_security_group: default
  vrrp_security_group: keepalived
  endpoint_interface: internal
wait:
  status_timeout_secs: 600
  status_poll_interval_secs: 2
  deletion_attempts: 20
  deletion_interval_secs: 5
deployment:
  image_name: Ubuntu 22.04
  load_balancers: false
  key_pair_name: salt-cloud
  ssh_user: ubuntu
  salt_states_repo: https://git.example.com/states.git
"#;
        let settings = ConfigParser::new()
            .parse_yaml(yaml, None)
            .expect("valid settings");
        assert_eq!(settings.cloud.vrrp_security_group, "keepalived");
        assert_eq!(settings.cloud.dns_nameservers.len(), 2);
        assert_eq!(settings.wait.deletion_attempts, 20);
        assert!(!settings.deployment.load_balancers);
    }

    #[test]
    fn test_parse_invalid_yaml() {
        let err = ConfigParser::new()
            .parse_yaml("wait: [unclosed", Some(Path::new("topology.yaml")))
            .expect_err("invalid yaml");
        assert!(matches!(
            err,
            TopologyError::Config(ConfigError::ParseError { location: Some(_), .. })
        ));
    }

    #[test]
    fn test_missing_explicit_file() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let err = ConfigParser::new()
            .load_file(temp.path().join("absent.yaml"))
            .expect_err("file is missing");
        assert!(matches!(err, TopologyError::Config(ConfigError::FileNotFound { .. })));
    }

    #[test]
    fn test_find_config_file_in_parent() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let nested = temp.path().join("a").join("b");
        std::fs::create_dir_all(&nested).expect("Failed to create dirs");
        std::fs::write(temp.path().join("topology.yml"), "cloud: {}\n")
            .expect("Failed to write config");

        let found = find_config_file(&nested).expect("config should be found");
        assert_eq!(found, temp.path().join("topology.yml"));

        let settings = ConfigParser::new()
            .with_base_path(&nested)
            .load_file(&found)
            .expect("config should parse");
        assert_eq!(settings.cloud.public_network, "public");
    }

    #[test]
    fn test_env_overrides() {
        let vars = HashMap::from([
            ("TOPOLOGY_PUBLIC_NETWORK", "ext-net"),
            ("TOPOLOGY_STATUS_TIMEOUT_SECS", "42"),
            ("TOPOLOGY_IMAGE_NAME", "Debian 12"),
        ]);
        let mut settings = Settings::default();
        ConfigParser::apply_overrides(&mut settings, |k| vars.get(k).map(ToString::to_string));
        assert_eq!(settings.cloud.public_network, "ext-net");
        assert_eq!(settings.wait.status_timeout_secs, 42);
        assert_eq!(settings.deployment.image_name, "Debian 12");
        assert_eq!(settings.deployment.ssh_user, "ubuntu");
    }
}
