//! Configuration module for the topology tool.
//!
//! This module handles all configuration-related functionality:
//! - Parsing the optional `topology.yaml` settings file
//! - Loading OpenStack credentials from the environment
//! - Validation of settings and run parameters

mod credentials;
mod parser;
mod settings;
mod validator;

pub use credentials::OpenStackCredentials;
pub use parser::{ConfigParser, DEFAULT_CONFIG_FILES, find_config_file};
pub use settings::{CloudSettings, DeploymentSettings, Settings, WaitPolicy};
pub use validator::{ConfigValidator, ValidationError, ValidationResult};
