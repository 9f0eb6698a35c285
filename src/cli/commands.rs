//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Topology - build and tear down salt-managed web environments on OpenStack.
#[derive(Parser, Debug)]
#[command(name = "topology")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the settings file.
    #[arg(short, long, global = true, env = "TOPOLOGY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging and resource details.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress resource-by-resource progress.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// The application environment a command targets.
#[derive(Args, Debug, Clone)]
pub struct EnvironmentArgs {
    /// Application name, e.g. `hello_world`.
    pub app: String,

    /// Environment name, e.g. `dev`.
    pub environment: String,

    /// Number of application servers.
    pub num_servers: usize,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build an environment, or destroy it with --destroy.
    Build {
        /// Target environment.
        #[command(flatten)]
        target: EnvironmentArgs,

        /// Flavor used for every server, e.g. `t1.small`.
        server_size: String,

        /// Destroy the environment instead of building it.
        #[arg(short, long)]
        destroy: bool,

        /// Leave out the load-balancer pair.
        #[arg(long)]
        no_load_balancers: bool,

        /// Create cloud resources only, without configuring the servers.
        #[arg(long)]
        skip_bootstrap: bool,

        /// Private key used to log in to the servers.
        #[arg(short, long, env = "TOPOLOGY_SSH_KEY")]
        identity_file: Option<PathBuf>,
    },

    /// Show which resources of an environment exist.
    Status {
        /// Target environment.
        #[command(flatten)]
        target: EnvironmentArgs,

        /// Leave out the load-balancer pair.
        #[arg(long)]
        no_load_balancers: bool,
    },

    /// Check the image and flavor without creating anything.
    Validate {
        /// Target environment.
        #[command(flatten)]
        target: EnvironmentArgs,

        /// Flavor used for every server.
        server_size: String,
    },
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
