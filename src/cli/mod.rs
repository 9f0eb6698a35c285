//! CLI module for the topology tool.
//!
//! This module provides the command-line interface for building, tearing
//! down and inspecting environments.

mod commands;
mod output;

pub use commands::{Cli, Commands, EnvironmentArgs, OutputFormat};
pub use output::OutputFormatter;
