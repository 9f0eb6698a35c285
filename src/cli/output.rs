//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use serde::Serialize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::openstack::ServerStatus;
use crate::topology::{BuildReport, EnvironmentStatus};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Server row for table display.
#[derive(Tabled)]
struct ServerRow {
    #[tabled(rename = "Server")]
    name: String,
    #[tabled(rename = "Role")]
    role: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Public addresses")]
    addresses: String,
}

/// Resource row for table display.
#[derive(Tabled)]
struct ResourceRow {
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Present")]
    present: String,
    #[tabled(rename = "ID")]
    id: String,
}

/// Validation outcome in JSON form.
#[derive(Serialize)]
struct ValidationJson<'a> {
    image: &'a str,
    flavor: &'a str,
    valid: bool,
    warning: Option<&'a str>,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    fn json<T: Serialize>(value: &T) -> String {
        serde_json::to_string_pretty(value).unwrap_or_default()
    }

    /// Formats a build report for display.
    #[must_use]
    pub fn format_build(&self, report: &BuildReport) -> String {
        match self.format {
            OutputFormat::Json => Self::json(report),
            OutputFormat::Text => Self::format_build_text(report),
        }
    }

    fn format_build_text(report: &BuildReport) -> String {
        let mut output = String::new();

        let _ = writeln!(
            output,
            "\n{} Built {}/{}\n",
            "✓".green(),
            report.app,
            report.environment
        );

        for server in &report.servers {
            let _ = writeln!(
                output,
                "server {} public IP address : {}",
                server.name.bold(),
                server.public_addresses.join(",")
            );
        }

        if let Some(address) = &report.ha_address {
            let _ = writeln!(output, "\n{} is now available at {}", report.app, address.cyan());
        }

        output
    }

    /// Formats the end of a teardown.
    #[must_use]
    pub fn format_destroyed(&self, app: &str, environment: &str) -> String {
        match self.format {
            OutputFormat::Json => Self::json(&serde_json::json!({
                "app": app,
                "environment": environment,
                "destroyed": true,
            })),
            OutputFormat::Text => format!("\n{} Destroyed {app}/{environment}\n", "✓".green()),
        }
    }

    /// Formats an environment inspection for display.
    #[must_use]
    pub fn format_status(&self, status: &EnvironmentStatus) -> String {
        match self.format {
            OutputFormat::Json => Self::json(status),
            OutputFormat::Text => Self::format_status_text(status),
        }
    }

    fn format_status_text(status: &EnvironmentStatus) -> String {
        let mut output = String::new();

        let _ = write!(
            output,
            "\nEnvironment: {}/{}\n\n",
            status.app, status.environment
        );

        let resources: Vec<ResourceRow> = status
            .resources
            .iter()
            .map(|r| ResourceRow {
                kind: r.kind.clone(),
                name: r.name.clone(),
                present: Self::format_presence(r.exists()),
                id: r.id.as_deref().map_or_else(|| String::from("-"), |id| Self::truncate(id, 12)),
            })
            .collect();
        output.push_str(&Table::new(resources).to_string());
        output.push_str("\n\n");

        let servers: Vec<ServerRow> = status
            .servers
            .iter()
            .map(|s| ServerRow {
                name: s.name.clone(),
                role: s.role.clone(),
                status: s
                    .status
                    .map_or_else(|| "absent".dimmed().to_string(), Self::format_server_status),
                addresses: if s.public_addresses.is_empty() {
                    String::from("-")
                } else {
                    s.public_addresses.join(", ")
                },
            })
            .collect();
        output.push_str(&Table::new(servers).to_string());
        output.push('\n');

        let summary = if status.is_complete() {
            "complete".green().to_string()
        } else if status.is_empty() {
            "absent".red().to_string()
        } else {
            "partial".yellow().to_string()
        };

        let _ = write!(
            output,
            "\nStatus: {summary} ({} of {} present)\n",
            status.present_count(),
            status.expected_count()
        );

        output
    }

    /// Formats an image/flavor validation outcome.
    #[must_use]
    pub fn format_validation(&self, image: &str, flavor: &str, warning: Option<&str>) -> String {
        match self.format {
            OutputFormat::Json => Self::json(&ValidationJson {
                image,
                flavor,
                valid: true,
                warning,
            }),
            OutputFormat::Text => match warning {
                Some(message) => format!("{} {message}\n", "⚠".yellow()),
                None => format!("{} {flavor} is suitable for {image}\n", "✓".green()),
            },
        }
    }

    fn format_presence(exists: bool) -> String {
        if exists {
            "yes".green().to_string()
        } else {
            "no".red().to_string()
        }
    }

    fn format_server_status(status: ServerStatus) -> String {
        match status {
            ServerStatus::Active => status.to_string().green().to_string(),
            ServerStatus::Build | ServerStatus::Reboot => status.to_string().yellow().to_string(),
            ServerStatus::Error => status.to_string().red().to_string(),
            _ => status.to_string().dimmed().to_string(),
        }
    }

    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{kept}...")
        }
    }
}
