//! Progress narration for facade operations.
//!
//! The facade reports every find, create and delete through a [`Reporter`]
//! chosen at construction. Diagnostics still go through `tracing`.

use colored::Colorize;
use std::fmt::Debug;
use std::io::Write;

/// Sink for resource-by-resource progress messages.
pub trait Reporter: Send + Sync {
    /// Reports a message, optionally with the resource it concerns.
    fn display(&self, label: &str, detail: Option<&dyn Debug>);
}

/// Reporter that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentReporter;

impl Reporter for SilentReporter {
    fn display(&self, _label: &str, _detail: Option<&dyn Debug>) {}
}

/// Reporter that writes to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct VerboseReporter {
    /// Also print the resource record after each message.
    show_details: bool,
}

impl VerboseReporter {
    /// Creates a stdout reporter.
    #[must_use]
    pub const fn new(show_details: bool) -> Self {
        Self { show_details }
    }

    fn render(&self, label: &str, detail: Option<&dyn Debug>) -> String {
        let marker = if label.starts_with("Deleting") || label.starts_with("Deleted") {
            "-".red()
        } else if label.starts_with("Creat") {
            "+".green()
        } else {
            "*".cyan()
        };

        match detail {
            Some(detail) if self.show_details => format!("{marker} {label}\n{detail:#?}"),
            _ => format!("{marker} {label}"),
        }
    }
}

impl Reporter for VerboseReporter {
    fn display(&self, label: &str, detail: Option<&dyn Debug>) {
        let line = self.render(label, detail);
        let mut stdout = std::io::stdout().lock();
        let _ = writeln!(stdout, "{line}");
    }
}
