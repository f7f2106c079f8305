// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! CLI argument parsing and command definitions.
//!
//! - `run`: Start the bridge (default)
//! - `validate`: Validate the configuration and tag definition files
//! - `version`: Show version information

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

// =============================================================================
// Main CLI Structure
// =============================================================================

/// nxbridge - Omron NX controller ↔ OPC UA bridge
///
/// Exposes controller tags as OPC UA variables and forwards client writes
/// back to the controller.
#[derive(Parser, Debug)]
#[command(
    name = "nxbridge",
    author = "Sylvex <contact@sylvex.io>",
    version = nxbridge_core::VERSION,
    about = "Bidirectional Omron NX controller to OPC UA bridge",
    long_about = None,
    propagate_version = true
)]
pub struct Cli {
    /// Configuration file path
    #[arg(
        short,
        long,
        default_value = "nxbridge.json",
        env = "NXBRIDGE_CONFIG",
        global = true
    )]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long, env = "NXBRIDGE_LOG_LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Log format (text, json, compact); overrides the config file
    #[arg(long, env = "NXBRIDGE_LOG_FORMAT", global = true)]
    pub log_format: Option<LogFormat>,

    /// Enable quiet mode (warnings and errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

// =============================================================================
// Subcommands
// =============================================================================

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the bridge
    ///
    /// This is the default command when no subcommand is specified. Runs
    /// until SIGINT or SIGTERM.
    Run,

    /// Validate the configuration file
    ///
    /// Loads the configuration and the tag definition file it points to
    /// without connecting to the controller or binding the endpoint.
    Validate(ValidateArgs),

    /// Show detailed version information
    Version,
}

/// Arguments for the `validate` command.
#[derive(Args, Debug, Clone, Default)]
pub struct ValidateArgs {
    /// Show parsed configuration after validation
    #[arg(short, long)]
    pub show_config: bool,

    /// Output format for validation results
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,

    /// Strict mode: treat warnings as errors
    #[arg(long)]
    pub strict: bool,
}

// =============================================================================
// Enums
// =============================================================================

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON format for structured logging
    Json,
    /// Compact format for minimal output
    Compact,
}

impl From<nxbridge_config::LogFormat> for LogFormat {
    fn from(format: nxbridge_config::LogFormat) -> Self {
        match format {
            nxbridge_config::LogFormat::Text => LogFormat::Text,
            nxbridge_config::LogFormat::Json => LogFormat::Json,
            nxbridge_config::LogFormat::Compact => LogFormat::Compact,
        }
    }
}

/// Output format for command results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON format for programmatic parsing
    Json,
}

// =============================================================================
// Helper Methods
// =============================================================================

impl Cli {
    /// Parse CLI arguments from the command line.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the effective command, defaulting to `Run` if none specified.
    pub fn effective_command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Run)
    }

    /// Get the effective log level.
    ///
    /// `--quiet` and `--verbose` win over `--log-level`, which wins over
    /// `configured`.
    pub fn effective_log_level<'a>(&'a self, configured: &'a str) -> &'a str {
        if self.quiet {
            "warn"
        } else if self.verbose {
            "debug"
        } else {
            self.log_level.as_deref().unwrap_or(configured)
        }
    }

    /// Get the effective log format, falling back to `configured`.
    pub fn effective_log_format(&self, configured: LogFormat) -> LogFormat {
        self.log_format.unwrap_or(configured)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command() {
        let cli = Cli::parse_from(["nxbridge"]);
        assert!(cli.command.is_none());
        assert!(matches!(cli.effective_command(), Commands::Run));
    }

    #[test]
    fn test_validate_command() {
        let cli = Cli::parse_from(["nxbridge", "validate", "--strict", "-f", "json"]);
        if let Some(Commands::Validate(args)) = cli.command {
            assert!(args.strict);
            assert!(!args.show_config);
            assert_eq!(args.format, OutputFormat::Json);
        } else {
            panic!("Expected Validate command");
        }
    }

    #[test]
    fn test_config_path() {
        let cli = Cli::parse_from(["nxbridge", "-c", "/etc/nxbridge/config_server.json"]);
        assert_eq!(cli.config, PathBuf::from("/etc/nxbridge/config_server.json"));
    }

    #[test]
    fn test_log_level_falls_back_to_config() {
        let cli = Cli::parse_from(["nxbridge", "run"]);
        if cli.log_level.is_none() {
            assert_eq!(cli.effective_log_level("error"), "error");
        }

        let cli = Cli::parse_from(["nxbridge", "-l", "trace"]);
        assert_eq!(cli.effective_log_level("error"), "trace");
    }

    #[test]
    fn test_quiet_and_verbose() {
        let cli = Cli::parse_from(["nxbridge", "-q", "-l", "trace"]);
        assert_eq!(cli.effective_log_level("info"), "warn");

        let cli = Cli::parse_from(["nxbridge", "-v"]);
        assert_eq!(cli.effective_log_level("info"), "debug");
    }

    #[test]
    fn test_log_format() {
        let cli = Cli::parse_from(["nxbridge", "--log-format", "compact"]);
        assert_eq!(cli.effective_log_format(LogFormat::Json), LogFormat::Compact);
        assert_eq!(
            LogFormat::from(nxbridge_config::LogFormat::Json),
            LogFormat::Json
        );
    }
}
