//! # brickwork-cli
//!
//! Command-line interface for workspace administration.
//!
//! ## Commands
//!
//! - `brickwork token` - Exchange client credentials for a bearer token
//! - `brickwork identity` - Find or register service principals
//! - `brickwork group` - Ensure groups and add members
//! - `brickwork job` - Ensure jobs, grant access, run and inspect runs
//!
//! ## Configuration
//!
//! The CLI uses environment variables or command-line flags for settings:
//!
//! - `DATABRICKS_HOST` - Workspace URL
//! - `DATABRICKS_TOKEN` - Bearer token for control-plane calls
//! - `DATABRICKS_WAREHOUSE_ID` - SQL warehouse for group statements
//! - `AZURE_TENANT_ID`, `AZURE_CLIENT_ID`, `AZURE_CLIENT_SECRET` - Service identity

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
// CLI uses print! macros intentionally
#![allow(clippy::print_stdout)]
#![allow(clippy::print_stderr)]

pub mod client;
pub mod commands;

use clap::{Parser, Subcommand};

/// Brickwork CLI - workspace job and identity automation.
#[derive(Debug, Parser)]
#[command(name = "brickwork")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Workspace URL.
    #[arg(long, env = "DATABRICKS_HOST")]
    pub host: Option<String>,

    /// Bearer token for control-plane calls.
    #[arg(long, env = "DATABRICKS_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// SQL warehouse used for group statements.
    #[arg(long, env = "DATABRICKS_WAREHOUSE_ID")]
    pub warehouse_id: Option<String>,

    /// Output format.
    #[arg(long, default_value = "text")]
    pub format: OutputFormat,

    /// Emit logs as JSON.
    #[arg(long)]
    pub log_json: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Get the effective configuration.
    #[must_use]
    pub fn config(&self) -> Config {
        Config {
            host: self.host.clone(),
            token: self.token.clone(),
            warehouse_id: self.warehouse_id.clone(),
            format: self.format.clone(),
        }
    }
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Exchange client credentials for a bearer token.
    Token(commands::token::TokenArgs),
    /// Find or register service principals.
    Identity(commands::identity::IdentityArgs),
    /// Manage Unity Catalog groups.
    Group(commands::group::GroupArgs),
    /// Manage jobs and runs.
    Job(commands::job::JobArgs),
}

/// Output format.
#[derive(Debug, Clone, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output.
    Json,
    /// Table output.
    Table,
}

/// CLI configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Workspace URL.
    pub host: Option<String>,
    /// Bearer token.
    pub token: Option<String>,
    /// SQL warehouse ID.
    pub warehouse_id: Option<String>,
    /// Output format.
    pub format: OutputFormat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_config_from_flags() {
        let cli = Cli::parse_from([
            "brickwork",
            "--host",
            "https://adb-1.azuredatabricks.net",
            "--token",
            "dapi-abc",
            "--warehouse-id",
            "wh-1",
            "--format",
            "json",
            "job",
            "status",
            "42",
        ]);

        let config = cli.config();
        assert_eq!(config.host.as_deref(), Some("https://adb-1.azuredatabricks.net"));
        assert_eq!(config.token.as_deref(), Some("dapi-abc"));
        assert_eq!(config.warehouse_id.as_deref(), Some("wh-1"));
        assert!(matches!(config.format, OutputFormat::Json));
        assert!(matches!(cli.command, Commands::Job(_)));
    }

    #[test]
    fn test_cli_rejects_unknown_format() {
        let result = Cli::try_parse_from(["brickwork", "--format", "yaml", "token"]);
        assert!(result.is_err());
    }
}
