//! Identity command - find or register service principals.

use anyhow::{Context, Result, bail};
use clap::{Args, Subcommand};
use tracing::Instrument;

use brickwork_core::observability::identity_span;
use brickwork_workspace::identity::{
    Entitlement, IdentityKey, IdentityRegistrar, RegisterIdentity, ServicePrincipal,
};

use crate::client::workspace_client;
use crate::{Config, OutputFormat};

/// Arguments for the identity command.
#[derive(Debug, Args)]
pub struct IdentityArgs {
    /// Identity operation.
    #[command(subcommand)]
    pub command: IdentityCommand,
}

/// Identity operations.
#[derive(Debug, Subcommand)]
pub enum IdentityCommand {
    /// Look up a service principal.
    Find(FindArgs),
    /// Register a service principal, or return the existing one.
    Register(RegisterArgs),
}

/// Arguments for `identity find`.
#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
pub struct FindArgs {
    /// Application (client) ID.
    #[arg(long)]
    pub application_id: Option<String>,

    /// Exact display name.
    #[arg(long)]
    pub display_name: Option<String>,
}

impl FindArgs {
    fn key(&self) -> Option<IdentityKey> {
        self.application_id
            .clone()
            .map(IdentityKey::ByApplicationId)
            .or_else(|| self.display_name.clone().map(IdentityKey::ByDisplayName))
    }
}

/// Arguments for `identity register`.
#[derive(Debug, Args)]
pub struct RegisterArgs {
    /// Application ID of an externally issued identity. Omit to create a
    /// workspace-local identity.
    #[arg(long)]
    pub application_id: Option<String>,

    /// Display name. Defaults to `sp-<application-id>` for external identities.
    #[arg(long)]
    pub display_name: Option<String>,

    /// Entitlements to grant instead of the defaults (repeatable).
    #[arg(long = "entitlement", value_delimiter = ',')]
    pub entitlements: Vec<String>,
}

impl RegisterArgs {
    /// Builds the registration request.
    ///
    /// # Errors
    ///
    /// Returns an error if neither an application ID nor a display name is given.
    pub fn request(&self) -> Result<RegisterIdentity> {
        let request = match (&self.application_id, &self.display_name) {
            (Some(app_id), Some(name)) => RegisterIdentity::external(app_id, name),
            (Some(app_id), None) => RegisterIdentity::external(app_id, format!("sp-{app_id}")),
            (None, Some(name)) => RegisterIdentity::workspace_local(name),
            (None, None) => bail!("Provide --display-name, --application-id, or both"),
        };
        if self.entitlements.is_empty() {
            Ok(request)
        } else {
            Ok(request.with_entitlements(
                self.entitlements.iter().map(|e| Entitlement::from(e.as_str())).collect(),
            ))
        }
    }
}

/// Execute the identity command.
///
/// # Errors
///
/// Returns an error if the workspace is not configured, the principal is not
/// found, or registration fails.
pub async fn execute(args: IdentityArgs, config: &Config) -> Result<()> {
    let client = workspace_client(config)?;
    let span = identity_span("identity", client.host());
    let registrar = IdentityRegistrar::new(client);

    match args.command {
        IdentityCommand::Find(find) => {
            let key = find.key().context("Provide --application-id or --display-name")?;
            let principal = registrar
                .find(&key)
                .instrument(span)
                .await
                .with_context(|| format!("No service principal with {key}"))?;
            print_principal(&principal, config)
        }
        IdentityCommand::Register(register) => {
            let request = register.request()?;
            let principal = registrar
                .register_or_get(&request)
                .instrument(span)
                .await
                .context("Failed to register service principal")?;
            print_principal(&principal, config)
        }
    }
}

fn print_principal(principal: &ServicePrincipal, config: &Config) -> Result<()> {
    match config.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(principal)?);
        }
        OutputFormat::Text => {
            println!("Service principal: {}", principal.id);
            println!("  Application ID: {}", principal.application_id.as_deref().unwrap_or("-"));
            println!("  Display name:   {}", principal.display_name.as_deref().unwrap_or("-"));
            let entitlements: Vec<&str> =
                principal.entitlements.iter().map(|e| e.value.as_str()).collect();
            if !entitlements.is_empty() {
                println!("  Entitlements:   {}", entitlements.join(", "));
            }
        }
        OutputFormat::Table => {
            use tabled::{Table, Tabled};

            #[derive(Tabled)]
            struct PrincipalRow {
                #[tabled(rename = "ID")]
                id: String,
                #[tabled(rename = "Application ID")]
                application_id: String,
                #[tabled(rename = "Display Name")]
                display_name: String,
                #[tabled(rename = "Active")]
                active: String,
            }

            let row = PrincipalRow {
                id: principal.id.clone(),
                application_id: principal.application_id.clone().unwrap_or_default(),
                display_name: principal.display_name.clone().unwrap_or_default(),
                active: principal.active.map_or_else(String::new, |a| a.to_string()),
            };
            println!("{}", Table::new([row]));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use brickwork_workspace::identity::LookupBy;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(subcommand)]
        command: IdentityCommand,
    }

    #[test]
    fn test_find_requires_exactly_one_key() {
        assert!(TestCli::try_parse_from(["test", "find"]).is_err());
        assert!(TestCli::try_parse_from([
            "test",
            "find",
            "--application-id",
            "a",
            "--display-name",
            "b"
        ])
        .is_err());

        let cli = TestCli::parse_from(["test", "find", "--display-name", "etl"]);
        let IdentityCommand::Find(find) = cli.command else {
            panic!("expected find");
        };
        assert_eq!(find.key(), Some(IdentityKey::ByDisplayName("etl".into())));
    }

    #[test]
    fn test_register_external_defaults_display_name() {
        let cli = TestCli::parse_from(["test", "register", "--application-id", "abc"]);
        let IdentityCommand::Register(register) = cli.command else {
            panic!("expected register");
        };
        let request = register.request().unwrap();
        assert_eq!(request.display_name, "sp-abc");
        assert_eq!(request.lookup, LookupBy::ApplicationId);
        assert_eq!(request.entitlements, Entitlement::external_defaults());
    }

    #[test]
    fn test_register_workspace_local_with_entitlements() {
        let cli = TestCli::parse_from([
            "test",
            "register",
            "--display-name",
            "etl-runner",
            "--entitlement",
            "databricks-sql-access",
        ]);
        let IdentityCommand::Register(register) = cli.command else {
            panic!("expected register");
        };
        let request = register.request().unwrap();
        assert_eq!(request.application_id, None);
        assert_eq!(request.lookup, LookupBy::DisplayName);
        assert_eq!(request.entitlements, vec![Entitlement::SqlAccess]);
    }

    #[test]
    fn test_register_requires_a_name() {
        let cli = TestCli::parse_from(["test", "register"]);
        let IdentityCommand::Register(register) = cli.command else {
            panic!("expected register");
        };
        assert!(register.request().is_err());
    }
}
