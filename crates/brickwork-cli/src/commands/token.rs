//! Token command - exchange client credentials for a bearer token.

use anyhow::{Context, Result};
use clap::Args;
use owo_colors::OwoColorize;

use brickwork_core::EntraConfig;
use brickwork_core::config::DEFAULT_AUTHORITY_HOST;
use brickwork_workspace::entra::CredentialResolver;

use crate::{Config, OutputFormat};

/// Arguments for the token command.
#[derive(Debug, Args)]
pub struct TokenArgs {
    /// Directory (tenant) ID.
    #[arg(long, env = "AZURE_TENANT_ID")]
    pub tenant_id: String,

    /// Application (client) ID.
    #[arg(long, env = "AZURE_CLIENT_ID")]
    pub client_id: String,

    /// Client secret.
    #[arg(long, env = "AZURE_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: String,

    /// Identity provider authority.
    #[arg(long, env = "AZURE_AUTHORITY_HOST", default_value = DEFAULT_AUTHORITY_HOST)]
    pub authority_host: String,

    /// Print the token itself.
    #[arg(long)]
    pub show: bool,
}

impl TokenArgs {
    /// Builds identity provider settings from the arguments.
    ///
    /// # Errors
    ///
    /// Returns an error if a required value is empty.
    pub fn entra_config(&self) -> Result<EntraConfig> {
        EntraConfig::from_lookup(|key| {
            let value = match key {
                "AZURE_TENANT_ID" => &self.tenant_id,
                "AZURE_CLIENT_ID" => &self.client_id,
                "AZURE_CLIENT_SECRET" => &self.client_secret,
                "AZURE_AUTHORITY_HOST" => &self.authority_host,
                _ => return None,
            };
            Some(value.clone())
        })
        .context("Incomplete identity provider credentials")
    }
}

/// Execute the token command.
///
/// # Errors
///
/// Returns an error if the credentials are incomplete or the exchange fails.
pub async fn execute(args: TokenArgs, config: &Config) -> Result<()> {
    let entra = args.entra_config()?;
    let token = CredentialResolver::from_config(&entra)?
        .resolve_config(&entra)
        .await
        .context("Token exchange failed")?;

    match config.format {
        OutputFormat::Json => {
            let mut body = serde_json::json!({
                "clientId": entra.client_id,
                "acquired": true,
            });
            if args.show {
                body["token"] = serde_json::Value::String(token.expose().to_string());
            }
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        OutputFormat::Text | OutputFormat::Table => {
            println!("{} token for {}", "Acquired".green(), entra.client_id);
            if args.show {
                println!("{}", token.expose());
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: TokenArgs,
    }

    #[test]
    fn test_token_args_parsing() {
        let cli = TestCli::parse_from([
            "test",
            "--tenant-id",
            "tenant-1",
            "--client-id",
            "client-1",
            "--client-secret",
            "s3cret",
            "--authority-host",
            "https://login.example.com/",
            "--show",
        ]);
        assert!(cli.args.show);

        let entra = cli.args.entra_config().unwrap();
        assert_eq!(entra.tenant_id, "tenant-1");
        assert_eq!(entra.client_id, "client-1");
        assert_eq!(entra.secret(), "s3cret");
        assert_eq!(entra.authority_host, "https://login.example.com");
    }

    #[test]
    fn test_token_args_empty_secret_is_rejected() {
        let cli = TestCli::parse_from([
            "test",
            "--tenant-id",
            "tenant-1",
            "--client-id",
            "client-1",
            "--client-secret",
            "",
        ]);
        assert!(cli.args.entra_config().is_err());
    }
}
