//! Group command - ensure Unity Catalog groups and their members.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use owo_colors::OwoColorize;
use tracing::Instrument;

use brickwork_core::observability::identity_span;
use brickwork_workspace::groups::{GroupManager, GroupName};
use brickwork_workspace::identity::ServicePrincipal;

use crate::client::sql_executor;
use crate::{Config, OutputFormat};

/// Arguments for the group command.
#[derive(Debug, Args)]
pub struct GroupArgs {
    /// Group operation.
    #[command(subcommand)]
    pub command: GroupCommand,
}

/// Group operations.
#[derive(Debug, Subcommand)]
pub enum GroupCommand {
    /// Create the group unless it exists.
    Ensure {
        /// Group name; characters outside `[A-Za-z0-9_]` become `_`.
        name: String,
    },
    /// Add a service principal to a group, creating the group if needed.
    AddMember(AddMemberArgs),
}

/// Arguments for `group add-member`.
#[derive(Debug, Args)]
pub struct AddMemberArgs {
    /// Group name.
    pub group: String,

    /// Display name of the principal.
    #[arg(long)]
    pub display_name: String,

    /// Application ID of the principal, used when the display name is unknown to the engine.
    #[arg(long)]
    pub application_id: Option<String>,

    /// Domain for the `<application-id>@<domain>` member form.
    #[arg(long)]
    pub member_domain: Option<String>,
}

impl AddMemberArgs {
    fn principal(&self) -> ServicePrincipal {
        ServicePrincipal {
            application_id: self.application_id.clone(),
            display_name: Some(self.display_name.clone()),
            ..ServicePrincipal::default()
        }
    }
}

/// Execute the group command.
///
/// # Errors
///
/// Returns an error if no warehouse is configured, the group name is empty,
/// or a statement fails.
pub async fn execute(args: GroupArgs, config: &Config) -> Result<()> {
    let executor = sql_executor(config)?;
    let span = identity_span("group", config.host.as_deref().unwrap_or_default());

    match args.command {
        GroupCommand::Ensure { name } => {
            let name = GroupName::new(&name)?;
            let handle = GroupManager::new(executor)
                .ensure_group(&name)
                .instrument(span)
                .await
                .with_context(|| format!("Failed to ensure group {name}"))?;
            match config.format {
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({ "group": handle.name.as_str() }))?
                ),
                OutputFormat::Text | OutputFormat::Table => {
                    println!("Group {} is present", handle.name.bold());
                }
            }
        }
        GroupCommand::AddMember(add) => {
            let name = GroupName::new(&add.group)?;
            let mut manager = GroupManager::new(executor);
            if let Some(domain) = &add.member_domain {
                manager = manager.with_member_domain(domain.clone());
            }
            let added = manager
                .add_member(&name, &add.principal())
                .instrument(span)
                .await
                .with_context(|| format!("Failed to add member to group {name}"))?;
            match config.format {
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "group": name.as_str(),
                        "member": add.display_name,
                        "added": added,
                    }))?
                ),
                OutputFormat::Text | OutputFormat::Table => {
                    if added {
                        println!("{} {} is a member of {name}", "OK".green(), add.display_name);
                    } else {
                        println!("{} could not add {} to {name}", "FAILED".red(), add.display_name);
                    }
                }
            }
            if !added {
                anyhow::bail!("Membership change was refused");
            }
        }
    }

    Ok(())
}
