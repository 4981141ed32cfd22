//! Builds workspace clients from CLI configuration.

use std::sync::Arc;

use anyhow::{Context, Result};

use brickwork_core::{BearerToken, WorkspaceConfig};
use brickwork_workspace::sql::StatementExecutor;
use brickwork_workspace::transport::WorkspaceClient;

use crate::Config;

/// Resolves the workspace settings from flags and environment.
///
/// # Errors
///
/// Returns an error if the host or token is missing or the host is invalid.
pub fn workspace_config(config: &Config) -> Result<WorkspaceConfig> {
    let host = config
        .host
        .as_deref()
        .context("Workspace host is required. Set DATABRICKS_HOST or use --host")?;
    let token = config
        .token
        .as_deref()
        .context("Token is required. Set DATABRICKS_TOKEN or use --token")?;

    let mut workspace = WorkspaceConfig::new(host, BearerToken::new(token))
        .context("Invalid workspace host")?;
    if let Some(warehouse_id) = &config.warehouse_id {
        workspace = workspace.with_warehouse_id(warehouse_id.clone());
    }
    Ok(workspace)
}

/// Creates a client for control-plane calls.
///
/// # Errors
///
/// Returns an error if the configuration is incomplete or the HTTP client
/// cannot be built.
pub fn workspace_client(config: &Config) -> Result<WorkspaceClient> {
    let workspace = workspace_config(config)?;
    WorkspaceClient::new(&workspace).context("Failed to create workspace client")
}

/// Creates a SQL executor on the configured warehouse.
///
/// # Errors
///
/// Returns an error if no warehouse is configured.
pub fn sql_executor(config: &Config) -> Result<Arc<StatementExecutor>> {
    let warehouse_id = config
        .warehouse_id
        .clone()
        .context("Warehouse ID is required. Set DATABRICKS_WAREHOUSE_ID or use --warehouse-id")?;
    Ok(Arc::new(StatementExecutor::new(
        workspace_client(config)?,
        warehouse_id,
    )))
}
