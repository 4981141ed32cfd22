//! Configuration for workspace, identity provider and run polling.
//!
//! Values come from flags (see the CLI) or from the environment:
//!
//! - `DATABRICKS_HOST`, `DATABRICKS_TOKEN`, `DATABRICKS_WAREHOUSE_ID`
//! - `AZURE_TENANT_ID`, `AZURE_CLIENT_ID`, `AZURE_CLIENT_SECRET`, `AZURE_AUTHORITY_HOST`
//! - `BRICKWORK_MAX_WAIT_SECONDS`, `BRICKWORK_POLL_INTERVAL_SECONDS`

use std::fmt;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::credential::BearerToken;
use crate::error::{Error, Result};

/// Default identity provider authority.
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Workspace connection settings.
#[derive(Clone)]
pub struct WorkspaceConfig {
    /// Workspace base URL, without a trailing slash.
    pub host: String,
    /// Default bearer token for control-plane calls.
    pub token: BearerToken,
    /// SQL warehouse used for group statements, when group management is needed.
    pub warehouse_id: Option<String>,
}

impl fmt::Debug for WorkspaceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkspaceConfig")
            .field("host", &self.host)
            .field("token", &"[REDACTED]")
            .field("warehouse_id", &self.warehouse_id)
            .finish()
    }
}

impl WorkspaceConfig {
    /// Builds a configuration, normalizing the host.
    ///
    /// # Errors
    ///
    /// Returns an error if the host is not an http(s) URL or the token is blank.
    pub fn new(host: impl Into<String>, token: BearerToken) -> Result<Self> {
        let host = normalize_host(&host.into())?;
        if token.is_blank() {
            return Err(Error::configuration("workspace token must not be empty"));
        }
        Ok(Self {
            host,
            token,
            warehouse_id: None,
        })
    }

    /// Sets the SQL warehouse ID.
    #[must_use]
    pub fn with_warehouse_id(mut self, warehouse_id: impl Into<String>) -> Self {
        self.warehouse_id = Some(warehouse_id.into());
        self
    }

    /// Loads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if `DATABRICKS_HOST` or `DATABRICKS_TOKEN` is missing or invalid.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads the configuration through an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a required key is missing or invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let host = required(&lookup, "DATABRICKS_HOST")?;
        let token = required(&lookup, "DATABRICKS_TOKEN")?;
        let mut config = Self::new(host, BearerToken::new(token))?;
        config.warehouse_id = optional(&lookup, "DATABRICKS_WAREHOUSE_ID");
        Ok(config)
    }
}

/// Client credentials for the external identity provider.
#[derive(Clone)]
pub struct EntraConfig {
    /// Directory (tenant) ID.
    pub tenant_id: String,
    /// Application (client) ID.
    pub client_id: String,
    /// Client secret.
    pub client_secret: SecretString,
    /// Authority host, e.g. `https://login.microsoftonline.com`.
    pub authority_host: String,
}

impl fmt::Debug for EntraConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntraConfig")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("authority_host", &self.authority_host)
            .finish()
    }
}

impl EntraConfig {
    /// Loads the credentials from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the tenant, client ID or secret is missing.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads the credentials through an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a required key is missing.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let secret = required(&lookup, "AZURE_CLIENT_SECRET")?;
        Ok(Self {
            tenant_id: required(&lookup, "AZURE_TENANT_ID")?,
            client_id: required(&lookup, "AZURE_CLIENT_ID")?,
            client_secret: SecretString::from(secret),
            authority_host: optional(&lookup, "AZURE_AUTHORITY_HOST")
                .map_or_else(|| DEFAULT_AUTHORITY_HOST.to_string(), |h| {
                    h.trim_end_matches('/').to_string()
                }),
        })
    }

    /// Returns the client secret.
    #[must_use]
    pub fn secret(&self) -> &str {
        self.client_secret.expose_secret()
    }
}

/// Fixed-interval polling budget for run completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Wall-clock budget before giving up with a local timeout.
    pub max_wait: Duration,
    /// Sleep between consecutive status reads.
    pub poll_interval: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            max_wait: Duration::from_secs(3600),
            poll_interval: Duration::from_secs(10),
        }
    }
}

impl PollSettings {
    /// Builds settings from whole seconds.
    #[must_use]
    pub const fn from_secs(max_wait_seconds: u64, poll_interval_seconds: u64) -> Self {
        Self {
            max_wait: Duration::from_secs(max_wait_seconds),
            poll_interval: Duration::from_secs(poll_interval_seconds),
        }
    }

    /// Loads overrides from the process environment on top of the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is present but not an integer.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads overrides through an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is present but not an integer, or the interval is zero.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut settings = Self::default();
        if let Some(secs) = optional_u64(&lookup, "BRICKWORK_MAX_WAIT_SECONDS")? {
            settings.max_wait = Duration::from_secs(secs);
        }
        if let Some(secs) = optional_u64(&lookup, "BRICKWORK_POLL_INTERVAL_SECONDS")? {
            if secs == 0 {
                return Err(Error::configuration(
                    "BRICKWORK_POLL_INTERVAL_SECONDS must be at least 1",
                ));
            }
            settings.poll_interval = Duration::from_secs(secs);
        }
        Ok(settings)
    }
}

fn normalize_host(host: &str) -> Result<String> {
    let host = host.trim().trim_end_matches('/');
    if host.is_empty() {
        return Err(Error::configuration("workspace host must not be empty"));
    }
    if host.starts_with("https://") || host.starts_with("http://") {
        Ok(host.to_string())
    } else if host.contains("://") {
        Err(Error::configuration(format!(
            "unsupported scheme in workspace host: {host}"
        )))
    } else {
        Ok(format!("https://{host}"))
    }
}

fn optional(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String> {
    optional(lookup, key).ok_or_else(|| Error::configuration(format!("{key} is required")))
}

fn optional_u64(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<u64>> {
    optional(lookup, key)
        .map(|raw| {
            raw.parse::<u64>()
                .map_err(|e| Error::configuration(format!("{key} must be an integer: {e}")))
        })
        .transpose()
}
