//! Unity Catalog group management through SQL.
//!
//! Group existence is decided by listing every group and checking
//! containment locally. "Already exists" and "already a member" answers
//! from the engine count as success, matched on a known error class first
//! and on the message text when the class is missing or generic.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use brickwork_core::{Error, Result};

use crate::identity::ServicePrincipal;
use crate::sql::SqlExecutor;

/// Domain appended to an application ID to form a member principal.
pub const DEFAULT_MEMBER_DOMAIN: &str = "databricks.com";

const GROUP_EXISTS_CLASSES: &[&str] = &[
    "GROUP_ALREADY_EXISTS",
    "PRINCIPAL_ALREADY_EXISTS",
    "RESOURCE_ALREADY_EXISTS",
];
const MEMBER_EXISTS_CLASSES: &[&str] = &["PRINCIPAL_ALREADY_EXISTS", "RESOURCE_ALREADY_EXISTS"];
const GROUP_EXISTS_TEXT: &[&str] = &["already exists"];
const MEMBER_EXISTS_TEXT: &[&str] = &["already a member", "already exists"];

/// A group name that is safe to splice into a statement as an identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupName(String);

impl GroupName {
    /// Sanitizes `raw`: every character outside `[A-Za-z0-9_]` becomes `_`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an empty name.
    pub fn new(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(Error::InvalidInput("group name must not be empty".into()));
        }
        Ok(Self(
            raw.chars()
                .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
                .collect(),
        ))
    }

    /// The sanitized name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A group known to exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupHandle {
    /// Sanitized group name.
    pub name: GroupName,
}

/// Quotes an identifier with backticks, doubling embedded backticks.
fn quote_identifier(raw: &str) -> String {
    format!("`{}`", raw.replace('`', "``"))
}

fn matches_answer(err: &Error, classes: &[&str], texts: &[&str]) -> bool {
    let Error::Sql { code, message } = err else {
        return false;
    };
    if code.as_deref().is_some_and(|code| classes.contains(&code)) {
        return true;
    }
    let message = message.to_ascii_lowercase();
    texts.iter().any(|text| message.contains(text))
}

/// Creates groups and adds principals to them.
#[derive(Clone)]
pub struct GroupManager {
    sql: Arc<dyn SqlExecutor>,
    member_domain: String,
}

impl fmt::Debug for GroupManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupManager")
            .field("member_domain", &self.member_domain)
            .finish_non_exhaustive()
    }
}

impl GroupManager {
    /// Creates a manager over a SQL executor.
    #[must_use]
    pub fn new(sql: Arc<dyn SqlExecutor>) -> Self {
        Self {
            sql,
            member_domain: DEFAULT_MEMBER_DOMAIN.to_string(),
        }
    }

    /// Overrides the domain used for synthesized member names.
    #[must_use]
    pub fn with_member_domain(mut self, domain: impl Into<String>) -> Self {
        self.member_domain = domain.into();
        self
    }

    /// Returns true if the group is listed. A failed listing counts as absent.
    #[instrument(skip(self), fields(group = %name))]
    pub async fn group_exists(&self, name: &GroupName) -> bool {
        match self.sql.execute("SHOW GROUPS").await {
            Ok(result) => result
                .first_present(&["principal", "name"])
                .iter()
                .any(|group| group == name.as_str()),
            Err(e) => {
                warn!(error = %e, "error listing groups");
                false
            }
        }
    }

    /// Creates the group unless it is already listed.
    ///
    /// # Errors
    ///
    /// Returns the statement error when creation fails for any reason other
    /// than the group already existing.
    #[instrument(skip(self), fields(group = %name))]
    pub async fn ensure_group(&self, name: &GroupName) -> Result<GroupHandle> {
        let handle = GroupHandle { name: name.clone() };
        if self.group_exists(name).await {
            debug!("group already exists");
            return Ok(handle);
        }

        match self.sql.execute(&format!("CREATE GROUP {name}")).await {
            Ok(_) => {
                info!("created group");
                Ok(handle)
            }
            Err(e) if matches_answer(&e, GROUP_EXISTS_CLASSES, GROUP_EXISTS_TEXT) => {
                info!("group already exists");
                Ok(handle)
            }
            Err(e) => {
                warn!(error = %e, "failed to create group");
                Err(e)
            }
        }
    }

    async fn principal_exists(&self, identifier: &str) -> bool {
        self.sql
            .execute(&format!("DESCRIBE USER {}", quote_identifier(identifier)))
            .await
            .is_ok()
    }

    /// Picks the member identifier for a principal.
    ///
    /// Prefers the display name when the engine knows it, then the
    /// `{application_id}@{domain}` form, and otherwise the display name as is.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] when the principal carries no name at all.
    pub async fn resolve_member(&self, principal: &ServicePrincipal) -> Result<String> {
        let display_name = principal
            .display_name
            .clone()
            .or_else(|| principal.application_id.clone())
            .ok_or_else(|| {
                Error::InvalidInput("service principal has neither display name nor application ID".into())
            })?;

        if self.principal_exists(&display_name).await {
            return Ok(display_name);
        }
        if let Some(application_id) = &principal.application_id {
            let synthesized = format!("{application_id}@{}", self.member_domain);
            if self.principal_exists(&synthesized).await {
                return Ok(synthesized);
            }
        }
        debug!(member = %display_name, "no probe matched, using display name");
        Ok(display_name)
    }

    /// Adds a principal to the group, creating the group first if needed.
    ///
    /// Returns `Ok(true)` when the principal is a member afterwards, and
    /// `Ok(false)` when the engine refused the membership change.
    ///
    /// # Errors
    ///
    /// Returns an error when the group cannot be ensured or the principal
    /// has no usable name.
    #[instrument(skip(self, principal), fields(group = %name, identity = %principal.id))]
    pub async fn add_member(&self, name: &GroupName, principal: &ServicePrincipal) -> Result<bool> {
        self.ensure_group(name).await?;
        let member = self.resolve_member(principal).await?;

        let statement = format!("ALTER GROUP {name} ADD USER {}", quote_identifier(&member));
        match self.sql.execute(&statement).await {
            Ok(_) => {
                info!(member = %member, "added member to group");
                Ok(true)
            }
            Err(e) if matches_answer(&e, MEMBER_EXISTS_CLASSES, MEMBER_EXISTS_TEXT) => {
                info!(member = %member, "already a member of group");
                Ok(true)
            }
            Err(e) => {
                warn!(member = %member, error = %e, "failed to add member to group");
                Ok(false)
            }
        }
    }
}
