//! # brickwork-workspace
//!
//! Administrative automation for a Databricks workspace.
//!
//! - **Credential Resolver** ([`entra`]): exchanges client credentials for a
//!   bearer token at the identity provider
//! - **Identity Registrar** ([`identity`], [`groups`], [`sql`]): service
//!   principals over SCIM and Unity Catalog groups over SQL
//! - **Job Controller** ([`jobs`], [`permissions`]): get-or-create jobs by
//!   name, trigger runs, poll them and fetch their output
//!
//! All managers talk to the workspace through [`transport::WorkspaceClient`],
//! which carries one immutable [`BearerToken`]. To call as another identity,
//! derive a handle with `acting_as`.
//!
//! ## Example
//!
//! ```rust,no_run
//! use brickwork_workspace::prelude::*;
//!
//! # async fn example() -> brickwork_core::Result<()> {
//! let config = WorkspaceConfig::from_env()?;
//! let jobs = JobController::new(WorkspaceClient::new(&config)?);
//!
//! let spec = JobSpec::notebook("nightly-ingest", "/Shared/ingest").catalog_schema("main", "raw");
//! let job = jobs.create_or_get(&spec).await?;
//! if let Some(completed) = jobs.run_and_wait(job.job_id, PollSettings::default()).await {
//!     println!("{}", completed.status);
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod entra;
pub mod groups;
pub mod identity;
pub mod jobs;
pub mod permissions;
pub mod sql;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;
pub mod transport;

pub use brickwork_core::{BearerToken, Error, JobId, PollSettings, Result, RunId};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use brickwork_core::prelude::*;

    pub use crate::entra::CredentialResolver;
    pub use crate::groups::{GroupHandle, GroupManager, GroupName};
    pub use crate::identity::{
        Entitlement, IdentityKey, IdentityRegistrar, RegisterIdentity, ServicePrincipal,
    };
    pub use crate::jobs::{CompletedRun, JobController, JobLookup, JobSpec, TerminalStatus};
    pub use crate::permissions::PermissionLevel;
    pub use crate::sql::{SqlExecutor, StatementExecutor};
    pub use crate::transport::WorkspaceClient;
}
