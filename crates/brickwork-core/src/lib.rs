//! # brickwork-core
//!
//! Core primitives shared by the brickwork crates.
//!
//! - **Error Types**: the shared [`Error`] enum and [`Result`] alias
//! - **Identifiers**: strongly-typed job and run IDs
//! - **Credentials**: the immutable [`BearerToken`] value
//! - **Configuration**: workspace, identity provider and polling settings
//! - **Observability**: logging initialization and span helpers
//!
//! ## Example
//!
//! ```rust
//! use brickwork_core::prelude::*;
//!
//! let token = BearerToken::new("dapi-example");
//! let job_id: JobId = "42".parse().unwrap();
//! assert_eq!(job_id.get(), 42);
//! # let _ = token;
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod credential;
pub mod error;
pub mod id;
pub mod observability;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::{EntraConfig, PollSettings, WorkspaceConfig};
    pub use crate::credential::BearerToken;
    pub use crate::error::{Error, Result};
    pub use crate::id::{JobId, RunId};
}

pub use config::{EntraConfig, PollSettings, WorkspaceConfig};
pub use credential::BearerToken;
pub use error::{Error, Result};
pub use id::{JobId, RunId};
pub use observability::{LogFormat, init_logging};
