//! Strongly-typed identifiers for control-plane resources.
//!
//! Job and run IDs are server-assigned integers. Wrapping them keeps a run
//! ID from being passed where a job ID is expected, which matters for
//! multi-task output retrieval where the parent run and its task runs both
//! carry a `run_id`.
//!
//! # Example
//!
//! ```rust
//! use brickwork_core::id::{JobId, RunId};
//!
//! let job = JobId::new(7);
//! let run: RunId = "1234".parse().unwrap();
//! assert_eq!(job.to_string(), "7");
//! assert_eq!(run.get(), 1234);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw server-assigned ID.
            #[must_use]
            pub const fn new(raw: i64) -> Self {
                Self(raw)
            }

            /// Returns the raw ID.
            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                s.trim()
                    .parse::<i64>()
                    .map(Self)
                    .map_err(|e| Error::InvalidInput(format!("invalid {} '{s}': {e}", $label)))
            }
        }

        impl From<i64> for $name {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }
    };
}

numeric_id!(
    /// Identifier of a job definition, assigned by the workspace on creation.
    JobId,
    "job ID"
);

numeric_id!(
    /// Identifier of a single run, or of one task run inside a multi-task run.
    RunId,
    "run ID"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_displays() {
        let id: JobId = " 981 ".parse().expect("parse");
        assert_eq!(id, JobId::new(981));
        assert_eq!(id.to_string(), "981");
    }

    #[test]
    fn rejects_non_numeric() {
        let err = "abc".parse::<RunId>().unwrap_err();
        assert!(matches!(err, Error::InvalidInput(ref msg) if msg.contains("run ID")));
    }

    #[test]
    fn serializes_as_bare_integer() {
        let json = serde_json::to_string(&RunId::new(55)).expect("serialize");
        assert_eq!(json, "55");
        let back: RunId = serde_json::from_str("55").expect("deserialize");
        assert_eq!(back.get(), 55);
    }
}
