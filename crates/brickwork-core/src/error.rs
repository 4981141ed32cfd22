//! Error types and result aliases for brickwork.
//!
//! A lookup that finds nothing is not an error here: finders return
//! `Ok(None)` or `None`, and transient lookup failures collapse into the
//! same answer. These variants cover the calls that are fatal for the
//! operation that issued them.

/// The result type used throughout brickwork.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in brickwork operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The identity provider refused the token exchange, or could not be reached.
    #[error("token exchange failed (status {}): {body}", status.map_or_else(|| "none".to_string(), |s| s.to_string()))]
    Auth {
        /// HTTP status returned by the token endpoint, if a response arrived.
        status: Option<u16>,
        /// Response body or transport error description.
        body: String,
    },

    /// A control-plane call returned a non-success status.
    #[error("API error ({status}): {body}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Raw response body.
        body: String,
    },

    /// The request never produced a response.
    #[error("transport error: {message}")]
    Transport {
        /// Description of the failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A response or request body could not be (de)serialized.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },

    /// A SQL statement failed on the query engine.
    #[error("SQL statement failed{}: {message}", code.as_deref().map(|c| format!(" [{c}]")).unwrap_or_default())]
    Sql {
        /// Engine error code, when the engine reports one.
        code: Option<String>,
        /// Engine error message.
        message: String,
    },

    /// The remote side reported a duplicate but the existing resource could not be read back.
    #[error("conflict: {message}")]
    Conflict {
        /// Description of the conflict.
        message: String,
    },

    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Required configuration is missing or malformed.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },
}

impl Error {
    /// Creates a transport error with a source cause.
    #[must_use]
    pub fn transport(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transport {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a serialization error.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Returns the HTTP status carried by this error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Auth { status, .. } => *status,
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}
