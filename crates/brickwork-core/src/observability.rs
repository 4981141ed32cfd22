//! Logging initialization and span helpers.
//!
//! Everything the managers report about their progress (lookups, conflicts,
//! fallbacks, failed calls) goes through `tracing`; this module sets up the
//! subscriber and provides spans with consistent field names.

use std::sync::Once;
use tracing::Span;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default)]
pub enum LogFormat {
    /// JSON structured logs.
    Json,
    /// Compact human-readable logs.
    #[default]
    Pretty,
}

/// Initializes the logging subsystem.
///
/// Safe to call multiple times; subsequent calls are no-ops. `RUST_LOG`
/// controls levels and falls back to `default_filter`.
pub fn init_logging(format: LogFormat, default_filter: &str) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

        match format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().json().with_writer(std::io::stderr))
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
                    .init();
            }
        }
    });
}

/// Creates a span for job and run operations.
#[must_use]
pub fn job_span(operation: &str, workspace: &str) -> Span {
    tracing::info_span!("job", op = operation, workspace = workspace)
}

/// Creates a span for identity and group operations.
#[must_use]
pub fn identity_span(operation: &str, workspace: &str) -> Span {
    tracing::info_span!("identity", op = operation, workspace = workspace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_logging_is_idempotent() {
        init_logging(LogFormat::Pretty, "warn");
        init_logging(LogFormat::Json, "warn");
    }

    #[test]
    fn span_helpers_create_spans() {
        job_span("create_or_get", "https://example.cloud.databricks.com")
            .in_scope(|| tracing::info!("message in job span"));
        identity_span("ensure_group", "https://example.cloud.databricks.com")
            .in_scope(|| tracing::info!("message in identity span"));
    }
}
