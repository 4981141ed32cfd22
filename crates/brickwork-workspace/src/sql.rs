//! SQL statement execution against a warehouse.
//!
//! Group management speaks SQL, so the registrar depends on the
//! [`SqlExecutor`] trait rather than on a particular engine.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::{Instant, sleep};
use tracing::{debug, instrument, warn};

use brickwork_core::{Error, PollSettings, Result};

use crate::transport::WorkspaceClient;

pub(crate) const STATEMENTS_PATH: &str = "/api/2.0/sql/statements";

/// Rows returned by a statement, with column names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatementResult {
    /// Column names in order.
    pub columns: Vec<String>,
    /// Row values, one vector per row.
    pub rows: Vec<Vec<Value>>,
}

impl StatementResult {
    /// Returns the string values of one column.
    ///
    /// Falls back to the first column when `column` is not in the schema.
    #[must_use]
    pub fn values(&self, column: &str) -> Vec<String> {
        let index = self
            .columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
            .unwrap_or(0);
        self.rows
            .iter()
            .filter_map(|row| row.get(index))
            .filter_map(|value| match value {
                Value::String(s) => Some(s.clone()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect()
    }

    /// Returns the string values of the first listed column present in the schema.
    #[must_use]
    pub fn first_present(&self, candidates: &[&str]) -> Vec<String> {
        let column = candidates
            .iter()
            .find(|c| self.columns.iter().any(|col| col.eq_ignore_ascii_case(c)))
            .copied()
            .unwrap_or_default();
        self.values(column)
    }
}

/// Executes SQL statements.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Runs one statement to completion.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Sql`] when the engine rejects the statement.
    async fn execute(&self, statement: &str) -> Result<StatementResult>;
}

#[derive(Debug, Serialize)]
struct ExecuteRequest<'a> {
    statement: &'a str,
    warehouse_id: &'a str,
    wait_timeout: &'static str,
    on_wait_timeout: &'static str,
    disposition: &'static str,
    format: &'static str,
}

#[derive(Debug, Deserialize)]
struct StatementResponse {
    statement_id: String,
    status: StatementStatus,
    #[serde(default)]
    manifest: Option<Manifest>,
    #[serde(default)]
    result: Option<ResultData>,
}

#[derive(Debug, Deserialize)]
struct StatementStatus {
    state: String,
    #[serde(default)]
    error: Option<StatementError>,
}

#[derive(Debug, Deserialize)]
struct StatementError {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Manifest {
    schema: Schema,
}

#[derive(Debug, Deserialize)]
struct Schema {
    #[serde(default)]
    columns: Vec<Column>,
}

#[derive(Debug, Deserialize)]
struct Column {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ResultData {
    #[serde(default)]
    data_array: Vec<Vec<Value>>,
}

impl StatementResponse {
    fn into_result(self) -> Result<StatementResult> {
        match self.status.state.as_str() {
            "SUCCEEDED" => Ok(StatementResult {
                columns: self
                    .manifest
                    .map(|m| m.schema.columns.into_iter().map(|c| c.name).collect())
                    .unwrap_or_default(),
                rows: self.result.map(|r| r.data_array).unwrap_or_default(),
            }),
            state => {
                let (code, message) = self
                    .status
                    .error
                    .map(|e| (e.error_code, e.message.unwrap_or_default()))
                    .unwrap_or_default();
                let message = if message.is_empty() {
                    format!("statement {} ended in state {state}", self.statement_id)
                } else {
                    message
                };
                Err(Error::Sql {
                    code: error_class(&message).or(code),
                    message,
                })
            }
        }
    }

    fn is_pending(&self) -> bool {
        matches!(self.status.state.as_str(), "PENDING" | "RUNNING")
    }
}

/// Extracts the `[ERROR_CLASS]` prefix engines put on their messages.
pub(crate) fn error_class(message: &str) -> Option<String> {
    let rest = message.trim_start().strip_prefix('[')?;
    let end = rest.find(']')?;
    let class = &rest[..end];
    (!class.is_empty() && class.chars().all(|c| c.is_ascii_uppercase() || c == '_' || c.is_ascii_digit()))
        .then(|| class.to_string())
}

/// [`SqlExecutor`] backed by the workspace statement execution API.
#[derive(Debug, Clone)]
pub struct StatementExecutor {
    client: WorkspaceClient,
    warehouse_id: String,
    poll: PollSettings,
}

impl StatementExecutor {
    /// Creates an executor running statements on `warehouse_id`.
    #[must_use]
    pub fn new(client: WorkspaceClient, warehouse_id: impl Into<String>) -> Self {
        Self {
            client,
            warehouse_id: warehouse_id.into(),
            poll: PollSettings::from_secs(600, 2),
        }
    }

    /// Overrides the polling cadence for long statements.
    #[must_use]
    pub fn with_poll_settings(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    async fn fetch(&self, statement_id: &str) -> Result<StatementResponse> {
        self.client
            .get(&format!("{STATEMENTS_PATH}/{statement_id}"), &[])
            .await?
            .error_for_status()?
            .json()
    }
}

#[async_trait]
impl SqlExecutor for StatementExecutor {
    #[instrument(skip(self), fields(warehouse_id = %self.warehouse_id))]
    async fn execute(&self, statement: &str) -> Result<StatementResult> {
        let request = ExecuteRequest {
            statement,
            warehouse_id: &self.warehouse_id,
            wait_timeout: "30s",
            on_wait_timeout: "CONTINUE",
            disposition: "INLINE",
            format: "JSON_ARRAY",
        };
        let mut response: StatementResponse = self
            .client
            .post(STATEMENTS_PATH, &request)
            .await?
            .error_for_status()?
            .json()?;

        let start = Instant::now();
        while response.is_pending() {
            if start.elapsed() >= self.poll.max_wait {
                warn!(statement_id = %response.statement_id, "statement did not finish in time");
                return Err(Error::Sql {
                    code: None,
                    message: format!(
                        "statement {} still {} after {}s",
                        response.statement_id,
                        response.status.state,
                        self.poll.max_wait.as_secs()
                    ),
                });
            }
            debug!(statement_id = %response.statement_id, state = %response.status.state, "waiting for statement");
            sleep(self.poll.poll_interval.max(Duration::from_millis(1))).await;
            response = self.fetch(&response.statement_id).await?;
        }

        response.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransport;
    use crate::transport::Method;
    use serde_json::json;

    #[test]
    fn values_reads_named_column() {
        let result = StatementResult {
            columns: vec!["principal".into(), "kind".into()],
            rows: vec![vec![json!("admins"), json!("group")], vec![json!("etl"), json!("group")]],
        };
        assert_eq!(result.values("principal"), vec!["admins", "etl"]);
        assert_eq!(result.first_present(&["name", "kind"]), vec!["group", "group"]);
        assert_eq!(result.values("missing"), vec!["admins", "etl"]);
    }

    #[test]
    fn error_class_is_read_from_message_prefix() {
        assert_eq!(
            error_class("[GROUP_ALREADY_EXISTS] Group etl already exists").as_deref(),
            Some("GROUP_ALREADY_EXISTS")
        );
        assert_eq!(error_class("no class here"), None);
        assert_eq!(error_class("[lowercase] nope"), None);
    }

    #[tokio::test]
    async fn inline_success_returns_rows() {
        let transport = ScriptedTransport::new();
        transport.respond(
            Method::Post,
            STATEMENTS_PATH,
            200,
            json!({
                "statement_id": "s1",
                "status": { "state": "SUCCEEDED" },
                "manifest": { "schema": { "columns": [{ "name": "principal" }] } },
                "result": { "data_array": [["admins"]] }
            }),
        );
        let executor = StatementExecutor::new(transport.client("t"), "wh-1");

        let result = executor.execute("SHOW GROUPS").await.expect("result");
        assert_eq!(result.values("principal"), vec!["admins"]);

        let body = transport.calls()[0].body.clone().expect("body");
        assert_eq!(body["statement"], "SHOW GROUPS");
        assert_eq!(body["warehouse_id"], "wh-1");
    }

    #[tokio::test(start_paused = true)]
    async fn pending_statement_is_polled() {
        let transport = ScriptedTransport::new();
        transport.respond(
            Method::Post,
            STATEMENTS_PATH,
            200,
            json!({ "statement_id": "s2", "status": { "state": "PENDING" } }),
        );
        transport
            .respond(
                Method::Get,
                "/api/2.0/sql/statements/s2",
                200,
                json!({ "statement_id": "s2", "status": { "state": "RUNNING" } }),
            )
            .respond(
                Method::Get,
                "/api/2.0/sql/statements/s2",
                200,
                json!({ "statement_id": "s2", "status": { "state": "SUCCEEDED" } }),
            );
        let executor = StatementExecutor::new(transport.client("t"), "wh")
            .with_poll_settings(PollSettings::from_secs(60, 1));

        let result = executor.execute("CREATE GROUP etl").await.expect("done");
        assert!(result.rows.is_empty());
        assert_eq!(transport.count(Method::Get, "/api/2.0/sql/statements/s2"), 2);
    }

    #[tokio::test]
    async fn failed_statement_carries_class() {
        let transport = ScriptedTransport::new();
        transport.respond(
            Method::Post,
            STATEMENTS_PATH,
            200,
            json!({
                "statement_id": "s3",
                "status": {
                    "state": "FAILED",
                    "error": {
                        "error_code": "BAD_REQUEST",
                        "message": "[PRINCIPAL_ALREADY_EXISTS] already a member"
                    }
                }
            }),
        );
        let executor = StatementExecutor::new(transport.client("t"), "wh");

        match executor.execute("ALTER GROUP g ADD USER `u`").await.unwrap_err() {
            Error::Sql { code, message } => {
                assert_eq!(code.as_deref(), Some("PRINCIPAL_ALREADY_EXISTS"));
                assert!(message.contains("already a member"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_statement_times_out() {
        let transport = ScriptedTransport::new();
        transport.respond(
            Method::Post,
            STATEMENTS_PATH,
            200,
            json!({ "statement_id": "s4", "status": { "state": "PENDING" } }),
        );
        transport.respond(
            Method::Get,
            "/api/2.0/sql/statements/s4",
            200,
            json!({ "statement_id": "s4", "status": { "state": "PENDING" } }),
        );
        let executor = StatementExecutor::new(transport.client("t"), "wh")
            .with_poll_settings(PollSettings::from_secs(3, 1));

        let err = executor.execute("SHOW GROUPS").await.unwrap_err();
        assert!(matches!(err, Error::Sql { code: None, .. }));
    }
}
