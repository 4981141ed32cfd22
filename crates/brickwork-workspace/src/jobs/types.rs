//! Jobs API 2.1 resource shapes.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use brickwork_core::{JobId, RunId};

/// Task key given to the single notebook task of jobs created here.
pub const DEFAULT_TASK_KEY: &str = "process_data";

/// A job as returned by the list endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDescriptor {
    /// Server-assigned job ID.
    pub job_id: JobId,
    /// Job settings; `settings.name` is the lookup key.
    #[serde(default)]
    pub settings: JobSettings,
}

impl JobDescriptor {
    /// Job name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.settings.name
    }
}

/// Job settings, used both for creation and in list responses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobSettings {
    /// Workspace-unique job name (exact, case-sensitive match).
    #[serde(default)]
    pub name: String,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Maximum concurrent runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent_runs: Option<u32>,
    /// Job-level timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    /// Tasks.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<JobTask>,
    /// Job format, `MULTI_TASK` for jobs created here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Run queueing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue: Option<QueueSettings>,
    /// Identity the job runs as.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_as: Option<RunAs>,
}

/// One task of a job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobTask {
    /// Task key, unique within the job.
    pub task_key: String,
    /// Task description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Notebook task definition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notebook_task: Option<NotebookTask>,
    /// Task-level timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

/// Notebook task definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotebookTask {
    /// Workspace path of the notebook.
    pub notebook_path: String,
    /// Widget parameters.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub base_parameters: BTreeMap<String, String>,
    /// Notebook source, `WORKSPACE` for jobs created here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Queue settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSettings {
    /// Whether runs queue when the concurrency limit is reached.
    pub enabled: bool,
}

/// Run-as identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunAs {
    /// Application ID of a service principal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_principal_name: Option<String>,
    /// User name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListJobsResponse {
    #[serde(default)]
    pub jobs: Vec<JobDescriptor>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateJobResponse {
    pub job_id: JobId,
}

/// Handle returned when a run is triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunHandle {
    /// Run ID of the triggered run.
    pub run_id: RunId,
    /// Sequence number of the run within its job.
    #[serde(default)]
    pub number_in_job: Option<i64>,
}

/// Run lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifeCycleState {
    /// Waiting to start.
    Pending,
    /// Waiting in the job queue.
    Queued,
    /// Executing.
    Running,
    /// Finishing up.
    Terminating,
    /// Completed; see the result state.
    Terminated,
    /// Skipped, e.g. because a previous run was still active.
    Skipped,
    /// Failed inside the platform.
    InternalError,
    /// Any state this client does not know.
    #[serde(other)]
    Unknown,
}

impl LifeCycleState {
    /// Returns true for states after which the run never changes again.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Terminated | Self::Skipped | Self::InternalError)
    }

    /// Wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Queued => "QUEUED",
            Self::Running => "RUNNING",
            Self::Terminating => "TERMINATING",
            Self::Terminated => "TERMINATED",
            Self::Skipped => "SKIPPED",
            Self::InternalError => "INTERNAL_ERROR",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for LifeCycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run result state, present once the run terminates.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResultState {
    /// Completed successfully.
    Success,
    /// Completed with an error.
    Failed,
    /// Stopped after reaching its timeout.
    Timedout,
    /// Cancelled.
    Canceled,
    /// Any other result, kept as the server sent it.
    Other(String),
}

impl ResultState {
    /// Wire name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
            Self::Timedout => "TIMEDOUT",
            Self::Canceled => "CANCELED",
            Self::Other(value) => value,
        }
    }
}

impl From<&str> for ResultState {
    fn from(value: &str) -> Self {
        match value {
            "SUCCESS" => Self::Success,
            "FAILED" => Self::Failed,
            "TIMEDOUT" => Self::Timedout,
            "CANCELED" => Self::Canceled,
            other => Self::Other(other.to_string()),
        }
    }
}

impl Serialize for ResultState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ResultState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from(raw.trim()))
    }
}

impl fmt::Display for ResultState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observed state of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    /// Lifecycle state.
    pub life_cycle_state: LifeCycleState,
    /// Result state; `None` while the run has not terminated.
    #[serde(default, deserialize_with = "empty_as_none")]
    pub result_state: Option<ResultState>,
    /// Human-readable state message.
    #[serde(default)]
    pub state_message: String,
}

impl RunState {
    /// Returns the terminal status, or `None` while the run can still change.
    #[must_use]
    pub fn terminal_status(&self) -> Option<TerminalStatus> {
        if !self.life_cycle_state.is_terminal() {
            return None;
        }
        Some(self.result_state.clone().map_or(
            TerminalStatus::Ended(self.life_cycle_state),
            TerminalStatus::Finished,
        ))
    }
}

/// One task run inside a multi-task run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTask {
    /// Task key from the job definition.
    pub task_key: String,
    /// Sub-run ID; task output is keyed by this, not the parent run ID.
    pub run_id: RunId,
    /// Task state.
    #[serde(default)]
    pub state: Option<RunState>,
}

/// A run as returned by `runs/get`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Run ID.
    pub run_id: RunId,
    /// Owning job.
    #[serde(default)]
    pub job_id: Option<JobId>,
    /// Current state.
    pub state: RunState,
    /// Task runs.
    #[serde(default)]
    pub tasks: Vec<RunTask>,
    /// Link to the run in the workspace UI.
    #[serde(default)]
    pub run_page_url: Option<String>,
}

impl RunRecord {
    /// Finds the task run for a task key (linear scan).
    #[must_use]
    pub fn task(&self, task_key: &str) -> Option<&RunTask> {
        self.tasks.iter().find(|t| t.task_key == task_key)
    }
}

/// Notebook exit value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotebookOutput {
    /// Value passed to the notebook exit call.
    #[serde(default)]
    pub result: Option<String>,
    /// Whether the value was truncated.
    #[serde(default)]
    pub truncated: bool,
}

/// Output of a single-task run or one task run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunOutput {
    /// Notebook exit value.
    #[serde(default)]
    pub notebook_output: Option<NotebookOutput>,
    /// Error message when the run failed.
    #[serde(default)]
    pub error: Option<String>,
    /// Error stack trace.
    #[serde(default)]
    pub error_trace: Option<String>,
    /// Captured logs.
    #[serde(default)]
    pub logs: Option<String>,
    /// Run metadata as returned by the server.
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// Outcome of waiting for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalStatus {
    /// Terminal with a result state.
    Finished(ResultState),
    /// Terminal without a result state (e.g. skipped).
    Ended(LifeCycleState),
    /// Local wall-clock budget exhausted before a terminal state was seen.
    Timeout,
}

impl TerminalStatus {
    /// Status string: the result state, else the lifecycle state, else `TIMEOUT`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Finished(result) => result.as_str(),
            Self::Ended(state) => state.as_str(),
            Self::Timeout => "TIMEOUT",
        }
    }

    /// Returns true only for a successful result.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Finished(ResultState::Success))
    }
}

impl fmt::Display for TerminalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<ResultState>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => Ok(Some(ResultState::from(value))),
    }
}
