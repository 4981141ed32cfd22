//! Job Controller: get-or-create jobs by name, trigger runs, poll them to
//! completion and fetch their output.
//!
//! Nothing is cached. Every `create_or_get` re-lists jobs, so two callers
//! racing on the same name can both see "absent" and both attempt creation;
//! only the server's duplicate rejection protects against that, and the
//! loser recovers by looking the job up again.

mod types;

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::{debug, info, instrument, warn};

use brickwork_core::{BearerToken, Error, JobId, PollSettings, Result, RunId};

use crate::transport::{ApiResponse, WorkspaceClient};

pub use types::{
    DEFAULT_TASK_KEY, JobDescriptor, JobSettings, JobTask, LifeCycleState, NotebookOutput,
    NotebookTask, QueueSettings, ResultState, RunAs, RunHandle, RunOutput, RunRecord, RunState,
    RunTask, TerminalStatus,
};
use types::{CreateJobResponse, ListJobsResponse};

pub(crate) const JOBS_LIST_PATH: &str = "/api/2.1/jobs/list";
pub(crate) const JOBS_CREATE_PATH: &str = "/api/2.1/jobs/create";
pub(crate) const RUN_NOW_PATH: &str = "/api/2.1/jobs/run-now";
pub(crate) const RUNS_GET_PATH: &str = "/api/2.1/jobs/runs/get";
pub(crate) const RUNS_GET_OUTPUT_PATH: &str = "/api/2.1/jobs/runs/get-output";

/// Page size of the job list call.
pub const JOB_LIST_LIMIT: u32 = 100;

const ALREADY_EXISTS_CODES: &[&str] = &["RESOURCE_ALREADY_EXISTS"];
const ALREADY_EXISTS_TEXT: &[&str] = &["already exists", "duplicate"];

/// How far `find_job_by_name` looks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobLookup {
    /// Only the first page of [`JOB_LIST_LIMIT`] jobs; later jobs are invisible.
    #[default]
    FirstPage,
    /// Follow `next_page_token` until the listing is exhausted.
    AllPages,
}

/// Definition of a single-notebook job to get or create.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSpec {
    /// Exact job name.
    pub name: String,
    /// Workspace path of the notebook.
    pub notebook_path: String,
    /// Notebook parameters.
    pub base_parameters: BTreeMap<String, String>,
    /// Service principal application ID to run as.
    pub run_as: Option<String>,
    /// Description; defaults to `Serverless job: {name}`.
    pub description: Option<String>,
    /// Job-level timeout.
    pub timeout: Duration,
    /// Task-level timeout.
    pub task_timeout: Duration,
    /// Key of the notebook task.
    pub task_key: String,
}

impl JobSpec {
    /// Creates a spec with the default timeouts (3600 s job, 1800 s task).
    #[must_use]
    pub fn notebook(name: impl Into<String>, notebook_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            notebook_path: notebook_path.into(),
            base_parameters: BTreeMap::new(),
            run_as: None,
            description: None,
            timeout: Duration::from_secs(3600),
            task_timeout: Duration::from_secs(1800),
            task_key: DEFAULT_TASK_KEY.to_string(),
        }
    }

    /// Adds a notebook parameter.
    #[must_use]
    pub fn parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.base_parameters.insert(key.into(), value.into());
        self
    }

    /// Sets the `catalog` and `schema` notebook parameters.
    #[must_use]
    pub fn catalog_schema(self, catalog: impl Into<String>, schema: impl Into<String>) -> Self {
        self.parameter("catalog", catalog).parameter("schema", schema)
    }

    /// Runs the job as a service principal.
    #[must_use]
    pub fn run_as(mut self, service_principal_name: impl Into<String>) -> Self {
        self.run_as = Some(service_principal_name.into());
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the job and task timeouts.
    #[must_use]
    pub fn timeouts(mut self, job: Duration, task: Duration) -> Self {
        self.timeout = job;
        self.task_timeout = task;
        self
    }

    /// Builds the creation payload: one notebook task, one concurrent run, queueing on.
    #[must_use]
    pub fn settings(&self) -> JobSettings {
        JobSettings {
            name: self.name.clone(),
            description: Some(
                self.description
                    .clone()
                    .unwrap_or_else(|| format!("Serverless job: {}", self.name)),
            ),
            max_concurrent_runs: Some(1),
            timeout_seconds: Some(self.timeout.as_secs()),
            tasks: vec![JobTask {
                task_key: self.task_key.clone(),
                description: Some("Process regional data based on permissions".to_string()),
                notebook_task: Some(NotebookTask {
                    notebook_path: self.notebook_path.clone(),
                    base_parameters: self.base_parameters.clone(),
                    source: Some("WORKSPACE".to_string()),
                }),
                timeout_seconds: Some(self.task_timeout.as_secs()),
            }],
            format: Some("MULTI_TASK".to_string()),
            queue: Some(QueueSettings { enabled: true }),
            run_as: self.run_as.as_ref().map(|sp| RunAs {
                service_principal_name: Some(sp.clone()),
                user_name: None,
            }),
        }
    }
}

/// Result of [`JobController::run_and_wait`].
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedRun {
    /// Triggered run.
    pub run_id: RunId,
    /// How the wait ended.
    pub status: TerminalStatus,
    /// Output, when the run terminated and output could be fetched.
    pub output: Option<RunOutput>,
}

enum OutputFetch {
    Found(RunOutput),
    MultipleTasks,
    Missing,
}

/// Manages jobs and runs through the Jobs API.
#[derive(Debug, Clone)]
pub struct JobController {
    client: WorkspaceClient,
    lookup: JobLookup,
    output_task_key: String,
}

impl JobController {
    /// Creates a controller over a workspace client.
    #[must_use]
    pub fn new(client: WorkspaceClient) -> Self {
        Self {
            client,
            lookup: JobLookup::default(),
            output_task_key: DEFAULT_TASK_KEY.to_string(),
        }
    }

    /// Sets how far name lookups page through the job list.
    #[must_use]
    pub fn with_lookup(mut self, lookup: JobLookup) -> Self {
        self.lookup = lookup;
        self
    }

    /// Sets the task key used when a multi-task run's output must be read per task.
    #[must_use]
    pub fn with_output_task_key(mut self, task_key: impl Into<String>) -> Self {
        self.output_task_key = task_key.into();
        self
    }

    /// Returns a controller that issues calls as another identity.
    ///
    /// `self` keeps its own credential.
    #[must_use]
    pub fn acting_as(&self, token: BearerToken) -> Self {
        Self {
            client: self.client.with_token(token),
            lookup: self.lookup,
            output_task_key: self.output_task_key.clone(),
        }
    }

    pub(crate) fn client(&self) -> &WorkspaceClient {
        &self.client
    }

    /// Finds a job whose `settings.name` equals `name` exactly.
    ///
    /// Listing failures are logged and reported as `None`.
    #[instrument(skip(self), fields(workspace = %self.client.host()))]
    pub async fn find_job_by_name(&self, name: &str) -> Option<JobDescriptor> {
        let mut page_token: Option<String> = None;
        loop {
            let mut query = vec![
                ("limit", JOB_LIST_LIMIT.to_string()),
                ("expand_tasks", "true".to_string()),
            ];
            if let Some(token) = &page_token {
                query.push(("page_token", token.clone()));
            }

            let page = match self.client.get(JOBS_LIST_PATH, &query).await {
                Ok(response) if response.status == 200 => {
                    match response.json::<ListJobsResponse>() {
                        Ok(page) => page,
                        Err(e) => {
                            warn!(error = %e, "error searching for job");
                            return None;
                        }
                    }
                }
                Ok(response) => {
                    warn!(status = response.status, body = %response.body, "error searching for job");
                    return None;
                }
                Err(e) => {
                    warn!(error = %e, "error searching for job");
                    return None;
                }
            };

            if let Some(job) = page.jobs.into_iter().find(|job| job.settings.name == name) {
                return Some(job);
            }

            match (self.lookup, page.has_more, page.next_page_token) {
                (JobLookup::AllPages, true, Some(token)) => page_token = Some(token),
                _ => return None,
            }
        }
    }

    /// Returns the job named `spec.name`, creating it when absent.
    ///
    /// A rejected creation whose error says the job already exists (error
    /// code, or "already exists"/"duplicate" in the body) falls back to a
    /// second lookup.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] with status and body when creation fails for
    /// any other reason, or when the fallback lookup still finds nothing.
    #[instrument(skip(self, spec), fields(job_name = %spec.name, workspace = %self.client.host()))]
    pub async fn create_or_get(&self, spec: &JobSpec) -> Result<JobDescriptor> {
        if let Some(existing) = self.find_job_by_name(&spec.name).await {
            info!(job_id = %existing.job_id, "job already exists, using existing job");
            return Ok(existing);
        }

        let settings = spec.settings();
        let response = self.client.post(JOBS_CREATE_PATH, &settings).await?;

        if !response.is_success() {
            if is_duplicate_job(&response) {
                info!("job name conflict, fetching existing job");
                if let Some(existing) = self.find_job_by_name(&spec.name).await {
                    return Ok(existing);
                }
            }
            warn!(status = response.status, body = %response.body, "job creation failed");
            return Err(Error::Http {
                status: response.status,
                body: response.body,
            });
        }

        let created: CreateJobResponse = response.json()?;
        info!(job_id = %created.job_id, "created new job");
        Ok(JobDescriptor {
            job_id: created.job_id,
            settings,
        })
    }

    /// Triggers a run of the job.
    ///
    /// `None` means the run could not be triggered; it does not mean the job
    /// is missing.
    #[instrument(skip(self), fields(workspace = %self.client.host()))]
    pub async fn trigger_run(&self, job_id: JobId) -> Option<RunHandle> {
        let body = serde_json::json!({ "job_id": job_id });
        match self.client.post(RUN_NOW_PATH, &body).await {
            Ok(response) if response.is_success() => match response.json::<RunHandle>() {
                Ok(handle) => {
                    info!(run_id = %handle.run_id, "triggered run");
                    Some(handle)
                }
                Err(e) => {
                    warn!(error = %e, "could not parse run-now response");
                    None
                }
            },
            Ok(response) => {
                warn!(status = response.status, body = %response.body, "could not trigger run");
                None
            }
            Err(e) => {
                warn!(error = %e, "could not trigger run");
                None
            }
        }
    }

    /// Reads a run's current state. Any non-200 answer is `None`.
    pub async fn get_run_status(&self, run_id: RunId) -> Option<RunRecord> {
        let query = [("run_id", run_id.to_string())];
        match self.client.get(RUNS_GET_PATH, &query).await {
            Ok(response) if response.status == 200 => response
                .json::<RunRecord>()
                .map_err(|e| warn!(run_id = %run_id, error = %e, "could not parse run"))
                .ok(),
            Ok(response) => {
                debug!(run_id = %run_id, status = response.status, "run status unavailable");
                None
            }
            Err(e) => {
                debug!(run_id = %run_id, error = %e, "run status unavailable");
                None
            }
        }
    }

    /// Fetches a run's output.
    ///
    /// When the server refuses because the run has multiple tasks, the
    /// output of the configured task is fetched instead through its sub-run.
    #[instrument(skip(self), fields(workspace = %self.client.host()))]
    pub async fn get_run_output(&self, run_id: RunId) -> Option<RunOutput> {
        match self.fetch_output(run_id).await {
            OutputFetch::Found(output) => Some(output),
            OutputFetch::MultipleTasks => {
                debug!(task_key = %self.output_task_key, "multi-task run, reading task output");
                self.get_task_output(run_id, &self.output_task_key).await
            }
            OutputFetch::Missing => None,
        }
    }

    /// Fetches the output of one task of a multi-task run.
    ///
    /// Output is keyed by the task's own run ID, so the parent run is read
    /// first to find it.
    #[instrument(skip(self), fields(workspace = %self.client.host()))]
    pub async fn get_task_output(&self, run_id: RunId, task_key: &str) -> Option<RunOutput> {
        let record = self.get_run_status(run_id).await?;
        let Some(task) = record.task(task_key) else {
            warn!(task_key, "task not found in run");
            return None;
        };
        match self.fetch_output(task.run_id).await {
            OutputFetch::Found(output) => Some(output),
            OutputFetch::MultipleTasks | OutputFetch::Missing => None,
        }
    }

    async fn fetch_output(&self, run_id: RunId) -> OutputFetch {
        let query = [("run_id", run_id.to_string())];
        let response = match self.client.get(RUNS_GET_OUTPUT_PATH, &query).await {
            Ok(response) => response,
            Err(e) => {
                warn!(run_id = %run_id, error = %e, "could not fetch run output");
                return OutputFetch::Missing;
            }
        };

        match response.status {
            200 => match response.json::<RunOutput>() {
                Ok(output) => OutputFetch::Found(output),
                Err(e) => {
                    warn!(run_id = %run_id, error = %e, "could not parse run output");
                    OutputFetch::Missing
                }
            },
            400 if mentions_multiple_tasks(&response) => OutputFetch::MultipleTasks,
            status => {
                warn!(run_id = %run_id, status, body = %response.body, "no run output");
                OutputFetch::Missing
            }
        }
    }

    /// Polls a run at a fixed interval until it reaches a terminal state or
    /// the wall-clock budget runs out.
    ///
    /// Status read failures count as "not finished yet". There is no
    /// backoff and no jitter; the remote run is not cancelled on timeout.
    #[instrument(skip(self, poll), fields(workspace = %self.client.host()))]
    pub async fn wait_for_completion(&self, run_id: RunId, poll: PollSettings) -> TerminalStatus {
        let started = Instant::now();
        while started.elapsed() < poll.max_wait {
            if let Some(record) = self.get_run_status(run_id).await {
                if let Some(status) = record.state.terminal_status() {
                    info!(status = %status, elapsed = ?started.elapsed(), "run finished");
                    return status;
                }
                debug!(state = %record.state.life_cycle_state, "run not finished");
            }
            sleep(poll.poll_interval).await;
        }

        warn!(max_wait = ?poll.max_wait, "timed out waiting for run");
        TerminalStatus::Timeout
    }

    /// Triggers a run, waits for it and fetches its output.
    ///
    /// Returns `None` when the run could not be triggered.
    pub async fn run_and_wait(&self, job_id: JobId, poll: PollSettings) -> Option<CompletedRun> {
        let handle = self.trigger_run(job_id).await?;
        let status = self.wait_for_completion(handle.run_id, poll).await;
        let output = match status {
            TerminalStatus::Timeout => None,
            _ => self.get_run_output(handle.run_id).await,
        };
        Some(CompletedRun {
            run_id: handle.run_id,
            status,
            output,
        })
    }
}

fn is_duplicate_job(response: &ApiResponse) -> bool {
    if response.status == 409 {
        return true;
    }
    if let Some(code) = response.error_code() {
        if ALREADY_EXISTS_CODES.contains(&code.as_str()) {
            return true;
        }
    }
    let body = response.body.to_lowercase();
    ALREADY_EXISTS_TEXT.iter().any(|needle| body.contains(needle))
}

fn mentions_multiple_tasks(response: &ApiResponse) -> bool {
    response
        .message()
        .unwrap_or_else(|| response.body.clone())
        .to_lowercase()
        .contains("multiple tasks")
}
