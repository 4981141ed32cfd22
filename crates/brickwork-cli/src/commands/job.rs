//! Job command - ensure jobs, grant access, trigger and inspect runs.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use owo_colors::OwoColorize;
use tracing::Instrument;

use brickwork_core::observability::job_span;
use brickwork_core::{EntraConfig, JobId, PollSettings, RunId};
use brickwork_workspace::entra::CredentialResolver;
use brickwork_workspace::jobs::{JobController, JobLookup, JobSpec, RunOutput, TerminalStatus};
use brickwork_workspace::permissions::PermissionLevel;

use crate::client::workspace_client;
use crate::{Config, OutputFormat};

/// Arguments for the job command.
#[derive(Debug, Args)]
pub struct JobArgs {
    /// Job operation.
    #[command(subcommand)]
    pub command: JobCommand,
}

/// Job operations.
#[derive(Debug, Subcommand)]
pub enum JobCommand {
    /// Return the job with this name, creating it if absent.
    Ensure(EnsureArgs),
    /// Grant a service principal a permission on a job.
    Grant(GrantArgs),
    /// Trigger a run.
    Run(RunArgs),
    /// Show the state of a run.
    Status {
        /// Run ID.
        run_id: RunId,
    },
    /// Show the output of a run.
    Output {
        /// Run ID.
        run_id: RunId,

        /// Task whose output is read when the run has several tasks.
        #[arg(long)]
        task_key: Option<String>,
    },
}

/// Arguments for `job ensure`.
#[derive(Debug, Args)]
pub struct EnsureArgs {
    /// Job name; the lookup key.
    #[arg(long)]
    pub name: String,

    /// Workspace path of the notebook the job runs.
    #[arg(long)]
    pub notebook: String,

    /// Catalog passed to the notebook.
    #[arg(long)]
    pub catalog: Option<String>,

    /// Schema passed to the notebook.
    #[arg(long)]
    pub schema: Option<String>,

    /// Extra notebook parameters as `key=value` (repeatable).
    #[arg(long = "param", value_parser = parse_key_value)]
    pub params: Vec<(String, String)>,

    /// Service principal application ID the job runs as.
    #[arg(long)]
    pub run_as: Option<String>,

    /// Search every page of the job list, not only the first 100 jobs.
    #[arg(long)]
    pub all_pages: bool,
}

impl EnsureArgs {
    fn spec(&self) -> JobSpec {
        let mut spec = JobSpec::notebook(&self.name, &self.notebook);
        if let Some(catalog) = &self.catalog {
            spec = spec.parameter("catalog", catalog);
        }
        if let Some(schema) = &self.schema {
            spec = spec.parameter("schema", schema);
        }
        for (key, value) in &self.params {
            spec = spec.parameter(key, value);
        }
        if let Some(run_as) = &self.run_as {
            spec = spec.run_as(run_as);
        }
        spec
    }
}

/// Arguments for `job grant`.
#[derive(Debug, Args)]
pub struct GrantArgs {
    /// Job ID.
    pub job_id: JobId,

    /// Service principal application ID.
    #[arg(long)]
    pub principal: String,

    /// Permission level, e.g. `CAN_MANAGE_RUN`.
    #[arg(long, default_value = "CAN_MANAGE_RUN")]
    pub level: PermissionLevel,
}

/// Arguments for `job run`.
#[derive(Debug, Args)]
pub struct RunArgs {
    /// Job ID.
    pub job_id: JobId,

    /// Wait for the run to finish and print its output.
    #[arg(long, short = 'w')]
    pub wait: bool,

    /// Trigger as the service identity from `AZURE_*` instead of the workspace token.
    #[arg(long)]
    pub as_service_principal: bool,

    /// Give up waiting after this many seconds.
    #[arg(long, default_value = "3600")]
    pub max_wait: u64,

    /// Poll interval when waiting (in seconds).
    #[arg(long, default_value = "10")]
    pub poll_interval: u64,
}

fn parse_key_value(raw: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    if key.is_empty() {
        return Err(format!("empty key in '{raw}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Execute the job command.
///
/// # Errors
///
/// Returns an error if the workspace is not configured or a required call fails.
pub async fn execute(args: JobArgs, config: &Config) -> Result<()> {
    let client = workspace_client(config)?;
    let span = job_span("job", client.host());
    let controller = JobController::new(client);

    match args.command {
        JobCommand::Ensure(ensure) => {
            let controller = if ensure.all_pages {
                controller.with_lookup(JobLookup::AllPages)
            } else {
                controller
            };
            let job = controller
                .create_or_get(&ensure.spec())
                .instrument(span)
                .await
                .with_context(|| format!("Failed to ensure job '{}'", ensure.name))?;
            match config.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&job)?),
                OutputFormat::Text | OutputFormat::Table => {
                    println!("Job {} ({})", job.job_id, job.name());
                }
            }
        }
        JobCommand::Grant(grant) => {
            let acl = controller
                .grant_permission(grant.job_id, &grant.principal, grant.level)
                .instrument(span)
                .await
                .context("Failed to grant job permission")?;
            match config.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&acl)?),
                OutputFormat::Text | OutputFormat::Table => println!(
                    "Granted {} on job {} to {}",
                    grant.level, grant.job_id, grant.principal
                ),
            }
        }
        JobCommand::Run(run) => execute_run(run, controller, config).instrument(span).await?,
        JobCommand::Status { run_id } => {
            let record = controller
                .get_run_status(run_id)
                .instrument(span)
                .await
                .with_context(|| format!("Could not read run {run_id}"))?;
            match config.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&record)?),
                OutputFormat::Text => {
                    let state = record
                        .state
                        .terminal_status()
                        .map_or_else(|| record.state.life_cycle_state.to_string(), |s| s.to_string());
                    println!("Run: {}", record.run_id);
                    println!("State: {}", format_state_colored(&state));
                    if !record.state.state_message.is_empty() {
                        println!("Message: {}", record.state.state_message);
                    }
                    if let Some(url) = &record.run_page_url {
                        println!("URL: {url}");
                    }
                }
                OutputFormat::Table => {
                    use tabled::{Table, Tabled};

                    #[derive(Tabled)]
                    struct TaskRow {
                        #[tabled(rename = "Task")]
                        task_key: String,
                        #[tabled(rename = "Run ID")]
                        run_id: String,
                        #[tabled(rename = "State")]
                        state: String,
                    }

                    let rows: Vec<_> = record
                        .tasks
                        .iter()
                        .map(|t| TaskRow {
                            task_key: t.task_key.clone(),
                            run_id: t.run_id.to_string(),
                            state: t
                                .state
                                .as_ref()
                                .map_or_else(String::new, |s| s.life_cycle_state.to_string()),
                        })
                        .collect();
                    println!("Run {}: {}", record.run_id, record.state.life_cycle_state);
                    if !rows.is_empty() {
                        println!("{}", Table::new(rows));
                    }
                }
            }
        }
        JobCommand::Output { run_id, task_key } => {
            let output = match task_key {
                Some(key) => controller.get_task_output(run_id, &key).instrument(span).await,
                None => controller.get_run_output(run_id).instrument(span).await,
            }
            .with_context(|| format!("No output for run {run_id}"))?;
            print_output(&output, config)?;
        }
    }

    Ok(())
}

async fn execute_run(run: RunArgs, controller: JobController, config: &Config) -> Result<()> {
    let controller = if run.as_service_principal {
        let entra = EntraConfig::from_env().context("Service identity credentials are missing")?;
        let token = CredentialResolver::from_config(&entra)?
            .resolve_config(&entra)
            .await
            .context("Token exchange failed")?;
        controller.acting_as(token)
    } else {
        controller
    };

    let handle = controller
        .trigger_run(run.job_id)
        .await
        .with_context(|| format!("Failed to trigger job {}", run.job_id))?;

    if !run.wait {
        match config.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&handle)?),
            OutputFormat::Text | OutputFormat::Table => {
                println!("Run triggered: {}", handle.run_id);
            }
        }
        return Ok(());
    }

    if matches!(config.format, OutputFormat::Text) {
        println!("Run triggered: {}", handle.run_id);
        println!("Waiting for completion...");
    }
    let poll = PollSettings::from_secs(run.max_wait, run.poll_interval.max(1));
    let status = controller.wait_for_completion(handle.run_id, poll).await;
    let output = match status {
        TerminalStatus::Timeout => None,
        _ => controller.get_run_output(handle.run_id).await,
    };

    match config.format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "runId": handle.run_id,
                "status": status.as_str(),
                "output": output,
            }))?
        ),
        OutputFormat::Text | OutputFormat::Table => {
            println!("Finished: {}", format_state_colored(status.as_str()));
            if let Some(output) = &output {
                print_output(output, config)?;
            }
        }
    }

    if status.is_success() {
        Ok(())
    } else {
        anyhow::bail!("Run {} ended with {status}", handle.run_id)
    }
}

fn print_output(output: &RunOutput, config: &Config) -> Result<()> {
    match config.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(output)?),
        OutputFormat::Text | OutputFormat::Table => {
            if let Some(result) = output.notebook_output.as_ref().and_then(|n| n.result.as_deref()) {
                println!("Result: {result}");
            }
            if let Some(error) = &output.error {
                println!("Error: {}", error.red());
            }
            if let Some(logs) = &output.logs {
                println!("Logs:");
                println!("{logs}");
            }
        }
    }
    Ok(())
}

fn format_state_colored(state: &str) -> String {
    match state {
        "SUCCESS" => state.green().to_string(),
        "FAILED" | "INTERNAL_ERROR" | "TIMEDOUT" | "TIMEOUT" => state.red().to_string(),
        "RUNNING" | "TERMINATING" => state.blue().to_string(),
        "PENDING" | "QUEUED" => state.yellow().to_string(),
        "CANCELED" | "SKIPPED" => state.dimmed().to_string(),
        _ => state.to_string(),
    }
}
