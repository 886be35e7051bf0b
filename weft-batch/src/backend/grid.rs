//! CLI-driven grid engine backend
//!
//! Grid engines expose everything through spawned tools: submission prints
//! the new job id on stdout, status comes from scraping a listing tool (with
//! a slower accounting tool as fallback), and cancellation is another tool
//! invocation. State inference goes through the marker-rule cascade in
//! [`crate::parser`].

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use weft_core::{JobHandle, JobState, StatusRecord};

use crate::backend::{BatchBackend, SubmissionPayload, TemplateHandle, TemplateSpec};
use crate::config::AdapterConfig;
use crate::error::{BatchError, Result};
use crate::parser;

/// Tool names the grid backend spawns. Defaults match an LSF-style engine.
#[derive(Debug, Clone)]
pub struct GridTools {
    /// Submission tool; prints the new job id on stdout.
    pub submit: String,
    /// Detailed per-job listing tool.
    pub status: String,
    /// Historical accounting tool, consulted when the listing is
    /// inconclusive.
    pub history: String,
    /// Cancellation tool.
    pub cancel: String,
}

impl Default for GridTools {
    fn default() -> Self {
        Self {
            submit: "bsub".to_string(),
            status: "bjobs".to_string(),
            history: "bacct".to_string(),
            cancel: "bkill".to_string(),
        }
    }
}

/// Backend adapter for CLI-driven grid engines
pub struct GridBackend {
    tools: GridTools,
    /// Extra flags appended to every submission, from
    /// [`AdapterConfig::extra_grid_args`].
    extra_args: Vec<String>,
}

impl GridBackend {
    pub fn new(tools: GridTools, config: &AdapterConfig) -> Self {
        Self {
            tools,
            extra_args: config
                .extra_grid_args
                .as_deref()
                .map(|s| s.split_whitespace().map(String::from).collect())
                .unwrap_or_default(),
        }
    }

    /// Runs one tool to completion, returning stdout and stderr merged
    /// (the status tools interleave their diagnostics) plus whether the
    /// tool exited successfully. Status tools routinely exit nonzero for
    /// finished jobs, so callers decide what the exit status means.
    async fn run_tool(&self, program: &str, args: &[String]) -> Result<(String, bool)> {
        debug!("running grid tool: {} {:?}", program, args);

        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| BatchError::Command {
                command: program.to_string(),
                message: format!("failed to spawn: {e}"),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !stdout.trim().is_empty() {
            debug!("{} stdout: {}", program, stdout.trim());
        }
        if !stderr.trim().is_empty() {
            debug!("{} stderr: {}", program, stderr.trim());
        }

        Ok((format!("{stdout}\n{stderr}"), output.status.success()))
    }

    /// Classifies one job through the two-stage text cascade.
    ///
    /// `None` means the listing tool has no record of the job and the
    /// accounting fallback is just as empty: the engine has purged it. The
    /// job is then omitted from status reports rather than staying Unknown
    /// forever, so a caller waiting out its death can finish.
    async fn classify(&self, handle: &JobHandle) -> Result<Option<JobState>> {
        // The listing tool takes the bare job id; any array task index is
        // only meaningful to the submission side.
        let job = handle.id.clone();

        let (detail, _) = self
            .run_tool(&self.tools.status, &["-l".to_string(), job.clone()])
            .await?;
        let state = parser::classify_detail(&job, &detail);
        if state != JobState::Unknown {
            return Ok(Some(state));
        }

        // Listing was inconclusive; ask the slower accounting tool.
        debug!("listing inconclusive for job {}, trying accounting", job);
        let (history, _) = self
            .run_tool(&self.tools.history, &["-l".to_string(), job.clone()])
            .await?;
        let state = parser::classify_history(&job, &history);
        if state == JobState::Unknown && parser::is_forgotten(&detail) {
            debug!("job {} unknown to both listing and accounting", job);
            return Ok(None);
        }
        Ok(Some(state))
    }
}

/// Builds the submission command line for one payload.
fn submit_args(payload: &SubmissionPayload, extra_args: &[String]) -> Vec<String> {
    let mut args = vec![
        "-cwd".to_string(),
        ".".to_string(),
        "-o".to_string(),
        "/dev/null".to_string(),
        "-e".to_string(),
        "/dev/null".to_string(),
        "-q".to_string(),
        payload.queue.clone(),
        "-J".to_string(),
        payload.name.clone(),
        "-n".to_string(),
        payload.resources.vcpus.to_string(),
        "-R".to_string(),
        format!("rusage[mem={}M]", payload.resources.memory_mib),
        "-M".to_string(),
        format!("{}M", payload.resources.memory_mib),
    ];
    args.extend(extra_args.iter().cloned());
    args.extend(payload.command.iter().cloned());
    args
}

/// Pulls the new job id out of submission stdout.
///
/// The engine prints a line like `Job <1234> is submitted to queue <q>`; the
/// id is the second whitespace token with its angle brackets stripped.
fn extract_handle(output: &str) -> Result<JobHandle> {
    let line = output
        .lines()
        .find(|l| !l.trim().is_empty())
        .ok_or_else(|| BatchError::Parse("empty submission output".into()))?;
    let token = line
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| BatchError::Parse(format!("unrecognized submission output: {line:?}")))?;
    let id = token
        .strip_prefix('<')
        .and_then(|t| t.strip_suffix('>'))
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            BatchError::Parse(format!("no job id in submission output: {line:?}"))
        })?;
    Ok(JobHandle::parse(id))
}

/// Whether cancel output means the job is already gone.
///
/// A job that finished naturally the instant before the cancel counts as
/// gone too: the engine rejects the kill with "Job has already finished",
/// but the caller's goal, a job that is no longer running, is met.
fn is_gone(output: &str) -> bool {
    let lowered = output.to_lowercase();
    lowered.contains("no matching job")
        || lowered.contains("not found")
        || lowered.contains("already finished")
}

#[async_trait]
impl BatchBackend for GridBackend {
    async fn submit_job(&self, payload: &SubmissionPayload) -> Result<JobHandle> {
        let args = submit_args(payload, &self.extra_args);

        debug!("submitting grid job: {} {:?}", self.tools.submit, args);
        let output = Command::new(&self.tools.submit)
            .args(&args)
            .envs(&payload.environment)
            .output()
            .await
            .map_err(|e| BatchError::Command {
                command: self.tools.submit.clone(),
                message: format!("failed to spawn: {e}"),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BatchError::Command {
                command: self.tools.submit.clone(),
                message: format!(
                    "exit {}: {} {}",
                    output.status.code().unwrap_or(-1),
                    stdout.trim(),
                    stderr.trim()
                ),
            });
        }

        let handle = extract_handle(&stdout)?;
        debug!("grid engine assigned job id {}", handle);
        Ok(handle)
    }

    async fn describe_jobs(&self, handles: &[JobHandle]) -> Result<Vec<StatusRecord>> {
        // No bulk query exists; scrape one job at a time. Records carry no
        // timestamps or exit codes beyond what the markers imply. Purged
        // jobs are omitted, per the describe contract.
        let mut records = Vec::with_capacity(handles.len());
        for handle in handles {
            let Some(state) = self.classify(handle).await? else {
                continue;
            };
            let mut record = StatusRecord::bare(handle.clone(), state);
            record.exit_code = match state {
                JobState::Succeeded => Some(0),
                JobState::Failed => Some(1),
                _ => None,
            };
            records.push(record);
        }
        Ok(records)
    }

    async fn cancel_job(&self, handle: &JobHandle, _reason: &str) -> Result<()> {
        let (output, success) = self
            .run_tool(&self.tools.cancel, &[handle.id.clone()])
            .await?;
        if is_gone(&output) {
            return Err(BatchError::NotFound(handle.to_string()));
        }
        if !success {
            // A rejection for any reason other than nonexistence matters:
            // the caller is owed a job that really stops.
            return Err(BatchError::Command {
                command: self.tools.cancel.clone(),
                message: output.trim().to_string(),
            });
        }
        Ok(())
    }

    async fn register_template(&self, spec: &TemplateSpec) -> Result<TemplateHandle> {
        // Grid engines have no reusable remote template object; the handle
        // is purely local so the shared lifecycle still holds.
        Ok(TemplateHandle(format!("local/{}", spec.name)))
    }

    async fn deregister_template(&self, _handle: &TemplateHandle) -> Result<()> {
        Ok(())
    }
}
