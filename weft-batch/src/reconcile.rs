//! Polling reconciliation
//!
//! Turns backend status reports into exactly one completion event per job.
//! Status is fetched for all outstanding handles in bounded batches;
//! terminal reports are matched back to internal ids through the registry,
//! suppressed if the job was explicitly killed, and otherwise emitted with a
//! computed runtime and exit code. One event is returned per call; whatever
//! else finished this cycle stays registered and comes out on later calls.

use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

use weft_core::{
    CompletionEvent, ExitReason, JobHandle, JobState, StatusRecord, EXIT_STATUS_UNAVAILABLE,
};

use crate::backend::{BatchBackend, MAX_DESCRIBE_BATCH};
use crate::error::Result;
use crate::local::LocalScheduler;
use crate::registry::JobRegistry;
use crate::retry::RetryPolicy;

/// Runtimes are never reported as exactly zero; a measured run shorter than
/// this is floored to it.
const MIN_RUNTIME: Duration = Duration::from_millis(1);

/// Longest single sleep between polling passes.
const MAX_POLL_SLEEP: Duration = Duration::from_secs(1);

/// The polling state machine for one adapter instance.
pub struct PollingReconciler {
    registry: Arc<JobRegistry>,
    backend: Arc<dyn BatchBackend>,
    retry: RetryPolicy,
}

/// Wall-clock runtime of a reported job.
///
/// `None` when the backend never reported a start time; that is distinct
/// from a measured runtime of almost zero, which comes back as
/// [`MIN_RUNTIME`].
fn runtime_of(record: &StatusRecord) -> Option<Duration> {
    let started = record.started_at?;
    let stopped = record.stopped_at.unwrap_or_else(Utc::now);
    let elapsed = (stopped - started)
        .to_std()
        .unwrap_or(Duration::ZERO)
        .max(MIN_RUNTIME);
    Some(elapsed)
}

fn exit_code_of(record: &StatusRecord) -> i32 {
    record.exit_code.unwrap_or(EXIT_STATUS_UNAVAILABLE)
}

impl PollingReconciler {
    pub fn new(
        registry: Arc<JobRegistry>,
        backend: Arc<dyn BatchBackend>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            registry,
            backend,
            retry,
        }
    }

    /// Polls until a completion turns up or `max_wait` elapses.
    ///
    /// A present local sub-scheduler is checked first on every pass; its
    /// results take priority over remote polling. With a zero `max_wait` a
    /// single pass is made and the call never blocks.
    pub async fn poll(
        &self,
        max_wait: Duration,
        local: Option<&dyn LocalScheduler>,
    ) -> Result<Option<CompletionEvent>> {
        let entry = Instant::now();
        loop {
            if let Some(local) = local {
                if let Some(event) = local.poll_completed().await {
                    return Ok(Some(event));
                }
            }

            if let Some(event) = self.poll_remote_once().await? {
                return Ok(Some(event));
            }

            let elapsed = entry.elapsed();
            if max_wait.is_zero() || elapsed >= max_wait {
                return Ok(None);
            }
            // Wait a bit and poll again
            let remaining = max_wait - elapsed;
            tokio::time::sleep((remaining / 2).min(MAX_POLL_SLEEP)).await;
        }
    }

    /// One pass over all outstanding remote jobs.
    async fn poll_remote_once(&self) -> Result<Option<CompletionEvent>> {
        let (records, lost) = self.describe_outstanding().await?;

        for record in &records {
            if !record.state.is_terminal() {
                continue;
            }
            if let Some(event) = self.reconcile_terminal(record) {
                return Ok(Some(event));
            }
        }

        for handle in &lost {
            // The backend answered but no longer knows this handle and never
            // reported it terminal. Surface it; do not silently drop it.
            warn!("lost contact with job {}", handle);
            let record = StatusRecord::bare(handle.clone(), JobState::Unknown);
            if let Some(mut event) = self.reconcile_handle(&record) {
                event.exit_reason = ExitReason::LostContact;
                return Ok(Some(event));
            }
        }

        Ok(None)
    }

    /// Describes every outstanding handle in batches of at most
    /// [`MAX_DESCRIBE_BATCH`]. Returns the reports plus the handles a
    /// successful describe omitted.
    async fn describe_outstanding(&self) -> Result<(Vec<StatusRecord>, Vec<JobHandle>)> {
        let mut to_check = self.registry.handles();
        let mut records = Vec::new();
        let mut lost = Vec::new();

        while !to_check.is_empty() {
            let start = to_check.len().saturating_sub(MAX_DESCRIBE_BATCH);
            let batch: Vec<JobHandle> = to_check.split_off(start);

            let reported = self
                .retry
                .run("describe_jobs", || self.backend.describe_jobs(&batch))
                .await?;

            let seen: HashSet<String> = reported.iter().map(|r| r.handle.to_string()).collect();
            for handle in &batch {
                if !seen.contains(&handle.to_string()) {
                    lost.push(handle.clone());
                }
            }
            records.extend(reported);
        }

        Ok((records, lost))
    }

    /// Reconciles one terminal report. Returns the event to emit, or `None`
    /// when the report is suppressed or stale.
    fn reconcile_terminal(&self, record: &StatusRecord) -> Option<CompletionEvent> {
        let mut event = self.reconcile_handle(record)?;

        event.exit_reason = match record.state {
            JobState::Succeeded => ExitReason::Finished,
            _ => ExitReason::Failed,
        };

        if record.state == JobState::Failed {
            if let Some(reason) = &record.status_reason {
                // The backend knows why it failed
                error!("job {} failed because: {}", event.job_id, reason);
            }
        }

        Some(event)
    }

    /// Shared acknowledge-and-build step: resolves the handle, removes the
    /// registry entry, and suppresses killed jobs. A handle that is no
    /// longer registered was already reconciled; duplicate backend reports
    /// are ignored here.
    fn reconcile_handle(&self, record: &StatusRecord) -> Option<CompletionEvent> {
        let internal_id = self.registry.resolve_reverse(&record.handle).ok()?;
        let killed = self.registry.was_killed(&record.handle);

        // Acknowledge before anything else so this job is never reported twice.
        let _ = self.registry.forget(internal_id);

        if killed {
            // Killed jobs aren't allowed to appear as updated.
            debug!("job {} was killed so skipping it", internal_id);
            return None;
        }

        Some(CompletionEvent {
            job_id: internal_id,
            exit_code: exit_code_of(record),
            wall_time: runtime_of(record),
            exit_reason: ExitReason::Failed,
        })
    }

    /// Map of internal id to seconds running, for jobs observed running.
    ///
    /// Jobs whose runtime cannot be measured are omitted: without a start
    /// time we cannot say how long they have been running.
    pub async fn running_snapshot(&self) -> Result<std::collections::HashMap<u64, f64>> {
        let (records, _) = self.describe_outstanding().await?;
        let mut snapshot = std::collections::HashMap::new();

        for record in &records {
            if record.state != JobState::Running {
                continue;
            }
            let Ok(internal_id) = self.registry.resolve_reverse(&record.handle) else {
                continue;
            };
            match runtime_of(record) {
                Some(runtime) => {
                    snapshot.insert(internal_id, runtime.as_secs_f64());
                }
                None => {
                    warn!(
                        "job {} is {:?} but has no measurable runtime",
                        internal_id, record.state
                    );
                }
            }
        }

        Ok(snapshot)
    }
}
