//! Job termination
//!
//! Cancelling a job and proving it dead. The kill flag is set in the
//! registry before the cancel call goes out, so a poll racing the
//! cancellation cannot emit a completion for a job the caller asked to
//! kill. A kill is only complete once the backend can no longer be observed
//! reporting the job as running.

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use weft_core::JobHandle;

use crate::backend::BatchBackend;
use crate::error::Result;
use crate::registry::JobRegistry;
use crate::retry::RetryPolicy;

/// How often the confirmed-death wait re-checks a killed job.
const STOP_CHECK_INTERVAL: Duration = Duration::from_secs(2);

/// Cancels jobs and waits out their deaths.
pub struct TerminationController {
    registry: Arc<JobRegistry>,
    backend: Arc<dyn BatchBackend>,
    retry: RetryPolicy,
}

impl TerminationController {
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

    /// Requests cancellation of one job.
    ///
    /// The killed flag goes into the registry first; even if the backend
    /// finishes the job naturally in the instant before the cancel takes
    /// effect, its terminal report will be suppressed. A job the backend no
    /// longer knows counts as already dead. Any other rejection propagates:
    /// the caller is owed a job that really stops.
    pub async fn cancel(&self, handle: &JobHandle) -> Result<()> {
        self.registry.mark_killed(handle);
        let result = self
            .retry
            .run("cancel_job", || {
                self.backend.cancel_job(handle, "killed by weft")
            })
            .await;
        match result {
            Err(err) if err.is_not_found() => Ok(()),
            other => other,
        }
    }

    /// Blocks until the backend stops reporting the job as alive.
    ///
    /// The backend does not guarantee a terminal status the instant a
    /// cancel call succeeds, but callers must never see a killed job as
    /// running again. A job the backend no longer knows at all counts as
    /// stopped. No timeout; termination is bounded only by the backend
    /// eventually reporting death.
    pub async fn wait_until_stopped(&self, handle: &JobHandle) -> Result<()> {
        loop {
            let records = self
                .retry
                .run("describe_jobs", || {
                    self.backend.describe_jobs(std::slice::from_ref(handle))
                })
                .await?;

            match records.iter().find(|r| r.handle == *handle) {
                None => return Ok(()),
                Some(record) if record.state.is_terminal() => return Ok(()),
                Some(_) => {
                    info!("waiting for killed job {} to stop", handle);
                    tokio::time::sleep(STOP_CHECK_INTERVAL).await;
                }
            }
        }
    }

    /// Kills a set of jobs and blocks until every one is confirmed dead.
    ///
    /// All cancel calls go out first, then all confirmations are awaited, so
    /// the backend's cancellation latency overlaps across jobs instead of
    /// serializing. Ids with no registry entry are skipped; they are either
    /// local jobs or already reconciled.
    pub async fn kill_many(&self, internal_ids: &[u64]) -> Result<()> {
        let mut handles = Vec::new();
        for id in internal_ids {
            if let Ok(handle) = self.registry.resolve(*id) {
                handles.push(handle);
            }
        }

        for handle in &handles {
            self.cancel(handle).await?;
        }
        for handle in &handles {
            self.wait_until_stopped(handle).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::MockBackend;

    fn controller(backend: Arc<MockBackend>) -> TerminationController {
        TerminationController::new(
            Arc::new(JobRegistry::new()),
            backend,
            RetryPolicy::none(),
        )
    }

    #[tokio::test]
    async fn test_wait_ends_when_backend_no_longer_knows_the_job() {
        // A purged job is omitted from describe output entirely; the death
        // wait must treat that as stopped instead of checking forever.
        let controller = controller(Arc::new(MockBackend::new()));
        let handle = JobHandle::new("purged-7");

        tokio::time::timeout(
            Duration::from_secs(5),
            controller.wait_until_stopped(&handle),
        )
        .await
        .expect("wait must end for a job the backend has forgotten")
        .unwrap();
    }
}
