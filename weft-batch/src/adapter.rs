//! Batch adapter facade
//!
//! The surface the workflow leader drives: submit a job, poll for
//! completions, snapshot what is running, kill, and shut down. One adapter
//! instance serves one workflow run and owns the id registry, the shared
//! template, and the retry discipline around every backend call.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

use weft_core::{CompletionEvent, JobDescription};

use crate::backend::BatchBackend;
use crate::config::AdapterConfig;
use crate::encode;
use crate::error::Result;
use crate::local::LocalScheduler;
use crate::reconcile::PollingReconciler;
use crate::registry::JobRegistry;
use crate::retry::RetryPolicy;
use crate::template::TemplateCache;
use crate::terminate::TerminationController;

/// Adapter between the workflow leader and one execution backend.
pub struct BatchAdapter {
    config: AdapterConfig,
    backend: Arc<dyn BatchBackend>,
    registry: Arc<JobRegistry>,
    template: TemplateCache,
    reconciler: PollingReconciler,
    terminator: TerminationController,
    retry: RetryPolicy,
    next_id: AtomicU64,
    /// Bundled user code attached to every subsequent submission, if set.
    user_script: Mutex<Option<String>>,
    local: Option<Arc<dyn LocalScheduler>>,
}

impl BatchAdapter {
    /// Builds an adapter for the given backend. Configuration problems are
    /// fatal here and never retried.
    pub fn new(config: AdapterConfig, backend: Arc<dyn BatchBackend>) -> Result<Self> {
        Self::with_retry(config, backend, RetryPolicy::default())
    }

    /// Like [`BatchAdapter::new`] with an explicit retry policy.
    pub fn with_retry(
        config: AdapterConfig,
        backend: Arc<dyn BatchBackend>,
        retry: RetryPolicy,
    ) -> Result<Self> {
        config.validate()?;
        let template = TemplateCache::new(&config)?;
        let registry = Arc::new(JobRegistry::new());

        Ok(Self {
            reconciler: PollingReconciler::new(
                Arc::clone(&registry),
                Arc::clone(&backend),
                retry,
            ),
            terminator: TerminationController::new(
                Arc::clone(&registry),
                Arc::clone(&backend),
                retry,
            ),
            config,
            backend,
            registry,
            template,
            retry,
            next_id: AtomicU64::new(1),
            user_script: Mutex::new(None),
            local: None,
        })
    }

    /// Attaches a local sub-scheduler consulted before the backend.
    pub fn with_local(mut self, local: Arc<dyn LocalScheduler>) -> Self {
        self.local = Some(local);
        self
    }

    /// Installs the bundled user code every later submission carries.
    pub fn set_user_script(&self, script: impl Into<String>) {
        let script = script.into();
        debug!("setting user script for deployment ({} bytes)", script.len());
        *self.user_script.lock().unwrap() = Some(script);
    }

    /// Dispatches one job, returning its internal id.
    ///
    /// Admission runs before anything touches the backend; an inadmissible
    /// requirement fails this job only. The shared template is created on
    /// first use.
    pub async fn submit(&self, desc: &JobDescription) -> Result<u64> {
        let internal_id = self.next_id.fetch_add(1, Ordering::SeqCst);

        if let Some(local) = &self.local {
            if local.try_issue(internal_id, desc).await {
                debug!("job {} issued locally", internal_id);
                return Ok(internal_id);
            }
        }

        // Local, side-effect-free validation first
        let rounded = crate::admission::admit(&desc.resources, &self.config.limits)?;

        let template = self
            .template
            .get_or_create(self.backend.as_ref(), &self.retry)
            .await?;

        let script = self.user_script.lock().unwrap().clone();
        let payload = encode::encode(desc, rounded, template, script.as_deref(), &self.config)?;

        let handle = self
            .retry
            .run("submit_job", || self.backend.submit_job(&payload))
            .await?;

        self.registry.record(internal_id, handle)?;
        debug!("launched job {} as {:?}", internal_id, payload.name);
        Ok(internal_id)
    }

    /// Returns one completion if any job finished, waiting up to `max_wait`.
    ///
    /// At most one event is ever produced per job; killed jobs produce
    /// none. A zero `max_wait` makes a single non-blocking pass.
    pub async fn poll(&self, max_wait: Duration) -> Result<Option<CompletionEvent>> {
        self.reconciler
            .poll(max_wait, self.local.as_deref())
            .await
    }

    /// Internal ids of jobs currently observed running, with how long each
    /// has been running in seconds.
    pub async fn running_snapshot(&self) -> Result<HashMap<u64, f64>> {
        self.reconciler.running_snapshot().await
    }

    /// Every internal id the adapter still owes a completion for.
    pub fn outstanding_ids(&self) -> Vec<u64> {
        let mut ids = self.registry.outstanding();
        if let Some(local) = &self.local {
            ids.extend(local.outstanding());
        }
        ids
    }

    /// Kills the given jobs and blocks until each is confirmed dead. After
    /// this returns, none of them will ever be reported as updated.
    pub async fn kill(&self, internal_ids: &[u64]) -> Result<()> {
        if let Some(local) = &self.local {
            local.kill(internal_ids).await;
        }
        self.terminator.kill_many(internal_ids).await
    }

    /// Tears the run down: cancels everything outstanding and deletes the
    /// shared template. Partial cleanup is preferable to a stuck shutdown,
    /// so failures here are logged and the remaining steps still run.
    pub async fn shutdown(&self) {
        if let Some(local) = &self.local {
            local.shutdown().await;
        }

        for handle in self.registry.handles() {
            if let Err(err) = self.terminator.cancel(&handle).await {
                warn!("failed to cancel job {} during shutdown: {}", handle, err);
            }
        }

        if let Err(err) = self
            .template
            .destroy(self.backend.as_ref(), &self.retry)
            .await
        {
            warn!("failed to tear down execution template: {}", err);
        }

        info!("batch adapter shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::MockBackend;
    use crate::error::BatchError;
    use weft_core::{ExitReason, JobState, ResourceRequirement, EXIT_STATUS_UNAVAILABLE};

    fn adapter_with(backend: Arc<MockBackend>) -> BatchAdapter {
        let config = AdapterConfig::new("main-queue", "http://localhost:1");
        BatchAdapter::with_retry(config, backend, RetryPolicy::none()).unwrap()
    }

    fn sleeper(name: &str) -> JobDescription {
        JobDescription::new(name, vec!["sleep".into(), "1000".into()])
    }

    /// The mock's handle for the nth submission (1-based).
    fn fake(n: u64) -> weft_core::JobHandle {
        weft_core::JobHandle::new(format!("fake-{n}"))
    }

    #[tokio::test]
    async fn test_submit_then_poll_reports_once() {
        let backend = Arc::new(MockBackend::new());
        let adapter = adapter_with(Arc::clone(&backend));

        let id = adapter.submit(&sleeper("step a")).await.unwrap();
        assert_eq!(adapter.outstanding_ids(), vec![id]);

        // Nothing terminal yet
        assert!(adapter.poll(Duration::ZERO).await.unwrap().is_none());

        backend.set_started_secs_ago(&fake(1), 30);
        backend.finish(&fake(1), JobState::Succeeded, Some(0));

        let event = adapter.poll(Duration::ZERO).await.unwrap().unwrap();
        assert_eq!(event.job_id, id);
        assert_eq!(event.exit_code, 0);
        assert_eq!(event.exit_reason, ExitReason::Finished);
        let wall = event.wall_time.expect("started job must have a runtime");
        assert!(wall >= Duration::from_millis(1));

        // Exactly once: the duplicate terminal report is ignored
        assert!(adapter.poll(Duration::ZERO).await.unwrap().is_none());
        assert!(adapter.outstanding_ids().is_empty());
    }

    #[tokio::test]
    async fn test_missing_exit_code_uses_sentinel() {
        let backend = Arc::new(MockBackend::new());
        let adapter = adapter_with(Arc::clone(&backend));

        adapter.submit(&sleeper("step")).await.unwrap();
        backend.finish(&fake(1), JobState::Succeeded, None);

        let event = adapter.poll(Duration::ZERO).await.unwrap().unwrap();
        assert_eq!(event.exit_code, EXIT_STATUS_UNAVAILABLE);
        assert_eq!(event.exit_reason, ExitReason::Finished);
        // Never started, so the runtime is unknown rather than zero
        assert_eq!(event.wall_time, None);
    }

    #[tokio::test]
    async fn test_failure_reported_with_reason_logged() {
        let backend = Arc::new(MockBackend::new());
        let adapter = adapter_with(Arc::clone(&backend));

        let id = adapter.submit(&sleeper("step")).await.unwrap();
        {
            let mut state = backend.state.lock().unwrap();
            let job = &mut state.jobs[0];
            job.state = JobState::Failed;
            job.exit_code = Some(137);
            job.status_reason = Some("OutOfMemoryError: container killed".into());
        }

        let event = adapter.poll(Duration::ZERO).await.unwrap().unwrap();
        assert_eq!(event.job_id, id);
        assert_eq!(event.exit_code, 137);
        assert_eq!(event.exit_reason, ExitReason::Failed);
    }

    #[tokio::test]
    async fn test_one_event_per_poll_call() {
        let backend = Arc::new(MockBackend::new());
        let adapter = adapter_with(Arc::clone(&backend));

        let a = adapter.submit(&sleeper("a")).await.unwrap();
        let b = adapter.submit(&sleeper("b")).await.unwrap();
        backend.finish(&fake(1), JobState::Succeeded, Some(0));
        backend.finish(&fake(2), JobState::Succeeded, Some(0));

        let first = adapter.poll(Duration::ZERO).await.unwrap().unwrap();
        let second = adapter.poll(Duration::ZERO).await.unwrap().unwrap();
        let mut seen = vec![first.job_id, second.job_id];
        seen.sort_unstable();
        let mut expected = vec![a, b];
        expected.sort_unstable();
        assert_eq!(seen, expected);
        assert!(adapter.poll(Duration::ZERO).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_killed_jobs_never_appear_as_updated() {
        let backend = Arc::new(MockBackend::new());
        let adapter = adapter_with(Arc::clone(&backend));

        let id = adapter.submit(&sleeper("doomed")).await.unwrap();
        adapter.kill(&[id]).await.unwrap();

        assert!(adapter.poll(Duration::ZERO).await.unwrap().is_none());
        assert!(adapter.outstanding_ids().is_empty());
        assert_eq!(backend.state.lock().unwrap().cancels, vec!["fake-1"]);
    }

    #[tokio::test]
    async fn test_kill_flag_set_before_cancel_wins_race() {
        let backend = Arc::new(MockBackend::new());
        let adapter = adapter_with(Arc::clone(&backend));

        let id = adapter.submit(&sleeper("racy")).await.unwrap();
        // The job finishes naturally the instant before the kill lands
        backend.finish(&fake(1), JobState::Succeeded, Some(0));
        adapter.kill(&[id]).await.unwrap();

        // Its terminal report must still be suppressed
        assert!(adapter.poll(Duration::ZERO).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_two_sleepers_killed_leave_empty_snapshot() {
        let backend = Arc::new(MockBackend::new());
        let adapter = adapter_with(Arc::clone(&backend));

        let id1 = adapter.submit(&sleeper("one")).await.unwrap();
        let id2 = adapter.submit(&sleeper("two")).await.unwrap();
        backend.set_started_secs_ago(&fake(1), 5);
        backend.set_started_secs_ago(&fake(2), 5);

        let snapshot = adapter.running_snapshot().await.unwrap();
        assert!(snapshot.contains_key(&id1));
        assert!(snapshot.contains_key(&id2));
        assert!(snapshot.values().all(|&secs| secs > 0.0));

        adapter.kill(&[id1, id2]).await.unwrap();
        let snapshot = adapter.running_snapshot().await.unwrap();
        assert!(snapshot.is_empty());
    }

    #[tokio::test]
    async fn test_running_snapshot_omits_unmeasurable_jobs() {
        let backend = Arc::new(MockBackend::new());
        let adapter = adapter_with(Arc::clone(&backend));

        adapter.submit(&sleeper("no-start-time")).await.unwrap();
        {
            let mut state = backend.state.lock().unwrap();
            state.jobs[0].state = JobState::Running;
            // started_secs_ago left None: backend reports no start time
        }

        let snapshot = adapter.running_snapshot().await.unwrap();
        assert!(snapshot.is_empty());
    }

    #[tokio::test]
    async fn test_vanished_job_reported_as_lost_contact() {
        let backend = Arc::new(MockBackend::new());
        let adapter = adapter_with(Arc::clone(&backend));

        let id = adapter.submit(&sleeper("ghost")).await.unwrap();
        backend.vanish(&fake(1));

        let event = adapter.poll(Duration::ZERO).await.unwrap().unwrap();
        assert_eq!(event.job_id, id);
        assert_eq!(event.exit_reason, ExitReason::LostContact);
        assert_eq!(event.exit_code, EXIT_STATUS_UNAVAILABLE);
        assert_eq!(event.wall_time, None);

        assert!(adapter.poll(Duration::ZERO).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_inadmissible_job_never_reaches_backend() {
        let backend = Arc::new(MockBackend::new());
        let adapter = adapter_with(Arc::clone(&backend));

        let mut desc = sleeper("greedy");
        desc.resources = ResourceRequirement {
            cores: 10_000.0,
            ..Default::default()
        };

        let err = adapter.submit(&desc).await.unwrap_err();
        assert!(matches!(err, BatchError::InsufficientResources { .. }));
        let state = backend.state.lock().unwrap();
        assert!(state.jobs.is_empty());
        assert_eq!(state.templates_registered, 0);
    }

    #[tokio::test]
    async fn test_template_shared_across_submissions_and_destroyed_once() {
        let backend = Arc::new(MockBackend::new());
        let adapter = adapter_with(Arc::clone(&backend));

        adapter.submit(&sleeper("a")).await.unwrap();
        adapter.submit(&sleeper("b")).await.unwrap();
        assert_eq!(backend.state.lock().unwrap().templates_registered, 1);

        adapter.shutdown().await;
        let state = backend.state.lock().unwrap();
        assert_eq!(state.templates_deregistered, 1);
        // Both outstanding jobs were cancelled on the way down
        assert_eq!(state.cancels.len(), 2);
    }

    #[tokio::test]
    async fn test_transient_submit_failure_retried() {
        let backend = Arc::new(MockBackend::new());
        backend
            .state
            .lock()
            .unwrap()
            .submit_faults
            .push(BatchError::Transient("connection reset".into()));

        let config = AdapterConfig::new("main-queue", "http://localhost:1");
        let retry = RetryPolicy {
            attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        };
        let adapter =
            BatchAdapter::with_retry(config, Arc::clone(&backend) as Arc<dyn BatchBackend>, retry)
                .unwrap();

        let id = adapter.submit(&sleeper("flaky")).await.unwrap();
        assert_eq!(adapter.outstanding_ids(), vec![id]);
        assert_eq!(backend.state.lock().unwrap().jobs.len(), 1);
    }

    #[tokio::test]
    async fn test_bundled_payload_rides_with_command() {
        let backend = Arc::new(MockBackend::new());
        let adapter = adapter_with(Arc::clone(&backend));

        adapter.set_user_script("def main(): pass");
        adapter.submit(&sleeper("scripted")).await.unwrap();

        let state = backend.state.lock().unwrap();
        let command = &state.jobs[0].payload.command;
        assert_eq!(command[0], encode::LAUNCHER_TOKEN);
        assert_eq!(command.len(), 2);
    }

    #[tokio::test]
    async fn test_poll_with_wait_returns_early_on_completion() {
        let backend = Arc::new(MockBackend::new());
        let adapter = adapter_with(Arc::clone(&backend));

        adapter.submit(&sleeper("quick")).await.unwrap();
        backend.finish(&fake(1), JobState::Succeeded, Some(0));

        let started = std::time::Instant::now();
        let event = adapter.poll(Duration::from_secs(30)).await.unwrap();
        assert!(event.is_some());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_poll_zero_wait_does_not_block() {
        let backend = Arc::new(MockBackend::new());
        let adapter = adapter_with(Arc::clone(&backend));

        adapter.submit(&sleeper("slow")).await.unwrap();
        let started = std::time::Instant::now();
        assert!(adapter.poll(Duration::ZERO).await.unwrap().is_none());
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
