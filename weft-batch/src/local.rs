//! Local sub-scheduler seam
//!
//! Some workflow runs keep a side channel for jobs cheap enough to run on
//! the leader machine instead of the backend. The adapter only needs this
//! boundary: offer a job before encoding it for the backend, check for
//! local completions before remote polling, and fan kills and shutdown out.
//! No implementation ships here.

use async_trait::async_trait;

use weft_core::{CompletionEvent, JobDescription};

/// A scheduler for jobs that never leave the local machine.
#[async_trait]
pub trait LocalScheduler: Send + Sync {
    /// Offers a job under an already-assigned internal id. `true` means it
    /// was taken locally and must not be submitted to the backend.
    async fn try_issue(&self, internal_id: u64, desc: &JobDescription) -> bool;

    /// Non-blocking check for a finished local job. Local completions take
    /// priority over remote polling.
    async fn poll_completed(&self) -> Option<CompletionEvent>;

    /// Internal ids of outstanding local jobs.
    fn outstanding(&self) -> Vec<u64>;

    /// Kills any of the given ids that are local. Unknown ids are ignored.
    async fn kill(&self, internal_ids: &[u64]);

    /// Stops everything local.
    async fn shutdown(&self);
}
