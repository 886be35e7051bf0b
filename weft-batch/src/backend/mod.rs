//! Backend capability interface
//!
//! Everything the adapter needs from a job-execution backend, abstracted so
//! the reconciler and termination controller are written once: submit one
//! job, describe a bounded batch of jobs, cancel one job, and manage the
//! shared execution template. One conforming implementation per backend
//! family lives in this module.

mod grid;
mod http;

pub use grid::{GridBackend, GridTools};
pub use http::CloudBatchClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use weft_core::{JobHandle, StatusRecord};

use crate::admission::RoundedResources;
use crate::error::Result;

/// Most handles a single describe call may ask about, to respect backend
/// bulk-query limits.
pub const MAX_DESCRIBE_BATCH: usize = 100;

/// A fully encoded, backend-ready submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionPayload {
    /// Sanitized, backend-safe job name.
    pub name: String,
    /// Queue or partition to land in.
    pub queue: String,
    /// Handle of the shared template this job runs under.
    pub template: TemplateHandle,
    /// Command vector, already wrapped in the launcher when a bundled
    /// payload rides along.
    pub command: Vec<String>,
    /// Fully merged environment.
    pub environment: HashMap<String, String>,
    /// Admitted, rounded resources in backend units.
    pub resources: ResourcesSpec,
    /// Ownership metadata, when configured.
    pub tags: HashMap<String, String>,
}

/// Resource fields as the backend wants to see them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcesSpec {
    pub vcpus: u32,
    pub memory_mib: u64,
}

impl From<RoundedResources> for ResourcesSpec {
    fn from(r: RoundedResources) -> Self {
        Self {
            vcpus: r.cores,
            memory_mib: r.memory_mib,
        }
    }
}

/// What the shared template should look like on the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateSpec {
    /// Unique remote name for this workflow run's template.
    pub name: String,
    /// Worker container image.
    pub image: String,
    /// Work directory mounted into every worker.
    pub work_dir: String,
    /// Placeholder resources; real per-job values always override them.
    pub resources: ResourcesSpec,
    /// Execution role jobs assume, if any.
    pub job_role: Option<String>,
    /// Ownership metadata, when configured.
    pub tags: HashMap<String, String>,
}

/// Opaque identifier of a registered template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateHandle(pub String);

impl std::fmt::Display for TemplateHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One job-execution backend family.
///
/// Implementations must be safe to call from multiple tasks; all state
/// needed between calls lives behind the handles the backend returns.
#[async_trait]
pub trait BatchBackend: Send + Sync {
    /// Submits one job and returns its backend-native handle.
    async fn submit_job(&self, payload: &SubmissionPayload) -> Result<JobHandle>;

    /// Reports status for up to [`MAX_DESCRIBE_BATCH`] handles. Read-only.
    /// Backends with no bulk query answer one record per handle however they
    /// can; a handle the backend knows nothing about may be omitted.
    async fn describe_jobs(&self, handles: &[JobHandle]) -> Result<Vec<StatusRecord>>;

    /// Cancels one job. Cancelling a job the backend no longer knows must
    /// return [`crate::error::BatchError::NotFound`], which callers treat as
    /// success.
    async fn cancel_job(&self, handle: &JobHandle, reason: &str) -> Result<()>;

    /// Registers the shared execution template.
    async fn register_template(&self, spec: &TemplateSpec) -> Result<TemplateHandle>;

    /// Deletes a previously registered template.
    async fn deregister_template(&self, handle: &TemplateHandle) -> Result<()>;
}
