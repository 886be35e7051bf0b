//! Job domain types
//!
//! Structures shared between the workflow leader (which decides what to run)
//! and the batch adapter (which dispatches it to a backend).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Exit status reported when a backend declares a job terminal without
/// telling us the container exit code.
pub const EXIT_STATUS_UNAVAILABLE: i32 = 255;

/// What a single schedulable unit of work needs in order to run.
///
/// Owned by the caller; the adapter copies what it needs at submission time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDescription {
    /// Free-form label. Sanitized into a backend-safe job name on submission.
    pub name: String,
    /// Command vector to run on the worker.
    pub command: Vec<String>,
    /// Per-job environment overrides, merged over the adapter-wide defaults.
    pub environment: HashMap<String, String>,
    /// Declared resource requirement, validated and rounded before submission.
    pub resources: ResourceRequirement,
}

impl JobDescription {
    pub fn new(name: impl Into<String>, command: Vec<String>) -> Self {
        Self {
            name: name.into(),
            command,
            environment: HashMap::new(),
            resources: ResourceRequirement::default(),
        }
    }
}

/// Declared resource shape of one job.
///
/// Cores may be fractional; memory and disk are bytes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequirement {
    pub cores: f64,
    pub memory_bytes: u64,
    pub disk_bytes: u64,
}

impl Default for ResourceRequirement {
    fn default() -> Self {
        Self {
            cores: 1.0,
            memory_bytes: 2 * 1024 * 1024 * 1024,
            disk_bytes: 2 * 1024 * 1024 * 1024,
        }
    }
}

/// Why a job reached a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    /// Backend reported success.
    Finished,
    /// Backend reported failure.
    Failed,
    /// Cancelled by the adapter on request.
    Killed,
    /// The backend no longer knows the job and never reported it terminal.
    LostContact,
}

/// One standardized completion notification.
///
/// Produced at most once per internal job id, regardless of how many times
/// the backend repeats its terminal report.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionEvent {
    /// Adapter-internal id the leader used to refer to the job.
    pub job_id: u64,
    /// Container/process exit code, or [`EXIT_STATUS_UNAVAILABLE`].
    pub exit_code: i32,
    /// Wall-clock runtime. `None` means the backend never reported a start
    /// time; distinct from a measured near-zero runtime.
    pub wall_time: Option<Duration>,
    pub exit_reason: ExitReason,
}
