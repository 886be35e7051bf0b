//! Adapter configuration
//!
//! Everything the adapter needs to know about the backend target and the
//! workflow run: queue, endpoint, identity, resource ceilings, default
//! environment, and grid tool passthrough flags.

use std::collections::HashMap;

use weft_core::ResourceRequirement;

use crate::error::{BatchError, Result};

/// Resource floors and ceilings the adapter admits requests against.
///
/// Minimums come from what the backend will accept in an API request;
/// maximums are configured for the workflow run.
#[derive(Debug, Clone, Copy)]
pub struct ResourceLimits {
    /// Smallest core count the backend accepts in a request.
    pub min_cores: u32,
    /// Smallest memory request the backend accepts, in MiB.
    pub min_memory_mib: u64,
    pub max_cores: f64,
    pub max_memory_bytes: u64,
    pub max_disk_bytes: u64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            // The cloud batch service refuses requests under these
            min_cores: 1,
            min_memory_mib: 4,
            max_cores: 96.0,
            max_memory_bytes: 512 * 1024 * 1024 * 1024,
            max_disk_bytes: 1024 * 1024 * 1024 * 1024,
        }
    }
}

/// Batch adapter configuration
///
/// One instance per workflow run. Built explicitly or from environment
/// variables; validated once at adapter construction.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Queue or partition to submit into. Required.
    pub queue: String,
    /// Cloud service endpoint (e.g., "http://batch.internal:8080"). Required
    /// for the HTTP backend family.
    pub endpoint: String,
    /// Region label recorded on submissions, if the backend wants one.
    pub region: Option<String>,
    /// Execution role/identity jobs should assume, if any.
    pub job_role: Option<String>,
    /// Owner tag value applied to everything the adapter creates, if set.
    pub owner_tag: Option<String>,
    /// Container image workers run.
    pub worker_image: String,
    /// Work directory mounted into every worker.
    pub worker_work_dir: String,
    /// Adapter-wide environment applied to every job, overridden per job.
    pub default_env: HashMap<String, String>,
    /// Placeholder resources baked into the shared template. Always
    /// overridden per submission.
    pub default_resources: ResourceRequirement,
    /// Floors and ceilings for admission control.
    pub limits: ResourceLimits,
    /// Extra CLI flags appended to every grid submission.
    pub extra_grid_args: Option<String>,
}

impl AdapterConfig {
    /// Creates a configuration for the given queue with defaults
    pub fn new(queue: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            endpoint: endpoint.into(),
            region: None,
            job_role: None,
            owner_tag: None,
            worker_image: "weft/worker:latest".to_string(),
            worker_work_dir: "/var/lib/weft".to_string(),
            default_env: HashMap::new(),
            default_resources: ResourceRequirement::default(),
            limits: ResourceLimits::default(),
            extra_grid_args: None,
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - WEFT_BATCH_QUEUE (required)
    /// - WEFT_BATCH_ENDPOINT (required)
    /// - WEFT_BATCH_REGION (optional)
    /// - WEFT_JOB_ROLE (optional)
    /// - WEFT_OWNER_TAG (optional)
    /// - WEFT_WORKER_IMAGE (optional)
    /// - WEFT_GRID_ARGS (optional, extra flags for grid submissions)
    pub fn from_env() -> Result<Self> {
        let queue = std::env::var("WEFT_BATCH_QUEUE").map_err(|_| {
            BatchError::Configuration("WEFT_BATCH_QUEUE environment variable not set".into())
        })?;

        let endpoint = std::env::var("WEFT_BATCH_ENDPOINT").map_err(|_| {
            BatchError::Configuration("WEFT_BATCH_ENDPOINT environment variable not set".into())
        })?;

        let mut config = Self::new(queue, endpoint);
        config.region = std::env::var("WEFT_BATCH_REGION").ok();
        config.job_role = std::env::var("WEFT_JOB_ROLE").ok();
        config.owner_tag = std::env::var("WEFT_OWNER_TAG").ok();
        if let Ok(image) = std::env::var("WEFT_WORKER_IMAGE") {
            config.worker_image = image;
        }
        config.extra_grid_args = std::env::var("WEFT_GRID_ARGS").ok();

        Ok(config)
    }

    /// Validates the configuration. Called once at adapter construction;
    /// failures here are fatal and never retried.
    pub fn validate(&self) -> Result<()> {
        if self.queue.is_empty() {
            return Err(BatchError::Configuration("queue cannot be empty".into()));
        }

        if self.endpoint.is_empty() {
            return Err(BatchError::Configuration(
                "endpoint cannot be empty".into(),
            ));
        }

        if self.worker_image.is_empty() {
            return Err(BatchError::Configuration(
                "worker_image cannot be empty".into(),
            ));
        }

        if self.limits.max_cores <= 0.0 {
            return Err(BatchError::Configuration(
                "max_cores must be greater than 0".into(),
            ));
        }

        if self.limits.max_memory_bytes < self.limits.min_memory_mib * 1024 * 1024 {
            return Err(BatchError::Configuration(
                "max_memory_bytes is below the backend minimum request".into(),
            ));
        }

        Ok(())
    }
}
