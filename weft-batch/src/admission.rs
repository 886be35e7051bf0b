//! Resource admission control
//!
//! Pure, local validation of a job's declared resources against the
//! configured ceilings and the backend's request minimums. Runs before any
//! remote call; a request that can never be satisfied is rejected here.
//! Rounding only ever goes up: under-requesting must never silently occur.

use weft_core::ResourceRequirement;

use crate::config::ResourceLimits;
use crate::error::{BatchError, Result};

const BYTES_PER_MIB: u64 = 1024 * 1024;

/// A requirement after admission: checked against ceilings and rounded up to
/// the backend's request granularity, in backend units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundedResources {
    pub cores: u32,
    pub memory_mib: u64,
    /// Disk is checked against the ceiling but not rounded; the cloud
    /// service cannot schedule on it and grid engines take raw bytes.
    pub disk_bytes: u64,
}

/// Converts bytes to MiB, rounding up.
fn bytes_to_mib_ceil(bytes: u64) -> u64 {
    bytes.div_ceil(BYTES_PER_MIB)
}

/// Validates and rounds one requirement.
///
/// Each dimension must fit under its configured ceiling; cores and memory
/// are then raised to the backend minimums, so the returned requirement is
/// never below either the request or the backend floor.
pub fn admit(req: &ResourceRequirement, limits: &ResourceLimits) -> Result<RoundedResources> {
    if req.cores > limits.max_cores {
        return Err(BatchError::InsufficientResources {
            dimension: "cores",
            requested: req.cores.ceil() as u64,
            limit: limits.max_cores as u64,
        });
    }
    if req.memory_bytes > limits.max_memory_bytes {
        return Err(BatchError::InsufficientResources {
            dimension: "memory",
            requested: req.memory_bytes,
            limit: limits.max_memory_bytes,
        });
    }
    if req.disk_bytes > limits.max_disk_bytes {
        return Err(BatchError::InsufficientResources {
            dimension: "disk",
            requested: req.disk_bytes,
            limit: limits.max_disk_bytes,
        });
    }

    Ok(RoundedResources {
        cores: (req.cores.ceil() as u32).max(limits.min_cores),
        memory_mib: bytes_to_mib_ceil(req.memory_bytes).max(limits.min_memory_mib),
        disk_bytes: req.disk_bytes,
    })
}
