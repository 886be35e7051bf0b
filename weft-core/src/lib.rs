//! Weft core domain types
//!
//! Value types shared between the workflow leader and the batch dispatch
//! layer: job descriptions going in, completion events coming out, and the
//! backend-facing status vocabulary in between. All types here are transient
//! values owned by the caller; nothing in this crate talks to a backend.

pub mod job;
pub mod status;

pub use job::{
    CompletionEvent, ExitReason, JobDescription, ResourceRequirement, EXIT_STATUS_UNAVAILABLE,
};
pub use status::{JobHandle, JobState, StatusRecord};
