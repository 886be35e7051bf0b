//! Weft batch dispatch layer
//!
//! Adapter between the workflow leader and heterogeneous job-execution
//! backends: cloud-managed batch services and CLI-driven grid engines.
//! The leader decides what to run; this crate dispatches it, reconciles the
//! backend's asynchronous, rate-limited, sometimes purely textual status
//! reporting into exactly one completion event per job, and guarantees that
//! a killed job is never reported as running again.
//!
//! Architecture:
//! - Registry: bidirectional internal-id/backend-handle mapping
//! - Admission: local resource validation and round-up before any remote call
//! - Template: lazy, shared, exactly-once backend execution template
//! - Encoder: job description to backend-native submission payload
//! - Reconciler: batched polling and terminal-state classification
//! - Terminator: cancellation with confirmed-death waiting
//! - Backends: one capability implementation per backend family

pub mod adapter;
pub mod admission;
pub mod backend;
pub mod config;
pub mod encode;
pub mod error;
pub mod local;
pub mod parser;
pub mod reconcile;
pub mod registry;
pub mod retry;
pub mod template;
pub mod terminate;

pub use adapter::BatchAdapter;
pub use backend::{BatchBackend, CloudBatchClient, GridBackend, GridTools};
pub use config::{AdapterConfig, ResourceLimits};
pub use error::{BatchError, Result};
pub use retry::RetryPolicy;
