//! Job id registry
//!
//! Bidirectional mapping between adapter-internal job ids and backend
//! handles, plus the set of handles that were explicitly killed so their
//! eventual terminal report can be suppressed. This is the only shared
//! mutable state in the adapter; both maps are always mutual inverses and
//! every mutation is atomic with respect to both.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use weft_core::JobHandle;

use crate::error::{BatchError, Result};

#[derive(Default)]
struct Inner {
    by_internal: HashMap<u64, JobHandle>,
    by_handle: HashMap<String, u64>,
    killed: HashSet<String>,
}

/// Registry of outstanding jobs
#[derive(Default)]
pub struct JobRegistry {
    inner: Mutex<Inner>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts both directions of a mapping. Fails without mutating anything
    /// if either key is already registered.
    pub fn record(&self, internal_id: u64, handle: JobHandle) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.by_internal.contains_key(&internal_id) {
            return Err(BatchError::DuplicateId(internal_id.to_string()));
        }
        let key = handle.to_string();
        if inner.by_handle.contains_key(&key) {
            return Err(BatchError::DuplicateId(key));
        }
        inner.by_handle.insert(key, internal_id);
        inner.by_internal.insert(internal_id, handle);
        Ok(())
    }

    /// Looks up the backend handle for an internal id.
    pub fn resolve(&self, internal_id: u64) -> Result<JobHandle> {
        let inner = self.inner.lock().unwrap();
        inner
            .by_internal
            .get(&internal_id)
            .cloned()
            .ok_or_else(|| BatchError::UnknownId(internal_id.to_string()))
    }

    /// Looks up the internal id for a backend handle.
    pub fn resolve_reverse(&self, handle: &JobHandle) -> Result<u64> {
        let inner = self.inner.lock().unwrap();
        inner
            .by_handle
            .get(&handle.to_string())
            .copied()
            .ok_or_else(|| BatchError::UnknownId(handle.to_string()))
    }

    /// Whether the handle is currently registered at all.
    pub fn contains_handle(&self, handle: &JobHandle) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.by_handle.contains_key(&handle.to_string())
    }

    /// Flags a handle so its terminal report is suppressed. Idempotent.
    /// Must be set before the cancel call goes out, so a poll racing the
    /// cancellation cannot emit a spurious completion.
    pub fn mark_killed(&self, handle: &JobHandle) {
        let mut inner = self.inner.lock().unwrap();
        inner.killed.insert(handle.to_string());
    }

    /// Whether the handle was explicitly killed.
    pub fn was_killed(&self, handle: &JobHandle) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.killed.contains(&handle.to_string())
    }

    /// Removes both directions and clears the killed flag. Only called once
    /// the job's terminal event has been delivered or deliberately
    /// suppressed.
    pub fn forget(&self, internal_id: u64) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let handle = inner
            .by_internal
            .remove(&internal_id)
            .ok_or_else(|| BatchError::UnknownId(internal_id.to_string()))?;
        let key = handle.to_string();
        inner.by_handle.remove(&key);
        inner.killed.remove(&key);
        Ok(())
    }

    /// Internal ids of every outstanding job, in no particular order.
    pub fn outstanding(&self) -> Vec<u64> {
        let inner = self.inner.lock().unwrap();
        inner.by_internal.keys().copied().collect()
    }

    /// Backend handles of every outstanding job, in no particular order.
    pub fn handles(&self) -> Vec<JobHandle> {
        let inner = self.inner.lock().unwrap();
        inner.by_internal.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().by_internal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(id: &str) -> JobHandle {
        JobHandle::new(id)
    }

    #[test]
    fn test_record_and_resolve_both_directions() {
        let registry = JobRegistry::new();
        registry.record(1, handle("aws-1")).unwrap();
        registry.record(2, handle("aws-2")).unwrap();

        assert_eq!(registry.resolve(1).unwrap().id, "aws-1");
        assert_eq!(registry.resolve_reverse(&handle("aws-2")).unwrap(), 2);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_duplicate_keys_rejected_without_mutation() {
        let registry = JobRegistry::new();
        registry.record(1, handle("aws-1")).unwrap();

        assert!(matches!(
            registry.record(1, handle("aws-other")),
            Err(BatchError::DuplicateId(_))
        ));
        assert!(matches!(
            registry.record(9, handle("aws-1")),
            Err(BatchError::DuplicateId(_))
        ));
        // The failed inserts must not have left half a pair behind
        assert_eq!(registry.len(), 1);
        assert!(registry.resolve(9).is_err());
        assert!(registry.resolve_reverse(&handle("aws-other")).is_err());
    }

    #[test]
    fn test_forget_removes_both_directions_and_killed_flag() {
        let registry = JobRegistry::new();
        registry.record(1, handle("aws-1")).unwrap();
        registry.mark_killed(&handle("aws-1"));

        registry.forget(1).unwrap();
        assert!(registry.resolve(1).is_err());
        assert!(registry.resolve_reverse(&handle("aws-1")).is_err());
        assert!(!registry.was_killed(&handle("aws-1")));
        assert!(registry.is_empty());

        assert!(matches!(registry.forget(1), Err(BatchError::UnknownId(_))));
    }

    #[test]
    fn test_mark_killed_idempotent() {
        let registry = JobRegistry::new();
        registry.record(1, handle("aws-1")).unwrap();
        registry.mark_killed(&handle("aws-1"));
        registry.mark_killed(&handle("aws-1"));
        assert!(registry.was_killed(&handle("aws-1")));
    }

    #[test]
    fn test_size_tracks_outstanding_jobs() {
        let registry = JobRegistry::new();
        for i in 0..5 {
            registry.record(i, handle(&format!("aws-{i}"))).unwrap();
        }
        registry.forget(2).unwrap();
        registry.forget(4).unwrap();

        let mut outstanding = registry.outstanding();
        outstanding.sort_unstable();
        assert_eq!(outstanding, vec![0, 1, 3]);
        assert_eq!(registry.handles().len(), 3);
    }
}
