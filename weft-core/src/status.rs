//! Backend status vocabulary
//!
//! The uniform shape every backend family reports into, whether it came from
//! a structured describe call or from scraping tool output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Backend-native identifier for a submitted job.
///
/// Opaque to the adapter except that some grid engines append an array task
/// index after a dot (`"1234.7"`), which has to survive a round trip.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobHandle {
    /// The backend's own job identifier.
    pub id: String,
    /// Array task index, when the backend embeds one.
    pub task: Option<u32>,
}

impl JobHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            task: None,
        }
    }

    /// Parses a handle string, splitting off a trailing `.N` task index if
    /// one is present and numeric. Anything else stays part of the id.
    pub fn parse(raw: &str) -> Self {
        if let Some((id, task)) = raw.split_once('.') {
            if let Ok(task) = task.parse::<u32>() {
                return Self {
                    id: id.to_string(),
                    task: Some(task),
                };
            }
        }
        Self::new(raw)
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.task {
            Some(task) => write!(f, "{}.{}", self.id, task),
            None => write!(f, "{}", self.id),
        }
    }
}

/// Backend-reported lifecycle state of one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Queued,
    Starting,
    Running,
    Succeeded,
    Failed,
    /// The backend gave no usable answer. Never treated as terminal.
    Unknown,
}

impl JobState {
    /// Whether the job will not change state again.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }
}

/// One backend status report for one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusRecord {
    pub handle: JobHandle,
    pub state: JobState,
    /// When the backend observed the job start, if it tracks that.
    pub started_at: Option<DateTime<Utc>>,
    /// When the backend observed the job stop; absent while still running
    /// and on backends that do not report it.
    pub stopped_at: Option<DateTime<Utc>>,
    /// Container/process exit code, when reported.
    pub exit_code: Option<i32>,
    /// Backend's own explanation for a failure, when it has one.
    pub status_reason: Option<String>,
}

impl StatusRecord {
    /// A bare record carrying only a state, for backends that report nothing
    /// beyond the answer of the text cascade.
    pub fn bare(handle: JobHandle, state: JobState) -> Self {
        Self {
            handle,
            state,
            started_at: None,
            stopped_at: None,
            exit_code: None,
            status_reason: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_parse_plain() {
        let h = JobHandle::parse("abc-123");
        assert_eq!(h.id, "abc-123");
        assert_eq!(h.task, None);
        assert_eq!(h.to_string(), "abc-123");
    }

    #[test]
    fn test_handle_parse_array_task() {
        let h = JobHandle::parse("1234.7");
        assert_eq!(h.id, "1234");
        assert_eq!(h.task, Some(7));
        assert_eq!(h.to_string(), "1234.7");
    }

    #[test]
    fn test_handle_parse_non_numeric_suffix_kept() {
        let h = JobHandle::parse("arn:aws:batch:us-west-2:job/x.y");
        assert_eq!(h.task, None);
        assert_eq!(h.id, "arn:aws:batch:us-west-2:job/x.y");
    }

    #[test]
    fn test_terminal_states() {
        assert!(JobState::Succeeded.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(!JobState::Unknown.is_terminal());
    }
}
