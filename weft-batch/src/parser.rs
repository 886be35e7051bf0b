//! Text status parser for CLI-driven grid engines
//!
//! Grid engines expose no structured status API, so state is inferred from
//! tool output by scanning for fixed marker phrases. Rules are ordered
//! (marker, state) pairs evaluated top to bottom; extending support for a
//! new engine version means adding a row, not restructuring the parser.
//!
//! Two-stage cascade: first the detailed per-job listing tool, then, if that
//! is inconclusive, the slower historical accounting tool. No match anywhere
//! means Unknown, which the reconciler treats as non-terminal — absence of
//! information is never read as failure.

use tracing::debug;
use weft_core::JobState;

/// One marker-phrase rule.
pub struct MarkerRule {
    pub marker: &'static str,
    pub state: JobState,
}

/// Rules for the detailed per-job listing tool, in evaluation order.
pub const DETAIL_RULES: &[MarkerRule] = &[
    MarkerRule {
        marker: "Done successfully",
        state: JobState::Succeeded,
    },
    MarkerRule {
        marker: "Completed <exit>",
        state: JobState::Failed,
    },
    MarkerRule {
        marker: "New job is waiting for scheduling",
        state: JobState::Queued,
    },
    MarkerRule {
        marker: "PENDING REASONS",
        state: JobState::Queued,
    },
];

/// Seen in detailed output for a job that has begun but not finished.
const STARTED_MARKER: &str = "Started on ";

/// Printed by the listing tool for a job it has no record of at all, as in
/// `Job <42> is not found`.
const FORGOTTEN_MARKER: &str = "is not found";

/// Rules for the historical accounting tool fallback.
pub const HISTORY_RULES: &[MarkerRule] = &[
    MarkerRule {
        marker: "Completed <done>",
        state: JobState::Succeeded,
    },
    MarkerRule {
        marker: "Completed <exit>",
        state: JobState::Failed,
    },
];

/// Scans output line by line, returning the state of the first rule whose
/// marker appears.
fn scan(output: &str, rules: &[MarkerRule]) -> Option<JobState> {
    for line in output.lines() {
        for rule in rules {
            if line.contains(rule.marker) {
                return Some(rule.state);
            }
        }
    }
    None
}

/// Classifies detailed listing output.
///
/// A started-but-unmatched job reports Running rather than Unknown, so the
/// caller does not fall through to the accounting tool for a job that is
/// demonstrably alive.
pub fn classify_detail(job: &str, output: &str) -> JobState {
    if let Some(state) = scan(output, DETAIL_RULES) {
        debug!("detail listing matched state {:?} for job {}", state, job);
        return state;
    }
    if output.lines().any(|line| line.contains(STARTED_MARKER)) {
        debug!("detail listing shows job {} started but not completed", job);
        return JobState::Running;
    }
    JobState::Unknown
}

/// Whether listing output says the tool has no record of the job at all.
///
/// Distinct from an inconclusive listing: a forgotten job whose accounting
/// lookup also comes back empty has been purged, and should be dropped from
/// status reports rather than stay Unknown forever.
pub fn is_forgotten(output: &str) -> bool {
    output.to_lowercase().contains(FORGOTTEN_MARKER)
}

/// Classifies historical accounting output.
pub fn classify_history(job: &str, output: &str) -> JobState {
    match scan(output, HISTORY_RULES) {
        Some(state) => {
            debug!("accounting matched state {:?} for job {}", state, job);
            state
        }
        None => {
            debug!(
                "can't determine state for job {} or job still running",
                job
            );
            JobState::Unknown
        }
    }
}
