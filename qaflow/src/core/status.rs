//! Run status and state-machine enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Overall status of a pipeline run as seen by external callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Accepted but not yet started.
    Pending,
    /// Actively progressing through stages.
    Running,
    /// Completed, but at least one result came from a fallback template.
    Partial,
    /// Completed with every stage result produced live or from cache.
    Succeeded,
    /// A stage failed with fallback disabled; no further stages ran.
    Failed,
    /// Cancellation was observed at a stage boundary.
    Cancelled,
}

impl RunStatus {
    /// Returns true if no further transitions are possible.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Partial | Self::Succeeded | Self::Failed | Self::Cancelled
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Partial => write!(f, "partial"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Position of a run inside the stage machine.
///
/// `Failed` and `Cancelled` are orthogonal terminals reachable from
/// any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Run accepted, nothing dispatched yet.
    Submitted,
    /// Analysis call in flight (or cache lookup pending).
    AnalysisPending,
    /// Scenario list available.
    AnalysisDone,
    /// Per-scenario generation fan-out in flight.
    GenerationPending,
    /// Every scenario has a terminal outcome.
    GenerationDone,
    /// Execution call in flight.
    ExecutionPending,
    /// Execution report available.
    ExecutionDone,
    /// Reporting / tracker-sync calls in flight.
    ReportingPending,
    /// All configured stages finished.
    Completed,
    /// Aborted by a stage failure with fallback disabled.
    Failed,
    /// Aborted by cooperative cancellation.
    Cancelled,
}

impl RunState {
    /// Returns true if the state machine can make no further move.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Submitted => "submitted",
            Self::AnalysisPending => "analysis_pending",
            Self::AnalysisDone => "analysis_done",
            Self::GenerationPending => "generation_pending",
            Self::GenerationDone => "generation_done",
            Self::ExecutionPending => "execution_pending",
            Self::ExecutionDone => "execution_done",
            Self::ReportingPending => "reporting_pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{name}")
    }
}
