//! The closed set of pipeline stages.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One discrete unit of pipeline work delegated to an external service.
///
/// Stage selection is dispatched through this enum and the adapter
/// registry, never by matching on free-form strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Document analysis: extracts test scenarios from a specification.
    Analysis,
    /// Test-code generation for a single scenario.
    Generation,
    /// Execution of generated tests against the target application.
    Execution,
    /// Spreadsheet / report rendering of execution results.
    Reporting,
    /// Issue-tracker synchronization of the report.
    TrackerSync,
}

impl StageKind {
    /// All stages in pipeline order.
    pub const ALL: [Self; 5] = [
        Self::Analysis,
        Self::Generation,
        Self::Execution,
        Self::Reporting,
        Self::TrackerSync,
    ];

    /// Stable name used in cache keys, config and event payloads.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Analysis => "analysis",
            Self::Generation => "generation",
            Self::Execution => "execution",
            Self::Reporting => "reporting",
            Self::TrackerSync => "tracker_sync",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
