//! Pipeline run record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::core::{RunState, RunStatus, StageKind, StageResult};

/// Reference to the source document a run was submitted for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    /// Where the document lives (path, URL, upload id...).
    pub source: String,
    /// The extracted text content handed to the analysis stage.
    pub content: String,
}

impl DocumentRef {
    /// Creates a document reference.
    #[must_use]
    pub fn new(source: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            content: content.into(),
        }
    }
}

/// One recorded stage outcome inside a run.
///
/// Fan-out stages record one entry per scenario; sequential stages
/// record a single entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    /// The stage this record belongs to.
    pub stage: StageKind,
    /// Scenario id for fan-out records, `None` for sequential stages.
    pub scenario_id: Option<String>,
    /// The normalized result.
    pub result: StageResult,
}

/// The full record of one pipeline run.
///
/// Owned exclusively by the engine for its lifetime; external callers
/// only ever see cloned snapshots through the run tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    /// Run identifier.
    pub id: Uuid,
    /// The submitted document.
    pub document: DocumentRef,
    /// Current position in the stage machine.
    pub state: RunState,
    /// Overall status.
    pub status: RunStatus,
    /// Recorded stage results, keyed for stable ordering in snapshots.
    pub records: BTreeMap<String, StageRecord>,
    /// Whether cancellation has been requested.
    pub cancel_requested: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last transition timestamp.
    pub updated_at: DateTime<Utc>,
}

impl PipelineRun {
    /// Creates a freshly submitted run.
    #[must_use]
    pub fn new(document: DocumentRef) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            document,
            state: RunState::Submitted,
            status: RunStatus::Pending,
            records: BTreeMap::new(),
            cancel_requested: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Moves the run to a new state.
    pub fn transition(&mut self, state: RunState) {
        self.state = state;
        self.updated_at = Utc::now();
    }

    /// Records a sequential stage result.
    pub fn record(&mut self, result: StageResult) {
        let stage = result.stage;
        self.records.insert(
            stage.as_str().to_string(),
            StageRecord {
                stage,
                scenario_id: None,
                result,
            },
        );
        self.updated_at = Utc::now();
    }

    /// Records a fan-out stage result for one scenario.
    pub fn record_scenario(&mut self, scenario_id: impl Into<String>, result: StageResult) {
        let scenario_id = scenario_id.into();
        let stage = result.stage;
        self.records.insert(
            format!("{}:{scenario_id}", stage.as_str()),
            StageRecord {
                stage,
                scenario_id: Some(scenario_id),
                result,
            },
        );
        self.updated_at = Utc::now();
    }

    /// Returns the recorded result for a sequential stage.
    #[must_use]
    pub fn result_for(&self, stage: StageKind) -> Option<&StageResult> {
        self.records.get(stage.as_str()).map(|r| &r.result)
    }

    /// Returns all recorded results for a fan-out stage.
    #[must_use]
    pub fn scenario_results(&self, stage: StageKind) -> Vec<&StageRecord> {
        self.records
            .values()
            .filter(|r| r.stage == stage && r.scenario_id.is_some())
            .collect()
    }

    /// Returns true if any recorded result is a fallback template.
    #[must_use]
    pub fn has_fallback_results(&self) -> bool {
        self.records.values().any(|r| r.result.from_fallback)
    }
}
