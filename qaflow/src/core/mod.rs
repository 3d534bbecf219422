//! Canonical data model shared by every orchestrator component.

mod request;
mod run;
mod scenario;
mod stage;
mod status;

pub use request::{StageOutcome, StageRequest, StageResult};
pub use run::{DocumentRef, PipelineRun, StageRecord};
pub use scenario::{dedup_by_id, ScenarioPriority, ScenarioUnit};
pub use stage::StageKind;
pub use status::{RunState, RunStatus};
