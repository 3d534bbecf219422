//! Adapter for the document-analysis stage.
//!
//! Input: the extracted text of a specification document. Output: the
//! list of test scenarios the model found in it.

use serde_json::Value;
use std::time::Duration;

use super::{fingerprint, normalize_text, with_ttl_hint, StageAdapter};
use crate::core::{ScenarioUnit, StageKind, StageRequest, StageResult};
use crate::errors::StageError;

/// Normalizes analysis-service requests and responses.
#[derive(Debug)]
pub struct AnalysisAdapter {
    deadline: Duration,
}

impl AnalysisAdapter {
    /// Creates the adapter with a per-call deadline.
    #[must_use]
    pub fn new(deadline: Duration) -> Self {
        Self { deadline }
    }
}

impl StageAdapter for AnalysisAdapter {
    fn stage(&self) -> StageKind {
        StageKind::Analysis
    }

    fn prepare(&self, raw: &Value) -> Result<StageRequest, StageError> {
        let content =
            raw.get("content")
                .and_then(Value::as_str)
                .ok_or_else(|| StageError::InvalidResponse {
                    stage: self.stage(),
                    message: "analysis input missing 'content'".to_string(),
                })?;

        // Fingerprint the normalized text so formatting-only edits to
        // the document reuse the cached scenario list.
        let canonical = serde_json::json!({ "content": normalize_text(content) });
        let fingerprint = fingerprint(self.stage(), &canonical);

        Ok(StageRequest {
            stage: self.stage(),
            payload: canonical,
            fingerprint,
            deadline: self.deadline,
        })
    }

    fn normalize(&self, fingerprint: &str, raw: Value) -> Result<StageResult, StageError> {
        let scenarios = raw
            .get("scenarios")
            .cloned()
            .ok_or_else(|| StageError::InvalidResponse {
                stage: self.stage(),
                message: "analysis response missing 'scenarios'".to_string(),
            })?;

        let parsed: Vec<ScenarioUnit> =
            serde_json::from_value(scenarios).map_err(|e| StageError::InvalidResponse {
                stage: self.stage(),
                message: format!("malformed scenario list: {e}"),
            })?;

        let count = parsed.len();
        let payload = serde_json::json!({
            "scenarios": parsed,
            "scenario_count": count,
        });
        Ok(with_ttl_hint(
            StageResult::success(self.stage(), fingerprint, payload),
            &raw,
        ))
    }
}

/// Extracts the scenario list from a normalized analysis result.
pub(crate) fn scenarios_from_result(result: &StageResult) -> Result<Vec<ScenarioUnit>, StageError> {
    let scenarios = result
        .payload
        .get("scenarios")
        .cloned()
        .unwrap_or(Value::Array(Vec::new()));
    serde_json::from_value(scenarios).map_err(|e| StageError::InvalidResponse {
        stage: StageKind::Analysis,
        message: format!("unreadable scenario list in result: {e}"),
    })
}
