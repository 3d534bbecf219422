//! Adapter for the per-scenario test-code generation stage.

use serde_json::Value;
use std::time::Duration;

use super::{fingerprint, with_ttl_hint, StageAdapter};
use crate::core::{ScenarioUnit, StageKind, StageRequest, StageResult};
use crate::errors::StageError;

/// Normalizes generation-service requests and responses.
#[derive(Debug)]
pub struct GenerationAdapter {
    deadline: Duration,
}

impl GenerationAdapter {
    /// Creates the adapter with a per-call deadline.
    #[must_use]
    pub fn new(deadline: Duration) -> Self {
        Self { deadline }
    }
}

impl StageAdapter for GenerationAdapter {
    fn stage(&self) -> StageKind {
        StageKind::Generation
    }

    fn prepare(&self, raw: &Value) -> Result<StageRequest, StageError> {
        let scenario: ScenarioUnit = serde_json::from_value(
            raw.get("scenario").cloned().unwrap_or(Value::Null),
        )
        .map_err(|e| StageError::InvalidResponse {
            stage: self.stage(),
            message: format!("generation input needs a 'scenario': {e}"),
        })?;

        // The scenario id is the idempotence key across retries, so it
        // is part of the canonical payload.
        let canonical = serde_json::json!({ "scenario": scenario });
        let fingerprint = fingerprint(self.stage(), &canonical);

        Ok(StageRequest {
            stage: self.stage(),
            payload: canonical,
            fingerprint,
            deadline: self.deadline,
        })
    }

    fn normalize(&self, fingerprint: &str, raw: Value) -> Result<StageResult, StageError> {
        let code = raw
            .get("code")
            .and_then(Value::as_str)
            .ok_or_else(|| StageError::InvalidResponse {
                stage: self.stage(),
                message: "generation response missing 'code'".to_string(),
            })?;

        let language = raw
            .get("language")
            .and_then(Value::as_str)
            .unwrap_or("python");

        let payload = serde_json::json!({
            "code": code,
            "language": language,
        });
        Ok(with_ttl_hint(
            StageResult::success(self.stage(), fingerprint, payload),
            &raw,
        ))
    }
}
