//! Adapter for the browser-automation execution stage.

use serde_json::Value;
use std::time::Duration;

use super::{fingerprint, with_ttl_hint, StageAdapter};
use crate::core::{StageKind, StageRequest, StageResult};
use crate::errors::StageError;

/// Normalizes execution-service requests and responses.
#[derive(Debug)]
pub struct ExecutionAdapter {
    deadline: Duration,
}

impl ExecutionAdapter {
    /// Creates the adapter with a per-call deadline.
    #[must_use]
    pub fn new(deadline: Duration) -> Self {
        Self { deadline }
    }
}

impl StageAdapter for ExecutionAdapter {
    fn stage(&self) -> StageKind {
        StageKind::Execution
    }

    fn prepare(&self, raw: &Value) -> Result<StageRequest, StageError> {
        let artifacts = raw
            .get("artifacts")
            .and_then(Value::as_array)
            .ok_or_else(|| StageError::InvalidResponse {
                stage: self.stage(),
                message: "execution input missing 'artifacts'".to_string(),
            })?;

        let canonical = serde_json::json!({ "artifacts": artifacts });
        let fingerprint = fingerprint(self.stage(), &canonical);

        Ok(StageRequest {
            stage: self.stage(),
            payload: canonical,
            fingerprint,
            deadline: self.deadline,
        })
    }

    fn normalize(&self, fingerprint: &str, raw: Value) -> Result<StageResult, StageError> {
        let passed = raw.get("passed").and_then(Value::as_u64);
        let failed = raw.get("failed").and_then(Value::as_u64);
        let (Some(passed), Some(failed)) = (passed, failed) else {
            return Err(StageError::InvalidResponse {
                stage: self.stage(),
                message: "execution response missing 'passed'/'failed' counts".to_string(),
            });
        };

        let payload = serde_json::json!({
            "passed": passed,
            "failed": failed,
            "skipped": raw.get("skipped").and_then(Value::as_u64).unwrap_or(0),
            "details": raw.get("details").cloned().unwrap_or(Value::Array(Vec::new())),
        });
        Ok(with_ttl_hint(
            StageResult::success(self.stage(), fingerprint, payload),
            &raw,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> ExecutionAdapter {
        ExecutionAdapter::new(Duration::from_secs(30))
    }

    #[test]
    fn test_prepare_requires_artifacts() {
        let err = adapter().prepare(&serde_json::json!({})).unwrap_err();
        assert!(matches!(err, StageError::InvalidResponse { .. }));
    }

    #[test]
    fn test_prepare_fingerprints_artifact_set() {
        let a = adapter()
            .prepare(&serde_json::json!({"artifacts": [{"code": "t1"}]}))
            .unwrap();
        let b = adapter()
            .prepare(&serde_json::json!({"artifacts": [{"code": "t2"}]}))
            .unwrap();
        assert_ne!(a.fingerprint, b.fingerprint);
    }

    #[test]
    fn test_normalize_counts() {
        let result = adapter()
            .normalize("fp", serde_json::json!({"passed": 7, "failed": 1}))
            .unwrap();

        assert!(result.is_success());
        assert_eq!(result.payload["passed"], 7);
        assert_eq!(result.payload["skipped"], 0);
    }

    #[test]
    fn test_normalize_rejects_missing_counts() {
        let err = adapter()
            .normalize("fp", serde_json::json!({"passed": 7}))
            .unwrap_err();
        assert!(matches!(err, StageError::InvalidResponse { .. }));
    }
}
