//! Adapter for the issue-tracker synchronization stage.

use serde_json::Value;
use std::time::Duration;

use super::{fingerprint, with_ttl_hint, StageAdapter};
use crate::core::{StageKind, StageRequest, StageResult};
use crate::errors::StageError;

/// Normalizes tracker-connector requests and responses.
#[derive(Debug)]
pub struct TrackerSyncAdapter {
    deadline: Duration,
}

impl TrackerSyncAdapter {
    /// Creates the adapter with a per-call deadline.
    #[must_use]
    pub fn new(deadline: Duration) -> Self {
        Self { deadline }
    }
}

impl StageAdapter for TrackerSyncAdapter {
    fn stage(&self) -> StageKind {
        StageKind::TrackerSync
    }

    fn prepare(&self, raw: &Value) -> Result<StageRequest, StageError> {
        let report = raw
            .get("report")
            .ok_or_else(|| StageError::InvalidResponse {
                stage: self.stage(),
                message: "tracker-sync input missing 'report'".to_string(),
            })?;

        let canonical = serde_json::json!({ "report": report });
        let fingerprint = fingerprint(self.stage(), &canonical);

        Ok(StageRequest {
            stage: self.stage(),
            payload: canonical,
            fingerprint,
            deadline: self.deadline,
        })
    }

    fn normalize(&self, fingerprint: &str, raw: Value) -> Result<StageResult, StageError> {
        let issues = raw
            .get("issues")
            .and_then(Value::as_array)
            .ok_or_else(|| StageError::InvalidResponse {
                stage: self.stage(),
                message: "tracker-sync response missing 'issues'".to_string(),
            })?;

        let payload = serde_json::json!({
            "issues": issues,
            "issue_count": issues.len(),
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

    fn adapter() -> TrackerSyncAdapter {
        TrackerSyncAdapter::new(Duration::from_secs(30))
    }

    #[test]
    fn test_normalize_counts_issues() {
        let result = adapter()
            .normalize(
                "fp",
                serde_json::json!({"issues": [{"key": "QA-1"}, {"key": "QA-2"}]}),
            )
            .unwrap();
        assert_eq!(result.payload["issue_count"], 2);
    }

    #[test]
    fn test_normalize_rejects_missing_issues() {
        let err = adapter()
            .normalize("fp", serde_json::json!({"synced": true}))
            .unwrap_err();
        assert!(matches!(err, StageError::InvalidResponse { .. }));
    }

    #[test]
    fn test_prepare_requires_report() {
        let err = adapter().prepare(&serde_json::json!({})).unwrap_err();
        assert!(matches!(err, StageError::InvalidResponse { .. }));
    }
}
