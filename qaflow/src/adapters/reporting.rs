//! Adapter for the spreadsheet/report rendering stage.

use serde_json::Value;
use std::time::Duration;

use super::{fingerprint, with_ttl_hint, StageAdapter};
use crate::core::{StageKind, StageRequest, StageResult};
use crate::errors::StageError;

/// Normalizes reporting-service requests and responses.
#[derive(Debug)]
pub struct ReportingAdapter {
    deadline: Duration,
}

impl ReportingAdapter {
    /// Creates the adapter with a per-call deadline.
    #[must_use]
    pub fn new(deadline: Duration) -> Self {
        Self { deadline }
    }
}

impl StageAdapter for ReportingAdapter {
    fn stage(&self) -> StageKind {
        StageKind::Reporting
    }

    fn prepare(&self, raw: &Value) -> Result<StageRequest, StageError> {
        let report = raw
            .get("report")
            .ok_or_else(|| StageError::InvalidResponse {
                stage: self.stage(),
                message: "reporting input missing 'report'".to_string(),
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
        let workbook = raw
            .get("workbook")
            .and_then(Value::as_str)
            .ok_or_else(|| StageError::InvalidResponse {
                stage: self.stage(),
                message: "reporting response missing 'workbook'".to_string(),
            })?;

        let payload = serde_json::json!({ "workbook": workbook });
        Ok(with_ttl_hint(
            StageResult::success(self.stage(), fingerprint, payload),
            &raw,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> ReportingAdapter {
        ReportingAdapter::new(Duration::from_secs(30))
    }

    #[test]
    fn test_prepare_requires_report() {
        let err = adapter().prepare(&serde_json::json!({})).unwrap_err();
        assert!(matches!(err, StageError::InvalidResponse { .. }));
    }

    #[test]
    fn test_normalize_extracts_workbook() {
        let result = adapter()
            .normalize("fp", serde_json::json!({"workbook": "reports/run-1.xlsx"}))
            .unwrap();
        assert_eq!(result.payload["workbook"], "reports/run-1.xlsx");
    }

    #[test]
    fn test_normalize_rejects_missing_workbook() {
        let err = adapter()
            .normalize("fp", serde_json::json!({"path": "x"}))
            .unwrap_err();
        assert!(matches!(err, StageError::InvalidResponse { .. }));
    }
}
