//! Stage request/result types exchanged between adapters, the
//! resilient client, the cache and the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::core::StageKind;
use crate::errors::StageErrorKind;

/// A prepared, canonical call to one stage service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRequest {
    /// Which stage this request targets.
    pub stage: StageKind,
    /// Canonical input payload produced by the adapter.
    pub payload: serde_json::Value,
    /// Deterministic hash of the normalized input.
    pub fingerprint: String,
    /// Per-call deadline enforced by the resilient client.
    #[serde(with = "duration_millis")]
    pub deadline: Duration,
}

/// Success or attributed failure of one stage call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum StageOutcome {
    /// The stage produced a usable payload.
    Success,
    /// The stage failed; the kind and message explain why.
    Failure {
        /// Classified error kind.
        kind: StageErrorKind,
        /// Human-readable detail.
        message: String,
    },
}

impl StageOutcome {
    /// Returns true for successful outcomes.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// The normalized result of one stage call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageResult {
    /// The stage that produced this result.
    pub stage: StageKind,
    /// Fingerprint of the input this result answers.
    pub fingerprint: String,
    /// Success or attributed failure.
    pub outcome: StageOutcome,
    /// Stage payload (scenario list, test artifact, report, ...).
    pub payload: serde_json::Value,
    /// When the result was produced.
    pub produced_at: DateTime<Utc>,
    /// Cache TTL hint, if the producer supplied one.
    #[serde(default, with = "opt_duration_secs")]
    pub ttl: Option<Duration>,
    /// True if this result was served from the cache.
    #[serde(default)]
    pub from_cache: bool,
    /// True if this result is a deterministic fallback template.
    #[serde(default)]
    pub from_fallback: bool,
}

impl StageResult {
    /// Creates a successful result.
    #[must_use]
    pub fn success(
        stage: StageKind,
        fingerprint: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            stage,
            fingerprint: fingerprint.into(),
            outcome: StageOutcome::Success,
            payload,
            produced_at: Utc::now(),
            ttl: None,
            from_cache: false,
            from_fallback: false,
        }
    }

    /// Creates a failed result attributed to an error kind.
    #[must_use]
    pub fn failure(
        stage: StageKind,
        fingerprint: impl Into<String>,
        kind: StageErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            stage,
            fingerprint: fingerprint.into(),
            outcome: StageOutcome::Failure {
                kind,
                message: message.into(),
            },
            payload: serde_json::Value::Null,
            produced_at: Utc::now(),
            ttl: None,
            from_cache: false,
            from_fallback: false,
        }
    }

    /// Sets the TTL hint.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Marks the result as served from cache.
    #[must_use]
    pub fn marked_cached(mut self) -> Self {
        self.from_cache = true;
        self
    }

    /// Marks the result as a fallback template.
    #[must_use]
    pub fn marked_fallback(mut self) -> Self {
        self.from_fallback = true;
        self
    }

    /// Returns true for successful outcomes.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

mod opt_duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&d.as_secs()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_secs))
    }
}
