//! Orchestrator configuration.
//!
//! All resilience knobs are configuration defaults, never enforced
//! invariants: deployments tune attempt counts, thresholds and
//! cool-downs through an external configuration source and hand the
//! parsed document to [`OrchestratorConfig::from_json_str`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::core::StageKind;
use crate::resilience::{BreakerConfig, JitterStrategy, RetryConfig};

/// Address and per-call limits for one stage service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageEndpoint {
    /// Base URL of the service (e.g. `http://analysis:8001`).
    pub base_url: String,
    /// Per-call deadline override in milliseconds.
    pub timeout_ms: Option<u64>,
}

impl StageEndpoint {
    /// Creates an endpoint with no deadline override.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_ms: None,
        }
    }
}

/// Concurrency bounds enforced by the governor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernorConfig {
    /// Maximum concurrently active pipeline runs.
    pub max_runs: usize,
    /// Maximum concurrently active scenario-level stage calls,
    /// within and across runs.
    pub max_stage_calls: usize,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            max_runs: 5,
            max_stage_calls: 10,
        }
    }
}

/// Engine-level policy knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Substitute a deterministic template when a stage call is
    /// unrecoverable, instead of failing the run.
    pub fallback_enabled: bool,
    /// Default TTL for cached stage results, in seconds.
    pub result_ttl_secs: u64,
    /// Default per-call deadline, in milliseconds.
    pub call_deadline_ms: u64,
    /// Whether to run the execution stage after generation.
    pub run_execution: bool,
    /// Whether to run the reporting stage.
    pub run_reporting: bool,
    /// Whether to sync the report to the issue tracker.
    pub run_tracker_sync: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fallback_enabled: true,
            result_ttl_secs: 3600,
            call_deadline_ms: 30_000,
            run_execution: true,
            run_reporting: true,
            run_tracker_sync: false,
        }
    }
}

impl EngineConfig {
    /// Returns the default result TTL as a duration.
    #[must_use]
    pub fn result_ttl(&self) -> Duration {
        Duration::from_secs(self.result_ttl_secs)
    }

    /// Returns the default per-call deadline as a duration.
    #[must_use]
    pub fn call_deadline(&self) -> Duration {
        Duration::from_millis(self.call_deadline_ms)
    }
}

/// Aggregated configuration for the whole orchestration layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Retry/backoff policy applied by the resilient client.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Circuit-breaker policy, one breaker per stage service.
    #[serde(default)]
    pub breaker: BreakerConfig,
    /// Concurrency bounds.
    #[serde(default)]
    pub governor: GovernorConfig,
    /// Engine policy.
    #[serde(default)]
    pub engine: EngineConfig,
    /// Stage service endpoints, keyed by stage.
    #[serde(default)]
    pub endpoints: HashMap<StageKind, StageEndpoint>,
}

impl OrchestratorConfig {
    /// Parses a configuration document from JSON.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the breaker policy.
    #[must_use]
    pub fn with_breaker(mut self, breaker: BreakerConfig) -> Self {
        self.breaker = breaker;
        self
    }

    /// Sets the governor bounds.
    #[must_use]
    pub fn with_governor(mut self, governor: GovernorConfig) -> Self {
        self.governor = governor;
        self
    }

    /// Sets the engine policy.
    #[must_use]
    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    /// Registers an endpoint for a stage.
    #[must_use]
    pub fn with_endpoint(mut self, stage: StageKind, endpoint: StageEndpoint) -> Self {
        self.endpoints.insert(stage, endpoint);
        self
    }

    /// Disables fallback substitution.
    #[must_use]
    pub fn without_fallback(mut self) -> Self {
        self.engine.fallback_enabled = false;
        self
    }

    /// Retry config tuned for fast tests: tiny delays, no jitter.
    #[must_use]
    pub fn fast_retry(mut self) -> Self {
        self.retry = RetryConfig::default()
            .with_base_delay_ms(1)
            .with_max_delay_ms(5)
            .with_jitter(JitterStrategy::None);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.breaker.failure_threshold, 5);
        assert_eq!(config.breaker.cooldown_secs, 60);
        assert_eq!(config.governor.max_runs, 5);
        assert_eq!(config.governor.max_stage_calls, 10);
        assert!(config.engine.fallback_enabled);
    }

    #[test]
    fn test_from_json_partial_document() {
        let json = r#"{
            "breaker": {"failure_threshold": 2, "cooldown_secs": 5},
            "engine": {
                "fallback_enabled": false,
                "result_ttl_secs": 60,
                "call_deadline_ms": 1000,
                "run_execution": false,
                "run_reporting": false,
                "run_tracker_sync": false
            },
            "endpoints": {
                "analysis": {"base_url": "http://analysis:8001", "timeout_ms": 5000}
            }
        }"#;

        let config = OrchestratorConfig::from_json_str(json).unwrap();
        assert_eq!(config.breaker.failure_threshold, 2);
        assert!(!config.engine.fallback_enabled);
        // Unspecified sections keep their defaults.
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(
            config.endpoints.get(&StageKind::Analysis).unwrap().base_url,
            "http://analysis:8001"
        );
    }

    #[test]
    fn test_builder_chain() {
        let config = OrchestratorConfig::default()
            .without_fallback()
            .with_governor(GovernorConfig {
                max_runs: 2,
                max_stage_calls: 4,
            })
            .with_endpoint(StageKind::Generation, StageEndpoint::new("http://gen:8002"));

        assert!(!config.engine.fallback_enabled);
        assert_eq!(config.governor.max_runs, 2);
        assert!(config.endpoints.contains_key(&StageKind::Generation));
    }
}
