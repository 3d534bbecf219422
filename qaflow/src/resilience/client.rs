//! The resilient client wrapping every outbound stage call.
//!
//! Composition order per attempt: circuit admission, per-call timeout,
//! transport submission, adapter normalization. Retryable failures
//! back off with jitter up to the configured attempt budget; every
//! outcome is recorded on the stage's circuit breaker.

use std::sync::Arc;
use tracing::{debug, warn};

use super::{backoff_delay, CircuitRegistry, RetryConfig};
use crate::adapters::StageAdapter;
use crate::core::{StageRequest, StageResult};
use crate::errors::StageError;
use crate::transport::StageTransport;

/// Applies timeout, retry and circuit breaking to stage calls.
pub struct ResilientClient {
    transport: Arc<dyn StageTransport>,
    breakers: Arc<CircuitRegistry>,
    retry: RetryConfig,
}

impl ResilientClient {
    /// Creates a client over a transport and a shared breaker registry.
    #[must_use]
    pub fn new(
        transport: Arc<dyn StageTransport>,
        breakers: Arc<CircuitRegistry>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            transport,
            breakers,
            retry,
        }
    }

    /// Executes one stage call with the full resilience policy.
    ///
    /// An open circuit fails fast with `ServiceUnavailable` before any
    /// network activity. Timeouts and transport failures are retried
    /// with exponential backoff and jitter; normalization failures are
    /// not, since the same payload would fail again. All failures
    /// propagate to the engine for the fallback decision.
    pub async fn call(
        &self,
        adapter: &dyn StageAdapter,
        request: &StageRequest,
    ) -> Result<StageResult, StageError> {
        let stage = request.stage;
        let breaker = self.breakers.breaker(stage);
        let mut attempt: u32 = 0;

        loop {
            breaker.admit()?;

            let submitted = self.transport.submit(stage, &request.payload);
            let outcome = match tokio::time::timeout(request.deadline, submitted).await {
                Err(_) => Err(StageError::Timeout {
                    stage,
                    elapsed_ms: request.deadline.as_millis() as u64,
                }),
                Ok(Err(e)) => Err(e),
                Ok(Ok(raw)) => adapter.normalize(&request.fingerprint, raw),
            };

            match outcome {
                Ok(result) => {
                    breaker.record_success();
                    return Ok(result);
                }
                Err(e) => {
                    breaker.record_failure();
                    if e.is_retryable() && !self.retry.is_last_attempt(attempt) {
                        let delay = backoff_delay(&self.retry, attempt);
                        debug!(
                            stage = %stage,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "retrying stage call"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    } else {
                        warn!(
                            stage = %stage,
                            fingerprint = %request.fingerprint,
                            attempts = attempt + 1,
                            error = %e,
                            "stage call failed"
                        );
                        return Err(e);
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for ResilientClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientClient")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{GenerationAdapter, StageAdapter};
    use crate::core::{ScenarioUnit, StageKind};
    use crate::events::NoOpEventSink;
    use crate::resilience::{BreakerConfig, CircuitState, JitterStrategy};
    use crate::testing::ScriptedTransport;
    use std::time::Duration;

    fn fast_retry(max_attempts: u32) -> RetryConfig {
        RetryConfig::new()
            .with_max_attempts(max_attempts)
            .with_base_delay_ms(1)
            .with_jitter(JitterStrategy::None)
    }

    fn registry(threshold: u32) -> Arc<CircuitRegistry> {
        Arc::new(CircuitRegistry::new(
            BreakerConfig::default()
                .with_failure_threshold(threshold)
                .with_cooldown_secs(0),
            Arc::new(NoOpEventSink),
        ))
    }

    fn generation_request() -> (GenerationAdapter, StageRequest) {
        let adapter = GenerationAdapter::new(Duration::from_secs(1));
        let request = adapter
            .prepare(&serde_json::json!({
                "scenario": ScenarioUnit::new("s1", "Login works")
            }))
            .unwrap();
        (adapter, request)
    }

    #[tokio::test]
    async fn test_success_first_attempt() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.set_default(StageKind::Generation, serde_json::json!({"code": "t"}));

        let client = ResilientClient::new(transport.clone(), registry(5), fast_retry(3));
        let (adapter, request) = generation_request();

        let result = client.call(&adapter, &request).await.unwrap();
        assert!(result.is_success());
        assert_eq!(transport.calls(StageKind::Generation), 1);
    }

    #[tokio::test]
    async fn test_retries_transient_failures() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.enqueue_failures(StageKind::Generation, 2);
        transport.set_default(StageKind::Generation, serde_json::json!({"code": "t"}));

        let client = ResilientClient::new(transport.clone(), registry(10), fast_retry(3));
        let (adapter, request) = generation_request();

        let result = client.call(&adapter, &request).await.unwrap();
        assert!(result.is_success());
        assert_eq!(transport.calls(StageKind::Generation), 3);
    }

    #[tokio::test]
    async fn test_exhausts_attempt_budget() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.enqueue_failures(StageKind::Generation, 10);

        let client = ResilientClient::new(transport.clone(), registry(100), fast_retry(3));
        let (adapter, request) = generation_request();

        let err = client.call(&adapter, &request).await.unwrap_err();
        assert!(matches!(err, StageError::Transport { .. }));
        assert_eq!(transport.calls(StageKind::Generation), 3);
    }

    #[tokio::test]
    async fn test_timeout_classified_and_retried() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.set_latency(StageKind::Generation, Duration::from_millis(50));
        transport.set_default(StageKind::Generation, serde_json::json!({"code": "t"}));

        let adapter = GenerationAdapter::new(Duration::from_millis(5));
        let request = adapter
            .prepare(&serde_json::json!({
                "scenario": ScenarioUnit::new("s1", "Slow service")
            }))
            .unwrap();

        let client = ResilientClient::new(transport.clone(), registry(100), fast_retry(2));
        let err = client.call(&adapter, &request).await.unwrap_err();

        assert!(matches!(err, StageError::Timeout { .. }));
        assert_eq!(transport.calls(StageKind::Generation), 2);
    }

    #[tokio::test]
    async fn test_invalid_response_not_retried() {
        let transport = Arc::new(ScriptedTransport::new());
        // Missing the 'code' field the adapter requires.
        transport.set_default(StageKind::Generation, serde_json::json!({"stdout": "?"}));

        let client = ResilientClient::new(transport.clone(), registry(100), fast_retry(3));
        let (adapter, request) = generation_request();

        let err = client.call(&adapter, &request).await.unwrap_err();
        assert!(matches!(err, StageError::InvalidResponse { .. }));
        assert_eq!(transport.calls(StageKind::Generation), 1);
    }

    #[tokio::test]
    async fn test_open_circuit_fails_fast_without_network() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.enqueue_failures(StageKind::Generation, 10);

        let breakers = registry(2);
        // Long cool-down so the circuit stays open for the assertion.
        let breakers_long = Arc::new(CircuitRegistry::new(
            BreakerConfig::default()
                .with_failure_threshold(2)
                .with_cooldown_secs(60),
            Arc::new(NoOpEventSink),
        ));
        drop(breakers);

        let client = ResilientClient::new(transport.clone(), breakers_long.clone(), fast_retry(2));
        let (adapter, request) = generation_request();

        // Exhaust the threshold: 2 attempts, both fail.
        let _ = client.call(&adapter, &request).await;
        assert_eq!(
            breakers_long.breaker(StageKind::Generation).state(),
            CircuitState::Open
        );
        let calls_before = transport.calls(StageKind::Generation);

        let err = client.call(&adapter, &request).await.unwrap_err();
        assert!(matches!(err, StageError::ServiceUnavailable { .. }));
        // Fail-fast: no additional network call.
        assert_eq!(transport.calls(StageKind::Generation), calls_before);
    }

    #[tokio::test]
    async fn test_half_open_trial_closes_circuit() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.enqueue_failures(StageKind::Generation, 2);
        transport.set_default(StageKind::Generation, serde_json::json!({"code": "t"}));

        // Zero cool-down so the next call is the half-open trial.
        let breakers = registry(2);
        let client = ResilientClient::new(transport.clone(), breakers.clone(), fast_retry(2));
        let (adapter, request) = generation_request();

        let _ = client.call(&adapter, &request).await;
        assert_eq!(
            breakers.breaker(StageKind::Generation).state(),
            CircuitState::Open
        );

        let result = client.call(&adapter, &request).await.unwrap();
        assert!(result.is_success());
        assert_eq!(
            breakers.breaker(StageKind::Generation).state(),
            CircuitState::Closed
        );
    }
}
