//! Circuit breaker, one per stage service.
//!
//! After a configurable number of consecutive failures the circuit
//! opens and calls fail fast until the cool-down elapses. The circuit
//! then admits exactly one trial call: success closes it, failure
//! reopens it and restarts the cool-down.

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::core::StageKind;
use crate::errors::StageError;
use crate::events::EventSink;

/// State of one circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls pass through; failures are counted.
    Closed,
    /// Calls fail fast until the cool-down elapses.
    Open,
    /// Exactly one trial call is admitted.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Circuit-breaker policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,
    /// Cool-down window while open, in seconds.
    pub cooldown_secs: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_secs: 60,
        }
    }
}

impl BreakerConfig {
    /// Sets the failure threshold.
    #[must_use]
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Sets the cool-down window.
    #[must_use]
    pub fn with_cooldown_secs(mut self, secs: u64) -> Self {
        self.cooldown_secs = secs;
        self
    }

    /// Returns the cool-down as a duration.
    #[must_use]
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

/// Circuit breaker for one stage service.
///
/// State is mutated only by call outcomes, under a single fine-grained
/// lock, so concurrent runs calling the same service observe a
/// consistent circuit.
pub struct CircuitBreaker {
    stage: StageKind,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
    events: Arc<dyn EventSink>,
}

impl CircuitBreaker {
    /// Creates a closed breaker for a stage.
    #[must_use]
    pub fn new(stage: StageKind, config: BreakerConfig, events: Arc<dyn EventSink>) -> Self {
        Self {
            stage,
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                trial_in_flight: false,
            }),
            events,
        }
    }

    /// Decides whether a call may proceed.
    ///
    /// Open circuits fail fast with [`StageError::ServiceUnavailable`]
    /// and no network activity. An open circuit whose cool-down has
    /// elapsed transitions to half-open and admits one trial call;
    /// concurrent callers during the trial are refused.
    pub fn admit(&self) -> Result<(), StageError> {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let elapsed = inner.opened_at.map_or(Duration::ZERO, |t| t.elapsed());
                if elapsed >= self.config.cooldown() {
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_in_flight = true;
                    self.transition_event("circuit.half_open");
                    Ok(())
                } else {
                    let retry_in = self.config.cooldown().saturating_sub(elapsed);
                    Err(StageError::ServiceUnavailable {
                        stage: self.stage,
                        retry_in_ms: retry_in.as_millis() as u64,
                    })
                }
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    Err(StageError::ServiceUnavailable {
                        stage: self.stage,
                        retry_in_ms: 0,
                    })
                } else {
                    inner.trial_in_flight = true;
                    Ok(())
                }
            }
        }
    }

    /// Records a successful call outcome.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = 0;
        inner.trial_in_flight = false;
        if inner.state != CircuitState::Closed {
            inner.state = CircuitState::Closed;
            inner.opened_at = None;
            self.transition_event("circuit.closed");
        }
    }

    /// Records a failed call outcome.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.trial_in_flight = false;
        match inner.state {
            CircuitState::HalfOpen => {
                // Failed trial reopens the circuit and restarts cool-down.
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                self.transition_event("circuit.opened");
            }
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                    self.transition_event("circuit.opened");
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Current circuit state.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Current consecutive-failure count.
    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.inner.lock().consecutive_failures
    }

    /// Explicitly resets the circuit to closed.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.trial_in_flight = false;
    }

    fn transition_event(&self, event_type: &str) {
        self.events.try_emit(
            event_type,
            Some(serde_json::json!({"stage": self.stage.as_str()})),
        );
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("stage", &self.stage)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Shared registry holding one breaker per stage service.
///
/// Explicitly injected into the resilient client; there are no hidden
/// process-wide globals. Breakers persist across runs and are only
/// reset by outcomes or an explicit [`CircuitRegistry::reset_all`].
pub struct CircuitRegistry {
    breakers: DashMap<StageKind, Arc<CircuitBreaker>>,
    config: BreakerConfig,
    events: Arc<dyn EventSink>,
}

impl CircuitRegistry {
    /// Creates a registry applying `config` to every stage breaker.
    #[must_use]
    pub fn new(config: BreakerConfig, events: Arc<dyn EventSink>) -> Self {
        Self {
            breakers: DashMap::new(),
            config,
            events,
        }
    }

    /// Returns the breaker for a stage, creating it on first use.
    #[must_use]
    pub fn breaker(&self, stage: StageKind) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(stage)
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(
                    stage,
                    self.config,
                    Arc::clone(&self.events),
                ))
            })
            .clone()
    }

    /// Resets every breaker to closed.
    pub fn reset_all(&self) {
        for entry in &self.breakers {
            entry.value().reset();
        }
    }
}

impl fmt::Debug for CircuitRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitRegistry")
            .field("config", &self.config)
            .field("stages", &self.breakers.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{CollectingEventSink, NoOpEventSink};

    fn breaker(threshold: u32, cooldown_secs: u64) -> CircuitBreaker {
        CircuitBreaker::new(
            StageKind::Analysis,
            BreakerConfig::default()
                .with_failure_threshold(threshold)
                .with_cooldown_secs(cooldown_secs),
            Arc::new(NoOpEventSink),
        )
    }

    #[test]
    fn test_starts_closed() {
        let breaker = breaker(5, 60);
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.admit().is_ok());
    }

    #[test]
    fn test_opens_after_exact_threshold() {
        let breaker = breaker(3, 60);

        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn test_open_fails_fast() {
        let breaker = breaker(1, 60);
        breaker.record_failure();

        match breaker.admit() {
            Err(StageError::ServiceUnavailable { retry_in_ms, .. }) => {
                assert!(retry_in_ms > 0);
            }
            other => panic!("expected ServiceUnavailable, got {other:?}"),
        }
    }

    #[test]
    fn test_success_resets_failure_count() {
        let breaker = breaker(3, 60);
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        assert_eq!(breaker.consecutive_failures(), 0);

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_after_cooldown_admits_one_trial() {
        let breaker = breaker(1, 0);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        // Zero cool-down: first admit transitions to half-open.
        assert!(breaker.admit().is_ok());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        // Second concurrent caller is refused while the trial is in flight.
        assert!(matches!(
            breaker.admit(),
            Err(StageError::ServiceUnavailable { .. })
        ));
    }

    #[test]
    fn test_trial_success_closes() {
        let breaker = breaker(1, 0);
        breaker.record_failure();
        breaker.admit().unwrap();

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.consecutive_failures(), 0);
    }

    #[test]
    fn test_trial_failure_reopens() {
        let breaker = breaker(1, 0);
        breaker.record_failure();
        breaker.admit().unwrap();

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn test_transitions_emit_events() {
        let sink = Arc::new(CollectingEventSink::new());
        let breaker = CircuitBreaker::new(
            StageKind::Generation,
            BreakerConfig::default()
                .with_failure_threshold(1)
                .with_cooldown_secs(0),
            sink.clone(),
        );

        breaker.record_failure(); // closed -> open
        breaker.admit().unwrap(); // open -> half_open
        breaker.record_success(); // half_open -> closed

        let types: Vec<String> = sink.events().into_iter().map(|(t, _)| t).collect();
        assert_eq!(
            types,
            vec!["circuit.opened", "circuit.half_open", "circuit.closed"]
        );
    }

    #[test]
    fn test_registry_one_breaker_per_stage() {
        let registry = CircuitRegistry::new(BreakerConfig::default(), Arc::new(NoOpEventSink));

        let a = registry.breaker(StageKind::Analysis);
        let b = registry.breaker(StageKind::Analysis);
        assert!(Arc::ptr_eq(&a, &b));

        let c = registry.breaker(StageKind::Generation);
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn test_registry_reset_all() {
        let registry = CircuitRegistry::new(
            BreakerConfig::default().with_failure_threshold(1),
            Arc::new(NoOpEventSink),
        );

        let breaker = registry.breaker(StageKind::Execution);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        registry.reset_all();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }
}
