//! Scripted in-memory stage transport.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::core::StageKind;
use crate::errors::StageError;
use crate::transport::StageTransport;

/// A stage transport driven by scripted outcomes.
///
/// Resolution order per call: a queued outcome if one is scripted,
/// then the first matcher rule whose needle appears in the serialized
/// payload, then the stage's default response. Calls are counted so
/// tests can assert how much network activity a path produced.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    scripts: DashMap<StageKind, Mutex<VecDeque<Result<Value, StageError>>>>,
    matchers: DashMap<StageKind, Vec<(String, StageError)>>,
    defaults: DashMap<StageKind, Value>,
    latencies: DashMap<StageKind, Duration>,
    calls: DashMap<StageKind, AtomicUsize>,
}

impl ScriptedTransport {
    /// Creates an empty transport; every call fails until scripted.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues one outcome for the next call to a stage.
    pub fn enqueue(&self, stage: StageKind, outcome: Result<Value, StageError>) {
        self.scripts
            .entry(stage)
            .or_default()
            .lock()
            .push_back(outcome);
    }

    /// Queues `n` copies of a transport failure for a stage.
    pub fn enqueue_failures(&self, stage: StageKind, n: usize) {
        for _ in 0..n {
            self.enqueue(
                stage,
                Err(StageError::Transport {
                    stage,
                    message: "scripted failure".to_string(),
                }),
            );
        }
    }

    /// Fails any call whose payload contains `needle`.
    pub fn fail_when(&self, stage: StageKind, needle: impl Into<String>, error: StageError) {
        self.matchers
            .entry(stage)
            .or_default()
            .push((needle.into(), error));
    }

    /// Sets the response used when no script or matcher applies.
    pub fn set_default(&self, stage: StageKind, response: Value) {
        self.defaults.insert(stage, response);
    }

    /// Delays every call to a stage, to exercise timeouts.
    pub fn set_latency(&self, stage: StageKind, latency: Duration) {
        self.latencies.insert(stage, latency);
    }

    /// Number of calls submitted for a stage.
    #[must_use]
    pub fn calls(&self, stage: StageKind) -> usize {
        self.calls
            .get(&stage)
            .map_or(0, |c| c.load(Ordering::SeqCst))
    }

    /// Total calls submitted across all stages.
    #[must_use]
    pub fn total_calls(&self) -> usize {
        StageKind::ALL.iter().map(|s| self.calls(*s)).sum()
    }
}

#[async_trait]
impl StageTransport for ScriptedTransport {
    async fn submit(&self, stage: StageKind, payload: &Value) -> Result<Value, StageError> {
        self.calls
            .entry(stage)
            .or_insert_with(|| AtomicUsize::new(0))
            .fetch_add(1, Ordering::SeqCst);

        if let Some(latency) = self.latencies.get(&stage).map(|l| *l) {
            tokio::time::sleep(latency).await;
        }

        if let Some(queue) = self.scripts.get(&stage) {
            if let Some(outcome) = queue.lock().pop_front() {
                return outcome;
            }
        }

        if let Some(rules) = self.matchers.get(&stage) {
            let serialized = payload.to_string();
            for (needle, error) in rules.iter() {
                if serialized.contains(needle.as_str()) {
                    return Err(error.clone());
                }
            }
        }

        self.defaults
            .get(&stage)
            .map(|v| v.clone())
            .ok_or_else(|| StageError::Transport {
                stage,
                message: "no scripted response".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_scripted_outcomes_pop_in_order() {
        let transport = ScriptedTransport::new();
        transport.enqueue_failures(StageKind::Analysis, 1);
        transport.enqueue(StageKind::Analysis, Ok(serde_json::json!({"ok": true})));

        assert_err!(transport.submit(StageKind::Analysis, &serde_json::json!({})).await);
        assert_ok!(transport.submit(StageKind::Analysis, &serde_json::json!({})).await);
        assert_eq!(transport.calls(StageKind::Analysis), 2);
    }

    #[tokio::test]
    async fn test_matcher_targets_payload() {
        let transport = ScriptedTransport::new();
        transport.set_default(StageKind::Generation, serde_json::json!({"code": "ok"}));
        transport.fail_when(
            StageKind::Generation,
            "login-02",
            StageError::Transport {
                stage: StageKind::Generation,
                message: "boom".to_string(),
            },
        );

        let ok = transport
            .submit(StageKind::Generation, &serde_json::json!({"id": "login-01"}))
            .await;
        let bad = transport
            .submit(StageKind::Generation, &serde_json::json!({"id": "login-02"}))
            .await;

        assert!(ok.is_ok());
        assert!(bad.is_err());
    }

    #[tokio::test]
    async fn test_unscripted_stage_fails() {
        let transport = ScriptedTransport::new();
        let err = transport
            .submit(StageKind::Reporting, &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no scripted response"));
    }
}
