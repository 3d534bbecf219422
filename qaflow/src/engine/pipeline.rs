//! The pipeline engine: drives a submitted document through the stage
//! machine.
//!
//! Each run is a spawned task. The engine holds a run permit for the
//! whole run, consults the cache before every stage call, fans
//! generation out per scenario under stage-call permits with a full
//! barrier join, substitutes fallback templates for unrecoverable
//! failures when enabled, and polls the cancel token at every stage
//! boundary.

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{error, info};
use uuid::Uuid;

use super::fallback;
use crate::adapters::{scenarios_from_result, AdapterRegistry};
use crate::cache::{InMemoryResultCache, ResultCache};
use crate::cancellation::CancelToken;
use crate::config::{EngineConfig, OrchestratorConfig};
use crate::core::{
    dedup_by_id, DocumentRef, PipelineRun, RunState, RunStatus, ScenarioUnit, StageKind,
    StageResult,
};
use crate::errors::{StageError, StageErrorKind};
use crate::events::{EventSink, NoOpEventSink};
use crate::governor::{Governor, PermitCategory};
use crate::resilience::{CircuitRegistry, ResilientClient};
use crate::tracker::RunTracker;
use crate::transport::{HttpStageTransport, StageTransport};

/// Orchestrates pipeline runs over a stage transport.
pub struct PipelineEngine {
    adapters: AdapterRegistry,
    client: ResilientClient,
    cache: Arc<dyn ResultCache>,
    governor: Arc<Governor>,
    tracker: Arc<RunTracker>,
    events: Arc<dyn EventSink>,
    policy: EngineConfig,
}

impl PipelineEngine {
    /// Creates an engine with an in-memory cache and no event sink.
    #[must_use]
    pub fn new(config: OrchestratorConfig, transport: Arc<dyn StageTransport>) -> Arc<Self> {
        Self::with_parts(
            config,
            transport,
            Arc::new(InMemoryResultCache::new()),
            Arc::new(NoOpEventSink),
        )
    }

    /// Creates an engine posting jobs to the configured HTTP endpoints.
    #[must_use]
    pub fn over_http(config: OrchestratorConfig) -> Arc<Self> {
        let transport = Arc::new(HttpStageTransport::new(config.endpoints.clone()));
        Self::new(config, transport)
    }

    /// Creates an engine with explicit cache and event sink.
    #[must_use]
    pub fn with_parts(
        config: OrchestratorConfig,
        transport: Arc<dyn StageTransport>,
        cache: Arc<dyn ResultCache>,
        events: Arc<dyn EventSink>,
    ) -> Arc<Self> {
        let breakers = Arc::new(CircuitRegistry::new(config.breaker, Arc::clone(&events)));
        Arc::new(Self {
            adapters: AdapterRegistry::with_defaults(config.engine.call_deadline()),
            client: ResilientClient::new(transport, breakers, config.retry),
            cache,
            governor: Arc::new(Governor::new(config.governor)),
            tracker: Arc::new(RunTracker::new()),
            events,
            policy: config.engine,
        })
    }

    /// The run tracker for status, cancellation and listing.
    #[must_use]
    pub fn tracker(&self) -> &Arc<RunTracker> {
        &self.tracker
    }

    /// The result cache backing this engine.
    #[must_use]
    pub fn cache(&self) -> &Arc<dyn ResultCache> {
        &self.cache
    }

    /// The concurrency governor shared by all runs.
    #[must_use]
    pub fn governor(&self) -> &Arc<Governor> {
        &self.governor
    }

    /// Submits a document and returns the run id immediately.
    ///
    /// The run executes on a spawned task; callers observe progress
    /// through [`PipelineEngine::tracker`]. Submissions beyond the
    /// governor's run bound queue until a slot frees.
    pub fn submit(self: &Arc<Self>, document: DocumentRef) -> Uuid {
        let run = PipelineRun::new(document);
        let run_id = run.id;
        let cancel = self.tracker.register(&run);

        let engine = Arc::clone(self);
        drop(tokio::spawn(async move {
            engine.drive(run, cancel).await;
        }));
        run_id
    }

    /// Polls the tracker until the run is terminal or the timeout
    /// elapses, returning the latest snapshot either way.
    pub async fn wait_terminal(&self, run_id: Uuid, timeout: Duration) -> Option<PipelineRun> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(run) = self.tracker.status(run_id) {
                if run.status.is_terminal() {
                    return Some(run);
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return self.tracker.status(run_id);
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    async fn drive(self: Arc<Self>, mut run: PipelineRun, cancel: Arc<CancelToken>) {
        let _permit = self.governor.acquire(PermitCategory::Run).await;
        run.status = RunStatus::Running;
        self.publish(&run);

        match self.execute(&mut run, &cancel).await {
            Ok(()) => {
                run.status = if run.has_fallback_results() {
                    RunStatus::Partial
                } else {
                    RunStatus::Succeeded
                };
                run.transition(RunState::Completed);
                info!(run_id = %run.id, status = %run.status, "run completed");
            }
            Err(StageError::RunCancelled { .. }) => {
                run.status = RunStatus::Cancelled;
                run.transition(RunState::Cancelled);
                self.events.try_emit(
                    "run.cancelled",
                    Some(json!({ "run_id": run.id, "reason": cancel.reason() })),
                );
                info!(run_id = %run.id, reason = ?cancel.reason(), "run cancelled");
            }
            Err(e) => {
                run.status = RunStatus::Failed;
                run.transition(RunState::Failed);
                error!(run_id = %run.id, error = %e, "run failed");
            }
        }
        self.publish(&run);
    }

    async fn execute(
        self: &Arc<Self>,
        run: &mut PipelineRun,
        cancel: &Arc<CancelToken>,
    ) -> Result<(), StageError> {
        checkpoint(run, cancel)?;
        run.transition(RunState::AnalysisPending);
        self.publish(run);

        let input = json!({ "content": run.document.content.clone() });
        let analysis = self.staged(run, StageKind::Analysis, &input).await?;
        let scenarios = match scenarios_from_result(&analysis) {
            Ok(units) => dedup_by_id(units),
            Err(e) => {
                run.record(StageResult::failure(
                    StageKind::Analysis,
                    analysis.fingerprint.clone(),
                    e.kind(),
                    e.to_string(),
                ));
                return Err(e);
            }
        };
        run.record(analysis);
        run.transition(RunState::AnalysisDone);
        self.publish(run);

        checkpoint(run, cancel)?;
        run.transition(RunState::GenerationPending);
        self.publish(run);
        self.generation_fan_out(run, cancel, scenarios).await?;
        checkpoint(run, cancel)?;
        run.transition(RunState::GenerationDone);
        self.publish(run);

        if self.policy.run_execution {
            checkpoint(run, cancel)?;
            run.transition(RunState::ExecutionPending);
            self.publish(run);

            let input = json!({ "artifacts": artifacts(run) });
            let result = self.staged(run, StageKind::Execution, &input).await?;
            run.record(result);
        }
        run.transition(RunState::ExecutionDone);
        self.publish(run);

        if self.policy.run_reporting || self.policy.run_tracker_sync {
            checkpoint(run, cancel)?;
            run.transition(RunState::ReportingPending);
            self.publish(run);
            let report = report_payload(run);

            if self.policy.run_reporting {
                let input = json!({ "report": report.clone() });
                let result = self.staged(run, StageKind::Reporting, &input).await?;
                run.record(result);
            }
            if self.policy.run_tracker_sync {
                checkpoint(run, cancel)?;
                let input = json!({ "report": report });
                let result = self.staged(run, StageKind::TrackerSync, &input).await?;
                run.record(result);
            }
        }
        Ok(())
    }

    /// Fans generation out per scenario under stage-call permits.
    ///
    /// Dispatch stops at the first observed cancellation; every call
    /// already in flight still reaches a terminal outcome and is
    /// recorded before this returns (barrier join).
    async fn generation_fan_out(
        self: &Arc<Self>,
        run: &mut PipelineRun,
        cancel: &Arc<CancelToken>,
        scenarios: Vec<ScenarioUnit>,
    ) -> Result<(), StageError> {
        let mut tasks: JoinSet<(String, Result<StageResult, StageFailure>)> = JoinSet::new();
        let mut first_error: Option<StageError> = None;

        for scenario in scenarios {
            if cancel.is_cancelled() {
                break;
            }
            let permit = self.governor.acquire(PermitCategory::StageCall).await;
            let engine = Arc::clone(self);
            tasks.spawn(async move {
                let _permit = permit;
                let scenario_id = scenario.id.clone();
                let input = json!({ "scenario": scenario });
                let outcome = engine.guarded_stage(StageKind::Generation, &input).await;
                (scenario_id, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((scenario_id, Ok(result))) => run.record_scenario(scenario_id, result),
                Ok((scenario_id, Err(failure))) => {
                    run.record_scenario(scenario_id, failure.record(StageKind::Generation));
                    first_error.get_or_insert(failure.error);
                }
                Err(join_err) => {
                    first_error.get_or_insert(StageError::Transport {
                        stage: StageKind::Generation,
                        message: format!("generation task aborted: {join_err}"),
                    });
                }
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Runs one stage call and, when it cannot be satisfied, records
    /// the failure on the run keyed by the request fingerprint before
    /// propagating the error.
    async fn staged(
        &self,
        run: &mut PipelineRun,
        stage: StageKind,
        input: &Value,
    ) -> Result<StageResult, StageError> {
        match self.guarded_stage(stage, input).await {
            Ok(result) => Ok(result),
            Err(failure) => {
                run.record(failure.record(stage));
                Err(failure.error)
            }
        }
    }

    /// One stage call: cache lookup, resilient call, cache write,
    /// fallback substitution.
    ///
    /// Fallback templates are never written to the cache, so the next
    /// run with the same input retries the real service. Errors carry
    /// the request fingerprint so callers can attribute them.
    async fn guarded_stage(
        &self,
        stage: StageKind,
        input: &Value,
    ) -> Result<StageResult, StageFailure> {
        let adapter = self.adapters.get(stage);
        let request = adapter.prepare(input).map_err(|error| StageFailure {
            fingerprint: String::new(),
            error,
        })?;

        if let Some(hit) = self.cache.get(stage, &request.fingerprint).await {
            self.events.try_emit(
                "cache.hit",
                Some(json!({ "stage": stage.as_str(), "fingerprint": request.fingerprint })),
            );
            return Ok(hit.marked_cached());
        }

        match self.client.call(adapter.as_ref(), &request).await {
            Ok(result) => {
                let ttl = result.ttl.unwrap_or_else(|| self.policy.result_ttl());
                self.cache
                    .put(stage, &request.fingerprint, result.clone(), ttl)
                    .await;
                Ok(result)
            }
            Err(e) if self.policy.fallback_enabled && e.kind() != StageErrorKind::RunCancelled => {
                self.events.try_emit(
                    "fallback.substituted",
                    Some(json!({ "stage": stage.as_str(), "error": e.kind().to_string() })),
                );
                Ok(fallback::template(stage, &request.fingerprint, input))
            }
            Err(error) => Err(StageFailure {
                fingerprint: request.fingerprint,
                error,
            }),
        }
    }

    fn publish(&self, run: &PipelineRun) {
        self.tracker.publish(run);
        self.events.try_emit(
            "run.state_changed",
            Some(json!({
                "run_id": run.id,
                "state": run.state.to_string(),
                "status": run.status.to_string(),
            })),
        );
    }
}

impl std::fmt::Debug for PipelineEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineEngine")
            .field("policy", &self.policy)
            .field("tracked_runs", &self.tracker.len())
            .finish_non_exhaustive()
    }
}

fn checkpoint(run: &PipelineRun, cancel: &CancelToken) -> Result<(), StageError> {
    if cancel.is_cancelled() {
        Err(StageError::RunCancelled {
            run_id: run.id.to_string(),
        })
    } else {
        Ok(())
    }
}

/// Builds the execution-stage artifact list from recorded generation
/// results. Record keys are sorted, so the artifact order (and the
/// execution fingerprint) is deterministic.
fn artifacts(run: &PipelineRun) -> Vec<Value> {
    run.scenario_results(StageKind::Generation)
        .into_iter()
        .filter(|r| r.result.is_success())
        .map(|r| {
            json!({
                "scenario_id": r.scenario_id.clone(),
                "code": r.result.payload.get("code").cloned().unwrap_or(Value::Null),
                "language": r.result.payload.get("language").cloned().unwrap_or(Value::Null),
            })
        })
        .collect()
}

fn report_payload(run: &PipelineRun) -> Value {
    let scenarios: Vec<Value> = run
        .scenario_results(StageKind::Generation)
        .into_iter()
        .map(|r| {
            json!({
                "scenario_id": r.scenario_id.clone(),
                "generated": r.result.is_success(),
                "fallback": r.result.from_fallback,
            })
        })
        .collect();
    let execution = run
        .result_for(StageKind::Execution)
        .map_or(Value::Null, |r| r.payload.clone());

    json!({
        "document": run.document.source.clone(),
        "scenarios": scenarios,
        "execution": execution,
    })
}

/// A stage call that failed, keyed by the fingerprint it was
/// dispatched under.
struct StageFailure {
    fingerprint: String,
    error: StageError,
}

impl StageFailure {
    fn record(&self, stage: StageKind) -> StageResult {
        StageResult::failure(
            stage,
            self.fingerprint.as_str(),
            self.error.kind(),
            self.error.to_string(),
        )
    }
}
