//! # Qaflow
//!
//! Orchestration layer for a document-to-test QA pipeline.
//!
//! A submitted specification document flows through five stage
//! services: analysis extracts test scenarios, generation writes test
//! code per scenario, execution runs the tests, reporting renders a
//! workbook, and tracker sync pushes results to an issue tracker.
//! Qaflow coordinates those calls with:
//!
//! - **Resilience**: per-call timeouts, retry with exponential backoff
//!   and jitter, and a circuit breaker per stage service
//! - **Caching**: content-addressed result reuse keyed by stage and
//!   input fingerprint, with TTL and corruption-as-miss semantics
//! - **Fallbacks**: deterministic degraded templates so one flaky
//!   service downgrades a run to partial instead of failing it
//! - **Concurrency governance**: bounded pools for active runs and
//!   scenario-level stage calls
//! - **Cooperative cancellation**: observed at every stage boundary,
//!   never pre-empting an in-flight call
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use qaflow::prelude::*;
//!
//! let config = OrchestratorConfig::default()
//!     .with_endpoint(StageKind::Analysis, StageEndpoint::new("http://analysis:8001"));
//! let engine = PipelineEngine::over_http(config);
//!
//! let run_id = engine.submit(DocumentRef::new("specs/login.md", document_text));
//! let run = engine.wait_terminal(run_id, Duration::from_secs(600)).await;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod adapters;
pub mod cache;
pub mod cancellation;
pub mod config;
pub mod core;
pub mod engine;
pub mod errors;
pub mod events;
pub mod governor;
pub mod resilience;
pub mod testing;
pub mod tracker;
pub mod transport;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::adapters::{AdapterRegistry, StageAdapter};
    pub use crate::cache::{InMemoryResultCache, ResultCache};
    pub use crate::config::{
        EngineConfig, GovernorConfig, OrchestratorConfig, StageEndpoint,
    };
    pub use crate::core::{
        DocumentRef, PipelineRun, RunState, RunStatus, ScenarioUnit, StageKind, StageResult,
    };
    pub use crate::engine::PipelineEngine;
    pub use crate::errors::{StageError, StageErrorKind};
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::governor::{Governor, PermitCategory};
    pub use crate::resilience::{BreakerConfig, JitterStrategy, RetryConfig};
    pub use crate::tracker::{RunFilter, RunTracker};
    pub use crate::transport::{HttpStageTransport, StageTransport};
}
