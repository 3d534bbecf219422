//! Stage adapters: one per stage, normalizing that stage's
//! request/response shape into the canonical job/result model.
//!
//! Adapters are deliberately thin. `prepare` is deterministic so
//! identical semantic input always yields the identical fingerprint;
//! `normalize` classifies every remote response into the error
//! taxonomy and never leaks a backend-specific error shape. Retry,
//! caching and circuit breaking are layered around adapters by the
//! resilient client and the engine, never inside them.

mod analysis;
mod execution;
mod generation;
mod reporting;
mod tracker_sync;

pub use analysis::AnalysisAdapter;
pub(crate) use analysis::scenarios_from_result;
pub use execution::ExecutionAdapter;
pub use generation::GenerationAdapter;
pub use reporting::ReportingAdapter;
pub use tracker_sync::TrackerSyncAdapter;

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::core::{StageKind, StageRequest, StageResult};
use crate::errors::StageError;

/// Normalizes one stage's request/response shape.
pub trait StageAdapter: Send + Sync {
    /// The stage this adapter serves.
    fn stage(&self) -> StageKind;

    /// Builds the canonical request from raw input.
    ///
    /// Must be deterministic: identical semantic input yields the
    /// identical fingerprint.
    fn prepare(&self, raw: &Value) -> Result<StageRequest, StageError>;

    /// Classifies the remote response into a normalized result.
    fn normalize(&self, fingerprint: &str, raw: Value) -> Result<StageResult, StageError>;
}

/// Computes the deterministic fingerprint of a canonical payload.
///
/// `serde_json` serializes object keys in sorted order, so two
/// semantically identical payloads hash identically regardless of how
/// they were assembled.
#[must_use]
pub fn fingerprint(stage: StageKind, canonical: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(stage.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(canonical.to_string().as_bytes());
    hex::encode(&hasher.finalize()[..16])
}

/// Collapses formatting-only differences in document text.
///
/// Lines are trimmed, internal runs of whitespace collapse to a
/// single space, and blank lines are dropped, so a re-indented or
/// re-wrapped copy of the same document fingerprints identically.
#[must_use]
pub fn normalize_text(text: &str) -> String {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Reads the producer's TTL hint from a response, if present.
fn ttl_hint(raw: &Value) -> Option<Duration> {
    raw.get("ttl_secs")
        .and_then(Value::as_u64)
        .map(Duration::from_secs)
}

/// Applies a TTL hint from the raw response to a normalized result.
pub(crate) fn with_ttl_hint(result: StageResult, raw: &Value) -> StageResult {
    match ttl_hint(raw) {
        Some(ttl) => result.with_ttl(ttl),
        None => result,
    }
}

/// Closed lookup table dispatching stage calls to their adapters.
pub struct AdapterRegistry {
    adapters: HashMap<StageKind, Arc<dyn StageAdapter>>,
}

impl AdapterRegistry {
    /// Builds the registry with all five stage adapters, applying the
    /// given per-call deadline to prepared requests.
    #[must_use]
    pub fn with_defaults(deadline: Duration) -> Self {
        let adapters: Vec<Arc<dyn StageAdapter>> = vec![
            Arc::new(AnalysisAdapter::new(deadline)),
            Arc::new(GenerationAdapter::new(deadline)),
            Arc::new(ExecutionAdapter::new(deadline)),
            Arc::new(ReportingAdapter::new(deadline)),
            Arc::new(TrackerSyncAdapter::new(deadline)),
        ];
        Self {
            adapters: adapters.into_iter().map(|a| (a.stage(), a)).collect(),
        }
    }

    /// Returns the adapter for a stage.
    ///
    /// # Panics
    ///
    /// Never panics for registries built with
    /// [`AdapterRegistry::with_defaults`], which covers every variant.
    #[must_use]
    pub fn get(&self, stage: StageKind) -> Arc<dyn StageAdapter> {
        Arc::clone(
            self.adapters
                .get(&stage)
                .unwrap_or_else(|| unreachable!("adapter registered for every stage")),
        )
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("stages", &self.adapters.len())
            .finish()
    }
}
