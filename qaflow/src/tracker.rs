//! Run tracker: status, cancellation and listing for external callers.
//!
//! The tracker is storage and query only. State transitions are
//! written exclusively by the pipeline engine; reads never block on
//! in-flight work, they return the latest published snapshot.

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::cancellation::CancelToken;
use crate::core::{PipelineRun, RunStatus};

/// Filter for [`RunTracker::list`].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RunFilter {
    /// Only runs with this status.
    pub status: Option<RunStatus>,
}

impl RunFilter {
    /// Matches every run.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Matches runs with the given status.
    #[must_use]
    pub fn with_status(status: RunStatus) -> Self {
        Self {
            status: Some(status),
        }
    }

    fn matches(&self, run: &PipelineRun) -> bool {
        self.status.map_or(true, |s| run.status == s)
    }
}

struct RunEntry {
    snapshot: RwLock<PipelineRun>,
    cancel: Arc<CancelToken>,
}

/// Thread-safe registry of run snapshots.
#[derive(Default)]
pub struct RunTracker {
    runs: DashMap<Uuid, Arc<RunEntry>>,
}

impl RunTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly submitted run and returns its cancel token.
    pub(crate) fn register(&self, run: &PipelineRun) -> Arc<CancelToken> {
        let cancel = Arc::new(CancelToken::new());
        self.runs.insert(
            run.id,
            Arc::new(RunEntry {
                snapshot: RwLock::new(run.clone()),
                cancel: Arc::clone(&cancel),
            }),
        );
        cancel
    }

    /// Publishes the latest engine-side state of a run.
    pub(crate) fn publish(&self, run: &PipelineRun) {
        if let Some(entry) = self.runs.get(&run.id) {
            *entry.snapshot.write() = run.clone();
        }
    }

    /// Returns the latest recorded snapshot of a run.
    #[must_use]
    pub fn status(&self, run_id: Uuid) -> Option<PipelineRun> {
        self.runs.get(&run_id).map(|e| e.snapshot.read().clone())
    }

    /// Requests cooperative cancellation of a run.
    ///
    /// Returns false for unknown or already-terminal runs. In-flight
    /// stage calls finish naturally; the engine observes the flag at
    /// the next stage boundary.
    pub fn cancel(&self, run_id: Uuid, reason: impl Into<String>) -> bool {
        let Some(entry) = self.runs.get(&run_id) else {
            return false;
        };
        {
            let snapshot = entry.snapshot.read();
            if snapshot.status.is_terminal() {
                return false;
            }
        }
        entry.cancel.cancel(reason);
        entry.snapshot.write().cancel_requested = true;
        true
    }

    /// Lists run snapshots matching a filter, oldest first.
    #[must_use]
    pub fn list(&self, filter: RunFilter) -> Vec<PipelineRun> {
        let mut runs: Vec<PipelineRun> = self
            .runs
            .iter()
            .map(|e| e.snapshot.read().clone())
            .filter(|run| filter.matches(run))
            .collect();
        runs.sort_by_key(|run| run.created_at);
        runs
    }

    /// Removes a terminal run from the tracker.
    ///
    /// Non-terminal runs are retained and `false` is returned.
    pub fn purge(&self, run_id: Uuid) -> bool {
        let terminal = self
            .runs
            .get(&run_id)
            .is_some_and(|e| e.snapshot.read().status.is_terminal());
        if terminal {
            self.runs.remove(&run_id);
        }
        terminal
    }

    /// Number of tracked runs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    /// Returns true if no runs are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

impl std::fmt::Debug for RunTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunTracker")
            .field("runs", &self.runs.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DocumentRef, RunState};

    fn run() -> PipelineRun {
        PipelineRun::new(DocumentRef::new("doc", "content"))
    }

    #[test]
    fn test_register_and_status() {
        let tracker = RunTracker::new();
        let run = run();
        tracker.register(&run);

        let snapshot = tracker.status(run.id).unwrap();
        assert_eq!(snapshot.id, run.id);
        assert_eq!(snapshot.status, RunStatus::Pending);
    }

    #[test]
    fn test_publish_updates_snapshot() {
        let tracker = RunTracker::new();
        let mut run = run();
        tracker.register(&run);

        run.status = RunStatus::Running;
        run.transition(RunState::AnalysisPending);
        tracker.publish(&run);

        let snapshot = tracker.status(run.id).unwrap();
        assert_eq!(snapshot.status, RunStatus::Running);
        assert_eq!(snapshot.state, RunState::AnalysisPending);
    }

    #[test]
    fn test_cancel_sets_token_and_flag() {
        let tracker = RunTracker::new();
        let run = run();
        let token = tracker.register(&run);

        assert!(tracker.cancel(run.id, "operator request"));
        assert!(token.is_cancelled());
        assert!(tracker.status(run.id).unwrap().cancel_requested);
    }

    #[test]
    fn test_cancel_unknown_or_terminal_refused() {
        let tracker = RunTracker::new();
        assert!(!tracker.cancel(Uuid::new_v4(), "nope"));

        let mut run = run();
        tracker.register(&run);
        run.status = RunStatus::Succeeded;
        tracker.publish(&run);
        assert!(!tracker.cancel(run.id, "too late"));
    }

    #[test]
    fn test_list_filters_by_status() {
        let tracker = RunTracker::new();
        let mut a = run();
        let b = run();
        tracker.register(&a);
        tracker.register(&b);

        a.status = RunStatus::Succeeded;
        tracker.publish(&a);

        assert_eq!(tracker.list(RunFilter::all()).len(), 2);
        let done = tracker.list(RunFilter::with_status(RunStatus::Succeeded));
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].id, a.id);
    }

    #[test]
    fn test_purge_only_terminal_runs() {
        let tracker = RunTracker::new();
        let mut run = run();
        tracker.register(&run);

        assert!(!tracker.purge(run.id));
        assert_eq!(tracker.len(), 1);

        run.status = RunStatus::Failed;
        tracker.publish(&run);
        assert!(tracker.purge(run.id));
        assert!(tracker.is_empty());
    }
}
