//! Concurrency governor bounding pipeline runs and scenario-level
//! stage calls.
//!
//! Two independent pools: one for concurrently active runs, one for
//! scenario-level generation/execution calls within and across runs.
//! Permits are scoped: dropping a [`Permit`] releases its slot, so
//! every exit path (success, failure, cancellation) releases and the
//! governor can never deadlock.

use std::fmt;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::GovernorConfig;
use crate::errors::StageError;

/// Which bounded pool a permit belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PermitCategory {
    /// A whole pipeline run.
    Run,
    /// One scenario-level stage call.
    StageCall,
}

impl fmt::Display for PermitCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Run => write!(f, "run"),
            Self::StageCall => write!(f, "stage_call"),
        }
    }
}

/// A held concurrency slot. Released on drop.
#[derive(Debug)]
pub struct Permit {
    _permit: OwnedSemaphorePermit,
    category: PermitCategory,
}

impl Permit {
    /// The pool this permit came from.
    #[must_use]
    pub fn category(&self) -> PermitCategory {
        self.category
    }
}

/// Bounded concurrency pools shared by all runs.
#[derive(Debug)]
pub struct Governor {
    runs: Arc<Semaphore>,
    calls: Arc<Semaphore>,
    config: GovernorConfig,
}

impl Governor {
    /// Creates a governor with the configured bounds.
    #[must_use]
    pub fn new(config: GovernorConfig) -> Self {
        Self {
            runs: Arc::new(Semaphore::new(config.max_runs)),
            calls: Arc::new(Semaphore::new(config.max_stage_calls)),
            config,
        }
    }

    fn pool(&self, category: PermitCategory) -> &Arc<Semaphore> {
        match category {
            PermitCategory::Run => &self.runs,
            PermitCategory::StageCall => &self.calls,
        }
    }

    /// Waits for a slot in the category's pool.
    pub async fn acquire(&self, category: PermitCategory) -> Permit {
        // The semaphores are never closed, so acquisition cannot fail.
        let permit = Arc::clone(self.pool(category))
            .acquire_owned()
            .await
            .unwrap_or_else(|_| unreachable!("governor semaphores are never closed"));
        Permit {
            _permit: permit,
            category,
        }
    }

    /// Takes a slot immediately or refuses with
    /// [`StageError::ConcurrencyLimit`].
    pub fn try_acquire(&self, category: PermitCategory) -> Result<Permit, StageError> {
        Arc::clone(self.pool(category))
            .try_acquire_owned()
            .map(|permit| Permit {
                _permit: permit,
                category,
            })
            .map_err(|_| StageError::ConcurrencyLimit {
                category: category.to_string(),
            })
    }

    /// Number of currently held permits in a category.
    #[must_use]
    pub fn active(&self, category: PermitCategory) -> usize {
        self.limit(category) - self.pool(category).available_permits()
    }

    /// Configured bound for a category.
    #[must_use]
    pub fn limit(&self, category: PermitCategory) -> usize {
        match category {
            PermitCategory::Run => self.config.max_runs,
            PermitCategory::StageCall => self.config.max_stage_calls,
        }
    }
}
