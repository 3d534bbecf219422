//! Error taxonomy for the orchestration layer.
//!
//! Every failure surfaced by a stage call is classified into one of a
//! closed set of kinds so the engine can make a fallback decision and
//! attribute the failure to a specific stage and fingerprint in the
//! run record.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::core::StageKind;

/// A failure produced while executing a stage call.
#[derive(Debug, Clone, Error)]
pub enum StageError {
    /// The per-call deadline elapsed before the service responded.
    #[error("stage '{stage}' timed out after {elapsed_ms}ms")]
    Timeout {
        /// The stage being called.
        stage: StageKind,
        /// Elapsed time when the deadline fired.
        elapsed_ms: u64,
    },

    /// The service could not be reached or returned a transport-level error.
    #[error("transport error calling stage '{stage}': {message}")]
    Transport {
        /// The stage being called.
        stage: StageKind,
        /// Underlying transport error description.
        message: String,
    },

    /// The circuit for this stage service is open; the call failed fast.
    #[error("stage '{stage}' unavailable: circuit open, retry in {retry_in_ms}ms")]
    ServiceUnavailable {
        /// The stage being called.
        stage: StageKind,
        /// Milliseconds until the circuit becomes half-open.
        retry_in_ms: u64,
    },

    /// The adapter could not normalize the remote response.
    #[error("invalid response from stage '{stage}': {message}")]
    InvalidResponse {
        /// The stage being called.
        stage: StageKind,
        /// What was wrong with the payload.
        message: String,
    },

    /// A cached payload failed to deserialize; treated as a miss.
    #[error("corrupt cache entry for stage '{stage}' fingerprint '{fingerprint}'")]
    CacheCorruption {
        /// The stage the entry belonged to.
        stage: StageKind,
        /// The fingerprint of the corrupt entry.
        fingerprint: String,
    },

    /// The run was cancelled before or during this call.
    #[error("run '{run_id}' cancelled")]
    RunCancelled {
        /// The cancelled run.
        run_id: String,
    },

    /// A bounded-queue acquire was refused by the governor.
    #[error("concurrency limit exceeded for '{category}'")]
    ConcurrencyLimit {
        /// The permit category that was exhausted.
        category: String,
    },
}

impl StageError {
    /// Returns the serializable kind of this error.
    #[must_use]
    pub fn kind(&self) -> StageErrorKind {
        match self {
            Self::Timeout { .. } => StageErrorKind::Timeout,
            Self::Transport { .. } => StageErrorKind::Transport,
            Self::ServiceUnavailable { .. } => StageErrorKind::ServiceUnavailable,
            Self::InvalidResponse { .. } => StageErrorKind::InvalidResponse,
            Self::CacheCorruption { .. } => StageErrorKind::CacheCorruption,
            Self::RunCancelled { .. } => StageErrorKind::RunCancelled,
            Self::ConcurrencyLimit { .. } => StageErrorKind::ConcurrencyLimit,
        }
    }

    /// Returns true if a retry may recover this failure.
    ///
    /// Circuit-open and malformed-response failures are not retried:
    /// the former fails fast until cool-down, the latter is
    /// deterministic for the same payload.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Transport { .. })
    }
}

/// Serializable classification of a [`StageError`], attached to run
/// records for post-hoc diagnosis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageErrorKind {
    /// Per-call deadline elapsed.
    Timeout,
    /// Transport-level failure.
    Transport,
    /// Circuit open for the stage service.
    ServiceUnavailable,
    /// Adapter could not normalize the response.
    InvalidResponse,
    /// Cached payload was malformed.
    CacheCorruption,
    /// Run cancellation observed.
    RunCancelled,
    /// Governor refused a bounded acquire.
    ConcurrencyLimit,
}

impl fmt::Display for StageErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::Transport => write!(f, "transport"),
            Self::ServiceUnavailable => write!(f, "service_unavailable"),
            Self::InvalidResponse => write!(f, "invalid_response"),
            Self::CacheCorruption => write!(f, "cache_corruption"),
            Self::RunCancelled => write!(f, "run_cancelled"),
            Self::ConcurrencyLimit => write!(f, "concurrency_limit"),
        }
    }
}
