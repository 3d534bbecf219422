//! Outbound transport to stage services.
//!
//! Every stage service exposes the same contract: submit a JSON job,
//! get a JSON result. The trait keeps the engine testable; the HTTP
//! implementation is what deployments use.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::config::StageEndpoint;
use crate::core::StageKind;
use crate::errors::StageError;

/// Async "submit job, get result" contract of one stage service.
#[async_trait]
pub trait StageTransport: Send + Sync {
    /// Submits a job payload to the service backing `stage` and
    /// returns its raw JSON response.
    async fn submit(&self, stage: StageKind, payload: &Value) -> Result<Value, StageError>;
}

/// HTTP transport posting jobs to configurably-addressed services.
#[derive(Debug)]
pub struct HttpStageTransport {
    client: reqwest::Client,
    endpoints: HashMap<StageKind, StageEndpoint>,
}

impl HttpStageTransport {
    /// Creates a transport from configured endpoints.
    #[must_use]
    pub fn new(endpoints: HashMap<StageKind, StageEndpoint>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoints,
        }
    }

    fn endpoint(&self, stage: StageKind) -> Result<&StageEndpoint, StageError> {
        self.endpoints
            .get(&stage)
            .ok_or_else(|| StageError::Transport {
                stage,
                message: format!("no endpoint configured for stage '{stage}'"),
            })
    }

    /// Job-submission URL for a stage.
    #[must_use]
    pub fn job_url(endpoint: &StageEndpoint) -> String {
        format!("{}/jobs", endpoint.base_url.trim_end_matches('/'))
    }

    /// Health-check URL for a stage service.
    ///
    /// Deployment tooling probes this; the engine itself never does.
    #[must_use]
    pub fn health_url(endpoint: &StageEndpoint) -> String {
        format!("{}/health", endpoint.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl StageTransport for HttpStageTransport {
    async fn submit(&self, stage: StageKind, payload: &Value) -> Result<Value, StageError> {
        let endpoint = self.endpoint(stage)?;
        let url = Self::job_url(endpoint);
        debug!(stage = %stage, url = %url, "submitting stage job");

        let mut request = self.client.post(&url).json(payload);
        if let Some(timeout_ms) = endpoint.timeout_ms {
            request = request.timeout(Duration::from_millis(timeout_ms));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                StageError::Timeout {
                    stage,
                    elapsed_ms: endpoint.timeout_ms.unwrap_or_default(),
                }
            } else {
                StageError::Transport {
                    stage,
                    message: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(StageError::Transport {
                stage,
                message: format!("service returned status {status}"),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| StageError::InvalidResponse {
                stage,
                message: format!("undecodable body: {e}"),
            })
    }
}
