//! Post-call evaluation collaborator.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::collaborators::{CollaboratorError, EvaluationRequest, Evaluator};

fn default_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Empty turns evaluation into a logged no-op.
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Posts the evaluation request as JSON.
pub struct HttpEvaluator {
    client: reqwest::Client,
    url: String,
}

impl HttpEvaluator {
    pub fn new(config: &EvaluationConfig) -> Result<Self, CollaboratorError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }
}

#[async_trait]
impl Evaluator for HttpEvaluator {
    async fn evaluate_call(&self, request: EvaluationRequest) -> Result<(), CollaboratorError> {
        let response = self.client.post(&self.url).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CollaboratorError::Evaluation(format!(
                "evaluator returned {status}"
            )));
        }
        tracing::info!(interaction_id = %request.interaction_id, "call evaluation submitted");
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct NoopEvaluator;

#[async_trait]
impl Evaluator for NoopEvaluator {
    async fn evaluate_call(&self, request: EvaluationRequest) -> Result<(), CollaboratorError> {
        tracing::debug!(
            interaction_id = %request.interaction_id,
            "evaluation not configured, skipping"
        );
        Ok(())
    }
}

pub fn evaluator_from_config(
    config: &EvaluationConfig,
) -> Result<Arc<dyn Evaluator>, CollaboratorError> {
    if config.url.is_empty() {
        return Ok(Arc::new(NoopEvaluator));
    }
    Ok(Arc::new(HttpEvaluator::new(config)?))
}
