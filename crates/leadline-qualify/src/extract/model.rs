//! Language-model extraction over an OpenAI-compatible chat completions API.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

use super::SlotExtractor;
use crate::error::ExtractError;
use crate::slots::{MortgageStatus, SlotName, Slots};

fn default_api_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_timeout_ms() -> u64 {
    8_000
}

/// Connection settings for [`ModelExtractor`].
#[derive(Clone, Serialize, Deserialize)]
pub struct ModelExtractorConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Empty disables the model strategy.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ModelExtractorConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key: String::new(),
            model: default_model(),
            temperature: 0.0,
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl std::fmt::Debug for ModelExtractorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelExtractorConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

const SYSTEM_PROMPT: &str = "You extract qualification facts from one utterance of a phone \
caller. Only report facts the caller states in this utterance; use null for anything not \
stated. Amounts are whole US dollars. age_over_threshold is true when the caller is 62 or \
older. mortgage_status is \"paid_off\" or \"has_balance\".";

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// Extracts slots with a structured-output model call.
pub struct ModelExtractor {
    client: reqwest::Client,
    config: ModelExtractorConfig,
}

impl ModelExtractor {
    pub fn new(config: ModelExtractorConfig) -> Result<Self, ExtractError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self { client, config })
    }

    fn request_body(&self, utterance: &str, prior: &Slots) -> Value {
        let known = serde_json::to_string(prior).unwrap_or_default();
        json!({
            "model": self.config.model,
            "temperature": self.config.temperature,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "system", "content": format!("Facts already known: {known}") },
                { "role": "user", "content": utterance },
            ],
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": "qualification_slots",
                    "strict": true,
                    "schema": slot_schema(),
                }
            }
        })
    }
}

fn slot_schema() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "required": SlotName::ALL.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
        "properties": {
            "purpose": { "type": ["string", "null"] },
            "age_over_threshold": { "type": ["boolean", "null"] },
            "is_primary_residence": { "type": ["boolean", "null"] },
            "mortgage_status": { "type": ["string", "null"], "enum": ["paid_off", "has_balance", null] },
            "estimated_property_value": { "type": ["number", "null"] },
            "estimated_mortgage_balance": { "type": ["number", "null"] },
        }
    })
}

fn amount(object: &Map<String, Value>, key: &str) -> Result<Option<u64>, ExtractError> {
    match object.get(key) {
        Some(Value::Null) | None => Ok(None),
        Some(Value::Number(n)) => match n.as_f64() {
            Some(v) if v >= 0.0 && v.is_finite() => Ok(Some(v.round() as u64)),
            _ => Err(ExtractError::Malformed(format!("{key} is not a valid amount"))),
        },
        Some(_) => Err(ExtractError::Malformed(format!("{key} is not a number"))),
    }
}

fn flag(object: &Map<String, Value>, key: &str) -> Result<Option<bool>, ExtractError> {
    match object.get(key) {
        Some(Value::Null) | None => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(ExtractError::Malformed(format!("{key} is not a boolean"))),
    }
}

/// Parses the model's JSON content into slots.
///
/// Every slot key must be present; a missing key means the model ignored the
/// schema and the whole result is rejected.
pub fn parse_slots(content: &str) -> Result<Slots, ExtractError> {
    let value: Value = serde_json::from_str(content)
        .map_err(|e| ExtractError::Malformed(format!("content is not JSON: {e}")))?;
    let Value::Object(object) = value else {
        return Err(ExtractError::Malformed("content is not an object".to_string()));
    };

    if let Some(missing) = SlotName::ALL
        .iter()
        .find(|slot| !object.contains_key(slot.as_str()))
    {
        return Err(ExtractError::Malformed(format!("missing key {missing}")));
    }

    let purpose = match object.get("purpose") {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::String(_)) | Some(Value::Null) | None => None,
        Some(_) => return Err(ExtractError::Malformed("purpose is not a string".to_string())),
    };

    let mortgage_status = match object.get("mortgage_status") {
        Some(Value::String(s)) => match s.as_str() {
            "paid_off" => Some(MortgageStatus::PaidOff),
            "has_balance" => Some(MortgageStatus::HasBalance),
            other => {
                return Err(ExtractError::Malformed(format!(
                    "unknown mortgage_status {other:?}"
                )))
            }
        },
        Some(Value::Null) | None => None,
        Some(_) => {
            return Err(ExtractError::Malformed(
                "mortgage_status is not a string".to_string(),
            ))
        }
    };

    Ok(Slots {
        purpose,
        age_over_threshold: flag(&object, "age_over_threshold")?,
        is_primary_residence: flag(&object, "is_primary_residence")?,
        mortgage_status,
        estimated_property_value: amount(&object, "estimated_property_value")?,
        estimated_mortgage_balance: amount(&object, "estimated_mortgage_balance")?,
    })
}

#[async_trait]
impl SlotExtractor for ModelExtractor {
    fn name(&self) -> &'static str {
        "model"
    }

    async fn extract(&self, utterance: &str, prior: &Slots) -> Result<Slots, ExtractError> {
        if self.config.api_key.is_empty() {
            return Err(ExtractError::Disabled("no extractor api key".to_string()));
        }

        let url = format!(
            "{}/chat/completions",
            self.config.api_url.trim_end_matches('/')
        );
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&self.request_body(utterance, prior))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractError::Upstream(format!("{status}: {body}")));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| ExtractError::Malformed(format!("unexpected response shape: {e}")))?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ExtractError::Malformed("response has no content".to_string()))?;

        debug!(len = content.len(), "model extraction received");
        parse_slots(&content)
    }
}
