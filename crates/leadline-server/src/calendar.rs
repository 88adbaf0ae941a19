//! Calendar collaborator over a small JSON HTTP API.
//!
//! `GET {base_url}/availability?days_ahead=N` returns `{"slots": [...]}` and
//! `POST {base_url}/events` returns `{"id": "..."}`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::collaborators::{AvailableSlot, BookingRequest, Calendar, CollaboratorError};

fn default_timeout_ms() -> u64 {
    5_000
}

#[derive(Clone, Serialize, Deserialize)]
pub struct CalendarConfig {
    /// Empty disables booking.
    #[serde(default)]
    pub base_url: String,
    #[serde(default, skip_serializing)]
    pub api_key: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl std::fmt::Debug for CalendarConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CalendarConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

#[derive(Deserialize)]
struct AvailabilityResponse {
    #[serde(default)]
    slots: Vec<AvailableSlot>,
}

#[derive(Deserialize)]
struct EventResponse {
    id: String,
}

pub struct HttpCalendar {
    client: reqwest::Client,
    config: CalendarConfig,
}

impl HttpCalendar {
    pub fn new(config: CalendarConfig) -> Result<Self, CollaboratorError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.config.api_key.is_empty() {
            request
        } else {
            request.bearer_auth(&self.config.api_key)
        }
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, CollaboratorError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(CollaboratorError::Calendar(format!("{status}: {body}")))
}

#[async_trait]
impl Calendar for HttpCalendar {
    async fn find_availability(
        &self,
        days_ahead: u32,
    ) -> Result<Vec<AvailableSlot>, CollaboratorError> {
        let response = self
            .authorized(self.client.get(self.url("availability")))
            .query(&[("days_ahead", days_ahead)])
            .send()
            .await?;
        let body: AvailabilityResponse = check_status(response).await?.json().await?;
        Ok(body.slots)
    }

    async fn create_event(&self, request: &BookingRequest) -> Result<String, CollaboratorError> {
        let response = self
            .authorized(self.client.post(self.url("events")))
            .json(request)
            .send()
            .await?;
        let body: EventResponse = check_status(response).await?.json().await?;
        tracing::info!(event_id = %body.id, call_id = %request.call_id, "calendar event created");
        Ok(body.id)
    }
}

/// Used when no calendar is configured.
#[derive(Debug, Default)]
pub struct DisabledCalendar;

#[async_trait]
impl Calendar for DisabledCalendar {
    async fn find_availability(&self, _: u32) -> Result<Vec<AvailableSlot>, CollaboratorError> {
        Err(CollaboratorError::Disabled("calendar"))
    }

    async fn create_event(&self, _: &BookingRequest) -> Result<String, CollaboratorError> {
        Err(CollaboratorError::Disabled("calendar"))
    }
}

pub fn calendar_from_config(config: &CalendarConfig) -> Result<Arc<dyn Calendar>, CollaboratorError> {
    if config.base_url.is_empty() {
        tracing::warn!("calendar.base_url is empty, booking is disabled");
        return Ok(Arc::new(DisabledCalendar));
    }
    Ok(Arc::new(HttpCalendar::new(config.clone())?))
}
