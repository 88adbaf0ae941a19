//! Interfaces to the systems a call depends on but does not own.
//!
//! The bridge only sees these traits. Production implementations live in
//! `scripts`, `records`, `calendar` and `evaluation`; tests substitute
//! in-memory fakes.

use std::sync::Arc;

use async_trait::async_trait;
use leadline_qualify::{ExtractorChain, Slots};
use leadline_store::InteractionRecord;
use leadline_types::{CallContext, CallDirection, Script, TranscriptEntry};
use leadline_voice::RealtimeConnector;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bridge::BridgeSettings;

#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("storage error: {0}")]
    Storage(#[from] leadline_store::StoreError),

    #[error("calendar error: {0}")]
    Calendar(String),

    #[error("evaluation error: {0}")]
    Evaluation(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0} is not configured")]
    Disabled(&'static str),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Picks the conversation script for a call.
///
/// Never fails: lookup problems fall back to a safe default script.
#[async_trait]
pub trait ScriptSource: Send + Sync {
    async fn script_for(&self, direction: CallDirection, context: &CallContext) -> ScriptSelection;
}

/// The script for a call plus whatever is already known about the caller.
#[derive(Debug, Clone)]
pub struct ScriptSelection {
    pub script: Script,
    /// Facts stored from earlier calls; seeded into the call's slot store.
    pub known_facts: Slots,
}

impl ScriptSelection {
    /// A script for a caller nothing is known about.
    pub fn fresh(script: Script) -> Self {
        Self {
            script,
            known_facts: Slots::default(),
        }
    }
}

/// Durable record keeping for calls and leads.
#[async_trait]
pub trait InteractionStore: Send + Sync {
    /// Persists a finished call and returns the new record id.
    async fn record_interaction(&self, record: InteractionRecord)
        -> Result<String, CollaboratorError>;

    /// Stores the qualification facts learned about `entity_id`.
    async fn update_facts(&self, entity_id: &str, facts: &Slots) -> Result<(), CollaboratorError>;
}

/// A bookable time window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableSlot {
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRequest {
    pub start_time: String,
    pub attendee_name: Option<String>,
    pub attendee_phone: Option<String>,
    pub notes: Option<String>,
    pub call_id: String,
}

/// Appointment scheduling. Only called once the booking guard allows it.
#[async_trait]
pub trait Calendar: Send + Sync {
    async fn find_availability(&self, days_ahead: u32)
        -> Result<Vec<AvailableSlot>, CollaboratorError>;

    /// Creates the appointment and returns the provider's event id.
    async fn create_event(&self, request: &BookingRequest) -> Result<String, CollaboratorError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRequest {
    pub interaction_id: String,
    pub call_id: String,
    pub script_version: String,
    pub transcript: Vec<TranscriptEntry>,
}

/// Post-call quality scoring.
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate_call(&self, request: EvaluationRequest) -> Result<(), CollaboratorError>;
}

/// Runs an evaluation in the background. Failures are logged only.
pub fn spawn_evaluation(evaluator: Arc<dyn Evaluator>, request: EvaluationRequest) {
    tokio::spawn(async move {
        let interaction_id = request.interaction_id.clone();
        if let Err(e) = evaluator.evaluate_call(request).await {
            tracing::error!(%interaction_id, error = %e, "call evaluation failed");
        }
    });
}

/// Everything a call bridge needs from the outside world.
#[derive(Clone)]
pub struct CallServices {
    pub scripts: Arc<dyn ScriptSource>,
    pub store: Arc<dyn InteractionStore>,
    pub calendar: Arc<dyn Calendar>,
    pub evaluator: Arc<dyn Evaluator>,
    pub extractor: ExtractorChain,
    pub realtime: Arc<dyn RealtimeConnector>,
    pub settings: BridgeSettings,
}
