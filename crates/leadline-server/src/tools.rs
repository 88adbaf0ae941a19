//! Function tools offered to the realtime model and their result payloads.

use leadline_qualify::{next_prompt, BlockReason};
use leadline_types::CallOutcome;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::collaborators::AvailableSlot;

pub const RECORD_OFFER_PRESENTED: &str = "record_offer_presented";
pub const RECORD_QUESTIONS_CLOSED: &str = "record_questions_closed";
pub const CHECK_AVAILABILITY: &str = "check_availability";
pub const BOOK_APPOINTMENT: &str = "book_appointment";
pub const SAVE_CALL_RECORD: &str = "save_call_record";

const DEFAULT_DAYS_AHEAD: u32 = 7;
const MAX_DAYS_AHEAD: u32 = 30;

/// Spoken when a collaborator cannot be reached.
pub const FOLLOW_UP_APOLOGY: &str = "I'm sorry, I can't reach our scheduling system right now. \
A specialist will follow up with you to set up a time.";

/// Realtime `session.update` tool definitions.
pub fn definitions() -> Vec<Value> {
    let outcomes: Vec<&str> = [
        CallOutcome::Booked,
        CallOutcome::Qualified,
        CallOutcome::NotQualified,
        CallOutcome::NotInterested,
        CallOutcome::FollowUp,
    ]
    .iter()
    .map(|o| o.as_str())
    .collect();

    vec![
        json!({
            "type": "function",
            "name": RECORD_OFFER_PRESENTED,
            "description": "Call right after you have explained the offer terms to the caller.",
            "parameters": { "type": "object", "properties": {} }
        }),
        json!({
            "type": "function",
            "name": RECORD_QUESTIONS_CLOSED,
            "description": "Call when the caller has no more questions about the offer.",
            "parameters": { "type": "object", "properties": {} }
        }),
        json!({
            "type": "function",
            "name": CHECK_AVAILABILITY,
            "description": "List open consultation times.",
            "parameters": {
                "type": "object",
                "properties": {
                    "days_ahead": { "type": "integer", "minimum": 1, "maximum": MAX_DAYS_AHEAD }
                }
            }
        }),
        json!({
            "type": "function",
            "name": BOOK_APPOINTMENT,
            "description": "Book a consultation at a time the caller accepted.",
            "parameters": {
                "type": "object",
                "properties": {
                    "start_time": { "type": "string", "description": "RFC 3339 start time" },
                    "attendee_name": { "type": "string" },
                    "notes": { "type": "string" }
                },
                "required": ["start_time"]
            }
        }),
        json!({
            "type": "function",
            "name": SAVE_CALL_RECORD,
            "description": "Save the outcome of the call before saying goodbye.",
            "parameters": {
                "type": "object",
                "properties": {
                    "outcome": { "type": "string", "enum": outcomes },
                    "summary": { "type": "string" }
                },
                "required": ["outcome"]
            }
        }),
    ]
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AvailabilityArgs {
    #[serde(default)]
    pub days_ahead: Option<u32>,
}

impl AvailabilityArgs {
    pub fn days_ahead(&self) -> u32 {
        self.days_ahead
            .unwrap_or(DEFAULT_DAYS_AHEAD)
            .clamp(1, MAX_DAYS_AHEAD)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BookingArgs {
    pub start_time: String,
    #[serde(default)]
    pub attendee_name: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SaveArgs {
    pub outcome: CallOutcome,
    #[serde(default)]
    pub summary: Option<String>,
}

/// A parsed tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCall {
    RecordOfferPresented,
    RecordQuestionsClosed,
    CheckAvailability(AvailabilityArgs),
    BookAppointment(BookingArgs),
    SaveCallRecord(SaveArgs),
    Unknown(String),
}

impl ToolCall {
    /// Parses a tool name and its JSON argument string. Empty arguments
    /// count as `{}`.
    pub fn parse(name: &str, arguments: &str) -> Result<Self, serde_json::Error> {
        let arguments = if arguments.trim().is_empty() {
            "{}"
        } else {
            arguments
        };
        Ok(match name {
            RECORD_OFFER_PRESENTED => Self::RecordOfferPresented,
            RECORD_QUESTIONS_CLOSED => Self::RecordQuestionsClosed,
            CHECK_AVAILABILITY => Self::CheckAvailability(serde_json::from_str(arguments)?),
            BOOK_APPOINTMENT => Self::BookAppointment(serde_json::from_str(arguments)?),
            SAVE_CALL_RECORD => Self::SaveCallRecord(serde_json::from_str(arguments)?),
            other => Self::Unknown(other.to_string()),
        })
    }

    /// Whether the booking guard must pass before this call runs.
    pub fn is_guarded(&self) -> bool {
        matches!(self, Self::CheckAvailability(_) | Self::BookAppointment(_))
    }
}

pub fn ok() -> Value {
    json!({ "status": "ok" })
}

pub fn error(message: impl Into<String>) -> Value {
    json!({ "status": "error", "message": message.into() })
}

pub fn unknown_tool() -> Value {
    error("unknown tool")
}

/// Collaborator failure, with the line the agent should say instead.
pub fn unavailable() -> Value {
    json!({ "status": "unavailable", "message": FOLLOW_UP_APOLOGY })
}

/// Structured refusal for a guarded tool.
pub fn not_eligible(reason: BlockReason) -> Value {
    match reason {
        BlockReason::MissingSlot(slot) => json!({
            "status": "not_eligible",
            "reason": reason.as_str(),
            "missing_slot": slot.as_str(),
            "next_question": next_prompt(slot),
        }),
        BlockReason::OfferNotPresented => json!({
            "status": "not_eligible",
            "reason": reason.as_str(),
        }),
    }
}

pub fn availability(slots: &[AvailableSlot]) -> Value {
    json!({ "status": "ok", "slots": slots })
}

pub fn booked(event_id: &str, start_time: &str) -> Value {
    json!({ "status": "booked", "event_id": event_id, "start_time": start_time })
}

pub fn already_booked(event_id: &str) -> Value {
    json!({ "status": "already_booked", "event_id": event_id })
}

pub fn saved(interaction_id: &str) -> Value {
    json!({ "status": "saved", "interaction_id": interaction_id })
}

pub fn already_saved() -> Value {
    json!({ "status": "already_saved" })
}
