//! Shared types for the Leadline call-qualification workspace.
//!
//! Every crate that needs to talk about a call (its direction, the parties
//! speaking, the finalized transcript, the eventual outcome) uses the types
//! defined here. Keeping them in one leaf crate means the qualification core,
//! the voice layer, and the storage layer never depend on each other just to
//! share a struct.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod voice;

pub use voice::{Script, VoiceParams};

/// Which side placed the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    /// The counterpart dialed us. Also the fallback when no call context arrives.
    #[default]
    Inbound,
    /// We dialed the counterpart.
    Outbound,
}

impl CallDirection {
    /// Returns the canonical lowercase label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        }
    }
}

impl std::fmt::Display for CallDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CallDirection {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "inbound" => Ok(Self::Inbound),
            "outbound" => Ok(Self::Outbound),
            _ => Err(ParseLabelError::new("call direction", s)),
        }
    }
}

/// Who produced a transcript turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    /// The person on the phone.
    Caller,
    /// The realtime AI voice.
    Agent,
}

impl Speaker {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Caller => "caller",
            Self::Agent => "agent",
        }
    }
}

/// One finalized turn of the conversation.
///
/// Entries are only ever created for finished turns; partial text lives in the
/// transcript accumulator until its turn closes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub speaker: Speaker,
    pub text: String,
    pub created_at: DateTime<Utc>,
    /// Provider-assigned identifier of the turn.
    pub turn_key: String,
}

impl TranscriptEntry {
    pub fn new(speaker: Speaker, text: impl Into<String>, turn_key: impl Into<String>) -> Self {
        Self {
            speaker,
            text: text.into(),
            created_at: Utc::now(),
            turn_key: turn_key.into(),
        }
    }
}

/// Telephony metadata describing one call.
///
/// Built from the provider's `start` message, or defaulted (inbound, no
/// identity) when that message does not arrive in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallContext {
    pub direction: CallDirection,
    /// Calling party identity (usually an E.164 number).
    pub from: Option<String>,
    /// Called party identity.
    pub to: Option<String>,
    /// Provider call identifier.
    pub provider_call_id: Option<String>,
    /// Provider media-stream identifier.
    pub stream_id: Option<String>,
    /// True when the context was synthesized after the wait timed out.
    #[serde(default)]
    pub defaulted: bool,
}

impl CallContext {
    /// The context used when the provider never sends call metadata.
    pub fn defaulted() -> Self {
        Self {
            defaulted: true,
            ..Self::default()
        }
    }

    /// The party on the other end of the line from our point of view.
    ///
    /// For inbound calls this is the caller (`from`), for outbound calls the
    /// dialed number (`to`).
    pub fn counterpart(&self) -> Option<&str> {
        match self.direction {
            CallDirection::Inbound => self.from.as_deref(),
            CallDirection::Outbound => self.to.as_deref(),
        }
    }
}

/// How a call ended, as recorded in the interaction log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    /// An appointment was booked.
    Booked,
    /// All facts collected but no appointment made.
    Qualified,
    /// The caller does not meet the qualification rules.
    NotQualified,
    /// The caller declined.
    NotInterested,
    /// A human follow-up was promised.
    FollowUp,
    /// The call ended before the conversation saved a record.
    Incomplete,
}

impl CallOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Booked => "booked",
            Self::Qualified => "qualified",
            Self::NotQualified => "not_qualified",
            Self::NotInterested => "not_interested",
            Self::FollowUp => "follow_up",
            Self::Incomplete => "incomplete",
        }
    }

    /// Whether the outcome counts as a positive result for evaluation.
    pub fn is_positive(self) -> bool {
        matches!(self, Self::Booked | Self::Qualified)
    }
}

impl std::fmt::Display for CallOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CallOutcome {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "booked" => Ok(Self::Booked),
            "qualified" => Ok(Self::Qualified),
            "not_qualified" => Ok(Self::NotQualified),
            "not_interested" => Ok(Self::NotInterested),
            "follow_up" => Ok(Self::FollowUp),
            "incomplete" => Ok(Self::Incomplete),
            _ => Err(ParseLabelError::new("call outcome", s)),
        }
    }
}

/// Error returned when parsing an unknown enum label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseLabelError {
    kind: &'static str,
    value: String,
}

impl ParseLabelError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

impl std::fmt::Display for ParseLabelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown {}: {}", self.kind, self.value)
    }
}

impl std::error::Error for ParseLabelError {}
