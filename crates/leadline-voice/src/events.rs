//! Typed event shapes for both legs of a call.
//!
//! Telephony frames arrive as binary audio or JSON control messages tagged by
//! `event`. Realtime server events are tagged by `type`. Anything unknown maps
//! to an `Unrecognized` variant that callers ignore.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use leadline_types::{CallContext, CallDirection, Script};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::RealtimeConfig;
use crate::error::VoiceError;

// ── Telephony ──────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct StartPayload {
    #[serde(default)]
    direction: Option<String>,
    #[serde(default)]
    from: Option<String>,
    #[serde(default)]
    to: Option<String>,
    #[serde(default)]
    call_id: Option<String>,
    #[serde(default)]
    stream_id: Option<String>,
}

impl StartPayload {
    fn into_context(self) -> CallContext {
        let direction = self
            .direction
            .as_deref()
            .and_then(|d| d.parse::<CallDirection>().ok())
            .unwrap_or_default();
        CallContext {
            direction,
            from: self.from.filter(|s| !s.is_empty()),
            to: self.to.filter(|s| !s.is_empty()),
            provider_call_id: self.call_id,
            stream_id: self.stream_id,
            defaulted: false,
        }
    }
}

/// An inbound message on the telephony media stream.
#[derive(Debug, Clone, PartialEq)]
pub enum TelephonyEvent {
    /// Call metadata; may never arrive.
    Start(CallContext),
    /// Graceful hang-up.
    Stop,
    /// Opaque audio payload.
    Audio(Vec<u8>),
    /// Known-but-ignored (`mark`) or unknown control frames.
    Unrecognized(String),
}

impl TelephonyEvent {
    /// Binary frames are audio and are never inspected.
    pub fn from_binary(bytes: Vec<u8>) -> Self {
        Self::Audio(bytes)
    }

    /// Parses a text control frame. Unparseable text is `Unrecognized`.
    pub fn from_text(text: &str) -> Self {
        let Ok(Value::Object(mut object)) = serde_json::from_str::<Value>(text) else {
            return Self::Unrecognized("invalid json".to_string());
        };
        let tag = object
            .get("event")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        match tag.as_str() {
            "start" => {
                let payload = object
                    .remove("start")
                    .and_then(|v| serde_json::from_value::<StartPayload>(v).ok())
                    .unwrap_or_default();
                Self::Start(payload.into_context())
            }
            "stop" => Self::Stop,
            _ => Self::Unrecognized(tag),
        }
    }
}

/// A message the bridge sends back to the telephony provider.
#[derive(Debug, Clone, PartialEq)]
pub enum TelephonyOutbound {
    Audio(Vec<u8>),
    /// Flush buffered agent audio on barge-in.
    Clear,
    /// Close the media stream.
    Close,
}

impl TelephonyOutbound {
    /// JSON body for control frames; `None` for audio and close.
    pub fn control_text(&self) -> Option<String> {
        match self {
            Self::Clear => Some(r#"{"event":"clear"}"#.to_string()),
            Self::Audio(_) | Self::Close => None,
        }
    }
}

// ── Realtime server events ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResponseOutputItem {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResponseInfo {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub output: Vec<ResponseOutputItem>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ErrorInfo {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub code: Option<String>,
}

/// Events received from the realtime AI session.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum RealtimeEvent {
    #[serde(rename = "session.created")]
    SessionCreated,
    #[serde(rename = "session.updated")]
    SessionUpdated,
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    CallerTranscriptCompleted { item_id: String, transcript: String },
    #[serde(rename = "conversation.item.input_audio_transcription.failed")]
    CallerTranscriptFailed { item_id: String },
    #[serde(rename = "response.audio_transcript.delta")]
    AgentTranscriptDelta { item_id: String, delta: String },
    #[serde(rename = "response.audio_transcript.done")]
    AgentTranscriptDone { item_id: String },
    #[serde(rename = "response.audio.delta")]
    AudioDelta { delta: String },
    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted,
    #[serde(rename = "response.done")]
    ResponseDone { response: ResponseInfo },
    #[serde(rename = "response.function_call_arguments.done")]
    FunctionCallArgumentsDone {
        call_id: String,
        name: String,
        arguments: String,
    },
    #[serde(rename = "error")]
    Error { error: ErrorInfo },
    #[serde(other)]
    Unrecognized,
}

impl RealtimeEvent {
    /// Parses a server event. Malformed JSON is a protocol error; well-formed
    /// events of unknown type are `Unrecognized`.
    pub fn parse(text: &str) -> Result<Self, VoiceError> {
        Ok(serde_json::from_str(text)?)
    }

    /// True for events that mean the session accepted its configuration.
    pub fn is_session_ready(&self) -> bool {
        matches!(self, Self::SessionCreated | Self::SessionUpdated)
    }

    /// Output item ids abandoned by a cancelled response.
    pub fn cancelled_items(&self) -> Vec<String> {
        match self {
            Self::ResponseDone { response } if response.status == "cancelled" => {
                response.output.iter().map(|item| item.id.clone()).collect()
            }
            _ => Vec::new(),
        }
    }
}

/// Decodes a base64 audio delta.
pub fn decode_audio(delta: &str) -> Result<Vec<u8>, VoiceError> {
    BASE64
        .decode(delta)
        .map_err(|e| VoiceError::Protocol(format!("bad audio payload: {e}")))
}

// ── Realtime client events ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptionSettings {
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnDetection {
    #[serde(rename = "type")]
    pub kind: String,
    pub threshold: f32,
    pub prefix_padding_ms: u32,
    pub silence_duration_ms: u32,
}

/// Partial session configuration; unset fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modalities: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_audio_format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<TranscriptionSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_detection: Option<TurnDetection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationItem {
    Message {
        role: String,
        content: Vec<ContentPart>,
    },
    FunctionCallOutput {
        call_id: String,
        output: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResponseSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

/// Events sent to the realtime AI session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionSettings },
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioAppend { audio: String },
    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate { item: ConversationItem },
    #[serde(rename = "response.create")]
    ResponseCreate {
        #[serde(skip_serializing_if = "Option::is_none")]
        response: Option<ResponseSettings>,
    },
    #[serde(rename = "response.cancel")]
    ResponseCancel,
}

impl ClientEvent {
    /// First configuration: persona and voice only.
    pub fn persona(script: &Script) -> Self {
        Self::SessionUpdate {
            session: SessionSettings {
                instructions: Some(script.instructions.clone()),
                voice: Some(script.voice.voice.clone()),
                temperature: Some(script.voice.temperature),
                ..SessionSettings::default()
            },
        }
    }

    /// Sent once the session is ready: audio formats, transcription, VAD, tools.
    pub fn enable_listening(config: &RealtimeConfig, tools: Vec<Value>) -> Self {
        let vad = &config.turn_detection;
        Self::SessionUpdate {
            session: SessionSettings {
                modalities: Some(vec!["audio".to_string(), "text".to_string()]),
                input_audio_format: Some(config.audio_format.clone()),
                output_audio_format: Some(config.audio_format.clone()),
                input_audio_transcription: Some(TranscriptionSettings {
                    model: config.transcription_model.clone(),
                }),
                turn_detection: Some(TurnDetection {
                    kind: "server_vad".to_string(),
                    threshold: vad.threshold,
                    prefix_padding_ms: vad.prefix_padding_ms,
                    silence_duration_ms: vad.silence_duration_ms,
                }),
                tool_choice: (!tools.is_empty()).then(|| "auto".to_string()),
                tools: Some(tools),
                ..SessionSettings::default()
            },
        }
    }

    pub fn append_audio(bytes: &[u8]) -> Self {
        Self::InputAudioAppend {
            audio: BASE64.encode(bytes),
        }
    }

    /// A system item injected into the conversation.
    pub fn system_message(text: impl Into<String>) -> Self {
        Self::ConversationItemCreate {
            item: ConversationItem::Message {
                role: "system".to_string(),
                content: vec![ContentPart {
                    kind: "input_text".to_string(),
                    text: text.into(),
                }],
            },
        }
    }

    pub fn tool_output(call_id: impl Into<String>, output: &Value) -> Self {
        Self::ConversationItemCreate {
            item: ConversationItem::FunctionCallOutput {
                call_id: call_id.into(),
                output: output.to_string(),
            },
        }
    }

    pub fn respond() -> Self {
        Self::ResponseCreate { response: None }
    }

    pub fn respond_with(instructions: impl Into<String>) -> Self {
        Self::ResponseCreate {
            response: Some(ResponseSettings {
                instructions: Some(instructions.into()),
            }),
        }
    }

    pub fn to_json(&self) -> Result<String, VoiceError> {
        Ok(serde_json::to_string(self)?)
    }
}
