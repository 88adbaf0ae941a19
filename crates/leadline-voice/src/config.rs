use serde::{Deserialize, Serialize};
use std::fmt;

fn default_url() -> String {
    "wss://api.openai.com/v1/realtime".to_string()
}

fn default_model() -> String {
    "gpt-4o-realtime-preview".to_string()
}

fn default_audio_format() -> String {
    "g711_ulaw".to_string()
}

fn default_transcription_model() -> String {
    "whisper-1".to_string()
}

fn default_threshold() -> f32 {
    0.5
}

fn default_prefix_padding_ms() -> u32 {
    300
}

fn default_silence_duration_ms() -> u32 {
    500
}

/// Server-side voice activity detection thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnDetectionConfig {
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    #[serde(default = "default_prefix_padding_ms")]
    pub prefix_padding_ms: u32,
    #[serde(default = "default_silence_duration_ms")]
    pub silence_duration_ms: u32,
}

impl Default for TurnDetectionConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            prefix_padding_ms: default_prefix_padding_ms(),
            silence_duration_ms: default_silence_duration_ms(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default, skip_serializing)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Audio codec on both legs. The telephony side speaks the same codec,
    /// so audio is passed through without transcoding.
    #[serde(default = "default_audio_format")]
    pub audio_format: String,
    #[serde(default = "default_transcription_model")]
    pub transcription_model: String,
    #[serde(default)]
    pub turn_detection: TurnDetectionConfig,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            api_key: String::new(),
            model: default_model(),
            audio_format: default_audio_format(),
            transcription_model: default_transcription_model(),
            turn_detection: TurnDetectionConfig::default(),
        }
    }
}

impl fmt::Debug for RealtimeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealtimeConfig")
            .field("url", &self.url)
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("audio_format", &self.audio_format)
            .field("transcription_model", &self.transcription_model)
            .field("turn_detection", &self.turn_detection)
            .finish()
    }
}

impl RealtimeConfig {
    pub fn is_enabled(&self) -> bool {
        !self.url.is_empty()
    }

    /// WebSocket URL including the model query parameter.
    pub fn endpoint(&self) -> String {
        if self.url.contains('?') {
            format!("{}&model={}", self.url, self.model)
        } else {
            format!("{}?model={}", self.url, self.model)
        }
    }
}
