//! Voice parameters and conversation scripts.
//!
//! A `Script` is the persona handed to the realtime session: behavioral
//! instructions plus the voice it should speak with. Scripts are versioned so
//! that stored interactions and evaluations can be traced back to the exact
//! wording the agent was running.

use serde::{Deserialize, Serialize};

/// Voice configuration for the realtime session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceParams {
    /// Provider voice name.
    pub voice: String,
    /// Sampling temperature for spoken responses.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_temperature() -> f32 {
    0.8
}

impl Default for VoiceParams {
    fn default() -> Self {
        Self {
            voice: "alloy".to_string(),
            temperature: default_temperature(),
        }
    }
}

/// A conversation script selected per call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    /// Logical identifier, e.g. `inbound_unqualified`.
    pub id: String,
    /// Version tag recorded alongside every interaction using this script.
    pub version: String,
    /// Behavioral instructions for the realtime model.
    pub instructions: String,
    #[serde(flatten)]
    pub voice: VoiceParams,
}

impl Script {
    /// Identifier stored with interactions: `<id>@<version>`.
    pub fn version_id(&self) -> String {
        format!("{}@{}", self.id, self.version)
    }

    /// Returns a copy with an extra paragraph appended to the instructions.
    pub fn with_context(&self, context: &str) -> Self {
        let mut script = self.clone();
        if !context.trim().is_empty() {
            script.instructions.push_str("\n\n");
            script.instructions.push_str(context.trim());
        }
        script
    }
}
