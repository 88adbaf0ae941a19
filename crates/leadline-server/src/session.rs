//! Per-call state owned by the bridge.

use leadline_qualify::QualificationState;
use leadline_store::InteractionRecord;
use leadline_types::{CallContext, CallOutcome, Script};
use leadline_voice::TranscriptAccumulator;
use serde_json::json;

use crate::collaborators::EvaluationRequest;
use crate::lifecycle::LifecycleGuard;

/// Script version recorded when a call ends before a script was chosen.
pub const UNASSIGNED_SCRIPT: &str = "unassigned";

/// One phone call: its context, qualification progress and transcript.
///
/// Only the bridge holds a `CallSession`; it is dropped when the call closes.
#[derive(Debug)]
pub struct CallSession {
    pub call_id: String,
    pub context: CallContext,
    pub script_version: String,
    pub qualification: QualificationState,
    pub transcript: TranscriptAccumulator,
    pub guard: LifecycleGuard,
    pub booked_event_id: Option<String>,
    pub summary: Option<String>,
    pub interaction_id: Option<String>,
}

impl CallSession {
    pub fn new(call_id: impl Into<String>, context: CallContext, script: Option<&Script>) -> Self {
        Self {
            call_id: call_id.into(),
            context,
            script_version: script
                .map(Script::version_id)
                .unwrap_or_else(|| UNASSIGNED_SCRIPT.to_string()),
            qualification: QualificationState::new(),
            transcript: TranscriptAccumulator::new(),
            guard: LifecycleGuard::new(),
            booked_event_id: None,
            summary: None,
            interaction_id: None,
        }
    }

    /// Snapshot of the call as it stands, with the given outcome.
    pub fn record(&self, outcome: CallOutcome) -> InteractionRecord {
        let q = &self.qualification;
        InteractionRecord {
            call_id: self.call_id.clone(),
            direction: self.context.direction,
            counterpart: self.context.counterpart().map(str::to_string),
            outcome,
            script_version: self.script_version.clone(),
            transcript: self.transcript.entries().to_vec(),
            facts: q.slots().clone(),
            metadata: json!({
                "phase": q.phase(),
                "offer_presented": q.offer_presented(),
                "questions_closed": q.questions_closed(),
                "missing_slot": q.missing_slot(),
                "booked_event_id": self.booked_event_id,
                "summary": self.summary,
                "provider_call_id": self.context.provider_call_id,
                "stream_id": self.context.stream_id,
                "context_defaulted": self.context.defaulted,
            }),
        }
    }

    pub fn evaluation_request(&self, interaction_id: &str) -> EvaluationRequest {
        EvaluationRequest {
            interaction_id: interaction_id.to_string(),
            call_id: self.call_id.clone(),
            script_version: self.script_version.clone(),
            transcript: self.transcript.entries().to_vec(),
        }
    }
}
