//! Transport bridge: one per call, between the telephony media stream and
//! the realtime AI session.
//!
//! Everything that happens to a call arrives as a [`BridgeInput`] on a single
//! bounded queue and is handled to completion before the next input is read.
//! That includes slot extraction results, which are computed by a per-call
//! worker and fed back through the same queue, so every mutation of the
//! [`CallSession`] happens in arrival order on one task.

use std::sync::Arc;
use std::time::Duration;

use leadline_qualify::{block_reason, next_prompt, phase_nudge, ExtractorChain, Phase, Slots};
use leadline_types::{CallContext, Speaker, TranscriptEntry};
use leadline_voice::{
    decode_audio, ClientEvent, RealtimeConfig, RealtimeEvent, RealtimeSession, TelephonyEvent,
    TelephonyOutbound,
};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use crate::collaborators::{BookingRequest, CallServices, ScriptSelection};
use crate::lifecycle::{on_ungraceful_close, persist_and_evaluate};
use crate::session::CallSession;
use crate::tools::{self, ToolCall};

/// Per-call tuning shared by every bridge.
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    /// How long to wait for the provider's call metadata.
    pub context_timeout: Duration,
    pub inbound_queue_capacity: usize,
    pub realtime: RealtimeConfig,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            context_timeout: Duration::from_secs(2),
            inbound_queue_capacity: 256,
            realtime: RealtimeConfig::default(),
        }
    }
}

/// Lifecycle states of a bridge, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BridgeState {
    AwaitingContext,
    ScriptLoaded,
    SessionConnected,
    Active,
    Closing,
    Closed,
}

impl BridgeState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AwaitingContext => "awaiting_context",
            Self::ScriptLoaded => "script_loaded",
            Self::SessionConnected => "session_connected",
            Self::Active => "active",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }
}

impl std::fmt::Display for BridgeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the bridge reacts to.
#[derive(Debug)]
pub enum BridgeInput {
    Telephony(TelephonyEvent),
    /// The media stream socket went away.
    TelephonyClosed,
    Realtime(RealtimeEvent),
    /// The realtime session went away.
    RealtimeClosed,
    /// Extraction result for a finalized caller turn.
    Extracted {
        turn_key: String,
        strategy: &'static str,
        update: Slots,
    },
}

/// Final state of a call, returned when the bridge finishes.
#[derive(Debug, Clone)]
pub struct CallReport {
    pub call_id: String,
    /// Every state the bridge entered, in order.
    pub states: Vec<BridgeState>,
    pub context: CallContext,
    pub script_version: String,
    pub transcript: Vec<TranscriptEntry>,
    pub phase: Phase,
    pub slots: Slots,
    /// True when the conversation saved the call itself.
    pub saved_explicitly: bool,
    pub interaction_id: Option<String>,
    pub booked_event_id: Option<String>,
}

impl CallReport {
    pub fn final_state(&self) -> Option<BridgeState> {
        self.states.last().copied()
    }
}

struct ExtractionJob {
    turn_key: String,
    utterance: String,
}

/// Handles held only while the realtime session is up.
struct Live {
    session: CallSession,
    realtime: mpsc::Sender<ClientEvent>,
    jobs: mpsc::UnboundedSender<ExtractionJob>,
    listening: bool,
}

enum Flow {
    Continue,
    Close(&'static str),
}

enum ContextWait {
    Known(CallContext),
    Closed,
}

pub struct Bridge {
    services: CallServices,
    call_id: String,
    inbox: mpsc::Receiver<BridgeInput>,
    inbox_tx: mpsc::WeakSender<BridgeInput>,
    outbound: mpsc::Sender<TelephonyOutbound>,
    states: Vec<BridgeState>,
    saved_explicitly: bool,
}

impl Bridge {
    /// Creates a bridge with a fresh call id.
    ///
    /// Returns the bridge, the sender the telephony side feeds, and the
    /// receiver of frames to write back to the telephony side. Dropping the
    /// returned sender counts as the telephony side closing.
    pub fn new(
        services: CallServices,
    ) -> (Self, mpsc::Sender<BridgeInput>, mpsc::Receiver<TelephonyOutbound>) {
        let capacity = services.settings.inbound_queue_capacity.max(1);
        let (inbox_tx, inbox) = mpsc::channel(capacity);
        let (outbound, outbound_rx) = mpsc::channel(capacity);
        let bridge = Self {
            services,
            call_id: Uuid::new_v4().to_string(),
            inbox,
            inbox_tx: inbox_tx.downgrade(),
            outbound,
            states: vec![BridgeState::AwaitingContext],
            saved_explicitly: false,
        };
        (bridge, inbox_tx, outbound_rx)
    }

    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    /// Drives the call to completion.
    pub async fn run(self) -> CallReport {
        let span = tracing::info_span!("call", call_id = %self.call_id);
        self.run_inner().instrument(span).await
    }

    async fn run_inner(mut self) -> CallReport {
        info!(state = %BridgeState::AwaitingContext, "call connected");

        let context = match self.await_context().await {
            ContextWait::Known(context) => context,
            ContextWait::Closed => {
                info!("telephony closed before call metadata arrived");
                let session = CallSession::new(&self.call_id, CallContext::defaulted(), None);
                return self.teardown(session).await;
            }
        };

        let ScriptSelection {
            script,
            known_facts,
        } = self
            .services
            .scripts
            .script_for(context.direction, &context)
            .await;
        let mut session = CallSession::new(&self.call_id, context, Some(&script));
        let seeded = session.qualification.merge(&known_facts);
        self.transition(BridgeState::ScriptLoaded);
        info!(
            direction = %session.context.direction,
            script = %session.script_version,
            known_slots = seeded.len(),
            "script selected"
        );

        let RealtimeSession { tx, rx } = match self.services.realtime.connect(&self.call_id).await {
            Ok(connected) => connected,
            Err(e) => {
                error!(error = %e, "realtime session failed to connect");
                return self.teardown(session).await;
            }
        };

        // Listen before configuring so nothing the session says is missed.
        let forwarder = self.spawn_forwarder(rx);
        let jobs = self.spawn_extraction_worker(session.qualification.slots().clone());
        let mut live = Live {
            session,
            realtime: tx,
            jobs,
            listening: false,
        };
        self.send_realtime(&live, ClientEvent::persona(&script)).await;
        if !seeded.is_empty() {
            self.advance(&mut live).await;
        }
        self.transition(BridgeState::SessionConnected);
        self.transition(BridgeState::Active);

        let reason = loop {
            let Some(input) = self.inbox.recv().await else {
                break "telephony closed";
            };
            if let Flow::Close(reason) = self.handle(&mut live, input).await {
                break reason;
            }
        };
        info!(reason, "call ending");

        forwarder.abort();
        let Live { session, .. } = live;
        self.teardown(session).await
    }

    fn transition(&mut self, next: BridgeState) {
        let from = self.states.last().copied();
        self.states.push(next);
        match from {
            Some(from) => info!(%from, to = %next, "bridge state changed"),
            None => info!(to = %next, "bridge state changed"),
        }
    }

    async fn await_context(&mut self) -> ContextWait {
        let deadline = tokio::time::Instant::now() + self.services.settings.context_timeout;
        let mut dropped_audio = 0usize;
        loop {
            match tokio::time::timeout_at(deadline, self.inbox.recv()).await {
                Ok(Some(BridgeInput::Telephony(TelephonyEvent::Start(context)))) => {
                    debug!(dropped_audio, "call metadata received");
                    return ContextWait::Known(context);
                }
                Ok(Some(BridgeInput::Telephony(TelephonyEvent::Stop)))
                | Ok(Some(BridgeInput::TelephonyClosed))
                | Ok(None) => return ContextWait::Closed,
                Ok(Some(BridgeInput::Telephony(TelephonyEvent::Audio(_)))) => dropped_audio += 1,
                Ok(Some(other)) => debug!(?other, "ignoring input before call metadata"),
                Err(_) => {
                    warn!(
                        timeout_ms = self.services.settings.context_timeout.as_millis() as u64,
                        "no call metadata before timeout, defaulting to inbound"
                    );
                    return ContextWait::Known(CallContext::defaulted());
                }
            }
        }
    }

    /// Pumps realtime events into the inbox, then reports the session closed.
    fn spawn_forwarder(&self, mut rx: mpsc::Receiver<RealtimeEvent>) -> JoinHandle<()> {
        let inbox = self.inbox_tx.clone();
        tokio::spawn(
            async move {
                while let Some(event) = rx.recv().await {
                    let Some(tx) = inbox.upgrade() else { return };
                    if tx.send(BridgeInput::Realtime(event)).await.is_err() {
                        return;
                    }
                }
                if let Some(tx) = inbox.upgrade() {
                    let _ = tx.send(BridgeInput::RealtimeClosed).await;
                }
            }
            .in_current_span(),
        )
    }

    /// Extracts caller turns one at a time, in the order they were queued.
    ///
    /// The worker keeps its own fill-once copy of the slots, starting from
    /// `known`, so each utterance is read against everything learned before
    /// it.
    fn spawn_extraction_worker(&self, mut known: Slots) -> mpsc::UnboundedSender<ExtractionJob> {
        let (jobs, mut queue) = mpsc::unbounded_channel::<ExtractionJob>();
        let extractor: ExtractorChain = self.services.extractor.clone();
        let inbox = self.inbox_tx.clone();
        tokio::spawn(
            async move {
                while let Some(job) = queue.recv().await {
                    let extraction = extractor.extract(&job.utterance, &known).await;
                    known.merge_unset(&extraction.slots);
                    let Some(tx) = inbox.upgrade() else { return };
                    let input = BridgeInput::Extracted {
                        turn_key: job.turn_key,
                        strategy: extraction.strategy,
                        update: extraction.slots,
                    };
                    if tx.send(input).await.is_err() {
                        return;
                    }
                }
            }
            .in_current_span(),
        );
        jobs
    }

    async fn send_realtime(&self, live: &Live, event: ClientEvent) {
        if live.realtime.send(event).await.is_err() {
            debug!("realtime session already closed, dropping client event");
        }
    }

    async fn send_telephony(&self, frame: TelephonyOutbound) {
        if self.outbound.send(frame).await.is_err() {
            debug!("telephony writer gone, dropping frame");
        }
    }

    async fn inject(&self, live: &Live, text: impl Into<String>) {
        self.send_realtime(live, ClientEvent::system_message(text)).await;
    }

    async fn handle(&mut self, live: &mut Live, input: BridgeInput) -> Flow {
        match input {
            BridgeInput::Telephony(TelephonyEvent::Audio(bytes)) => {
                self.send_realtime(live, ClientEvent::append_audio(&bytes)).await;
            }
            BridgeInput::Telephony(TelephonyEvent::Start(_)) => {
                debug!("duplicate call metadata ignored");
            }
            BridgeInput::Telephony(TelephonyEvent::Unrecognized(kind)) => {
                debug!(%kind, "unrecognized telephony event");
            }
            BridgeInput::Telephony(TelephonyEvent::Stop) => return Flow::Close("telephony hung up"),
            BridgeInput::TelephonyClosed => return Flow::Close("telephony closed"),
            BridgeInput::RealtimeClosed => {
                warn!("realtime session dropped");
                return Flow::Close("realtime session dropped");
            }
            BridgeInput::Realtime(event) => self.handle_realtime(live, event).await,
            BridgeInput::Extracted {
                turn_key,
                strategy,
                update,
            } => self.apply_extraction(live, &turn_key, strategy, update).await,
        }
        Flow::Continue
    }

    async fn handle_realtime(&mut self, live: &mut Live, event: RealtimeEvent) {
        match event {
            RealtimeEvent::SessionCreated | RealtimeEvent::SessionUpdated => {
                if !live.listening {
                    live.listening = true;
                    let enable = ClientEvent::enable_listening(
                        &self.services.settings.realtime,
                        tools::definitions(),
                    );
                    self.send_realtime(live, enable).await;
                    self.send_realtime(live, ClientEvent::respond()).await;
                    debug!("transcription and turn detection enabled");
                }
            }
            RealtimeEvent::CallerTranscriptCompleted {
                item_id,
                transcript,
            } => {
                let text = transcript.trim();
                if text.is_empty() {
                    debug!(turn_key = %item_id, "empty caller turn dropped");
                } else if live
                    .session
                    .transcript
                    .append_final(Speaker::Caller, text, &item_id)
                {
                    let job = ExtractionJob {
                        turn_key: item_id,
                        utterance: text.to_string(),
                    };
                    if live.jobs.send(job).is_err() {
                        warn!("extraction worker stopped, caller turn not extracted");
                    }
                } else {
                    debug!(turn_key = %item_id, "duplicate caller turn ignored");
                }
            }
            RealtimeEvent::CallerTranscriptFailed { item_id } => {
                warn!(turn_key = %item_id, "caller transcription failed");
            }
            RealtimeEvent::AgentTranscriptDelta { item_id, delta } => {
                live.session.transcript.accumulate_delta(&item_id, &delta);
            }
            RealtimeEvent::AgentTranscriptDone { item_id } => {
                if live.session.transcript.finish_agent_turn(&item_id).is_none() {
                    debug!(turn_key = %item_id, "empty agent turn dropped");
                }
            }
            RealtimeEvent::AudioDelta { delta } => match decode_audio(&delta) {
                Ok(bytes) => self.send_telephony(TelephonyOutbound::Audio(bytes)).await,
                Err(e) => warn!(error = %e, "undecodable agent audio dropped"),
            },
            RealtimeEvent::SpeechStarted => {
                self.send_telephony(TelephonyOutbound::Clear).await;
                let open = live.session.transcript.open_keys();
                if !open.is_empty() {
                    info!(turns = open.len(), "caller barged in, cancelling agent turn");
                    for key in &open {
                        live.session.transcript.cancel(key);
                    }
                    self.send_realtime(live, ClientEvent::ResponseCancel).await;
                }
            }
            event @ RealtimeEvent::ResponseDone { .. } => {
                for key in event.cancelled_items() {
                    debug!(turn_key = %key, "agent turn cancelled");
                    live.session.transcript.cancel(&key);
                }
            }
            RealtimeEvent::FunctionCallArgumentsDone {
                call_id,
                name,
                arguments,
            } => self.dispatch_tool(live, &call_id, &name, &arguments).await,
            RealtimeEvent::Error { error } => {
                warn!(message = %error.message, code = ?error.code, "realtime session error");
            }
            RealtimeEvent::Unrecognized => debug!("unrecognized realtime event"),
        }
    }

    /// Merges an extraction, advances the phase and steers the agent.
    async fn apply_extraction(
        &mut self,
        live: &mut Live,
        turn_key: &str,
        strategy: &'static str,
        update: Slots,
    ) {
        let was_qualified = live.session.qualification.is_qualified();
        let filled = live.session.qualification.merge(&update);
        if !filled.is_empty() {
            info!(turn_key, strategy, slots = ?filled, "slots filled");
        }
        self.advance(live).await;

        if live.session.qualification.phase() == Phase::Qualify {
            if let Some(slot) = live.session.qualification.missing_slot() {
                self.inject(live, format!("Next, ask the caller: {}", next_prompt(slot)))
                    .await;
            }
        }

        if !was_qualified && live.session.qualification.is_qualified() {
            self.persist_facts(&live.session);
        }
    }

    /// Advances the phase and injects the nudge for a newly entered phase.
    async fn advance(&self, live: &mut Live) {
        let before = live.session.qualification.phase();
        let after = live.session.qualification.advance();
        if after != before {
            info!(from = %before, to = %after, "phase changed");
            if let Some(nudge) = phase_nudge(after) {
                self.inject(live, nudge).await;
            }
        }
    }

    fn persist_facts(&self, session: &CallSession) {
        let Some(counterpart) = session.context.counterpart() else {
            debug!("qualified caller has no identity, facts not stored");
            return;
        };
        let store = Arc::clone(&self.services.store);
        let counterpart = counterpart.to_string();
        let facts = session.qualification.slots().clone();
        tokio::spawn(
            async move {
                if let Err(e) = store.update_facts(&counterpart, &facts).await {
                    warn!(error = %e, "failed to store qualification facts");
                }
            }
            .in_current_span(),
        );
    }

    /// Runs one tool call. The model always gets exactly one output and a
    /// follow-up response request.
    async fn dispatch_tool(&mut self, live: &mut Live, call_id: &str, name: &str, arguments: &str) {
        let (output, redirect) = match ToolCall::parse(name, arguments) {
            Ok(call) => self.run_tool(live, call).await,
            Err(e) => {
                warn!(tool = name, error = %e, "invalid tool arguments");
                (tools::error(format!("invalid arguments: {e}")), None)
            }
        };
        self.send_realtime(live, ClientEvent::tool_output(call_id, &output))
            .await;
        let follow_up = match redirect {
            Some(instructions) => ClientEvent::respond_with(instructions),
            None => ClientEvent::respond(),
        };
        self.send_realtime(live, follow_up).await;
    }

    async fn run_tool(&mut self, live: &mut Live, call: ToolCall) -> (Value, Option<String>) {
        if call.is_guarded() {
            if let Some(reason) = block_reason(&live.session.qualification) {
                info!(reason = %reason, "booking blocked");
                return (tools::not_eligible(reason), Some(reason.redirect_instructions()));
            }
        }

        let output = match call {
            ToolCall::RecordOfferPresented => {
                if let Err(reason) = live.session.qualification.mark_offer_presented() {
                    info!(reason = %reason, "offer cannot be presented yet");
                    return (tools::not_eligible(reason), Some(reason.redirect_instructions()));
                }
                self.advance(live).await;
                tools::ok()
            }
            ToolCall::RecordQuestionsClosed => {
                live.session.qualification.mark_questions_closed();
                self.advance(live).await;
                tools::ok()
            }
            ToolCall::CheckAvailability(args) => {
                match self.services.calendar.find_availability(args.days_ahead()).await {
                    Ok(slots) => tools::availability(&slots),
                    Err(e) => {
                        error!(error = %e, "availability lookup failed");
                        tools::unavailable()
                    }
                }
            }
            ToolCall::BookAppointment(args) => self.book(live, args).await,
            ToolCall::SaveCallRecord(args) => {
                if live.session.guard.is_finalized() {
                    return (tools::already_saved(), None);
                }
                live.session.summary = args.summary;
                match persist_and_evaluate(
                    &live.session,
                    args.outcome,
                    self.services.store.as_ref(),
                    Arc::clone(&self.services.evaluator),
                )
                .await
                {
                    Ok(id) => {
                        live.session.guard.mark_finalized();
                        self.saved_explicitly = true;
                        info!(interaction_id = %id, outcome = %args.outcome, "call record saved");
                        let output = tools::saved(&id);
                        live.session.interaction_id = Some(id);
                        output
                    }
                    Err(e) => {
                        error!(error = %e, "failed to save call record");
                        tools::error("the call record could not be saved")
                    }
                }
            }
            ToolCall::Unknown(name) => {
                warn!(tool = %name, "unknown tool requested");
                tools::unknown_tool()
            }
        };
        (output, None)
    }

    async fn book(&mut self, live: &mut Live, args: tools::BookingArgs) -> Value {
        if let Some(event_id) = &live.session.booked_event_id {
            return tools::already_booked(event_id);
        }
        if chrono::DateTime::parse_from_rfc3339(&args.start_time).is_err() {
            return tools::error("start_time must be an RFC 3339 timestamp");
        }
        let request = BookingRequest {
            start_time: args.start_time,
            attendee_name: args.attendee_name,
            attendee_phone: live.session.context.counterpart().map(str::to_string),
            notes: args.notes,
            call_id: live.session.call_id.clone(),
        };
        match self.services.calendar.create_event(&request).await {
            Ok(event_id) => {
                let before = live.session.qualification.phase();
                live.session.qualification.mark_booked();
                let after = live.session.qualification.phase();
                info!(%event_id, from = %before, to = %after, "appointment booked");
                if after != before {
                    if let Some(nudge) = phase_nudge(after) {
                        self.inject(live, nudge).await;
                    }
                }
                let output = tools::booked(&event_id, &request.start_time);
                live.session.booked_event_id = Some(event_id);
                output
            }
            Err(e) => {
                error!(error = %e, "booking failed");
                tools::unavailable()
            }
        }
    }

    async fn teardown(mut self, mut session: CallSession) -> CallReport {
        self.transition(BridgeState::Closing);

        let flushed = session.transcript.flush_open();
        if flushed > 0 {
            debug!(flushed, "open agent turns closed into the transcript");
        }
        session.qualification.end();
        self.send_telephony(TelephonyOutbound::Close).await;

        if session.guard.claim() {
            session.interaction_id = on_ungraceful_close(
                &session,
                self.services.store.as_ref(),
                Arc::clone(&self.services.evaluator),
            )
            .await;
        }

        self.transition(BridgeState::Closed);
        CallReport {
            call_id: self.call_id,
            states: self.states,
            context: session.context,
            script_version: session.script_version,
            transcript: session.transcript.into_entries(),
            phase: session.qualification.phase(),
            slots: session.qualification.slots().clone(),
            saved_explicitly: self.saved_explicitly,
            interaction_id: session.interaction_id,
            booked_event_id: session.booked_event_id,
        }
    }
}
