//! Channel-backed fakes for driving a bridge without network access.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use leadline_qualify::{ExtractError, ExtractorChain, PatternExtractor, SlotExtractor, Slots};
use leadline_server::bridge::{Bridge, BridgeInput, BridgeSettings, CallReport};
use leadline_server::collaborators::{
    AvailableSlot, BookingRequest, Calendar, CallServices, CollaboratorError, EvaluationRequest,
    Evaluator, InteractionStore, ScriptSelection, ScriptSource,
};
use leadline_store::InteractionRecord;
use leadline_types::{CallContext, CallDirection, Script, VoiceParams};
use leadline_voice::{
    ClientEvent, ConversationItem, RealtimeConnector, RealtimeEvent, RealtimeSession,
    TelephonyEvent, TelephonyOutbound, VoiceError,
};
use serde_json::Value;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

const WAIT: Duration = Duration::from_secs(5);

// ── realtime ───────────────────────────────────────────────────────────

/// The far end of one fake realtime session.
pub struct FakeRealtime {
    pub call_id: String,
    pub events: mpsc::Sender<RealtimeEvent>,
    pub client: mpsc::Receiver<ClientEvent>,
}

impl FakeRealtime {
    pub async fn send(&self, event: RealtimeEvent) {
        self.events.send(event).await.expect("bridge is listening");
    }

    pub async fn next(&mut self) -> ClientEvent {
        tokio::time::timeout(WAIT, self.client.recv())
            .await
            .expect("timed out waiting for a client event")
            .expect("session closed")
    }

    /// Skips client events until one matches.
    pub async fn until(&mut self, pred: impl Fn(&ClientEvent) -> bool) -> ClientEvent {
        loop {
            let event = self.next().await;
            if pred(&event) {
                return event;
            }
        }
    }

    /// Waits for the output of tool call `call_id`, parsed as JSON.
    pub async fn tool_output(&mut self, call_id: &str) -> Value {
        let event = self
            .until(|e| {
                matches!(
                    e,
                    ClientEvent::ConversationItemCreate {
                        item: ConversationItem::FunctionCallOutput { call_id: id, .. }
                    } if id == call_id
                )
            })
            .await;
        match event {
            ClientEvent::ConversationItemCreate {
                item: ConversationItem::FunctionCallOutput { output, .. },
            } => serde_json::from_str(&output).expect("tool output is json"),
            _ => unreachable!(),
        }
    }

    /// Waits for the next `response.create` and returns its instructions.
    pub async fn response(&mut self) -> Option<String> {
        match self
            .until(|e| matches!(e, ClientEvent::ResponseCreate { .. }))
            .await
        {
            ClientEvent::ResponseCreate { response } => response.and_then(|r| r.instructions),
            _ => unreachable!(),
        }
    }

    /// Waits for the next injected system message and returns its text.
    pub async fn system_text(&mut self) -> String {
        let event = self
            .until(|e| {
                matches!(
                    e,
                    ClientEvent::ConversationItemCreate {
                        item: ConversationItem::Message { .. }
                    }
                )
            })
            .await;
        match event {
            ClientEvent::ConversationItemCreate {
                item: ConversationItem::Message { content, .. },
            } => content.into_iter().map(|part| part.text).collect(),
            _ => unreachable!(),
        }
    }

    /// Answers the persona update the way the provider does and waits for
    /// listening to be enabled.
    pub async fn ready(&mut self) {
        self.send(RealtimeEvent::SessionCreated).await;
        self.until(|e| {
            matches!(e, ClientEvent::SessionUpdate { session } if session.tools.is_some())
        })
        .await;
        self.response().await;
    }

    pub async fn tool(&self, call_id: &str, name: &str, arguments: &str) {
        self.send(RealtimeEvent::FunctionCallArgumentsDone {
            call_id: call_id.to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        })
        .await;
    }

    pub async fn caller_says(&self, item_id: &str, text: &str) {
        self.send(RealtimeEvent::CallerTranscriptCompleted {
            item_id: item_id.to_string(),
            transcript: text.to_string(),
        })
        .await;
    }
}

/// Hands every connected session to the test.
pub struct FakeConnector {
    sessions: mpsc::UnboundedSender<FakeRealtime>,
}

impl FakeConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<FakeRealtime>) {
        let (sessions, rx) = mpsc::unbounded_channel();
        (Self { sessions }, rx)
    }
}

#[async_trait]
impl RealtimeConnector for FakeConnector {
    async fn connect(&self, call_id: &str) -> Result<RealtimeSession, VoiceError> {
        let (client_tx, client_rx) = mpsc::channel(256);
        let (events_tx, events_rx) = mpsc::channel(256);
        self.sessions
            .send(FakeRealtime {
                call_id: call_id.to_string(),
                events: events_tx,
                client: client_rx,
            })
            .map_err(|_| VoiceError::Closed)?;
        Ok(RealtimeSession {
            tx: client_tx,
            rx: events_rx,
        })
    }
}

pub struct FailingConnector;

#[async_trait]
impl RealtimeConnector for FailingConnector {
    async fn connect(&self, _: &str) -> Result<RealtimeSession, VoiceError> {
        Err(VoiceError::Connect("connection refused".to_string()))
    }
}

// ── collaborators ──────────────────────────────────────────────────────

/// Serves the unqualified or outbound script. With `known_facts` set, every
/// inbound caller is a returning lead with those facts.
#[derive(Default)]
pub struct FakeScripts {
    pub lookups: AtomicUsize,
    pub known_facts: Option<Slots>,
}

pub fn script(id: &str) -> Script {
    Script {
        id: id.to_string(),
        version: "1".to_string(),
        instructions: format!("You are running the {id} script."),
        voice: VoiceParams::default(),
    }
}

#[async_trait]
impl ScriptSource for FakeScripts {
    async fn script_for(&self, direction: CallDirection, _: &CallContext) -> ScriptSelection {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        match (direction, &self.known_facts) {
            (CallDirection::Outbound, _) => ScriptSelection::fresh(script("outbound")),
            (CallDirection::Inbound, None) => ScriptSelection::fresh(script("inbound_unqualified")),
            (CallDirection::Inbound, Some(facts)) => {
                let id = if facts.is_complete() {
                    "inbound_qualified"
                } else {
                    "inbound_unqualified"
                };
                ScriptSelection {
                    script: script(id),
                    known_facts: facts.clone(),
                }
            }
        }
    }
}

pub struct FakeStore {
    pub records: Mutex<Vec<InteractionRecord>>,
    facts: mpsc::UnboundedSender<(String, Slots)>,
    failures_left: AtomicUsize,
    pub attempts: AtomicUsize,
}

impl FakeStore {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(String, Slots)>) {
        let (facts, rx) = mpsc::unbounded_channel();
        (
            Self {
                records: Mutex::new(Vec::new()),
                facts,
                failures_left: AtomicUsize::new(0),
                attempts: AtomicUsize::new(0),
            },
            rx,
        )
    }

    /// Makes the next `count` record writes fail.
    pub fn fail_next(&self, count: usize) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<InteractionRecord> {
        self.records.lock().expect("records lock").clone()
    }
}

#[async_trait]
impl InteractionStore for FakeStore {
    async fn record_interaction(
        &self,
        record: InteractionRecord,
    ) -> Result<String, CollaboratorError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(CollaboratorError::Disabled("interaction store"));
        }
        let mut records = self.records.lock().expect("records lock");
        records.push(record);
        Ok(format!("interaction-{}", records.len()))
    }

    async fn update_facts(&self, entity_id: &str, facts: &Slots) -> Result<(), CollaboratorError> {
        let _ = self.facts.send((entity_id.to_string(), facts.clone()));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeCalendar {
    pub bookings: Mutex<Vec<BookingRequest>>,
}

impl FakeCalendar {
    pub fn bookings(&self) -> Vec<BookingRequest> {
        self.bookings.lock().expect("bookings lock").clone()
    }
}

#[async_trait]
impl Calendar for FakeCalendar {
    async fn find_availability(
        &self,
        _days_ahead: u32,
    ) -> Result<Vec<AvailableSlot>, CollaboratorError> {
        Ok(vec![AvailableSlot {
            start_time: "2026-11-02T15:00:00Z".to_string(),
            end_time: "2026-11-02T15:30:00Z".to_string(),
        }])
    }

    async fn create_event(&self, request: &BookingRequest) -> Result<String, CollaboratorError> {
        let mut bookings = self.bookings.lock().expect("bookings lock");
        bookings.push(request.clone());
        Ok(format!("evt-{}", bookings.len()))
    }
}

pub struct FakeEvaluator {
    requests: mpsc::UnboundedSender<EvaluationRequest>,
    pub failing: AtomicBool,
}

impl FakeEvaluator {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<EvaluationRequest>) {
        let (requests, rx) = mpsc::unbounded_channel();
        (
            Self {
                requests,
                failing: AtomicBool::new(false),
            },
            rx,
        )
    }
}

#[async_trait]
impl Evaluator for FakeEvaluator {
    async fn evaluate_call(&self, request: EvaluationRequest) -> Result<(), CollaboratorError> {
        let _ = self.requests.send(request);
        if self.failing.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Evaluation("503: scoring offline".to_string()));
        }
        Ok(())
    }
}

// ── extraction ─────────────────────────────────────────────────────────

/// Pattern extraction that holds every utterance until released.
pub struct GatedExtractor {
    gate: Notify,
    started: mpsc::UnboundedSender<String>,
    pub finished: AtomicUsize,
}

impl GatedExtractor {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
        let (started, rx) = mpsc::unbounded_channel();
        let extractor = Self {
            gate: Notify::new(),
            started,
            finished: AtomicUsize::new(0),
        };
        (Arc::new(extractor), rx)
    }

    /// Lets one held utterance through.
    pub fn release(&self) {
        self.gate.notify_one();
    }
}

#[async_trait]
impl SlotExtractor for GatedExtractor {
    fn name(&self) -> &'static str {
        "gated"
    }

    async fn extract(&self, utterance: &str, prior: &Slots) -> Result<Slots, ExtractError> {
        let _ = self.started.send(utterance.to_string());
        self.gate.notified().await;
        let slots = PatternExtractor::new().extract(utterance, prior).await;
        self.finished.fetch_add(1, Ordering::SeqCst);
        slots
    }
}

// ── harness ────────────────────────────────────────────────────────────

pub struct Harness {
    pub inbox: mpsc::Sender<BridgeInput>,
    pub outbound: mpsc::Receiver<TelephonyOutbound>,
    pub sessions: mpsc::UnboundedReceiver<FakeRealtime>,
    pub scripts: Arc<FakeScripts>,
    pub store: Arc<FakeStore>,
    pub calendar: Arc<FakeCalendar>,
    pub evaluator: Arc<FakeEvaluator>,
    pub facts: mpsc::UnboundedReceiver<(String, Slots)>,
    pub evaluations: mpsc::UnboundedReceiver<EvaluationRequest>,
    pub bridge: JoinHandle<CallReport>,
}

pub struct HarnessOptions {
    pub context_timeout: Duration,
    pub connector: Option<Arc<dyn RealtimeConnector>>,
    pub calendar: Option<Arc<dyn Calendar>>,
    pub extractor: Option<ExtractorChain>,
    /// Facts the script source reports for every inbound caller.
    pub known_facts: Option<Slots>,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            context_timeout: Duration::from_secs(2),
            connector: None,
            calendar: None,
            extractor: None,
            known_facts: None,
        }
    }
}

pub fn start() -> Harness {
    start_with(HarnessOptions::default())
}

pub fn start_with(options: HarnessOptions) -> Harness {
    let (connector, sessions) = FakeConnector::new();
    let (store, facts) = FakeStore::new();
    let (evaluator, evaluations) = FakeEvaluator::new();
    let scripts = Arc::new(FakeScripts {
        known_facts: options.known_facts,
        ..FakeScripts::default()
    });
    let store = Arc::new(store);
    let calendar = Arc::new(FakeCalendar::default());
    let evaluator = Arc::new(evaluator);

    let services = CallServices {
        scripts: scripts.clone(),
        store: store.clone(),
        calendar: options.calendar.unwrap_or_else(|| calendar.clone()),
        evaluator: evaluator.clone(),
        extractor: options.extractor.unwrap_or_else(ExtractorChain::pattern_only),
        realtime: options.connector.unwrap_or_else(|| Arc::new(connector)),
        settings: BridgeSettings {
            context_timeout: options.context_timeout,
            ..BridgeSettings::default()
        },
    };

    let (bridge, inbox, outbound) = Bridge::new(services);
    Harness {
        inbox,
        outbound,
        sessions,
        scripts,
        store,
        calendar,
        evaluator,
        facts,
        evaluations,
        bridge: tokio::spawn(bridge.run()),
    }
}

/// Collaborators for tests that run the HTTP app instead of a bare bridge.
pub fn fake_services() -> (CallServices, mpsc::UnboundedReceiver<FakeRealtime>, Arc<FakeStore>) {
    let (connector, sessions) = FakeConnector::new();
    let (store, _facts) = FakeStore::new();
    let (evaluator, _evaluations) = FakeEvaluator::new();
    let store = Arc::new(store);
    let services = CallServices {
        scripts: Arc::new(FakeScripts::default()),
        store: store.clone(),
        calendar: Arc::new(FakeCalendar::default()),
        evaluator: Arc::new(evaluator),
        extractor: ExtractorChain::pattern_only(),
        realtime: Arc::new(connector),
        settings: BridgeSettings::default(),
    };
    (services, sessions, store)
}

pub fn inbound_from(phone: &str) -> CallContext {
    CallContext {
        direction: CallDirection::Inbound,
        from: Some(phone.to_string()),
        to: Some("+15557770000".to_string()),
        provider_call_id: Some("CA-test".to_string()),
        stream_id: Some("MZ-test".to_string()),
        defaulted: false,
    }
}

impl Harness {
    pub async fn telephony(&self, event: TelephonyEvent) {
        self.inbox
            .send(BridgeInput::Telephony(event))
            .await
            .expect("bridge is running");
    }

    /// Sends call metadata and waits for the realtime session to open.
    pub async fn connect(&mut self, context: CallContext) -> FakeRealtime {
        self.telephony(TelephonyEvent::Start(context)).await;
        self.session().await
    }

    pub async fn session(&mut self) -> FakeRealtime {
        tokio::time::timeout(WAIT, self.sessions.recv())
            .await
            .expect("timed out waiting for the realtime connect")
            .expect("connector dropped")
    }

    pub async fn next_outbound(&mut self) -> TelephonyOutbound {
        tokio::time::timeout(WAIT, self.outbound.recv())
            .await
            .expect("timed out waiting for telephony output")
            .expect("bridge output closed")
    }

    /// Hangs up and returns the report.
    pub async fn hang_up(&mut self) -> CallReport {
        let _ = self
            .inbox
            .send(BridgeInput::Telephony(TelephonyEvent::Stop))
            .await;
        self.finish().await
    }

    pub async fn finish(&mut self) -> CallReport {
        tokio::time::timeout(WAIT, &mut self.bridge)
            .await
            .expect("bridge did not finish")
            .expect("bridge task panicked")
    }
}
