mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{inbound_from, start, start_with, FailingConnector, GatedExtractor, HarnessOptions};
use leadline_qualify::{
    next_prompt, phase_nudge, BlockReason, ExtractorChain, MortgageStatus, Phase, SlotExtractor,
    SlotName, Slots,
};
use leadline_server::bridge::{BridgeInput, BridgeState};
use leadline_server::calendar::DisabledCalendar;
use leadline_server::session::UNASSIGNED_SCRIPT;
use leadline_server::tools::FOLLOW_UP_APOLOGY;
use leadline_types::{CallDirection, CallOutcome, Speaker};
use leadline_voice::{
    ClientEvent, RealtimeEvent, ResponseInfo, ResponseOutputItem, TelephonyEvent,
    TelephonyOutbound,
};

const QUALIFYING_TURN: &str =
    "I want to pay off debt. I'm 70, it's my only home, it's paid off, worth about $700k";

fn stored_facts() -> Slots {
    Slots {
        purpose: Some("pay off debt".to_string()),
        age_over_threshold: Some(true),
        is_primary_residence: Some(true),
        mortgage_status: Some(MortgageStatus::PaidOff),
        estimated_property_value: Some(700_000),
        estimated_mortgage_balance: None,
    }
}

#[tokio::test(start_paused = true)]
async fn missing_call_metadata_defaults_to_inbound() {
    let mut h = start_with(HarnessOptions {
        context_timeout: Duration::from_secs(2),
        ..HarnessOptions::default()
    });

    // No start frame: the paused clock runs the wait out.
    let mut rt = h.session().await;
    match rt.next().await {
        ClientEvent::SessionUpdate { session } => {
            assert_eq!(
                session.instructions.as_deref(),
                Some("You are running the inbound_unqualified script.")
            );
            assert!(session.tools.is_none());
        }
        other => panic!("expected persona first, got {other:?}"),
    }

    let report = h.hang_up().await;
    assert_eq!(report.context.direction, CallDirection::Inbound);
    assert!(report.context.from.is_none());
    assert!(report.context.defaulted);
    assert_eq!(report.script_version, "inbound_unqualified@1");
    assert_eq!(
        report.states,
        vec![
            BridgeState::AwaitingContext,
            BridgeState::ScriptLoaded,
            BridgeState::SessionConnected,
            BridgeState::Active,
            BridgeState::Closing,
            BridgeState::Closed,
        ]
    );
}

#[tokio::test]
async fn booking_waits_for_the_offer_then_succeeds() {
    let mut h = start();
    let mut rt = h.connect(inbound_from("+15550100")).await;
    rt.ready().await;

    rt.caller_says("c1", QUALIFYING_TURN).await;
    let nudge = rt.system_text().await;
    assert_eq!(Some(nudge.as_str()), phase_nudge(Phase::PresentOffer));

    let (entity, facts) = h.facts.recv().await.expect("facts stored once qualified");
    assert_eq!(entity, "+15550100");
    assert_eq!(facts.mortgage_status, Some(MortgageStatus::PaidOff));
    assert_eq!(facts.estimated_property_value, Some(700_000));

    // Qualified, but the offer has not been presented.
    rt.tool("t1", "book_appointment", r#"{"start_time":"2026-11-02T15:00:00Z"}"#)
        .await;
    let output = rt.tool_output("t1").await;
    assert_eq!(output["status"], "not_eligible");
    assert_eq!(output["reason"], "offer_not_presented");
    assert_eq!(
        rt.response().await,
        Some(BlockReason::OfferNotPresented.redirect_instructions())
    );
    assert!(h.calendar.bookings().is_empty());

    rt.tool("t2", "record_offer_presented", "").await;
    assert_eq!(
        Some(rt.system_text().await.as_str()),
        phase_nudge(Phase::Questions)
    );
    assert_eq!(rt.tool_output("t2").await["status"], "ok");
    assert_eq!(rt.response().await, None);

    rt.tool(
        "t3",
        "book_appointment",
        r#"{"start_time":"2026-11-02T15:00:00Z","attendee_name":"Ada"}"#,
    )
    .await;
    assert_eq!(
        Some(rt.system_text().await.as_str()),
        phase_nudge(Phase::Book)
    );
    let output = rt.tool_output("t3").await;
    assert_eq!(output["status"], "booked");
    assert_eq!(output["event_id"], "evt-1");

    rt.tool("t4", "save_call_record", r#"{"outcome":"booked","summary":"booked a consult"}"#)
        .await;
    let output = rt.tool_output("t4").await;
    assert_eq!(output["status"], "saved");
    let evaluation = h.evaluations.recv().await.expect("evaluation fired");
    assert_eq!(evaluation.interaction_id, output["interaction_id"]);

    let report = h.hang_up().await;
    assert_eq!(report.phase, Phase::Ended);
    assert!(report.saved_explicitly);
    assert_eq!(report.booked_event_id.as_deref(), Some("evt-1"));

    let bookings = h.calendar.bookings();
    assert_eq!(bookings.len(), 1);
    assert_eq!(bookings[0].attendee_phone.as_deref(), Some("+15550100"));
    assert_eq!(bookings[0].attendee_name.as_deref(), Some("Ada"));

    let records = h.store.records();
    assert_eq!(records.len(), 1, "explicit save suppresses the lifecycle guard");
    assert_eq!(records[0].outcome, CallOutcome::Booked);
    assert_eq!(records[0].metadata["booked_event_id"], "evt-1");
    assert_eq!(records[0].metadata["summary"], "booked a consult");
}

#[tokio::test]
async fn blocked_booking_asks_the_missing_question() {
    let mut h = start();
    let mut rt = h.connect(inbound_from("+15550101")).await;
    rt.ready().await;

    rt.tool("t1", "check_availability", r#"{"days_ahead":3}"#).await;
    let output = rt.tool_output("t1").await;
    assert_eq!(output["status"], "not_eligible");
    assert_eq!(output["reason"], "missing_slot");
    assert_eq!(output["missing_slot"], "purpose");
    assert_eq!(output["next_question"], next_prompt(SlotName::Purpose));

    let redirect = rt.response().await.expect("redirect instructions");
    assert!(redirect.contains(&next_prompt(SlotName::Purpose)));

    let report = h.hang_up().await;
    assert!(!report.saved_explicitly);
    let records = h.store.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome, CallOutcome::Incomplete);
    assert!(h.evaluations.recv().await.is_some());
}

#[tokio::test]
async fn qualify_phase_prompts_for_the_next_slot() {
    let mut h = start();
    let mut rt = h.connect(inbound_from("+15550102")).await;
    rt.ready().await;

    rt.caller_says("c1", "We'd like to travel more").await;
    assert_eq!(
        Some(rt.system_text().await.as_str()),
        phase_nudge(Phase::Qualify)
    );
    let ask = rt.system_text().await;
    assert!(ask.contains(&next_prompt(SlotName::AgeOverThreshold)));

    rt.caller_says("c2", "Yes I am").await;
    let ask = rt.system_text().await;
    assert!(ask.contains(&next_prompt(SlotName::IsPrimaryResidence)));

    let report = h.hang_up().await;
    assert_eq!(report.slots.purpose.as_deref(), Some("travel"));
    assert_eq!(report.slots.age_over_threshold, Some(true));
}

#[tokio::test]
async fn transcript_merges_deltas_and_drops_barged_in_turns() {
    let mut h = start();
    let mut rt = h.connect(inbound_from("+15550103")).await;
    rt.ready().await;

    let delta = |id: &str, text: &str| RealtimeEvent::AgentTranscriptDelta {
        item_id: id.to_string(),
        delta: text.to_string(),
    };
    let done = |id: &str| RealtimeEvent::AgentTranscriptDone {
        item_id: id.to_string(),
    };

    rt.send(delta("a1", "Hello ")).await;
    rt.send(delta("a1", "there")).await;
    rt.send(done("a1")).await;

    rt.caller_says("c1", "hi").await;
    rt.caller_says("c1", "hi").await;

    rt.send(delta("a2", "Let me tell")).await;
    rt.send(RealtimeEvent::SpeechStarted).await;
    assert_eq!(h.next_outbound().await, TelephonyOutbound::Clear);
    rt.until(|e| matches!(e, ClientEvent::ResponseCancel)).await;
    rt.send(delta("a2", " you more")).await;
    rt.send(done("a2")).await;

    rt.send(delta("a3", "Dropped")).await;
    rt.send(RealtimeEvent::ResponseDone {
        response: ResponseInfo {
            status: "cancelled".to_string(),
            output: vec![ResponseOutputItem {
                id: "a3".to_string(),
            }],
        },
    })
    .await;

    rt.send(done("a4")).await;
    rt.send(delta("a5", "Goodbye")).await;

    let report = h.hang_up().await;
    let turns: Vec<(Speaker, &str)> = report
        .transcript
        .iter()
        .map(|entry| (entry.speaker, entry.text.as_str()))
        .collect();
    assert_eq!(
        turns,
        vec![
            (Speaker::Agent, "Hello there"),
            (Speaker::Caller, "hi"),
            (Speaker::Agent, "Goodbye"),
        ]
    );
}

#[tokio::test]
async fn audio_is_forwarded_both_ways() {
    let mut h = start();
    let mut rt = h.connect(inbound_from("+15550104")).await;

    h.telephony(TelephonyEvent::Audio(vec![1, 2, 3])).await;
    match rt
        .until(|e| matches!(e, ClientEvent::InputAudioAppend { .. }))
        .await
    {
        ClientEvent::InputAudioAppend { audio } => assert_eq!(audio, "AQID"),
        _ => unreachable!(),
    }

    rt.send(RealtimeEvent::AudioDelta {
        delta: "BAUG".to_string(),
    })
    .await;
    assert_eq!(h.next_outbound().await, TelephonyOutbound::Audio(vec![4, 5, 6]));

    h.hang_up().await;
    assert_eq!(h.next_outbound().await, TelephonyOutbound::Close);
}

#[tokio::test]
async fn second_save_is_acknowledged_not_repeated() {
    let mut h = start();
    let mut rt = h.connect(inbound_from("+15550105")).await;
    rt.ready().await;

    rt.tool("t1", "save_call_record", r#"{"outcome":"not_interested"}"#).await;
    assert_eq!(rt.tool_output("t1").await["status"], "saved");
    rt.tool("t2", "save_call_record", r#"{"outcome":"follow_up"}"#).await;
    assert_eq!(rt.tool_output("t2").await["status"], "already_saved");

    rt.tool("t3", "transfer_call", "{}").await;
    let output = rt.tool_output("t3").await;
    assert_eq!(output["status"], "error");
    assert_eq!(output["message"], "unknown tool");
    assert_eq!(rt.response().await, None);

    h.hang_up().await;
    let records = h.store.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome, CallOutcome::NotInterested);
}

#[tokio::test]
async fn calendar_outage_becomes_an_apology() {
    let mut h = start_with(HarnessOptions {
        calendar: Some(Arc::new(DisabledCalendar)),
        ..HarnessOptions::default()
    });
    let mut rt = h.connect(inbound_from("+15550106")).await;
    rt.ready().await;

    rt.caller_says("c1", QUALIFYING_TURN).await;
    rt.system_text().await;
    rt.tool("t1", "record_offer_presented", "{}").await;
    rt.tool_output("t1").await;

    rt.tool("t2", "check_availability", "{}").await;
    let output = rt.tool_output("t2").await;
    assert_eq!(output["status"], "unavailable");
    assert_eq!(output["message"], FOLLOW_UP_APOLOGY);

    let report = h.hang_up().await;
    assert!(report.booked_event_id.is_none());
    assert_eq!(h.store.records()[0].outcome, CallOutcome::Incomplete);
}

#[tokio::test]
async fn realtime_connect_failure_still_saves_the_call() {
    let mut h = start_with(HarnessOptions {
        connector: Some(Arc::new(FailingConnector)),
        ..HarnessOptions::default()
    });
    h.telephony(TelephonyEvent::Start(inbound_from("+15550107")))
        .await;

    let report = h.finish().await;
    assert_eq!(report.final_state(), Some(BridgeState::Closed));
    assert!(!report.states.contains(&BridgeState::SessionConnected));
    assert!(report.states.contains(&BridgeState::ScriptLoaded));
    assert_eq!(h.next_outbound().await, TelephonyOutbound::Close);

    let records = h.store.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome, CallOutcome::Incomplete);
    assert_eq!(records[0].counterpart.as_deref(), Some("+15550107"));
}

#[tokio::test]
async fn hang_up_before_metadata_skips_the_session() {
    let mut h = start();
    h.inbox
        .send(BridgeInput::TelephonyClosed)
        .await
        .expect("bridge is running");

    let report = h.finish().await;
    assert_eq!(
        report.states,
        vec![
            BridgeState::AwaitingContext,
            BridgeState::Closing,
            BridgeState::Closed,
        ]
    );
    assert_eq!(h.scripts.lookups.load(Ordering::SeqCst), 0);
    assert!(h.sessions.try_recv().is_err());

    let records = h.store.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].script_version, UNASSIGNED_SCRIPT);
    assert!(records[0].transcript.is_empty());
}

#[tokio::test]
async fn realtime_drop_ends_the_call() {
    let mut h = start();
    let rt = h.connect(inbound_from("+15550108")).await;
    drop(rt);

    let report = h.finish().await;
    assert_eq!(report.final_state(), Some(BridgeState::Closed));
    assert_eq!(h.store.records().len(), 1);
}

#[tokio::test]
async fn offer_cannot_be_recorded_before_qualification() {
    let mut h = start();
    let mut rt = h.connect(inbound_from("+15550109")).await;
    rt.ready().await;

    rt.tool("t1", "record_offer_presented", "{}").await;
    let output = rt.tool_output("t1").await;
    assert_eq!(output["status"], "not_eligible");
    assert_eq!(output["reason"], "missing_slot");
    assert_eq!(output["missing_slot"], "purpose");
    let redirect = rt.response().await.expect("redirect instructions");
    assert!(redirect.contains(&next_prompt(SlotName::Purpose)));

    // Qualifying afterwards still goes through the offer phase.
    rt.caller_says("c1", QUALIFYING_TURN).await;
    assert_eq!(
        Some(rt.system_text().await.as_str()),
        phase_nudge(Phase::PresentOffer)
    );

    rt.tool("t2", "book_appointment", r#"{"start_time":"2026-11-02T15:00:00Z"}"#)
        .await;
    let output = rt.tool_output("t2").await;
    assert_eq!(output["status"], "not_eligible");
    assert_eq!(output["reason"], "offer_not_presented");
    assert!(h.calendar.bookings().is_empty());

    let report = h.hang_up().await;
    assert!(report.booked_event_id.is_none());
    assert_eq!(h.store.records()[0].metadata["offer_presented"], false);
}

#[tokio::test]
async fn returning_lead_starts_from_stored_facts() {
    let mut h = start_with(HarnessOptions {
        known_facts: Some(stored_facts()),
        ..HarnessOptions::default()
    });
    let mut rt = h.connect(inbound_from("+15550110")).await;
    match rt.next().await {
        ClientEvent::SessionUpdate { session } => assert_eq!(
            session.instructions.as_deref(),
            Some("You are running the inbound_qualified script.")
        ),
        other => panic!("expected persona first, got {other:?}"),
    }
    assert_eq!(
        Some(rt.system_text().await.as_str()),
        phase_nudge(Phase::PresentOffer)
    );
    rt.ready().await;

    rt.tool("t1", "record_offer_presented", "{}").await;
    assert_eq!(rt.tool_output("t1").await["status"], "ok");
    rt.tool("t2", "book_appointment", r#"{"start_time":"2026-11-03T10:00:00Z"}"#)
        .await;
    let output = rt.tool_output("t2").await;
    assert_eq!(output["status"], "booked");

    let report = h.hang_up().await;
    assert_eq!(report.slots, stored_facts());
    assert_eq!(h.calendar.bookings().len(), 1);
    assert!(h.facts.try_recv().is_err(), "known facts are not written back");
}

#[tokio::test]
async fn partial_stored_facts_skip_answered_questions() {
    let known = Slots {
        purpose: Some("travel".to_string()),
        age_over_threshold: Some(true),
        ..Slots::default()
    };
    let mut h = start_with(HarnessOptions {
        known_facts: Some(known),
        ..HarnessOptions::default()
    });
    let mut rt = h.connect(inbound_from("+15550114")).await;
    assert_eq!(
        Some(rt.system_text().await.as_str()),
        phase_nudge(Phase::Qualify)
    );
    rt.ready().await;

    rt.caller_says("c1", "Yes, I live there").await;
    let ask = rt.system_text().await;
    assert!(ask.contains(&next_prompt(SlotName::MortgageStatus)));

    let report = h.hang_up().await;
    assert_eq!(report.slots.is_primary_residence, Some(true));
    assert_eq!(report.slots.purpose.as_deref(), Some("travel"));
}

#[tokio::test]
async fn storage_failure_does_not_block_teardown() {
    let mut h = start();
    h.store.fail_next(usize::MAX);
    let mut rt = h.connect(inbound_from("+15550111")).await;
    rt.ready().await;
    rt.caller_says("c1", "We'd like to travel more").await;
    rt.system_text().await;

    let report = h.hang_up().await;
    assert_eq!(report.final_state(), Some(BridgeState::Closed));
    assert!(report.interaction_id.is_none());
    assert!(!report.saved_explicitly);
    assert_eq!(h.store.attempts.load(Ordering::SeqCst), 1);
    assert!(h.store.records().is_empty());
    assert!(h.evaluations.try_recv().is_err(), "nothing to evaluate");
    assert_eq!(h.next_outbound().await, TelephonyOutbound::Close);
}

#[tokio::test]
async fn evaluation_failure_keeps_the_saved_record() {
    let mut h = start();
    h.evaluator.failing.store(true, Ordering::SeqCst);
    let mut rt = h.connect(inbound_from("+15550115")).await;
    rt.ready().await;

    let report = h.hang_up().await;
    assert_eq!(report.final_state(), Some(BridgeState::Closed));
    assert_eq!(report.interaction_id.as_deref(), Some("interaction-1"));
    let request = tokio::time::timeout(Duration::from_secs(5), h.evaluations.recv())
        .await
        .expect("evaluation attempted")
        .expect("evaluator alive");
    assert_eq!(request.interaction_id, "interaction-1");
    assert_eq!(h.store.records().len(), 1);
}

#[tokio::test]
async fn failed_save_is_retried_as_incomplete_at_teardown() {
    let mut h = start();
    let mut rt = h.connect(inbound_from("+15550112")).await;
    rt.ready().await;

    h.store.fail_next(1);
    rt.tool(
        "t1",
        "save_call_record",
        r#"{"outcome":"follow_up","summary":"call back tomorrow"}"#,
    )
    .await;
    assert_eq!(rt.tool_output("t1").await["status"], "error");

    let report = h.hang_up().await;
    assert!(!report.saved_explicitly);
    assert_eq!(report.interaction_id.as_deref(), Some("interaction-1"));
    assert_eq!(h.store.attempts.load(Ordering::SeqCst), 2);

    let records = h.store.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome, CallOutcome::Incomplete);
    assert_eq!(records[0].metadata["summary"], "call back tomorrow");
}

#[tokio::test]
async fn extraction_finishing_after_hang_up_is_dropped() {
    let (gated, mut started) = GatedExtractor::new();
    let mut h = start_with(HarnessOptions {
        extractor: Some(ExtractorChain::new(vec![
            gated.clone() as Arc<dyn SlotExtractor>
        ])),
        ..HarnessOptions::default()
    });
    let mut rt = h.connect(inbound_from("+15550113")).await;
    rt.ready().await;

    rt.caller_says("c1", QUALIFYING_TURN).await;
    let held = tokio::time::timeout(Duration::from_secs(5), started.recv())
        .await
        .expect("extraction started")
        .expect("extractor alive");
    assert_eq!(held, QUALIFYING_TURN);

    let report = h.hang_up().await;
    assert!(report.slots.is_empty());
    assert_eq!(report.phase, Phase::Ended);
    assert_eq!(report.transcript.len(), 1);

    gated.release();
    tokio::time::timeout(Duration::from_secs(5), async {
        while gated.finished.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("held extraction finished");
    tokio::time::sleep(Duration::from_millis(50)).await;

    let records = h.store.records();
    assert_eq!(records.len(), 1);
    assert!(records[0].facts.is_empty());
    assert!(h.facts.try_recv().is_err());
    drop(rt);
}
