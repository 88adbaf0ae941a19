//! Unit tests for lead and interaction persistence.

use leadline_qualify::{MortgageStatus, Slots};
use leadline_types::{CallDirection, CallOutcome, Speaker, TranscriptEntry};
use rusqlite::Connection;
use serde_json::json;

use crate::{
    find_lead, get_interaction, interactions_for_call, record_interaction, run_migrations,
    update_facts, upsert_lead, InteractionRecord,
};

fn test_db() -> Connection {
    let conn = Connection::open_in_memory().expect("should open in-memory db");
    run_migrations(&conn).expect("migrations should succeed");
    conn
}

fn complete_facts() -> Slots {
    Slots {
        purpose: Some("travel".to_string()),
        age_over_threshold: Some(true),
        is_primary_residence: Some(true),
        mortgage_status: Some(MortgageStatus::PaidOff),
        estimated_property_value: Some(800_000),
        estimated_mortgage_balance: None,
    }
}

fn sample_record(call_id: &str) -> InteractionRecord {
    InteractionRecord {
        call_id: call_id.to_string(),
        direction: CallDirection::Inbound,
        counterpart: Some("+15550100".to_string()),
        outcome: CallOutcome::Incomplete,
        script_version: "inbound_unqualified@1".to_string(),
        transcript: vec![
            TranscriptEntry::new(Speaker::Agent, "Hi, thanks for calling.", "a1"),
            TranscriptEntry::new(Speaker::Caller, "I'm 70", "c1"),
        ],
        facts: Slots {
            age_over_threshold: Some(true),
            ..Slots::default()
        },
        metadata: json!({ "phase": "qualify" }),
    }
}

// ── leads ───────────────────────────────────────────────────────────

#[test]
fn unknown_lead_is_none() {
    let conn = test_db();
    assert!(find_lead(&conn, "+15550199").expect("lookup").is_none());
}

#[test]
fn upsert_keeps_existing_name_when_none_given() {
    let conn = test_db();
    upsert_lead(&conn, "+15550101", Some("Dana")).expect("insert");
    upsert_lead(&conn, "+15550101", None).expect("update");

    let lead = find_lead(&conn, "+15550101").expect("lookup").expect("exists");
    assert_eq!(lead.display_name.as_deref(), Some("Dana"));
    assert!(!lead.qualified);
    assert!(lead.facts.is_empty());
}

#[test]
fn complete_facts_mark_lead_qualified() {
    let conn = test_db();
    update_facts(&conn, "+15550102", &complete_facts()).expect("update");

    let lead = find_lead(&conn, "+15550102").expect("lookup").expect("exists");
    assert!(lead.qualified);
    assert_eq!(lead.facts, complete_facts());
}

#[test]
fn partial_facts_never_demote_a_qualified_lead() {
    let conn = test_db();
    update_facts(&conn, "+15550103", &complete_facts()).expect("first");
    update_facts(
        &conn,
        "+15550103",
        &Slots {
            purpose: Some("travel".to_string()),
            ..Slots::default()
        },
    )
    .expect("second");

    let lead = find_lead(&conn, "+15550103").expect("lookup").expect("exists");
    assert!(lead.qualified);
}

// ── interactions ────────────────────────────────────────────────────

#[test]
fn record_round_trips_through_the_table() {
    let conn = test_db();
    let record = sample_record("call-1");
    let id = record_interaction(&conn, &record).expect("insert");

    let stored = get_interaction(&conn, &id).expect("query").expect("exists");
    assert_eq!(stored.id, id);
    assert_eq!(stored.record, record);
}

#[test]
fn records_are_listed_per_call() {
    let conn = test_db();
    record_interaction(&conn, &sample_record("call-a")).expect("a");
    record_interaction(&conn, &sample_record("call-b")).expect("b");

    let rows = interactions_for_call(&conn, "call-a").expect("query");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].record.outcome, CallOutcome::Incomplete);
}

#[test]
fn missing_interaction_is_none() {
    let conn = test_db();
    assert!(get_interaction(&conn, "nope").expect("query").is_none());
}
