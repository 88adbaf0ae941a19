//! Interaction log: one row per finished call.

use chrono::Utc;
use leadline_qualify::Slots;
use leadline_types::{CallDirection, CallOutcome, TranscriptEntry};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StoreError;

/// Everything persisted about one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub call_id: String,
    pub direction: CallDirection,
    pub counterpart: Option<String>,
    pub outcome: CallOutcome,
    pub script_version: String,
    pub transcript: Vec<TranscriptEntry>,
    pub facts: Slots,
    /// Free-form call metadata (summary, booked event id, phase).
    pub metadata: Value,
}

/// A stored record with its generated id and timestamp.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredInteraction {
    pub id: String,
    pub created_at: String,
    #[serde(flatten)]
    pub record: InteractionRecord,
}

/// Inserts a record and returns its id.
pub fn record_interaction(
    conn: &Connection,
    record: &InteractionRecord,
) -> Result<String, StoreError> {
    let id = uuid::Uuid::new_v4().to_string();
    let transcript_json = serde_json::to_string(&record.transcript)?;
    let facts_json = serde_json::to_string(&record.facts)?;
    let metadata_json = serde_json::to_string(&record.metadata)?;

    conn.execute(
        "INSERT INTO interactions
            (id, call_id, direction, counterpart, outcome, script_version,
             transcript_json, facts_json, metadata_json, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            id,
            record.call_id,
            record.direction.as_str(),
            record.counterpart,
            record.outcome.as_str(),
            record.script_version,
            transcript_json,
            facts_json,
            metadata_json,
            Utc::now().to_rfc3339(),
        ],
    )?;

    tracing::info!(
        interaction_id = %id,
        call_id = %record.call_id,
        outcome = record.outcome.as_str(),
        turns = record.transcript.len(),
        "interaction recorded"
    );
    Ok(id)
}

struct InteractionRow {
    id: String,
    call_id: String,
    direction: String,
    counterpart: Option<String>,
    outcome: String,
    script_version: String,
    transcript_json: String,
    facts_json: String,
    metadata_json: String,
    created_at: String,
}

const SELECT_COLUMNS: &str = "SELECT id, call_id, direction, counterpart, outcome, script_version,
    transcript_json, facts_json, metadata_json, created_at FROM interactions";

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<InteractionRow> {
    Ok(InteractionRow {
        id: row.get(0)?,
        call_id: row.get(1)?,
        direction: row.get(2)?,
        counterpart: row.get(3)?,
        outcome: row.get(4)?,
        script_version: row.get(5)?,
        transcript_json: row.get(6)?,
        facts_json: row.get(7)?,
        metadata_json: row.get(8)?,
        created_at: row.get(9)?,
    })
}

fn label_error(column: &str, value: &str) -> StoreError {
    StoreError::Database(rusqlite::Error::InvalidColumnType(
        0,
        format!("{column}={value}"),
        rusqlite::types::Type::Text,
    ))
}

impl TryFrom<InteractionRow> for StoredInteraction {
    type Error = StoreError;

    fn try_from(row: InteractionRow) -> Result<Self, StoreError> {
        let direction = row
            .direction
            .parse::<CallDirection>()
            .map_err(|_| label_error("direction", &row.direction))?;
        let outcome = row
            .outcome
            .parse::<CallOutcome>()
            .map_err(|_| label_error("outcome", &row.outcome))?;

        Ok(StoredInteraction {
            id: row.id,
            created_at: row.created_at,
            record: InteractionRecord {
                call_id: row.call_id,
                direction,
                counterpart: row.counterpart,
                outcome,
                script_version: row.script_version,
                transcript: serde_json::from_str(&row.transcript_json)?,
                facts: serde_json::from_str(&row.facts_json)?,
                metadata: serde_json::from_str(&row.metadata_json)?,
            },
        })
    }
}

pub fn get_interaction(conn: &Connection, id: &str) -> Result<Option<StoredInteraction>, StoreError> {
    let row = conn
        .query_row(&format!("{SELECT_COLUMNS} WHERE id = ?1"), params![id], read_row)
        .optional()?;
    row.map(StoredInteraction::try_from).transpose()
}

/// Records for one call, oldest first.
pub fn interactions_for_call(
    conn: &Connection,
    call_id: &str,
) -> Result<Vec<StoredInteraction>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT_COLUMNS} WHERE call_id = ?1 ORDER BY created_at ASC"
    ))?;
    let rows = stmt
        .query_map(params![call_id], read_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(StoredInteraction::try_from).collect()
}
