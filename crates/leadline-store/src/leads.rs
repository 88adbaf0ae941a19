//! Lead records: who we have spoken to and what we learned.

use chrono::Utc;
use leadline_qualify::Slots;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::error::StoreError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Lead {
    pub phone: String,
    pub display_name: Option<String>,
    pub qualified: bool,
    pub facts: Slots,
    pub updated_at: String,
}

/// Looks up a lead by phone number.
pub fn find_lead(conn: &Connection, phone: &str) -> Result<Option<Lead>, StoreError> {
    let row = conn
        .query_row(
            "SELECT phone, display_name, qualified, facts_json, updated_at
             FROM leads WHERE phone = ?1",
            params![phone],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, bool>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            },
        )
        .optional()?;

    let Some((phone, display_name, qualified, facts_json, updated_at)) = row else {
        return Ok(None);
    };

    Ok(Some(Lead {
        phone,
        display_name,
        qualified,
        facts: serde_json::from_str(&facts_json)?,
        updated_at,
    }))
}

/// Creates or renames a lead without touching its facts.
pub fn upsert_lead(
    conn: &Connection,
    phone: &str,
    display_name: Option<&str>,
) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO leads (phone, display_name, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(phone) DO UPDATE SET
            display_name = COALESCE(excluded.display_name, leads.display_name),
            updated_at = excluded.updated_at",
        params![phone, display_name, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

/// Stores the facts collected for a lead, creating it if needed.
///
/// `qualified` follows the completeness of `facts`; it is never cleared once
/// set, so a later partial call cannot demote a qualified lead.
pub fn update_facts(conn: &Connection, phone: &str, facts: &Slots) -> Result<(), StoreError> {
    let facts_json = serde_json::to_string(facts)?;
    conn.execute(
        "INSERT INTO leads (phone, qualified, facts_json, updated_at) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(phone) DO UPDATE SET
            qualified = MAX(leads.qualified, excluded.qualified),
            facts_json = excluded.facts_json,
            updated_at = excluded.updated_at",
        params![phone, facts.is_complete(), facts_json, Utc::now().to_rfc3339()],
    )?;
    tracing::debug!(phone, qualified = facts.is_complete(), "lead facts updated");
    Ok(())
}
