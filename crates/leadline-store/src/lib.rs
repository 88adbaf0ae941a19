//! Persistence for Leadline.
//!
//! SQLite behind an `r2d2` pool, with schema managed by embedded migrations.
//! Functions here take a plain `&Connection` and are synchronous; async
//! callers run them inside `spawn_blocking`.

mod error;
mod interactions;
mod leads;
mod migrations;
mod pool;

pub use error::StoreError;
pub use interactions::{
    get_interaction, interactions_for_call, record_interaction, InteractionRecord,
    StoredInteraction,
};
pub use leads::{find_lead, update_facts, upsert_lead, Lead};
pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool, DbPool, DbRuntimeSettings};

#[cfg(test)]
mod tests;
