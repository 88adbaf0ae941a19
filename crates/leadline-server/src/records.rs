//! SQLite-backed interaction store.

use async_trait::async_trait;
use leadline_qualify::Slots;
use leadline_store::{DbPool, InteractionRecord, StoreError};

use crate::collaborators::{CollaboratorError, InteractionStore};

pub struct SqliteInteractionStore {
    pool: DbPool,
}

impl SqliteInteractionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InteractionStore for SqliteInteractionStore {
    async fn record_interaction(
        &self,
        record: InteractionRecord,
    ) -> Result<String, CollaboratorError> {
        let pool = self.pool.clone();
        let id = tokio::task::spawn_blocking(move || {
            let conn = pool.get().map_err(StoreError::from)?;
            leadline_store::record_interaction(&conn, &record)
        })
        .await??;
        Ok(id)
    }

    async fn update_facts(&self, entity_id: &str, facts: &Slots) -> Result<(), CollaboratorError> {
        let pool = self.pool.clone();
        let entity_id = entity_id.to_string();
        let facts = facts.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get().map_err(StoreError::from)?;
            leadline_store::update_facts(&conn, &entity_id, &facts)
        })
        .await??;
        Ok(())
    }
}
