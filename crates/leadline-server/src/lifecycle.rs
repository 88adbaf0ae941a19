//! Call lifecycle guard: the safety net that saves calls nobody saved.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use leadline_types::CallOutcome;

use crate::collaborators::{spawn_evaluation, CollaboratorError, Evaluator, InteractionStore};
use crate::session::CallSession;

/// One-shot "was this call finalized?" flag.
///
/// Either the conversation saves the call explicitly (`mark_finalized`) or
/// teardown claims it (`claim`), never both.
#[derive(Debug, Default)]
pub struct LifecycleGuard {
    finalized: AtomicBool,
}

impl LifecycleGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_finalized(&self) {
        self.finalized.store(true, Ordering::SeqCst);
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized.load(Ordering::SeqCst)
    }

    /// Returns true exactly once, and only if the call was never finalized.
    pub fn claim(&self) -> bool {
        !self.finalized.swap(true, Ordering::SeqCst)
    }
}

/// Persists a record and fires evaluation for it.
pub async fn persist_and_evaluate(
    session: &CallSession,
    outcome: CallOutcome,
    store: &dyn InteractionStore,
    evaluator: Arc<dyn Evaluator>,
) -> Result<String, CollaboratorError> {
    let id = store.record_interaction(session.record(outcome)).await?;
    spawn_evaluation(evaluator, session.evaluation_request(&id));
    Ok(id)
}

/// Saves a best-effort `Incomplete` record for a call that ended without
/// an explicit save. Failures are logged and swallowed.
pub async fn on_ungraceful_close(
    session: &CallSession,
    store: &dyn InteractionStore,
    evaluator: Arc<dyn Evaluator>,
) -> Option<String> {
    tracing::info!(
        call_id = %session.call_id,
        turns = session.transcript.len(),
        phase = %session.qualification.phase(),
        "call ended without a saved record, saving as incomplete"
    );
    match persist_and_evaluate(session, CallOutcome::Incomplete, store, evaluator).await {
        Ok(id) => Some(id),
        Err(e) => {
            tracing::error!(call_id = %session.call_id, error = %e, "failed to save incomplete call");
            None
        }
    }
}
