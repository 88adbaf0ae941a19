//! Script selection backed by the lead table.

use async_trait::async_trait;
use leadline_store::{find_lead, DbPool, Lead, StoreError};
use leadline_types::{CallContext, CallDirection, Script, VoiceParams};
use serde::Deserialize;

use crate::collaborators::{ScriptSelection, ScriptSource};

const QUALIFIED_INSTRUCTIONS: &str = "You are a friendly specialist returning a call to a \
homeowner who already qualified for a home equity conversion loan. Greet them by name if you \
know it, briefly confirm their details are unchanged, remind them of the offer terms, then \
call record_offer_presented and help them book a consultation. If any detail has changed, \
ask about it before booking. Speak naturally and keep answers short.";

const UNQUALIFIED_INSTRUCTIONS: &str = "You are a friendly specialist answering a call from a \
homeowner interested in a home equity conversion loan. Build rapport first, then learn what \
they would use the funds for, whether they are 62 or older, whether the home is their primary \
residence, whether it is paid off, and roughly what it is worth. Ask one question at a time. \
Never book an appointment before every detail is confirmed.";

const OUTBOUND_INSTRUCTIONS: &str = "You are a friendly specialist calling a homeowner who \
asked to hear about home equity conversion loans. Introduce yourself, confirm it is a good \
time to talk, then learn their goals and qualification details one question at a time.";

fn builtin(id: &str, instructions: &str) -> Script {
    Script {
        id: id.to_string(),
        version: "1".to_string(),
        instructions: instructions.to_string(),
        voice: VoiceParams::default(),
    }
}

fn default_inbound_qualified() -> Script {
    builtin("inbound_qualified", QUALIFIED_INSTRUCTIONS)
}

fn default_inbound_unqualified() -> Script {
    builtin("inbound_unqualified", UNQUALIFIED_INSTRUCTIONS)
}

fn default_outbound() -> Script {
    builtin("outbound", OUTBOUND_INSTRUCTIONS)
}

/// The three scripts a call can run.
#[derive(Debug, Clone, Deserialize)]
pub struct ScriptsConfig {
    #[serde(default = "default_inbound_qualified")]
    pub inbound_qualified: Script,
    #[serde(default = "default_inbound_unqualified")]
    pub inbound_unqualified: Script,
    #[serde(default = "default_outbound")]
    pub outbound: Script,
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self {
            inbound_qualified: default_inbound_qualified(),
            inbound_unqualified: default_inbound_unqualified(),
            outbound: default_outbound(),
        }
    }
}

impl ScriptsConfig {
    /// Inbound script for a caller with the given lead record.
    ///
    /// Stored facts are carried over whether or not the lead qualified, so
    /// known answers are not asked again.
    fn for_lead(&self, lead: Option<Lead>) -> ScriptSelection {
        let Some(lead) = lead else {
            return ScriptSelection::fresh(self.inbound_unqualified.clone());
        };
        let script = if lead.qualified {
            let context = lead
                .display_name
                .as_deref()
                .map(|name| format!("The caller's name is {name}."))
                .unwrap_or_default();
            self.inbound_qualified.with_context(&context)
        } else {
            self.inbound_unqualified.clone()
        };
        ScriptSelection {
            script,
            known_facts: lead.facts,
        }
    }
}

/// Chooses scripts from config, looking inbound callers up in the lead store.
pub struct StoreScriptSource {
    pool: DbPool,
    scripts: ScriptsConfig,
}

impl StoreScriptSource {
    pub fn new(pool: DbPool, scripts: ScriptsConfig) -> Self {
        Self { pool, scripts }
    }

    async fn lookup(&self, phone: String) -> Result<Option<Lead>, StoreError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            find_lead(&conn, &phone)
        })
        .await
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, "lead lookup task failed");
            Ok(None)
        })
    }
}

#[async_trait]
impl ScriptSource for StoreScriptSource {
    async fn script_for(&self, direction: CallDirection, context: &CallContext) -> ScriptSelection {
        if direction == CallDirection::Outbound {
            return ScriptSelection::fresh(self.scripts.outbound.clone());
        }
        let Some(phone) = context.counterpart() else {
            return ScriptSelection::fresh(self.scripts.inbound_unqualified.clone());
        };
        match self.lookup(phone.to_string()).await {
            Ok(lead) => self.scripts.for_lead(lead),
            Err(e) => {
                tracing::warn!(error = %e, "lead lookup failed, using unqualified script");
                ScriptSelection::fresh(self.scripts.inbound_unqualified.clone())
            }
        }
    }
}
