//! Forward-only phase state machine wrapped around the slot store.

use serde::{Deserialize, Serialize};

use crate::guard::BlockReason;
use crate::slots::{SlotName, Slots, AGE_THRESHOLD};

/// Position of a call in the qualification script.
///
/// Variants are declared in script order; the derived ordering is what makes
/// "never regress" checkable.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Rapport,
    Qualify,
    PresentOffer,
    Questions,
    Book,
    Ended,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rapport => "rapport",
            Self::Qualify => "qualify",
            Self::PresentOffer => "present_offer",
            Self::Questions => "questions",
            Self::Book => "book",
            Self::Ended => "ended",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deterministic question for a slot.
pub fn next_prompt(slot: SlotName) -> String {
    match slot {
        SlotName::Purpose => {
            "What would you most like to use the funds from your home for?".to_string()
        }
        SlotName::AgeOverThreshold => format!("Are you {AGE_THRESHOLD} or older?"),
        SlotName::IsPrimaryResidence => {
            "Is this home your primary residence, where you live most of the year?".to_string()
        }
        SlotName::MortgageStatus => {
            "Is your home paid off, or do you still have a mortgage balance on it?".to_string()
        }
        SlotName::EstimatedPropertyValue => {
            "Roughly what do you think your home is worth today?".to_string()
        }
        SlotName::EstimatedMortgageBalance => {
            "About how much do you still owe on the mortgage?".to_string()
        }
    }
}

/// Guidance injected into the session when a phase is entered.
pub fn phase_nudge(phase: Phase) -> Option<&'static str> {
    match phase {
        Phase::Rapport => None,
        Phase::Qualify => Some(
            "Move on to qualification. Ask one question at a time and wait for the answer.",
        ),
        Phase::PresentOffer => Some(
            "The caller meets every requirement. Present the offer terms clearly, then call \
             record_offer_presented.",
        ),
        Phase::Questions => Some(
            "Answer the caller's questions about the offer. When they have none left, call \
             record_questions_closed and offer to book a consultation.",
        ),
        Phase::Book => Some("The appointment is booked. Confirm the time and wrap up politely."),
        Phase::Ended => None,
    }
}

/// Slot store plus phase and one-way progress flags for one call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualificationState {
    slots: Slots,
    phase: Phase,
    offer_presented: bool,
    questions_closed: bool,
}

impl QualificationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slots(&self) -> &Slots {
        &self.slots
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn offer_presented(&self) -> bool {
        self.offer_presented
    }

    pub fn questions_closed(&self) -> bool {
        self.questions_closed
    }

    pub fn missing_slot(&self) -> Option<SlotName> {
        self.slots.missing_slot()
    }

    pub fn is_qualified(&self) -> bool {
        self.missing_slot().is_none()
    }

    /// Merges an extraction with fill-only-if-unset semantics.
    pub fn merge(&mut self, update: &Slots) -> Vec<SlotName> {
        self.slots.merge_unset(update)
    }

    /// Computes and applies the next phase, one step at a time.
    ///
    /// Applying it repeatedly without new facts or flags is a no-op. Every
    /// qualified call passes through `PresentOffer`. `Book` is never reached
    /// from here; it only follows a successful booking.
    pub fn advance(&mut self) -> Phase {
        let next = match self.phase {
            Phase::Rapport => {
                if self.is_qualified() {
                    Phase::PresentOffer
                } else {
                    Phase::Qualify
                }
            }
            Phase::Qualify if self.is_qualified() => Phase::PresentOffer,
            Phase::Qualify => Phase::Qualify,
            Phase::PresentOffer if self.offer_presented => Phase::Questions,
            Phase::PresentOffer => Phase::PresentOffer,
            Phase::Questions => Phase::Questions,
            Phase::Book => Phase::Book,
            Phase::Ended => Phase::Ended,
        };
        self.set_phase(next);
        self.phase
    }

    /// Records that the offer terms were presented.
    ///
    /// Refused while a required slot is unknown, since no offer exists yet.
    /// The flag is left unset in that case.
    pub fn mark_offer_presented(&mut self) -> Result<(), BlockReason> {
        if let Some(slot) = self.missing_slot() {
            return Err(BlockReason::MissingSlot(slot));
        }
        self.offer_presented = true;
        Ok(())
    }

    pub fn mark_questions_closed(&mut self) {
        self.questions_closed = true;
    }

    /// Records a completed booking. Only valid once qualified.
    pub fn mark_booked(&mut self) {
        if self.is_qualified() {
            self.set_phase(Phase::Book);
        }
    }

    pub fn end(&mut self) {
        self.set_phase(Phase::Ended);
    }

    fn set_phase(&mut self, next: Phase) {
        if next > self.phase {
            self.phase = next;
        }
    }
}
