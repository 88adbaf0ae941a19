//! Booking guard: decides, at the moment a booking is requested, whether the
//! calendar side effect may run.

use serde::Serialize;

use crate::phase::{next_prompt, QualificationState};
use crate::slots::SlotName;

/// Why a booking request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "slot", rename_all = "snake_case")]
pub enum BlockReason {
    /// A required fact is still unknown.
    MissingSlot(SlotName),
    /// Qualified, but the offer terms have not been presented yet.
    OfferNotPresented,
}

impl BlockReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingSlot(_) => "missing_slot",
            Self::OfferNotPresented => "offer_not_presented",
        }
    }

    /// The instruction the agent should follow instead of booking.
    pub fn redirect_instructions(self) -> String {
        match self {
            Self::MissingSlot(slot) => format!(
                "Do not book yet. Politely explain you need one more detail first, then ask: {}",
                next_prompt(slot)
            ),
            Self::OfferNotPresented => "Do not book yet. First present the offer terms to the \
                caller, then call record_offer_presented before offering to book."
                .to_string(),
        }
    }
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingSlot(slot) => write!(f, "missing slot {slot}"),
            Self::OfferNotPresented => f.write_str("offer not presented"),
        }
    }
}

/// First reason booking is not allowed, or `None` when it is.
pub fn block_reason(state: &QualificationState) -> Option<BlockReason> {
    if let Some(slot) = state.missing_slot() {
        return Some(BlockReason::MissingSlot(slot));
    }
    if !state.offer_presented() {
        return Some(BlockReason::OfferNotPresented);
    }
    None
}

pub fn can_book(state: &QualificationState) -> bool {
    block_reason(state).is_none()
}
