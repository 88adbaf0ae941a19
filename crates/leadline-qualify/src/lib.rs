//! Qualification logic for a call: the slot store, the phase machine, the
//! booking guard, and slot extraction.
//!
//! Everything here is synchronous except the extractor chain, and nothing
//! here performs I/O except the model extractor.

pub mod error;
pub mod extract;
pub mod guard;
pub mod phase;
pub mod slots;

pub use error::ExtractError;
pub use extract::{
    Extraction, ExtractorChain, ModelExtractor, ModelExtractorConfig, PatternExtractor,
    SlotExtractor,
};
pub use guard::{block_reason, can_book, BlockReason};
pub use phase::{next_prompt, phase_nudge, Phase, QualificationState};
pub use slots::{check_rules, sanitize, MortgageStatus, RuleViolation, SlotName, Slots, AGE_THRESHOLD};
