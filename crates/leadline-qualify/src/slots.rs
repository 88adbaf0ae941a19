//! The slot store: typed qualification facts collected during a call.
//!
//! A slot is either unset (`None`) or known. Known slots are never
//! overwritten: [`Slots::merge_unset`] only fills gaps, so the first answer a
//! caller gives wins for the lifetime of the call.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Age at or above which a caller is over the qualification threshold.
pub const AGE_THRESHOLD: u32 = 62;

/// Whether the caller's property still carries a mortgage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MortgageStatus {
    PaidOff,
    HasBalance,
}

impl MortgageStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PaidOff => "paid_off",
            Self::HasBalance => "has_balance",
        }
    }
}

/// Names of the qualification slots, in the fixed order they are asked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotName {
    Purpose,
    AgeOverThreshold,
    IsPrimaryResidence,
    MortgageStatus,
    EstimatedPropertyValue,
    EstimatedMortgageBalance,
}

impl SlotName {
    /// All slots in priority order.
    pub const ALL: [SlotName; 6] = [
        SlotName::Purpose,
        SlotName::AgeOverThreshold,
        SlotName::IsPrimaryResidence,
        SlotName::MortgageStatus,
        SlotName::EstimatedPropertyValue,
        SlotName::EstimatedMortgageBalance,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Purpose => "purpose",
            Self::AgeOverThreshold => "age_over_threshold",
            Self::IsPrimaryResidence => "is_primary_residence",
            Self::MortgageStatus => "mortgage_status",
            Self::EstimatedPropertyValue => "estimated_property_value",
            Self::EstimatedMortgageBalance => "estimated_mortgage_balance",
        }
    }

    /// True for yes/no slots.
    pub fn is_boolean(self) -> bool {
        matches!(self, Self::AgeOverThreshold | Self::IsPrimaryResidence)
    }
}

impl std::fmt::Display for SlotName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Qualification facts. Also used as the partial result of an extraction,
/// where `None` means "not mentioned in this utterance".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Slots {
    pub purpose: Option<String>,
    pub age_over_threshold: Option<bool>,
    pub is_primary_residence: Option<bool>,
    pub mortgage_status: Option<MortgageStatus>,
    /// Whole dollars.
    pub estimated_property_value: Option<u64>,
    /// Whole dollars. Required only when `mortgage_status` is `HasBalance`.
    pub estimated_mortgage_balance: Option<u64>,
}

impl Slots {
    /// Whether `slot` is required given the facts known so far.
    pub fn is_required(&self, slot: SlotName) -> bool {
        match slot {
            SlotName::EstimatedMortgageBalance => {
                self.mortgage_status == Some(MortgageStatus::HasBalance)
            }
            _ => true,
        }
    }

    pub fn is_known(&self, slot: SlotName) -> bool {
        match slot {
            SlotName::Purpose => self.purpose.is_some(),
            SlotName::AgeOverThreshold => self.age_over_threshold.is_some(),
            SlotName::IsPrimaryResidence => self.is_primary_residence.is_some(),
            SlotName::MortgageStatus => self.mortgage_status.is_some(),
            SlotName::EstimatedPropertyValue => self.estimated_property_value.is_some(),
            SlotName::EstimatedMortgageBalance => self.estimated_mortgage_balance.is_some(),
        }
    }

    /// First required slot that is still unset, in priority order.
    pub fn missing_slot(&self) -> Option<SlotName> {
        SlotName::ALL
            .into_iter()
            .find(|slot| self.is_required(*slot) && !self.is_known(*slot))
    }

    /// Every required slot is known.
    pub fn is_complete(&self) -> bool {
        self.missing_slot().is_none()
    }

    /// True when nothing at all is set.
    pub fn is_empty(&self) -> bool {
        SlotName::ALL.into_iter().all(|slot| !self.is_known(slot))
    }

    /// Fills every unset slot from `update`, leaving known slots untouched.
    ///
    /// Returns the names of the slots that were newly filled.
    pub fn merge_unset(&mut self, update: &Slots) -> Vec<SlotName> {
        let mut filled = Vec::new();

        fn fill<T: Clone>(
            target: &mut Option<T>,
            source: &Option<T>,
            name: SlotName,
            filled: &mut Vec<SlotName>,
        ) {
            if target.is_none() {
                if let Some(value) = source {
                    *target = Some(value.clone());
                    filled.push(name);
                }
            }
        }

        fill(&mut self.purpose, &update.purpose, SlotName::Purpose, &mut filled);
        fill(
            &mut self.age_over_threshold,
            &update.age_over_threshold,
            SlotName::AgeOverThreshold,
            &mut filled,
        );
        fill(
            &mut self.is_primary_residence,
            &update.is_primary_residence,
            SlotName::IsPrimaryResidence,
            &mut filled,
        );
        fill(
            &mut self.mortgage_status,
            &update.mortgage_status,
            SlotName::MortgageStatus,
            &mut filled,
        );
        fill(
            &mut self.estimated_property_value,
            &update.estimated_property_value,
            SlotName::EstimatedPropertyValue,
            &mut filled,
        );
        // A paid-off property never carries a balance, whichever answer came first.
        if self.mortgage_status != Some(MortgageStatus::PaidOff) {
            fill(
                &mut self.estimated_mortgage_balance,
                &update.estimated_mortgage_balance,
                SlotName::EstimatedMortgageBalance,
                &mut filled,
            );
        }

        filled
    }
}

/// Business-rule conflicts between mortgage fields of one extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleViolation {
    /// `paid_off` was reported together with a positive balance.
    PaidOffWithBalance,
    /// `has_balance` was reported together with a zero balance.
    HasBalanceWithoutAmount,
}

impl std::fmt::Display for RuleViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PaidOffWithBalance => f.write_str("paid_off reported with a balance"),
            Self::HasBalanceWithoutAmount => f.write_str("has_balance reported with zero balance"),
        }
    }
}

/// Checks an extraction against the already-known facts.
///
/// The combined view is what matters: a balance extracted on its own is a
/// violation when the stored status is already `paid_off`.
///
/// `has_balance` with no balance yet is accepted on purpose: the balance is
/// asked for as its own question, after the property value.
pub fn check_rules(prior: &Slots, update: &Slots) -> Result<(), RuleViolation> {
    let status = prior.mortgage_status.or(update.mortgage_status);
    let balance = update
        .estimated_mortgage_balance
        .or(prior.estimated_mortgage_balance);

    match (status, balance) {
        (Some(MortgageStatus::PaidOff), Some(amount)) if amount > 0 => {
            Err(RuleViolation::PaidOffWithBalance)
        }
        (Some(MortgageStatus::HasBalance), Some(0)) => Err(RuleViolation::HasBalanceWithoutAmount),
        _ => Ok(()),
    }
}

/// Drops the mortgage fields of `update` if they break a business rule.
///
/// Violations are treated as a low-confidence extraction rather than an
/// error; the remaining fields survive.
pub fn sanitize(prior: &Slots, mut update: Slots) -> Slots {
    if let Err(violation) = check_rules(prior, &update) {
        warn!(%violation, "dropping mortgage fields from extraction");
        update.mortgage_status = None;
        update.estimated_mortgage_balance = None;
    }
    update
}
