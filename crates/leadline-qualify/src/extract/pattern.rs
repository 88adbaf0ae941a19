//! Keyword and number-pattern extraction.
//!
//! Deterministic and offline. Rules per slot are evaluated in a fixed order,
//! and negative phrasings are checked before positive ones so that
//! "I don't have a mortgage" is not read as "have a mortgage".

use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;

use super::numbers::{money_mentions, parse_number_words};
use super::SlotExtractor;
use crate::error::ExtractError;
use crate::slots::{MortgageStatus, SlotName, Slots, AGE_THRESHOLD};

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("pattern extractor regex is valid")
}

static PURPOSE_RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        (
            re(r"(?i)\b(?:eliminate|get rid of|stop making)\b.{0,20}\bpayments?\b"),
            "eliminate monthly mortgage payment",
        ),
        (
            re(r"(?i)\b(?:pay (?:off|down)|consolidat\w*|debts?|bills|credit cards?)\b"),
            "pay off debt",
        ),
        (
            re(r"(?i)\b(?:retire\w*|income|social security|cash flow|make ends meet|living expenses)\b"),
            "supplement retirement income",
        ),
        (
            re(r"(?i)\b(?:repairs?|renovat\w*|remodel\w*|new roof|home improvements?|fix up)\b"),
            "home improvements",
        ),
        (
            re(r"(?i)\b(?:medical|health ?care|hospital|prescriptions?|long[- ]term care)\b"),
            "healthcare costs",
        ),
        (
            re(r"(?i)\b(?:travel\w*|vacations?|trips?)\b"),
            "travel",
        ),
        (
            re(r"(?i)\b(?:help (?:my|our) (?:kids|children|grandkids|grandchildren|family))\b"),
            "help family",
        ),
    ]
});

static AGE_DIGITS_RE: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?i)\b(?:i'?m|i am|aged?|age is|turn(?:ed|ing)?)\s+(?:about\s+|almost\s+|nearly\s+)?(\d{2,3})\b")
});
static AGE_YEARS_RE: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?i)\b(\d{2,3})\s*(?:years?|yrs?)(?:\s+old)?\b"));
static AGE_WORDS_RE: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?i)\b(?:i'?m|i am|aged?|turn(?:ed|ing)?)\s+([a-z]+(?:[- ][a-z]+)?)")
});
static AGE_OVER_RE: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?i)\b(?:over|older than|past|above)\s+(?:sixty[- ]two|62)\b")
});
static AGE_UNDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?i)\b(?:under|younger than|not (?:yet )?(?:sixty[- ]two|62))\b")
});

static NOT_RESIDENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?i)\b(?:rental|rent it out|investment property|vacation home|second home|don'?t live (?:there|in it)|do not live (?:there|in it)|tenants?)\b")
});
static RESIDENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?i)\b(?:primary (?:residence|home)|only home|main home|live (?:there|here|in it)|where i live|live in the (?:house|home)|full[- ]time)\b")
});

static NOT_PAID_OFF_RE: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?i)\bnot (?:yet |quite )?paid off\b"));
static PAID_OFF_RE: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?i)\b(?:paid (?:it )?off|own it (?:free and clear|outright)|free and clear|no mortgage|don'?t have a mortgage|mortgage[- ]free)\b")
});
static HAS_BALANCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?i)\b(?:still (?:owe|have a mortgage|paying)|remaining balance|mortgage balance|outstanding balance|have a mortgage|owe)\b")
});

static BALANCE_CUE_RE: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?i)\b(?:still owe|remaining balance|owe|balance|left on (?:the|my) (?:mortgage|loan)|payoff amount)\b")
});

static NO_RE: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?i)^\s*(?:no|nope|nah|not yet|i'?m not|i am not|it'?s not|it is not|it isn'?t)\b")
});
static YES_RE: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?i)^\s*(?:yes|yeah|yep|yup|correct|that'?s right|i am|it is|sure|absolutely|definitely|uh[- ]huh)\b")
});

/// Pattern-based slot extractor. Always succeeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternExtractor;

impl PatternExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Synchronous core of the strategy.
    pub fn extract_slots(&self, utterance: &str, prior: &Slots) -> Slots {
        let mut update = Slots {
            purpose: extract_purpose(utterance),
            age_over_threshold: extract_age(utterance),
            is_primary_residence: extract_residence(utterance),
            mortgage_status: extract_mortgage_status(utterance),
            ..Slots::default()
        };
        attribute_money(utterance, prior, &mut update);

        if update.is_empty() {
            answer_pending_question(utterance, prior, &mut update);
        }
        update
    }
}

#[async_trait]
impl SlotExtractor for PatternExtractor {
    fn name(&self) -> &'static str {
        "pattern"
    }

    async fn extract(&self, utterance: &str, prior: &Slots) -> Result<Slots, ExtractError> {
        Ok(self.extract_slots(utterance, prior))
    }
}

fn extract_purpose(text: &str) -> Option<String> {
    PURPOSE_RULES
        .iter()
        .find(|(pattern, _)| pattern.is_match(text))
        .map(|(_, label)| (*label).to_string())
}

/// Digits directly after the age cue must not be the start of an amount.
fn looks_like_amount(rest: &str) -> bool {
    let rest = rest.trim_start().to_ascii_lowercase();
    let mut chars = rest.chars();
    match chars.next() {
        Some('%') => true,
        Some(',') | Some('.') => chars.next().is_some_and(|c| c.is_ascii_digit()),
        Some('k') => !chars.next().is_some_and(|c| c.is_ascii_alphabetic()),
        _ => rest.starts_with("thousand") || rest.starts_with("grand"),
    }
}

fn extract_age(text: &str) -> Option<bool> {
    if AGE_UNDER_RE.is_match(text) {
        return Some(false);
    }
    if AGE_OVER_RE.is_match(text) {
        return Some(true);
    }

    let digit_age = AGE_DIGITS_RE
        .captures_iter(text)
        .chain(AGE_YEARS_RE.captures_iter(text))
        .find_map(|caps| {
            let group = caps.get(1)?;
            if looks_like_amount(&text[group.end()..]) {
                return None;
            }
            group.as_str().parse::<u32>().ok()
        });

    let age = digit_age.or_else(|| {
        AGE_WORDS_RE.captures_iter(text).find_map(|caps| {
            let words = caps.get(1)?.as_str();
            // "seventy two" or just "seventy" followed by something else.
            parse_number_words(words)
                .or_else(|| parse_number_words(words.split([' ', '-']).next()?))
                .and_then(|n| u32::try_from(n).ok())
        })
    });

    age.filter(|years| (18..=120).contains(years))
        .map(|years| years >= AGE_THRESHOLD)
}

fn extract_residence(text: &str) -> Option<bool> {
    if NOT_RESIDENCE_RE.is_match(text) {
        Some(false)
    } else if RESIDENCE_RE.is_match(text) {
        Some(true)
    } else {
        None
    }
}

fn extract_mortgage_status(text: &str) -> Option<MortgageStatus> {
    if NOT_PAID_OFF_RE.is_match(text) {
        Some(MortgageStatus::HasBalance)
    } else if PAID_OFF_RE.is_match(text) {
        Some(MortgageStatus::PaidOff)
    } else if HAS_BALANCE_RE.is_match(text) {
        Some(MortgageStatus::HasBalance)
    } else {
        None
    }
}

/// Attributes the first monetary mention.
///
/// It goes to the property value unless a balance cue is present. When the
/// property value is already known and only the balance is outstanding, a
/// bare amount answers the balance question.
fn attribute_money(text: &str, prior: &Slots, update: &mut Slots) {
    let Some(first) = money_mentions(text).into_iter().next() else {
        return;
    };

    let status = prior.mortgage_status.or(update.mortgage_status);
    let balance_pending = prior.estimated_property_value.is_some()
        && status == Some(MortgageStatus::HasBalance)
        && prior.estimated_mortgage_balance.is_none();

    if BALANCE_CUE_RE.is_match(text) || balance_pending {
        update.estimated_mortgage_balance = Some(first.value);
        if status.is_none() {
            update.mortgage_status = Some(MortgageStatus::HasBalance);
        }
    } else {
        update.estimated_property_value = Some(first.value);
    }
}

/// A bare yes/no answers the first missing yes/no question.
fn answer_pending_question(text: &str, prior: &Slots, update: &mut Slots) {
    let Some(slot) = prior.missing_slot().filter(|slot| slot.is_boolean()) else {
        return;
    };
    let answer = if NO_RE.is_match(text) {
        false
    } else if YES_RE.is_match(text) {
        true
    } else {
        return;
    };

    match slot {
        SlotName::AgeOverThreshold => update.age_over_threshold = Some(answer),
        SlotName::IsPrimaryResidence => update.is_primary_residence = Some(answer),
        _ => {}
    }
}
