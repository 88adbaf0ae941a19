//! Permissive number parsing for spoken and transcribed amounts.
//!
//! Accepts digit forms (`600000`, `600,000`, `$600k`, `1.2 million`) and word
//! forms (`six hundred thousand`, `a million`). Offsets are byte offsets into
//! the original text so callers can order mentions.

use regex::Regex;
use std::sync::LazyLock;

static DIGIT_AMOUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(\$\s*)?(\d{1,3}(?:,\d{3})+(?:\.\d+)?|\d+(?:\.\d+)?)(?:\s*(k|thousand|grand|m|mil|million)\b)?",
    )
    .expect("digit amount pattern is valid")
});

static WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-z]+(?:-[a-z]+)*").expect("word pattern is valid"));

/// Bare digit runs below this are not treated as money (ages, years, counts).
const BARE_MONEY_MIN: u64 = 10_000;

/// Word-form runs below this are not treated as money.
const WORD_MONEY_MIN: u64 = 1_000;

/// A number found in text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Amount {
    pub value: u64,
    /// Byte offset of the first character of the mention.
    pub start: usize,
    /// Byte offset one past the mention.
    pub end: usize,
}

fn unit_value(word: &str) -> Option<u64> {
    let value = match word {
        "zero" => 0,
        "one" => 1,
        "two" => 2,
        "three" => 3,
        "four" => 4,
        "five" => 5,
        "six" => 6,
        "seven" => 7,
        "eight" => 8,
        "nine" => 9,
        "ten" => 10,
        "eleven" => 11,
        "twelve" => 12,
        "thirteen" => 13,
        "fourteen" => 14,
        "fifteen" => 15,
        "sixteen" => 16,
        "seventeen" => 17,
        "eighteen" => 18,
        "nineteen" => 19,
        "twenty" => 20,
        "thirty" => 30,
        "forty" => 40,
        "fifty" => 50,
        "sixty" => 60,
        "seventy" => 70,
        "eighty" => 80,
        "ninety" => 90,
        _ => return None,
    };
    Some(value)
}

fn scale_value(word: &str) -> Option<u64> {
    match word {
        "hundred" => Some(100),
        "thousand" | "grand" => Some(1_000),
        "million" => Some(1_000_000),
        _ => None,
    }
}

fn starts_with_unit(word: &str) -> bool {
    word.split('-')
        .next()
        .is_some_and(|first| unit_value(first).is_some())
}

fn is_number_word(word: &str) -> bool {
    word.split('-')
        .all(|part| unit_value(part).is_some() || scale_value(part).is_some())
}

/// Parses a sequence of number words such as `seven hundred fifty thousand`.
///
/// Returns `None` when the text contains anything other than number words,
/// `and`, or a leading `a`.
pub fn parse_number_words(text: &str) -> Option<u64> {
    let lowered = text.to_ascii_lowercase();
    let words: Vec<&str> = WORD_RE.find_iter(&lowered).map(|m| m.as_str()).collect();
    if words.is_empty() {
        return None;
    }

    let mut total: u64 = 0;
    let mut current: u64 = 0;
    let mut seen = false;

    for (i, word) in words.iter().enumerate() {
        if *word == "and" && seen {
            continue;
        }
        if *word == "a" && i + 1 < words.len() && scale_value(words[i + 1]).is_some() {
            current = current.max(1);
            continue;
        }
        for part in word.split('-') {
            if let Some(value) = unit_value(part) {
                current = current.checked_add(value)?;
            } else if let Some(scale) = scale_value(part) {
                if scale == 100 {
                    current = current.max(1).checked_mul(100)?;
                } else {
                    total = total.checked_add(current.max(1).checked_mul(scale)?)?;
                    current = 0;
                }
            } else {
                return None;
            }
            seen = true;
        }
    }

    if seen {
        total.checked_add(current)
    } else {
        None
    }
}

/// Word-form number runs in `text`, in order of appearance.
pub fn word_numbers(text: &str) -> Vec<Amount> {
    let lowered = text.to_ascii_lowercase();
    let words: Vec<regex::Match<'_>> = WORD_RE.find_iter(&lowered).collect();
    let mut runs = Vec::new();
    let mut i = 0;

    while i < words.len() {
        let word = words[i].as_str();
        let starts_run = (starts_with_unit(word) && is_number_word(word))
            || (word == "a"
                && words
                    .get(i + 1)
                    .is_some_and(|next| scale_value(next.as_str()).is_some()));
        if !starts_run {
            i += 1;
            continue;
        }

        let mut j = i + 1;
        while j < words.len() {
            let next = words[j].as_str();
            let continues = is_number_word(next)
                || (next == "and"
                    && words
                        .get(j + 1)
                        .is_some_and(|after| is_number_word(after.as_str())));
            if !continues {
                break;
            }
            j += 1;
        }

        let start = words[i].start();
        let end = words[j - 1].end();
        if let Some(value) = parse_number_words(&lowered[start..end]) {
            runs.push(Amount { value, start, end });
        }
        i = j;
    }

    runs
}

/// Monetary mentions in `text`, in order of appearance.
///
/// A digit run counts as money when it carries a `$`, a magnitude suffix, or
/// is large enough that it cannot be an age or a year. Word runs count when
/// they reach a thousand.
pub fn money_mentions(text: &str) -> Vec<Amount> {
    let mut mentions = Vec::new();

    for caps in DIGIT_AMOUNT_RE.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        let has_dollar = caps.get(1).is_some();
        let suffix = caps.get(3).map(|m| m.as_str().to_ascii_lowercase());
        let Ok(base) = caps[2].replace(',', "").parse::<f64>() else {
            continue;
        };

        let multiplier = match suffix.as_deref() {
            Some("k") | Some("thousand") | Some("grand") => 1_000.0,
            Some("m") | Some("mil") | Some("million") => 1_000_000.0,
            _ => 1.0,
        };
        let value = (base * multiplier).round() as u64;

        if has_dollar || suffix.is_some() || value >= BARE_MONEY_MIN {
            mentions.push(Amount {
                value,
                start: whole.start(),
                end: whole.end(),
            });
        }
    }

    mentions.extend(
        word_numbers(text)
            .into_iter()
            .filter(|amount| amount.value >= WORD_MONEY_MIN),
    );
    mentions.sort_by_key(|amount| amount.start);
    mentions
}
