//! Transcript accumulation for one call.
//!
//! Caller turns arrive already finalized. Agent turns stream in as deltas
//! keyed by the provider's item id and are joined on `done`. A cancelled
//! agent turn is sealed: later deltas for its key are dropped.

use std::collections::{HashMap, HashSet};

use leadline_types::{Speaker, TranscriptEntry};
use tracing::debug;

#[derive(Debug, Default)]
struct OpenBuffer {
    text: String,
    /// Arrival order of the first fragment, for close-out ordering.
    seq: u64,
}

#[derive(Debug, Default)]
pub struct TranscriptAccumulator {
    entries: Vec<TranscriptEntry>,
    recorded: HashSet<String>,
    open: HashMap<String, OpenBuffer>,
    sealed: HashSet<String>,
    next_seq: u64,
}

impl TranscriptAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<TranscriptEntry> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends a finalized turn once per key. Returns whether it was added.
    pub fn append_final(&mut self, speaker: Speaker, text: &str, turn_key: &str) -> bool {
        if self.recorded.contains(turn_key) {
            debug!(turn_key, "duplicate final turn ignored");
            return false;
        }
        self.recorded.insert(turn_key.to_string());
        self.entries
            .push(TranscriptEntry::new(speaker, text, turn_key));
        true
    }

    /// Appends a fragment to the open buffer for `turn_key`.
    pub fn accumulate_delta(&mut self, turn_key: &str, fragment: &str) {
        if self.sealed.contains(turn_key) || self.recorded.contains(turn_key) {
            return;
        }
        let next_seq = &mut self.next_seq;
        let buffer = self.open.entry(turn_key.to_string()).or_insert_with(|| {
            *next_seq += 1;
            OpenBuffer {
                text: String::new(),
                seq: *next_seq,
            }
        });
        buffer.text.push_str(fragment);
    }

    /// Closes the buffer and returns its text. Unknown keys yield `""`.
    pub fn finalize(&mut self, turn_key: &str) -> String {
        self.sealed.insert(turn_key.to_string());
        self.open
            .remove(turn_key)
            .map(|buffer| buffer.text)
            .unwrap_or_default()
    }

    /// Discards the buffer without recording it.
    pub fn cancel(&mut self, turn_key: &str) {
        self.sealed.insert(turn_key.to_string());
        if self.open.remove(turn_key).is_some() {
            debug!(turn_key, "agent turn discarded");
        }
    }

    /// Finalizes an agent turn and records it unless it is empty.
    pub fn finish_agent_turn(&mut self, turn_key: &str) -> Option<String> {
        let text = self.finalize(turn_key);
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        self.append_final(Speaker::Agent, text, turn_key)
            .then(|| text.to_string())
    }

    /// Keys of agent turns still being streamed.
    pub fn open_keys(&self) -> Vec<String> {
        let mut keys: Vec<(&String, u64)> =
            self.open.iter().map(|(key, buffer)| (key, buffer.seq)).collect();
        keys.sort_by_key(|(_, seq)| *seq);
        keys.into_iter().map(|(key, _)| key.clone()).collect()
    }

    /// Records every still-open agent turn, oldest first. Used at call close.
    pub fn flush_open(&mut self) -> usize {
        let mut flushed = 0;
        for key in self.open_keys() {
            if self.finish_agent_turn(&key).is_some() {
                flushed += 1;
            }
        }
        flushed
    }
}
