//! Append-only chat log.
//!
//! Entries are identified by `(sender, sequence)` of the envelope that
//! created them, which lets history bootstraps merge without duplicating
//! lines a peer already has. Display order is local receipt order.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::protocol::PeerId;

/// One chat line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEntry {
    pub sender: PeerId,
    /// Sequence of the envelope that carried the line
    pub sequence: u64,
    pub text: String,
    /// Sender's clock, milliseconds since the epoch
    pub timestamp: u64,
    /// Position in this peer's log; not carried on the wire
    #[serde(skip)]
    pub receipt_order: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ChatLog {
    entries: Vec<ChatEntry>,
    ids: HashSet<(PeerId, u64)>,
}

impl ChatLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a line. Returns `None` if `(sender, sequence)` is already logged.
    pub fn append(&mut self, sender: PeerId, sequence: u64, text: String, timestamp: u64) -> Option<&ChatEntry> {
        if self.ids.contains(&(sender.clone(), sequence)) {
            return None;
        }
        Some(self.push(sender, sequence, text, timestamp))
    }

    /// Append a line whose `(sender, sequence)` is not logged yet, such as
    /// one authored here with a sequence past [`last_sequence`](Self::last_sequence).
    pub fn push(&mut self, sender: PeerId, sequence: u64, text: String, timestamp: u64) -> &ChatEntry {
        self.ids.insert((sender.clone(), sequence));
        let index = self.entries.len();
        self.entries.push(ChatEntry {
            sender,
            sequence,
            text,
            timestamp,
            receipt_order: index as u64,
        });
        &self.entries[index]
    }

    /// Highest sequence logged for `sender`.
    pub fn last_sequence(&self, sender: &PeerId) -> Option<u64> {
        self.entries
            .iter()
            .filter(|e| e.sender == *sender)
            .map(|e| e.sequence)
            .max()
    }

    /// Merge a history snapshot, keeping its order. Returns the new entries.
    pub fn merge_history(&mut self, history: Vec<ChatEntry>) -> Vec<ChatEntry> {
        history
            .into_iter()
            .filter_map(|e| self.append(e.sender, e.sequence, e.text, e.timestamp).cloned())
            .collect()
    }

    pub fn entries(&self) -> &[ChatEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Texts in display order.
    pub fn texts(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.text.as_str()).collect()
    }
}
