//! Short rolling transcript per conversation.
//!
//! Entries are shown to the model with their index (`[3] User: …`), and the
//! model answers with non-negative indexes into this list when it quotes or
//! reacts to a specific earlier message.

use std::collections::VecDeque;

use parley_core::MessageRef;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Bot,
}

impl Speaker {
    pub fn label(&self) -> &'static str {
        match self {
            Speaker::User => "User",
            Speaker::Bot => "Bot",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub speaker: Speaker,
    pub content: String,
    /// Platform handle, when the message can be quoted or reacted to.
    pub message: Option<MessageRef>,
}

/// Bounded transcript; the oldest entries fall off first.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    max_entries: usize,
    entries: VecDeque<HistoryEntry>,
}

impl ConversationHistory {
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries: max_entries.max(1),
            entries: VecDeque::new(),
        }
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.push_back(entry);
        while self.entries.len() > self.max_entries {
            self.entries.pop_front();
        }
    }

    pub fn push_user(&mut self, content: impl Into<String>, message: Option<MessageRef>) {
        self.push(HistoryEntry {
            speaker: Speaker::User,
            content: content.into(),
            message,
        });
    }

    pub fn push_bot(&mut self, content: impl Into<String>, message: Option<MessageRef>) {
        self.push(HistoryEntry {
            speaker: Speaker::Bot,
            content: content.into(),
            message,
        });
    }

    pub fn get(&self, index: usize) -> Option<&HistoryEntry> {
        self.entries.get(index)
    }

    /// Resolve a history index to a quotable message, if it has a platform id.
    pub fn message_ref(&self, index: usize) -> Option<MessageRef> {
        self.entries.get(index).and_then(|e| e.message.clone())
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render as `[i] Speaker: content` lines, one per entry.
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, e)| format!("[{}] {}: {}", i, e.speaker.label(), e.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::new(parley_core::config::DEFAULT_HISTORY_ENTRIES)
    }
}
