//! Bounded record of the bot's own recently sent messages.
//!
//! The model refers to its own earlier output with negative indexes
//! (`[quote:-1]…`, `[undo:-2]`), so the ledger keeps the last N sends per
//! conversation in order and resolves those indexes to platform ids.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use parley_core::MessageRef;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One message the bot sent, as acknowledged by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentMessageRecord {
    pub platform_message_id: String,
    pub client_message_id: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl SentMessageRecord {
    pub fn new(
        platform_message_id: impl Into<String>,
        client_message_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            platform_message_id: platform_message_id.into(),
            client_message_id: client_message_id.into(),
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Handle used to quote or retract this message.
    pub fn message_ref(&self) -> MessageRef {
        MessageRef {
            platform_message_id: self.platform_message_id.clone(),
            client_message_id: Some(self.client_message_id.clone()),
            content: Some(self.content.clone()),
        }
    }
}

/// Capacity-bounded ring of sent messages, oldest first.
#[derive(Debug, Clone)]
pub struct SentLedger {
    capacity: usize,
    entries: VecDeque<SentMessageRecord>,
}

impl SentLedger {
    /// A capacity of zero is bumped to one so `get(-1)` stays meaningful.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Append `entry`, evicting the oldest record on overflow.
    ///
    /// Returns the absolute index the new record was stored at.
    pub fn record(&mut self, entry: SentMessageRecord) -> usize {
        debug!(msg_id = %entry.platform_message_id, "ledger: recording sent message");
        self.entries.push_back(entry);
        while self.entries.len() > self.capacity {
            if let Some(evicted) = self.entries.pop_front() {
                debug!(msg_id = %evicted.platform_message_id, "ledger: evicted oldest");
            }
        }
        self.entries.len() - 1
    }

    /// Resolve an index: `>= 0` counts from the oldest retained record,
    /// `< 0` counts back from the newest (`-1` = most recent).
    ///
    /// Out-of-range indexes return `None`.
    pub fn get(&self, index: i64) -> Option<&SentMessageRecord> {
        let len = self.entries.len() as i64;
        let actual = if index < 0 { len + index } else { index };
        if actual < 0 || actual >= len {
            return None;
        }
        self.entries.get(actual as usize)
    }

    /// Remove a record by platform id regardless of its position.
    pub fn remove(&mut self, platform_message_id: &str) -> Option<SentMessageRecord> {
        let pos = self
            .entries
            .iter()
            .position(|e| e.platform_message_id == platform_message_id)?;
        self.entries.remove(pos)
    }

    /// Drop records older than `max_age`. Returns how many were removed.
    pub fn prune_older_than(&mut self, max_age: Duration) -> usize {
        let cutoff = Utc::now() - max_age;
        let before = self.entries.len();
        self.entries.retain(|e| e.timestamp > cutoff);
        before - self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SentMessageRecord> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for SentLedger {
    fn default() -> Self {
        Self::new(parley_core::config::DEFAULT_LEDGER_CAPACITY)
    }
}
