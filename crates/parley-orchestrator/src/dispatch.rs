//! Turns decoded actions into messenger calls.
//!
//! Every call is best effort: a failure is logged and the next action is
//! still attempted. Index targets resolve against the conversation history
//! (`>= 0`) or the sent-message ledger (`< 0`).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parley_agent::{Action, ActionSink};
use parley_channels::{Messenger, SentReceipt};
use parley_core::{ConversationId, MessageRef, ReactionKind};
use parley_sessions::{ConversationHistory, SentLedger, SentMessageRecord};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// History and ledger for one conversation.
#[derive(Debug, Default)]
pub struct ConversationState {
    pub history: ConversationHistory,
    pub ledger: SentLedger,
}

impl ConversationState {
    pub fn new(history_entries: usize, ledger_capacity: usize) -> Self {
        Self {
            history: ConversationHistory::new(history_entries),
            ledger: SentLedger::new(ledger_capacity),
        }
    }

    /// `>= 0` indexes the history, `< 0` the ledger.
    pub fn resolve(&self, index: i64) -> Option<MessageRef> {
        if index >= 0 {
            self.history.message_ref(usize::try_from(index).ok()?)
        } else {
            self.ledger.get(index).map(SentMessageRecord::message_ref)
        }
    }
}

/// Counters for one run, logged when it ends.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchStats {
    pub reactions: usize,
    pub stickers: usize,
    pub messages: usize,
    pub undos: usize,
    pub failures: usize,
}

pub struct ChatDispatcher {
    messenger: Arc<dyn Messenger>,
    conversation: ConversationId,
    state: Arc<Mutex<ConversationState>>,
    /// Where an index-less reaction lands: the newest message being answered.
    reply_target: Option<MessageRef>,
    cancel: CancellationToken,
    gap: Duration,
    defer_stickers: bool,
    deferred: Vec<String>,
    sent_messages: usize,
    stats: DispatchStats,
}

impl ChatDispatcher {
    pub fn new(
        messenger: Arc<dyn Messenger>,
        conversation: ConversationId,
        state: Arc<Mutex<ConversationState>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            messenger,
            conversation,
            state,
            reply_target: None,
            cancel,
            gap: Duration::ZERO,
            defer_stickers: false,
            deferred: Vec::new(),
            sent_messages: 0,
            stats: DispatchStats::default(),
        }
    }

    pub fn with_reply_target(mut self, target: Option<MessageRef>) -> Self {
        self.reply_target = target;
        self
    }

    /// Pause between consecutive text messages.
    pub fn with_message_gap(mut self, gap: Duration) -> Self {
        self.gap = gap;
        self
    }

    /// Hold stickers back until [`ChatDispatcher::flush_deferred`].
    pub fn with_deferred_stickers(mut self, defer: bool) -> Self {
        self.defer_stickers = defer;
        self
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    /// Send stickers held back during the run. Skipped entirely once the run
    /// has been cancelled.
    pub async fn flush_deferred(&mut self) {
        for keyword in std::mem::take(&mut self.deferred) {
            if self.cancel.is_cancelled() {
                debug!(conversation = %self.conversation, "dropping deferred stickers after cancel");
                return;
            }
            self.send_sticker(&keyword).await;
        }
    }

    /// The token may have fired while an index lookup waited on the lock.
    fn cancelled_before_send(&self, action: &str) -> bool {
        let cancelled = self.cancel.is_cancelled();
        if cancelled {
            debug!(conversation = %self.conversation, action, "run cancelled, not sending");
        }
        cancelled
    }

    async fn resolve(&self, index: i64) -> Option<MessageRef> {
        self.state.lock().await.resolve(index)
    }

    async fn send_reaction(&mut self, kind: ReactionKind, related_index: Option<i64>) {
        let target = match related_index {
            Some(i) => self.resolve(i).await,
            None => self.reply_target.clone(),
        };
        let Some(target) = target else {
            debug!(conversation = %self.conversation, %kind, ?related_index, "no reaction target, skipping");
            return;
        };
        if self.cancelled_before_send("reaction") {
            return;
        }
        match self
            .messenger
            .send_reaction(&self.conversation, kind, &target)
            .await
        {
            Ok(()) => self.stats.reactions += 1,
            Err(e) => self.failed("reaction", &e),
        }
    }

    async fn send_sticker(&mut self, keyword: &str) {
        match self.messenger.send_sticker(&self.conversation, keyword).await {
            Ok(Some(receipt)) => {
                self.stats.stickers += 1;
                self.record(receipt, format!("[sticker:{keyword}]")).await;
            }
            Ok(None) => debug!(conversation = %self.conversation, keyword, "no sticker for keyword"),
            Err(e) => self.failed("sticker", &e),
        }
    }

    async fn send_message(&mut self, text: String, quote_index: Option<i64>) {
        if self.sent_messages > 0 && !self.gap.is_zero() {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(self.gap) => {}
            }
        }
        let quote = match quote_index {
            Some(i) => {
                let found = self.resolve(i).await;
                if found.is_none() {
                    debug!(conversation = %self.conversation, index = i, "quote target not found, sending unquoted");
                }
                found
            }
            None => None,
        };
        if self.cancelled_before_send("message") {
            return;
        }
        match self
            .messenger
            .send_message(&self.conversation, &text, quote.as_ref())
            .await
        {
            Ok(receipt) => {
                self.sent_messages += 1;
                self.stats.messages += 1;
                self.record(receipt, text).await;
            }
            Err(e) => self.failed("message", &e),
        }
    }

    async fn retract(&mut self, target_index: i64) {
        let record = self.state.lock().await.ledger.get(target_index).cloned();
        let Some(record) = record else {
            debug!(conversation = %self.conversation, target_index, "undo target not in ledger");
            return;
        };
        if self.cancelled_before_send("undo") {
            return;
        }
        match self
            .messenger
            .retract(&self.conversation, &record.message_ref())
            .await
        {
            Ok(()) => {
                self.state
                    .lock()
                    .await
                    .ledger
                    .remove(&record.platform_message_id);
                self.stats.undos += 1;
                info!(conversation = %self.conversation, msg_id = %record.platform_message_id, "message retracted");
            }
            Err(e) => self.failed("undo", &e),
        }
    }

    async fn record(&self, receipt: SentReceipt, content: String) {
        let entry = SentMessageRecord::new(
            receipt.platform_message_id,
            receipt.client_message_id,
            content.clone(),
        );
        let reference = entry.message_ref();
        let mut state = self.state.lock().await;
        state.ledger.record(entry);
        state.history.push_bot(content, Some(reference));
    }

    fn failed(&mut self, what: &str, error: &dyn std::fmt::Display) {
        self.stats.failures += 1;
        warn!(conversation = %self.conversation, action = what, error = %error, "dispatch failed, continuing");
    }
}

#[async_trait]
impl ActionSink for ChatDispatcher {
    async fn emit(&mut self, action: Action) {
        match action {
            Action::Reaction {
                kind,
                related_index,
            } => self.send_reaction(kind, related_index).await,
            Action::Sticker { keyword } if self.defer_stickers => self.deferred.push(keyword),
            Action::Sticker { keyword } => self.send_sticker(&keyword).await,
            Action::Message { text, quote_index } => self.send_message(text, quote_index).await,
            Action::Undo { target_index } => self.retract(target_index).await,
        }
    }
}
