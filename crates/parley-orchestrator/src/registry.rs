use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parley_channels::InboundMessage;
use parley_core::ConversationId;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::conversation::{ConversationHandle, Status};
use crate::services::Services;
use crate::task::TaskController;

/// Conversation id → running conversation task.
///
/// Conversations are created on their first inbound message and removed by
/// [`ConversationRegistry::evict_idle`].
pub struct ConversationRegistry {
    services: Arc<Services>,
    controller: TaskController,
    conversations: DashMap<ConversationId, ConversationHandle>,
}

impl ConversationRegistry {
    pub fn new(services: Arc<Services>) -> Self {
        Self {
            services,
            controller: TaskController::new(),
            conversations: DashMap::new(),
        }
    }

    /// Route `msg` to its conversation, starting one if needed.
    pub fn handle_inbound(&self, msg: InboundMessage) {
        let id = msg.conversation_id.clone();
        let mut entry = self
            .conversations
            .entry(id.clone())
            .or_insert_with(|| self.spawn(&id));

        if let Err(msg) = entry.send(msg) {
            // The task exited (it only does so when its handle is dropped,
            // so this is rare); replace it and retry once.
            warn!(conversation = %id, "conversation task gone, restarting");
            *entry = self.spawn(&id);
            if entry.send(msg).is_err() {
                warn!(conversation = %id, "dropping inbound message");
            }
        }
    }

    fn spawn(&self, id: &ConversationId) -> ConversationHandle {
        info!(conversation = %id, "new conversation");
        ConversationHandle::spawn(id.clone(), self.services.clone(), self.controller.clone())
    }

    pub fn status(&self, id: &ConversationId) -> Option<Status> {
        self.conversations.get(id).map(|c| c.status())
    }

    pub fn subscribe(&self, id: &ConversationId) -> Option<watch::Receiver<Status>> {
        self.conversations.get(id).map(|c| c.subscribe())
    }

    /// Drop conversations that have been idle for at least `max_idle`.
    ///
    /// Dropping the handle closes the task's inbox, which ends the task.
    /// A conversation with messages still queued for its task is kept even
    /// if its last published status is an old `Idle`.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let before = self.conversations.len();
        self.conversations.retain(|id, conv| {
            let evict = conv.is_quiescent() && conv.status().since.elapsed() >= max_idle;
            if evict {
                debug!(conversation = %id, "evicting idle conversation");
            }
            !evict
        });
        before.saturating_sub(self.conversations.len())
    }

    /// Prune ledger records older than `max_age` in every conversation.
    pub async fn sweep_ledgers(&self, max_age: chrono::Duration) -> usize {
        let states: Vec<_> = self
            .conversations
            .iter()
            .map(|c| c.state().clone())
            .collect();
        let mut removed = 0;
        for state in states {
            removed += state.lock().await.ledger.prune_older_than(max_age);
        }
        if removed > 0 {
            debug!(removed, "pruned stale ledger records");
        }
        removed
    }

    /// True when no conversation is collecting or processing.
    pub fn all_idle(&self) -> bool {
        self.conversations
            .iter()
            .all(|c| c.is_quiescent())
    }

    /// Signal every active run. Conversations keep accepting input.
    pub fn signal_all(&self) -> usize {
        let n = self.controller.signal_all();
        if n > 0 {
            info!(cancelled = n, "signalled all active runs");
        }
        n
    }

    pub fn controller(&self) -> &TaskController {
        &self.controller
    }

    pub fn services(&self) -> &Arc<Services> {
        &self.services
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }
}
