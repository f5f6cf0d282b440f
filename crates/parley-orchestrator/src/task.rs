//! Cancellation handles for generation runs, one per conversation.
//!
//! Cancellation is cooperative: the decoder, dispatcher and generator poll
//! the token at their safe points. Nothing here aborts a task.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parley_core::ConversationId;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Token for one run, plus the id used to retire it.
#[derive(Debug, Clone)]
pub struct RunTicket {
    pub run_id: u64,
    pub token: CancellationToken,
}

#[derive(Debug)]
struct ActiveRun {
    run_id: u64,
    token: CancellationToken,
}

/// Holds the current cancellation handle per conversation and nothing else.
#[derive(Debug, Clone, Default)]
pub struct TaskController {
    active: Arc<DashMap<ConversationId, ActiveRun>>,
    next_id: Arc<AtomicU64>,
}

impl TaskController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a fresh token for `conversation`. Any previous token for the same
    /// conversation is signalled first.
    pub fn start(&self, conversation: &ConversationId) -> RunTicket {
        let run_id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let token = CancellationToken::new();
        let previous = self.active.insert(
            conversation.clone(),
            ActiveRun {
                run_id,
                token: token.clone(),
            },
        );
        if let Some(prev) = previous {
            debug!(conversation = %conversation, run_id = prev.run_id, "replacing active run");
            prev.token.cancel();
        }
        RunTicket { run_id, token }
    }

    /// Signal the active run for `conversation`. Returns false if there is none.
    pub fn signal(&self, conversation: &ConversationId) -> bool {
        match self.active.get(conversation) {
            Some(run) => {
                run.token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_signalled(&self, conversation: &ConversationId) -> bool {
        self.active
            .get(conversation)
            .is_some_and(|run| run.token.is_cancelled())
    }

    /// Retire `run_id`. A newer run for the same conversation is left alone.
    pub fn finish(&self, conversation: &ConversationId, run_id: u64) {
        self.active
            .remove_if(conversation, |_, run| run.run_id == run_id);
    }

    /// Signal every active run and forget them. Returns how many were signalled.
    pub fn signal_all(&self) -> usize {
        let mut count = 0;
        self.active.retain(|_, run| {
            run.token.cancel();
            count += 1;
            false
        });
        count
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_replaces_and_signals_previous() {
        let ctl = TaskController::new();
        let conv = ConversationId::new("c1");
        let first = ctl.start(&conv);
        let second = ctl.start(&conv);
        assert!(first.token.is_cancelled());
        assert!(!second.token.is_cancelled());
        assert_ne!(first.run_id, second.run_id);
        assert_eq!(ctl.active_count(), 1);
    }

    #[test]
    fn signal_is_per_conversation() {
        let ctl = TaskController::new();
        let a = ctl.start(&"a".into());
        let b = ctl.start(&"b".into());
        assert!(ctl.signal(&"a".into()));
        assert!(a.token.is_cancelled());
        assert!(!b.token.is_cancelled());
        assert!(ctl.is_signalled(&"a".into()));
        assert!(!ctl.signal(&"zzz".into()));
    }

    #[test]
    fn stale_finish_keeps_newer_run() {
        let ctl = TaskController::new();
        let conv = ConversationId::new("c1");
        let old = ctl.start(&conv);
        let new = ctl.start(&conv);
        ctl.finish(&conv, old.run_id);
        assert_eq!(ctl.active_count(), 1);
        ctl.finish(&conv, new.run_id);
        assert_eq!(ctl.active_count(), 0);
    }

    #[test]
    fn signal_all_clears_everything() {
        let ctl = TaskController::new();
        let a = ctl.start(&"a".into());
        let b = ctl.start(&"b".into());
        assert_eq!(ctl.signal_all(), 2);
        assert!(a.token.is_cancelled() && b.token.is_cancelled());
        assert_eq!(ctl.active_count(), 0);
    }
}
