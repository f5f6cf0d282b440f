//! "Composing" indicator, refreshed on a timer while a conversation is busy.
//!
//! Platforms expire the indicator after roughly five seconds, so it is
//! re-sent every refresh period (3 s by default). Dropping the handle stops
//! the loop, which makes release automatic on every exit path.

use std::sync::Arc;
use std::time::Duration;

use parley_channels::Messenger;
use parley_core::ConversationId;
use tokio::task::JoinHandle;
use tracing::debug;

pub struct PresenceHandle(JoinHandle<()>);

impl PresenceHandle {
    /// Send the indicator now, then every `refresh`.
    pub fn start(messenger: Arc<dyn Messenger>, conversation: ConversationId, refresh: Duration) -> Self {
        let refresh = refresh.max(Duration::from_millis(100));
        let handle = tokio::spawn(async move {
            loop {
                if let Err(e) = messenger.send_typing(&conversation).await {
                    debug!(conversation = %conversation, error = %e, "typing indicator failed");
                }
                tokio::time::sleep(refresh).await;
            }
        });
        PresenceHandle(handle)
    }

    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for PresenceHandle {
    fn drop(&mut self) {
        self.0.abort();
    }
}
