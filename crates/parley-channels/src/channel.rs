use async_trait::async_trait;
use parley_core::{ConversationId, MessageRef, ReactionKind};

use crate::{error::ChannelError, types::SentReceipt};

/// Outbound side of a messaging platform (Zalo, Telegram, a console, …).
///
/// Each method is a single network call. Implementations must not retry on
/// their own behalf beyond what the platform SDK does; callers treat every
/// failure as "skip this action and continue".
///
/// Implementations must be `Send + Sync` so one instance can be shared by
/// every conversation task.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Stable lowercase identifier for this platform (e.g. `"console"`).
    fn name(&self) -> &str;

    /// Show the "composing" indicator in `conversation`.
    ///
    /// Platforms expire the indicator on their own after a few seconds, so
    /// callers refresh it periodically.
    async fn send_typing(&self, conversation: &ConversationId) -> Result<(), ChannelError>;

    /// Attach `kind` to the `target` message.
    async fn send_reaction(
        &self,
        conversation: &ConversationId,
        kind: ReactionKind,
        target: &MessageRef,
    ) -> Result<(), ChannelError>;

    /// Look up a sticker matching `keyword` and send it.
    ///
    /// Returns `Ok(None)` when the platform has no sticker for the keyword.
    async fn send_sticker(
        &self,
        conversation: &ConversationId,
        keyword: &str,
    ) -> Result<Option<SentReceipt>, ChannelError>;

    /// Send a text message, optionally as a reply quoting `quote`.
    async fn send_message(
        &self,
        conversation: &ConversationId,
        text: &str,
        quote: Option<&MessageRef>,
    ) -> Result<SentReceipt, ChannelError>;

    /// Retract (unsend) one of the bot's own messages.
    async fn retract(
        &self,
        conversation: &ConversationId,
        target: &MessageRef,
    ) -> Result<(), ChannelError>;
}
