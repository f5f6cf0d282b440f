use parley_core::{ConversationId, MessageRef};
use serde::{Deserialize, Serialize};

/// A message received from the messaging platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Thread the message belongs to.
    pub conversation_id: ConversationId,

    /// Platform id of this message, when the platform exposes one.
    /// Needed to react to or quote the message later.
    pub message_id: Option<String>,

    /// Secondary client-side id some platforms require alongside `message_id`.
    pub client_message_id: Option<String>,

    /// Platform-native identifier for the sender.
    pub sender_id: String,

    /// Human-readable display name for the sender, if available.
    pub sender_name: Option<String>,

    /// True when the platform echoes back a message the bot itself sent.
    pub sender_is_self: bool,

    /// Plain text content (or a textual placeholder for media).
    pub content: String,

    /// Text of the message the sender replied to, if any.
    pub quoted_content: Option<String>,

    /// RFC 3339 timestamp of when the message was received.
    pub timestamp: String,
}

impl InboundMessage {
    /// Build a plain text message from a human sender, stamped now.
    pub fn text(
        conversation_id: impl Into<ConversationId>,
        sender_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            message_id: None,
            client_message_id: None,
            sender_id: sender_id.into(),
            sender_name: None,
            sender_is_self: false,
            content: content.into(),
            quoted_content: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    /// Handle usable as a reaction/quote target, if the platform gave us an id.
    pub fn message_ref(&self) -> Option<MessageRef> {
        self.message_id.as_ref().map(|id| MessageRef {
            platform_message_id: id.clone(),
            client_message_id: self.client_message_id.clone(),
            content: Some(self.content.clone()),
        })
    }
}

/// Ids the platform assigned to a message the bot just sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentReceipt {
    pub platform_message_id: String,
    pub client_message_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_ref_requires_platform_id() {
        let msg = InboundMessage::text("t1", "u1", "hello");
        assert!(msg.message_ref().is_none());

        let msg = msg.with_message_id("m-9");
        let r = msg.message_ref().unwrap();
        assert_eq!(r.platform_message_id, "m-9");
        assert_eq!(r.content.as_deref(), Some("hello"));
    }

    #[test]
    fn inbound_round_trips_through_json() {
        let msg = InboundMessage::text("t1", "u1", "xin chào").with_message_id("m-1");
        let json = serde_json::to_string(&msg).unwrap();
        let back: InboundMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back.conversation_id.as_str(), "t1");
        assert_eq!(back.content, "xin chào");
        assert!(!back.sender_is_self);
    }
}
