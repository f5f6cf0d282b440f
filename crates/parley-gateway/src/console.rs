//! Terminal stand-in for a messaging platform.
//!
//! Each stdin line is one inbound message: `conversation: text`, or plain
//! text for the `console` conversation. Outbound actions are printed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use parley_channels::{ChannelError, InboundMessage, Messenger, SentReceipt};
use parley_core::config::GatewayConfig;
use parley_core::{ConversationId, MessageRef, ReactionKind};
use parley_orchestrator::ConversationRegistry;
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing::{debug, warn};

pub const DEFAULT_CONVERSATION: &str = "console";

#[derive(Default)]
pub struct ConsoleMessenger {
    next_inbound: AtomicU64,
    next_outbound: AtomicU64,
}

impl ConsoleMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Turn one input line into an inbound message with a fresh id.
    pub fn parse_line(&self, line: &str) -> Option<InboundMessage> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let (conversation, text) = match line.split_once(':') {
            Some((conv, text))
                if !conv.is_empty() && !conv.contains(char::is_whitespace) && !text.trim().is_empty() =>
            {
                (conv, text.trim())
            }
            _ => (DEFAULT_CONVERSATION, line),
        };
        let n = self.next_inbound.fetch_add(1, Ordering::Relaxed) + 1;
        let mut msg = InboundMessage::text(conversation, "console-user", text).with_message_id(format!("in-{n}"));
        msg.sender_name = Some("you".to_string());
        Some(msg)
    }

    fn receipt(&self) -> SentReceipt {
        let n = self.next_outbound.fetch_add(1, Ordering::Relaxed) + 1;
        SentReceipt {
            platform_message_id: format!("out-{n}"),
            client_message_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

#[async_trait]
impl Messenger for ConsoleMessenger {
    fn name(&self) -> &str {
        "console"
    }

    async fn send_typing(&self, conversation: &ConversationId) -> Result<(), ChannelError> {
        debug!(conversation = %conversation, "typing");
        Ok(())
    }

    async fn send_reaction(
        &self,
        conversation: &ConversationId,
        kind: ReactionKind,
        target: &MessageRef,
    ) -> Result<(), ChannelError> {
        println!("[{conversation}] reacts {kind} to {}", target.platform_message_id);
        Ok(())
    }

    async fn send_sticker(
        &self,
        conversation: &ConversationId,
        keyword: &str,
    ) -> Result<Option<SentReceipt>, ChannelError> {
        let receipt = self.receipt();
        println!("[{conversation}] <sticker:{keyword}> ({})", receipt.platform_message_id);
        Ok(Some(receipt))
    }

    async fn send_message(
        &self,
        conversation: &ConversationId,
        text: &str,
        quote: Option<&MessageRef>,
    ) -> Result<SentReceipt, ChannelError> {
        let receipt = self.receipt();
        match quote {
            Some(q) => println!(
                "[{conversation}] bot ({}) replying to {}: {text}",
                receipt.platform_message_id, q.platform_message_id
            ),
            None => println!("[{conversation}] bot ({}): {text}", receipt.platform_message_id),
        }
        Ok(receipt)
    }

    async fn retract(&self, conversation: &ConversationId, target: &MessageRef) -> Result<(), ChannelError> {
        println!("[{conversation}] bot retracted {}", target.platform_message_id);
        Ok(())
    }
}

/// Feed stdin lines into the registry until EOF.
pub async fn run_stdin(
    messenger: Arc<ConsoleMessenger>,
    registry: Arc<ConversationRegistry>,
    gateway: GatewayConfig,
) {
    let mut lines = FramedRead::new(tokio::io::stdin(), LinesCodec::new());
    while let Some(line) = lines.next().await {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                warn!(error = %e, "stdin read failed");
                break;
            }
        };
        let Some(msg) = messenger.parse_line(&line) else {
            continue;
        };
        if let Some(msg) = crate::inbound::accept(&gateway, msg) {
            registry.handle_inbound(msg);
        }
    }
}
