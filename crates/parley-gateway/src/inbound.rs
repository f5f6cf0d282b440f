//! Gate applied to every inbound message before it reaches the registry.

use parley_channels::InboundMessage;
use parley_core::config::GatewayConfig;
use tracing::debug;

/// Returns `true` when `conversation` may talk to the bot.
///
/// An empty allowlist admits everyone, as does a `"*"` entry.
pub fn is_allowed(allow: &[String], conversation: &str) -> bool {
    allow.is_empty() || allow.iter().any(|e| e == "*" || e == conversation)
}

/// Apply the allowlist and, when enabled, the command prefix.
///
/// The prefix is matched case-insensitively and stripped. Messages the bot
/// sent itself skip the prefix check so they still reach the history.
pub fn accept(cfg: &GatewayConfig, mut msg: InboundMessage) -> Option<InboundMessage> {
    if !is_allowed(&cfg.allow_conversations, msg.conversation_id.as_str()) {
        debug!(conversation = %msg.conversation_id, "conversation not in allowlist");
        return None;
    }
    if msg.sender_is_self || !cfg.require_prefix {
        return Some(msg);
    }

    let body = strip_prefix(msg.content.trim_start(), &cfg.prefix)?;
    let body = body.trim();
    if body.is_empty() {
        return None;
    }
    msg.content = body.to_string();
    Some(msg)
}

fn strip_prefix<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &text[prefix.len()..])
}
