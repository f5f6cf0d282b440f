//! One-shot decoding of a complete model response.

use std::collections::HashSet;

use parley_core::ReactionKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use super::grammar::{scan, strip_tags, Action, Category};
use crate::provider::ProviderError;

/// Reply sent when the response is unusable.
pub const FALLBACK_MESSAGE: &str = "Sorry, I got a bit lost there. Could you say that again?";

/// Responses larger than this are rejected rather than scanned.
pub const MAX_RESPONSE_BYTES: usize = 256 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedMessage {
    /// May be empty for a sticker-only entry.
    pub text: String,
    pub sticker: Option<String>,
    pub quote_index: Option<i64>,
}

impl ParsedMessage {
    fn text(text: String, quote_index: Option<i64>) -> Self {
        Self {
            text,
            sticker: None,
            quote_index,
        }
    }

    fn sticker(keyword: String) -> Self {
        Self {
            text: String::new(),
            sticker: Some(keyword),
            quote_index: None,
        }
    }
}

/// Structured form of a whole response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResponse {
    /// Distinct kinds in first-seen order.
    pub reactions: Vec<ReactionKind>,
    pub messages: Vec<ParsedMessage>,
    /// Ledger indexes to retract.
    pub undos: Vec<i64>,
}

impl BatchResponse {
    /// A thumbs-up and a short apology.
    pub fn fallback() -> Self {
        Self {
            reactions: vec![ReactionKind::Like],
            messages: vec![ParsedMessage::text(FALLBACK_MESSAGE.to_string(), None)],
            undos: Vec::new(),
        }
    }

    /// No reaction and no message. Undos alone do not count as a reply.
    pub fn is_empty(&self) -> bool {
        self.reactions.is_empty() && self.messages.is_empty()
    }

    /// Flatten into dispatch order: reactions (aimed at the message being
    /// answered), then each message's text and sticker, then undos.
    pub fn into_actions(self) -> Vec<Action> {
        let mut out: Vec<Action> = self
            .reactions
            .into_iter()
            .map(|kind| Action::Reaction {
                kind,
                related_index: None,
            })
            .collect();
        for m in self.messages {
            if !m.text.is_empty() {
                out.push(Action::Message {
                    text: m.text,
                    quote_index: m.quote_index,
                });
            }
            if let Some(keyword) = m.sticker {
                out.push(Action::Sticker { keyword });
            }
        }
        out.extend(
            self.undos
                .into_iter()
                .map(|target_index| Action::Undo { target_index }),
        );
        out
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("response is empty")]
    Empty,

    #[error("response too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },
}

/// Decode `text` into reactions, messages and undos.
///
/// Message order: the untagged remainder first, then one sticker-only
/// entry per distinct keyword, then quotes, then `[msg]` blocks.
pub fn try_parse(text: &str) -> Result<BatchResponse, ParseError> {
    if text.trim().is_empty() {
        return Err(ParseError::Empty);
    }
    if text.len() > MAX_RESPONSE_BYTES {
        return Err(ParseError::TooLarge {
            size: text.len(),
            max: MAX_RESPONSE_BYTES,
        });
    }

    let mut out = BatchResponse::default();
    let mut seen = HashSet::new();

    let plain = strip_tags(text);
    if !plain.is_empty() {
        seen.insert(format!("msg:{plain}"));
        out.messages.push(ParsedMessage::text(plain, None));
    }

    for category in Category::SCAN_ORDER {
        for action in scan(text, category) {
            if !seen.insert(action.key()) {
                continue;
            }
            match action {
                Action::Reaction { kind, .. } => {
                    if !out.reactions.contains(&kind) {
                        out.reactions.push(kind);
                    }
                }
                Action::Sticker { keyword } => out.messages.push(ParsedMessage::sticker(keyword)),
                Action::Message { text, quote_index } => {
                    out.messages.push(ParsedMessage::text(text, quote_index))
                }
                Action::Undo { target_index } => out.undos.push(target_index),
            }
        }
    }

    Ok(out)
}

/// Like [`try_parse`] but never fails: unusable input yields
/// [`BatchResponse::fallback`].
pub fn parse_response(text: &str) -> BatchResponse {
    match try_parse(text) {
        Ok(batch) if !batch.is_empty() => batch,
        Ok(_) => {
            warn!("response contained no usable actions, using fallback");
            BatchResponse::fallback()
        }
        Err(e) => {
            warn!(error = %e, "could not parse response, using fallback");
            BatchResponse::fallback()
        }
    }
}

/// Map a generation result straight to a batch, falling back on errors.
pub fn response_or_fallback(result: Result<String, ProviderError>) -> BatchResponse {
    match result {
        Ok(text) => parse_response(&text),
        Err(e) => {
            warn!(error = %e, "generation failed, using fallback");
            BatchResponse::fallback()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_passes_through() {
        let batch = parse_response("just chatting");
        assert!(batch.reactions.is_empty());
        assert_eq!(
            batch.messages,
            vec![ParsedMessage::text("just chatting".into(), None)]
        );
    }

    #[test]
    fn mixed_response_decomposes() {
        let batch = parse_response("Hello [reaction:haha] [sticker:love] friend");
        assert_eq!(batch.reactions, vec![ReactionKind::Haha]);
        assert_eq!(
            batch.messages,
            vec![
                ParsedMessage::text("Hello friend".into(), None),
                ParsedMessage::sticker("love".into()),
            ]
        );
    }

    #[test]
    fn message_order_is_plain_sticker_quote_msg() {
        let batch = parse_response("[msg]b[/msg] [quote:0]a[/quote] [sticker:x] top");
        let texts: Vec<_> = batch
            .messages
            .iter()
            .map(|m| (m.text.as_str(), m.sticker.as_deref(), m.quote_index))
            .collect();
        assert_eq!(
            texts,
            vec![
                ("top", None, None),
                ("", Some("x"), None),
                ("a", None, Some(0)),
                ("b", None, None),
            ]
        );
    }

    #[test]
    fn reactions_collapse_by_kind() {
        let batch = parse_response("[reaction:wow] [reaction:2:wow] [reaction:sad] hi");
        assert_eq!(batch.reactions, vec![ReactionKind::Wow, ReactionKind::Sad]);
    }

    #[test]
    fn undo_only_response_falls_back() {
        assert_eq!(parse_response("[undo:-1]"), BatchResponse::fallback());
    }

    #[test]
    fn undos_ride_along_with_a_reply() {
        let batch = parse_response("[undo:-1] sorry, ignore that");
        assert_eq!(batch.undos, vec![-1]);
        assert_eq!(batch.messages, vec![ParsedMessage::text("sorry, ignore that".into(), None)]);
    }

    #[test]
    fn empty_or_tag_noise_falls_back() {
        assert_eq!(parse_response("   "), BatchResponse::fallback());
        assert_eq!(parse_response("[msg] [/msg]"), BatchResponse::fallback());
        assert_eq!(parse_response("[reaction:nope]"), BatchResponse::fallback());
    }

    #[test]
    fn oversized_input_is_rejected() {
        let huge = "a".repeat(MAX_RESPONSE_BYTES + 1);
        assert!(matches!(
            try_parse(&huge),
            Err(ParseError::TooLarge { .. })
        ));
        assert_eq!(parse_response(&huge), BatchResponse::fallback());
    }

    #[test]
    fn provider_error_falls_back() {
        let batch = response_or_fallback(Err(ProviderError::Unavailable("down".into())));
        assert_eq!(batch.reactions, vec![ReactionKind::Like]);
        assert_eq!(batch.messages[0].text, FALLBACK_MESSAGE);
    }

    #[test]
    fn into_actions_orders_reactions_messages_undos() {
        let actions = parse_response("[undo:-1] hi [reaction:wow] [sticker:cat]").into_actions();
        assert_eq!(
            actions,
            vec![
                Action::Reaction { kind: ReactionKind::Wow, related_index: None },
                Action::Message { text: "hi".into(), quote_index: None },
                Action::Sticker { keyword: "cat".into() },
                Action::Undo { target_index: -1 },
            ]
        );
    }

    #[test]
    fn duplicate_msg_blocks_collapse() {
        let batch = parse_response("[msg]same[/msg][msg]same[/msg]");
        assert_eq!(batch.messages.len(), 1);
    }
}
