use std::path::Path;

use parley_core::{ConversationId, ReactionKind};
use tracing::{info, warn};

use crate::provider::{GenerationRequest, Message, Role};

/// Persona files larger than this are truncated.
const MAX_PERSONA_CHARS: usize = 20_000;

/// Describes the action tags the decoder understands.
const TAG_INSTRUCTIONS: &str = "\
You are chatting inside a messaging app. Reply in plain text. You may also use these tags:
[reaction:KIND]            react to the newest user message
[reaction:N:KIND]          react to history entry N
[sticker:KEYWORD]          send a sticker that matches KEYWORD
[msg]TEXT[/msg]            send TEXT as a separate message
[quote:N]TEXT[/quote]      reply to history entry N (N >= 0) or to your own message N (N < 0, -1 = your latest)
[undo:N]                   retract your own message N (-1 = your latest)
Plain text outside tags is sent as one final message. Keep messages short.";

/// Builds the system prompt and the per-batch user turn.
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    persona: Option<String>,
}

impl PromptBuilder {
    pub fn new(persona: Option<String>) -> Self {
        Self { persona }
    }

    /// Load the persona from `path`. A missing or unreadable file is logged
    /// and treated as no persona.
    pub fn from_file(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(mut text) => {
                if text.len() > MAX_PERSONA_CHARS {
                    let cut = (0..=MAX_PERSONA_CHARS)
                        .rev()
                        .find(|&i| text.is_char_boundary(i))
                        .unwrap_or(0);
                    text.truncate(cut);
                    warn!(path = %path.display(), "persona file truncated");
                }
                info!(path = %path.display(), chars = text.len(), "persona loaded");
                Self::new(Some(text))
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not read persona file");
                Self::default()
            }
        }
    }

    pub fn system_prompt(&self) -> String {
        let kinds: Vec<&str> = ReactionKind::ALL.iter().map(|k| k.as_str()).collect();
        let mut out = String::new();
        if let Some(persona) = self.persona.as_deref().filter(|p| !p.trim().is_empty()) {
            out.push_str(persona.trim());
            out.push_str("\n\n");
        }
        out.push_str(TAG_INSTRUCTIONS);
        out.push_str("\nKIND is one of: ");
        out.push_str(&kinds.join(", "));
        out
    }

    /// Render the user turn: the indexed transcript, then the new batch.
    pub fn user_turn(&self, history: &str, batch: &[String]) -> String {
        let mut out = String::new();
        if !history.is_empty() {
            out.push_str("Recent conversation:\n");
            out.push_str(history);
            out.push_str("\n\n");
        }
        out.push_str("New messages from the user:\n");
        out.push_str(&batch.join("\n"));
        out
    }

    pub fn request(
        &self,
        conversation_id: &ConversationId,
        model: &str,
        max_tokens: u32,
        history: &str,
        batch: &[String],
    ) -> GenerationRequest {
        GenerationRequest {
            conversation_id: conversation_id.clone(),
            model: model.to_string(),
            system: self.system_prompt(),
            messages: vec![Message {
                role: Role::User,
                content: self.user_turn(history, batch),
            }],
            max_tokens,
        }
    }
}
