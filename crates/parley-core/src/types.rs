use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one chat thread the bot answers in.
///
/// Opaque to the core: the messaging platform decides the format
/// (a numeric thread id, a group id, `"console"` for local runs, …).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ConversationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ConversationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The six emotive reactions the bot can attach to a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionKind {
    Heart,
    Haha,
    Wow,
    Sad,
    Angry,
    Like,
}

impl ReactionKind {
    pub const ALL: [ReactionKind; 6] = [
        ReactionKind::Heart,
        ReactionKind::Haha,
        ReactionKind::Wow,
        ReactionKind::Sad,
        ReactionKind::Angry,
        ReactionKind::Like,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReactionKind::Heart => "heart",
            ReactionKind::Haha => "haha",
            ReactionKind::Wow => "wow",
            ReactionKind::Sad => "sad",
            ReactionKind::Angry => "angry",
            ReactionKind::Like => "like",
        }
    }
}

impl fmt::Display for ReactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReactionKind {
    type Err = String;

    /// Case-insensitive: the model is free to write `[reaction:HAHA]`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ReactionKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown reaction: {}", s))
    }
}

/// Platform handle to a concrete chat message (inbound or our own).
///
/// Used as the target of reactions, quotes and retractions. Platforms that
/// identify messages by a single id leave `client_message_id` empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef {
    pub platform_message_id: String,
    #[serde(default)]
    pub client_message_id: Option<String>,
    /// Text of the referenced message, when known (quotes render it).
    #[serde(default)]
    pub content: Option<String>,
}

impl MessageRef {
    pub fn new(platform_message_id: impl Into<String>) -> Self {
        Self {
            platform_message_id: platform_message_id.into(),
            client_message_id: None,
            content: None,
        }
    }
}
