use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParleyError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Conversation not found: {id}")]
    ConversationNotFound { id: String },

    #[error("Conversation closed: {id}")]
    ConversationClosed { id: String },

    #[error("Channel error ({channel}): {reason}")]
    Channel { channel: String, reason: String },

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ParleyError {
    /// Short error code string used in structured log fields.
    pub fn code(&self) -> &'static str {
        match self {
            ParleyError::Config(_) => "CONFIG_ERROR",
            ParleyError::ConversationNotFound { .. } => "CONVERSATION_NOT_FOUND",
            ParleyError::ConversationClosed { .. } => "CONVERSATION_CLOSED",
            ParleyError::Channel { .. } => "CHANNEL_ERROR",
            ParleyError::Generation(_) => "GENERATION_ERROR",
            ParleyError::Serialization(_) => "SERIALIZATION_ERROR",
            ParleyError::Io(_) => "IO_ERROR",
            ParleyError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, ParleyError>;
