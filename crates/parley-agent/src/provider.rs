use async_trait::async_trait;
use parley_core::ConversationId;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::stream::StreamEvent;

/// A single turn sent to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Everything a generator needs to answer one batch.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Used only for logging and for generators that keep per-thread state.
    pub conversation_id: ConversationId,
    pub model: String,
    pub system: String,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
}

/// Produces a reply for a batch of user messages.
///
/// Implementations should check `cancel` before starting network work and
/// stop early once it fires, returning [`ProviderError::Cancelled`].
#[async_trait]
pub trait Generator: Send + Sync {
    fn name(&self) -> &str;

    /// Produce the whole response text at once.
    async fn generate(
        &self,
        req: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<String, ProviderError>;

    /// Stream the response as [`StreamEvent`]s.
    ///
    /// Default: calls [`Generator::generate`] and emits one delta plus `Done`.
    async fn generate_stream(
        &self,
        req: &GenerationRequest,
        tx: mpsc::Sender<StreamEvent>,
        cancel: &CancellationToken,
    ) -> Result<(), ProviderError> {
        let text = self.generate(req, cancel).await?;
        let _ = tx.send(StreamEvent::TextDelta { text }).await;
        let _ = tx
            .send(StreamEvent::Done {
                model: req.model.clone(),
                tokens_in: 0,
                tokens_out: 0,
                stop_reason: "stop".to_string(),
            })
            .await;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl ProviderError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ProviderError::Cancelled)
    }
}
