use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::provider::{GenerationRequest, Generator, ProviderError};
use crate::stream::{parse_sse_line, LineBuffer, SseLine, StreamEvent};

/// Generator backed by any OpenAI-compatible `/v1/chat/completions` endpoint.
pub struct OpenAiGenerator {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiGenerator {
    pub fn new(api_key: String, base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn post(
        &self,
        req: &GenerationRequest,
        stream: bool,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response, ProviderError> {
        if cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }
        let url = format!("{}/v1/chat/completions", self.base_url);
        debug!(model = %req.model, conversation = %req.conversation_id, stream, "sending chat completion");

        let send = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&build_request_body(req, stream))
            .send();

        let resp = tokio::select! {
            _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
            resp = send => resp?,
        };
        check_status(resp).await
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(
        &self,
        req: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<String, ProviderError> {
        let resp = self.post(req, false, cancel).await?;
        let body = tokio::select! {
            _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
            body = resp.json::<ApiResponse>() => body.map_err(|e| ProviderError::Parse(e.to_string()))?,
        };
        Ok(body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }

    async fn generate_stream(
        &self,
        req: &GenerationRequest,
        tx: mpsc::Sender<StreamEvent>,
        cancel: &CancellationToken,
    ) -> Result<(), ProviderError> {
        let resp = self.post(req, true, cancel).await?;
        let mut bytes = resp.bytes_stream();
        let mut lines = LineBuffer::default();
        let mut done = DoneInfo::new(&req.model);

        loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
                chunk = bytes.next() => chunk,
            };
            let chunk = match chunk {
                Some(Ok(c)) => c,
                Some(Err(e)) => {
                    let _ = tx.send(StreamEvent::Error { message: e.to_string() }).await;
                    return Err(ProviderError::Http(e));
                }
                None => break,
            };

            for line in lines.push(&chunk) {
                match parse_sse_line(&line) {
                    Some(SseLine::Done) => return finish(&tx, done).await,
                    Some(SseLine::Data(data)) => {
                        for text in done.absorb(data) {
                            if tx.send(StreamEvent::TextDelta { text }).await.is_err() {
                                // Receiver gone; nobody is listening for the rest.
                                return Ok(());
                            }
                        }
                    }
                    _ => {}
                }
            }
        }

        finish(&tx, done).await
    }
}

async fn finish(tx: &mpsc::Sender<StreamEvent>, done: DoneInfo) -> Result<(), ProviderError> {
    let _ = tx
        .send(StreamEvent::Done {
            model: done.model,
            tokens_in: done.tokens_in,
            tokens_out: done.tokens_out,
            stop_reason: done.stop_reason,
        })
        .await;
    Ok(())
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = resp.status().as_u16();
    if status == 429 {
        let retry_after_ms = resp
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(|s| s * 1000)
            .unwrap_or(5000);
        return Err(ProviderError::RateLimited { retry_after_ms });
    }
    if !resp.status().is_success() {
        let message = resp.text().await.unwrap_or_default();
        warn!(status, body = %message, "chat completion failed");
        return Err(ProviderError::Api { status, message });
    }
    Ok(resp)
}

fn build_request_body(req: &GenerationRequest, stream: bool) -> serde_json::Value {
    let mut messages = vec![serde_json::json!({ "role": "system", "content": req.system })];
    messages.extend(
        req.messages
            .iter()
            .map(|m| serde_json::json!({ "role": m.role, "content": m.content })),
    );
    serde_json::json!({
        "model": req.model,
        "messages": messages,
        "max_tokens": req.max_tokens,
        "stream": stream,
    })
}

/// Running totals for the closing `Done` event.
struct DoneInfo {
    model: String,
    tokens_in: u32,
    tokens_out: u32,
    stop_reason: String,
}

impl DoneInfo {
    fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            tokens_in: 0,
            tokens_out: 0,
            stop_reason: String::new(),
        }
    }

    /// Fold one `data:` payload in and return its text deltas.
    fn absorb(&mut self, data: &str) -> Vec<String> {
        let Ok(chunk) = serde_json::from_str::<StreamChunk>(data) else {
            debug!(len = data.len(), "skipping unparseable stream chunk");
            return Vec::new();
        };
        if let Some(usage) = chunk.usage {
            self.tokens_in = usage.prompt_tokens;
            self.tokens_out = usage.completion_tokens;
        }
        let mut out = Vec::new();
        for choice in chunk.choices {
            if let Some(reason) = choice.finish_reason.filter(|r| !r.is_empty()) {
                self.stop_reason = reason;
            }
            if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
                out.push(text);
            }
        }
        out
    }
}

#[derive(Deserialize)]
struct ApiResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{Message, Role};

    fn request() -> GenerationRequest {
        GenerationRequest {
            conversation_id: "c1".into(),
            model: "gpt-test".into(),
            system: "be brief".into(),
            messages: vec![Message {
                role: Role::User,
                content: "hi".into(),
            }],
            max_tokens: 64,
        }
    }

    #[test]
    fn request_body_prepends_system_turn() {
        let body = build_request_body(&request(), true);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "be brief");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["stream"], true);
        assert_eq!(body["max_tokens"], 64);
    }

    #[test]
    fn absorb_collects_text_usage_and_reason() {
        let mut done = DoneInfo::new("gpt-test");
        let texts = done.absorb(r#"{"choices":[{"delta":{"content":"Hel"},"finish_reason":null}]}"#);
        assert_eq!(texts, vec!["Hel"]);
        let texts = done.absorb(
            r#"{"choices":[{"delta":{},"finish_reason":"stop"}],"usage":{"prompt_tokens":7,"completion_tokens":3}}"#,
        );
        assert!(texts.is_empty());
        assert_eq!(done.stop_reason, "stop");
        assert_eq!((done.tokens_in, done.tokens_out), (7, 3));
    }

    #[test]
    fn absorb_ignores_garbage() {
        let mut done = DoneInfo::new("m");
        assert!(done.absorb("not json").is_empty());
    }

    #[tokio::test]
    async fn cancelled_before_send_makes_no_request() {
        // Unroutable address: a real request would fail with Http, not Cancelled.
        let generator = OpenAiGenerator::new("k".into(), "http://127.0.0.1:9");
        let token = CancellationToken::new();
        token.cancel();
        let err = generator.generate(&request(), &token).await.unwrap_err();
        assert!(err.is_cancelled());
    }
}
