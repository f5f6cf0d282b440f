//! Hand-written fakes shared by the unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use parley_agent::{GenerationRequest, Generator, ProviderError, StreamEvent};
use parley_channels::{ChannelError, Messenger, SentReceipt};
use parley_core::{ConversationId, MessageRef, ReactionKind};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Typing,
    Reaction { kind: ReactionKind, target: String },
    Sticker(String),
    Message { text: String, quote: Option<String> },
    Retract(String),
}

#[derive(Default)]
pub struct FakeMessenger {
    log: Mutex<Vec<(Instant, Event)>>,
    next_id: AtomicU64,
    fail_text: Option<String>,
}

impl FakeMessenger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// `send_message` fails for exactly this text.
    pub fn failing_on(text: &str) -> Arc<Self> {
        Arc::new(Self {
            fail_text: Some(text.to_string()),
            ..Self::default()
        })
    }

    fn push(&self, event: Event) {
        self.log.lock().unwrap().push((Instant::now(), event));
    }

    fn receipt(&self) -> SentReceipt {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        SentReceipt {
            platform_message_id: format!("out-{n}"),
            client_message_id: format!("cli-{n}"),
        }
    }

    /// Everything except typing indicators, in order.
    pub fn events(&self) -> Vec<Event> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, e)| *e != Event::Typing)
            .map(|(_, e)| e.clone())
            .collect()
    }

    pub fn timed(&self) -> Vec<(Instant, Event)> {
        self.log.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.log.lock().unwrap().iter().filter(|(_, e)| pred(e)).count()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Message { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Messenger for FakeMessenger {
    fn name(&self) -> &str {
        "fake"
    }

    async fn send_typing(&self, _conversation: &ConversationId) -> Result<(), ChannelError> {
        self.push(Event::Typing);
        Ok(())
    }

    async fn send_reaction(
        &self,
        _conversation: &ConversationId,
        kind: ReactionKind,
        target: &MessageRef,
    ) -> Result<(), ChannelError> {
        self.push(Event::Reaction {
            kind,
            target: target.platform_message_id.clone(),
        });
        Ok(())
    }

    async fn send_sticker(
        &self,
        _conversation: &ConversationId,
        keyword: &str,
    ) -> Result<Option<SentReceipt>, ChannelError> {
        self.push(Event::Sticker(keyword.to_string()));
        Ok(Some(self.receipt()))
    }

    async fn send_message(
        &self,
        _conversation: &ConversationId,
        text: &str,
        quote: Option<&MessageRef>,
    ) -> Result<SentReceipt, ChannelError> {
        if self.fail_text.as_deref() == Some(text) {
            return Err(ChannelError::SendFailed("scripted failure".into()));
        }
        self.push(Event::Message {
            text: text.to_string(),
            quote: quote.map(|q| q.platform_message_id.clone()),
        });
        Ok(self.receipt())
    }

    async fn retract(
        &self,
        _conversation: &ConversationId,
        target: &MessageRef,
    ) -> Result<(), ChannelError> {
        self.push(Event::Retract(target.platform_message_id.clone()));
        Ok(())
    }
}

/// One step of a scripted generation.
#[derive(Debug, Clone)]
pub enum Step {
    Delta(String),
    /// Sleep, giving up early if cancelled.
    Wait(u64),
    /// Sleep without looking at the token.
    Stall(u64),
    Fail,
}

pub fn delta(text: &str) -> Step {
    Step::Delta(text.to_string())
}

#[derive(Debug, Clone)]
pub struct Call {
    pub at: Instant,
    pub prompt: String,
}

/// Plays one script per call; answers "ok" once the scripts run out.
#[derive(Default)]
pub struct FakeGenerator {
    scripts: Mutex<VecDeque<Vec<Step>>>,
    calls: Mutex<Vec<Call>>,
}

impl FakeGenerator {
    pub fn new(scripts: Vec<Vec<Step>>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn begin(&self, req: &GenerationRequest) -> Vec<Step> {
        let prompt = req
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        self.calls.lock().unwrap().push(Call {
            at: Instant::now(),
            prompt,
        });
        self.scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| vec![delta("ok")])
    }
}

async fn wait(ms: u64, cancel: &CancellationToken) -> Result<(), ProviderError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(ProviderError::Cancelled),
        _ = tokio::time::sleep(Duration::from_millis(ms)) => Ok(()),
    }
}

#[async_trait]
impl Generator for FakeGenerator {
    fn name(&self) -> &str {
        "fake"
    }

    async fn generate(
        &self,
        req: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<String, ProviderError> {
        let mut out = String::new();
        for step in self.begin(req) {
            match step {
                Step::Delta(text) => out.push_str(&text),
                Step::Wait(ms) => wait(ms, cancel).await?,
                Step::Stall(ms) => tokio::time::sleep(Duration::from_millis(ms)).await,
                Step::Fail => return Err(ProviderError::Unavailable("scripted".into())),
            }
        }
        Ok(out)
    }

    async fn generate_stream(
        &self,
        req: &GenerationRequest,
        tx: mpsc::Sender<StreamEvent>,
        cancel: &CancellationToken,
    ) -> Result<(), ProviderError> {
        for step in self.begin(req) {
            match step {
                Step::Delta(text) => {
                    if tx.send(StreamEvent::TextDelta { text }).await.is_err() {
                        return Ok(());
                    }
                }
                Step::Wait(ms) => wait(ms, cancel).await?,
                Step::Stall(ms) => tokio::time::sleep(Duration::from_millis(ms)).await,
                Step::Fail => return Err(ProviderError::Unavailable("scripted".into())),
            }
        }
        let _ = tx
            .send(StreamEvent::Done {
                model: req.model.clone(),
                tokens_in: 0,
                tokens_out: 0,
                stop_reason: "stop".into(),
            })
            .await;
        Ok(())
    }
}
