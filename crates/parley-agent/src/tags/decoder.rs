use std::collections::HashSet;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::grammar::{scan, strip_tags, Action, Category};

/// Receiver for actions decoded from a model response.
///
/// Emission is awaited, so a sink that paces or sends over the network
/// naturally back-pressures the decoder.
#[async_trait]
pub trait ActionSink: Send {
    async fn emit(&mut self, action: Action);
}

/// Result of feeding the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// The run was cancelled; nothing further was emitted.
    Cancelled,
}

/// Per-run dedup sets. Quotes and plain messages share one set.
#[derive(Debug, Default)]
struct SeenKeys {
    reactions: HashSet<String>,
    stickers: HashSet<String>,
    messages: HashSet<String>,
    undos: HashSet<String>,
}

impl SeenKeys {
    /// Returns true the first time `action` is seen.
    fn insert(&mut self, action: &Action) -> bool {
        let set = match action.category() {
            Category::Reaction => &mut self.reactions,
            Category::Sticker => &mut self.stickers,
            Category::Quote | Category::Message => &mut self.messages,
            Category::Undo => &mut self.undos,
        };
        set.insert(action.key())
    }
}

/// Incremental decoder for one streamed response.
///
/// The full accumulated text is rescanned after every delta, so a tag split
/// across chunk boundaries is picked up as soon as it completes and every
/// distinct tag is delivered exactly once however the stream was chunked.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    buffer: String,
    seen: SeenKeys,
    /// Bodies of every message already emitted, for final-text dedup.
    emitted_texts: HashSet<String>,
    finished: bool,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything received so far.
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Append `delta` and return the actions that became complete.
    pub fn push(&mut self, delta: &str) -> Vec<Action> {
        self.buffer.push_str(delta);
        self.scan_new()
    }

    fn scan_new(&mut self) -> Vec<Action> {
        let mut fresh = Vec::new();
        for category in Category::SCAN_ORDER {
            for action in scan(&self.buffer, category) {
                if self.seen.insert(&action) {
                    if let Action::Message { text, .. } = &action {
                        self.emitted_texts.insert(text.clone());
                    }
                    fresh.push(action);
                }
            }
        }
        fresh
    }

    /// The untagged remainder of the response, once.
    ///
    /// `None` when it is empty or repeats a message body already emitted.
    pub fn finish_text(&mut self) -> Option<Action> {
        if self.finished {
            return None;
        }
        self.finished = true;
        let text = strip_tags(&self.buffer);
        if text.is_empty() || self.emitted_texts.contains(&text) {
            return None;
        }
        self.emitted_texts.insert(text.clone());
        Some(Action::Message {
            text,
            quote_index: None,
        })
    }

    /// Push `delta` and deliver new actions to `sink` in scan order.
    ///
    /// Cancellation is checked before each emission.
    pub async fn feed<S>(&mut self, delta: &str, sink: &mut S, cancel: &CancellationToken) -> Flow
    where
        S: ActionSink + ?Sized,
    {
        if cancel.is_cancelled() {
            return Flow::Cancelled;
        }
        let actions = self.push(delta);
        deliver(actions, sink, cancel).await
    }

    /// Deliver the final plain-text message, if any.
    pub async fn finish<S>(&mut self, sink: &mut S, cancel: &CancellationToken) -> Flow
    where
        S: ActionSink + ?Sized,
    {
        if cancel.is_cancelled() {
            return Flow::Cancelled;
        }
        let actions: Vec<Action> = self.finish_text().into_iter().collect();
        deliver(actions, sink, cancel).await
    }
}

async fn deliver<S>(actions: Vec<Action>, sink: &mut S, cancel: &CancellationToken) -> Flow
where
    S: ActionSink + ?Sized,
{
    for action in actions {
        if cancel.is_cancelled() {
            return Flow::Cancelled;
        }
        sink.emit(action).await;
    }
    Flow::Continue
}
