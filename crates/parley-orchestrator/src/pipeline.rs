//! One generation run: prompt, generate, decode, dispatch.

use std::sync::Arc;

use parley_agent::tags::parser::response_or_fallback;
use parley_agent::{ActionSink, Flow, ProviderError, StreamDecoder, StreamEvent};
use parley_channels::InboundMessage;
use parley_core::ConversationId;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::dispatch::{ChatDispatcher, ConversationState};
use crate::services::Services;

/// How a run ended. Every variant returns the conversation to idle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Cancelled,
    Failed(String),
}

pub async fn run_batch(
    services: Arc<Services>,
    conversation: ConversationId,
    state: Arc<Mutex<ConversationState>>,
    batch: Vec<InboundMessage>,
    cancel: CancellationToken,
) -> RunOutcome {
    let reply_target = batch.iter().rev().find_map(InboundMessage::message_ref);
    let texts: Vec<String> = batch.into_iter().map(|m| m.content).collect();

    let history = state.lock().await.history.render();
    let request = services.prompt.request(
        &conversation,
        &services.config.provider.model,
        services.config.provider.max_tokens,
        &history,
        &texts,
    );

    let mut dispatcher = ChatDispatcher::new(
        services.messenger.clone(),
        conversation.clone(),
        state,
        cancel.clone(),
    )
    .with_reply_target(reply_target)
    .with_message_gap(services.message_gap())
    .with_deferred_stickers(services.config.dispatch.defer_stickers);

    let outcome = if services.config.dispatch.streaming {
        run_streaming(&services, &request, &mut dispatcher, &cancel).await
    } else {
        run_oneshot(&services, &request, &mut dispatcher, &cancel).await
    };

    let stats = dispatcher.stats();
    debug!(
        conversation = %conversation,
        reactions = stats.reactions,
        stickers = stats.stickers,
        messages = stats.messages,
        undos = stats.undos,
        failures = stats.failures,
        "run dispatched"
    );
    outcome
}

async fn run_streaming(
    services: &Services,
    request: &parley_agent::GenerationRequest,
    dispatcher: &mut ChatDispatcher,
    cancel: &CancellationToken,
) -> RunOutcome {
    let (tx, mut rx) = mpsc::channel::<StreamEvent>(64);
    let generate = services.generator.generate_stream(request, tx, cancel);

    let consume = async {
        let mut decoder = StreamDecoder::new();
        while let Some(event) = rx.recv().await {
            match event {
                StreamEvent::TextDelta { text } => {
                    if decoder.feed(&text, &mut *dispatcher, cancel).await == Flow::Cancelled {
                        break;
                    }
                }
                StreamEvent::Done { stop_reason, .. } => {
                    debug!(stop_reason = %stop_reason, "stream finished");
                    break;
                }
                StreamEvent::Error { message } => {
                    warn!(error = %message, "stream error, keeping partial output");
                    break;
                }
            }
        }
        // Dropping the receiver tells the generator nobody is listening.
        drop(rx);
        decoder
    };

    let (result, mut decoder) = tokio::join!(generate, consume);

    if cancel.is_cancelled() || matches!(&result, Err(e) if e.is_cancelled()) {
        return RunOutcome::Cancelled;
    }
    if decoder.finish(&mut *dispatcher, cancel).await == Flow::Cancelled {
        return RunOutcome::Cancelled;
    }
    dispatcher.flush_deferred().await;

    match result {
        Ok(()) => RunOutcome::Completed,
        Err(e) => RunOutcome::Failed(e.to_string()),
    }
}

async fn run_oneshot(
    services: &Services,
    request: &parley_agent::GenerationRequest,
    dispatcher: &mut ChatDispatcher,
    cancel: &CancellationToken,
) -> RunOutcome {
    let result = services.generator.generate(request, cancel).await;
    if cancel.is_cancelled() || matches!(&result, Err(ProviderError::Cancelled)) {
        return RunOutcome::Cancelled;
    }

    for action in response_or_fallback(result).into_actions() {
        if cancel.is_cancelled() {
            return RunOutcome::Cancelled;
        }
        dispatcher.emit(action).await;
    }
    dispatcher.flush_deferred().await;
    RunOutcome::Completed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{delta, Event, FakeGenerator, FakeMessenger, Step};
    use parley_agent::prompt::PromptBuilder;
    use parley_core::{MessageRef, ParleyConfig, ReactionKind};

    fn services(
        messenger: &Arc<FakeMessenger>,
        generator: &Arc<FakeGenerator>,
        streaming: bool,
    ) -> Arc<Services> {
        let mut config = ParleyConfig::default();
        config.dispatch.streaming = streaming;
        config.dispatch.message_gap_ms = 0;
        Arc::new(Services::new(
            messenger.clone(),
            generator.clone(),
            PromptBuilder::default(),
            config,
        ))
    }

    fn inbound(text: &str, id: &str) -> InboundMessage {
        InboundMessage::text("c1", "u1", text).with_message_id(id)
    }

    async fn run(svc: Arc<Services>, batch: Vec<InboundMessage>, cancel: CancellationToken) -> RunOutcome {
        let state = Arc::new(Mutex::new(ConversationState::default()));
        run_batch(svc, "c1".into(), state, batch, cancel).await
    }

    #[tokio::test]
    async fn streaming_run_dispatches_in_scan_order_with_stickers_last() {
        let messenger = FakeMessenger::new();
        let generator = FakeGenerator::new(vec![vec![
            delta("Hello [reaction:ha"),
            delta("ha] [sticker:love] fri"),
            delta("end [msg]two[/msg]"),
        ]]);
        let outcome = run(
            services(&messenger, &generator, true),
            vec![inbound("hi", "in-1")],
            CancellationToken::new(),
        )
        .await;

        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(
            messenger.events(),
            vec![
                Event::Reaction { kind: ReactionKind::Haha, target: "in-1".into() },
                Event::Message { text: "two".into(), quote: None },
                Event::Message { text: "Hello friend".into(), quote: None },
                Event::Sticker("love".into()),
            ]
        );
    }

    #[tokio::test]
    async fn oneshot_run_uses_batch_order() {
        let messenger = FakeMessenger::new();
        let generator = FakeGenerator::new(vec![vec![delta("[sticker:cat] meow [reaction:heart]")]]);
        let outcome = run(
            services(&messenger, &generator, false),
            vec![inbound("hi", "in-1")],
            CancellationToken::new(),
        )
        .await;

        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(
            messenger.events(),
            vec![
                Event::Reaction { kind: ReactionKind::Heart, target: "in-1".into() },
                Event::Message { text: "meow".into(), quote: None },
                Event::Sticker("cat".into()),
            ]
        );
    }

    #[tokio::test]
    async fn oneshot_failure_sends_fallback() {
        let messenger = FakeMessenger::new();
        let generator = FakeGenerator::new(vec![vec![Step::Fail]]);
        let outcome = run(
            services(&messenger, &generator, false),
            vec![inbound("hi", "in-1")],
            CancellationToken::new(),
        )
        .await;

        assert_eq!(outcome, RunOutcome::Completed);
        let events = messenger.events();
        assert_eq!(events[0], Event::Reaction { kind: ReactionKind::Like, target: "in-1".into() });
        assert_eq!(
            events[1],
            Event::Message {
                text: parley_agent::tags::parser::FALLBACK_MESSAGE.into(),
                quote: None
            }
        );
    }

    #[tokio::test]
    async fn streaming_failure_keeps_partial_output() {
        let messenger = FakeMessenger::new();
        let generator = FakeGenerator::new(vec![vec![delta("partial answer"), Step::Fail]]);
        let outcome = run(
            services(&messenger, &generator, true),
            vec![inbound("hi", "in-1")],
            CancellationToken::new(),
        )
        .await;

        assert!(matches!(outcome, RunOutcome::Failed(_)));
        assert_eq!(messenger.sent_texts(), vec!["partial answer"]);
    }

    #[tokio::test]
    async fn cancelled_before_start_dispatches_nothing() {
        let messenger = FakeMessenger::new();
        let generator = FakeGenerator::new(vec![vec![delta("[msg]x[/msg] y")]]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = run(services(&messenger, &generator, true), vec![inbound("hi", "in-1")], cancel).await;

        assert_eq!(outcome, RunOutcome::Cancelled);
        assert!(messenger.events().is_empty());
    }

    #[tokio::test]
    async fn prompt_carries_history_and_batch() {
        let messenger = FakeMessenger::new();
        let generator = FakeGenerator::new(vec![]);
        let state = Arc::new(Mutex::new(ConversationState::default()));
        state.lock().await.history.push_user("earlier", Some(MessageRef::new("in-0")));

        run_batch(
            services(&messenger, &generator, true),
            "c1".into(),
            state,
            vec![inbound("one", "in-1"), inbound("two", "in-2")],
            CancellationToken::new(),
        )
        .await;

        let prompt = &generator.calls()[0].prompt;
        assert!(prompt.contains("[0] User: earlier"));
        assert!(prompt.ends_with("one\ntwo"));
    }
}
