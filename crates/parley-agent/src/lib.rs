pub mod openai;
pub mod prompt;
pub mod provider;
pub mod stream;
pub mod tags;

pub use provider::{GenerationRequest, Generator, ProviderError};
pub use stream::StreamEvent;
pub use tags::{Action, ActionSink, BatchResponse, Flow, StreamDecoder};
