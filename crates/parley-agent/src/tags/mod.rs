//! Wire micro-syntax the model uses to request chat actions.
//!
//! ```text
//! [reaction:KIND]  [reaction:N:KIND]  [sticker:KEYWORD]
//! [quote:N]TEXT[/quote]  [msg]TEXT[/msg]  [undo:N]
//! ```
//!
//! `grammar` recognises the tags, `decoder` turns a growing stream into
//! exactly-once actions, `parser` handles a complete response in one pass.

pub mod decoder;
pub mod grammar;
pub mod parser;

pub use decoder::{ActionSink, Flow, StreamDecoder};
pub use grammar::{strip_tags, Action, Category};
pub use parser::{parse_response, BatchResponse, ParsedMessage};
