pub mod channel;
pub mod error;
pub mod types;

pub use channel::Messenger;
pub use error::ChannelError;
pub use types::{InboundMessage, SentReceipt};
