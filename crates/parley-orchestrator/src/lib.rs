//! Per-conversation orchestration: debounce bursts of inbound messages,
//! run one generation at a time, preempt it when newer input arrives, and
//! dispatch the decoded actions back to the messenger.

pub mod conversation;
pub mod dispatch;
pub mod pipeline;
pub mod registry;
pub mod services;
pub mod task;
pub mod typing;

#[cfg(test)]
pub(crate) mod testing;

pub use conversation::{Phase, Status};
pub use dispatch::{ChatDispatcher, ConversationState};
pub use pipeline::RunOutcome;
pub use registry::ConversationRegistry;
pub use services::Services;
pub use task::{RunTicket, TaskController};
pub use typing::PresenceHandle;
