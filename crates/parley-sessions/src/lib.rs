pub mod history;
pub mod ledger;

pub use history::{ConversationHistory, HistoryEntry, Speaker};
pub use ledger::{SentLedger, SentMessageRecord};
