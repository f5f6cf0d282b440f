use thiserror::Error;

/// Errors a messaging platform can report for a single outbound call.
///
/// Every call fails independently; callers log and move on to the next action.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// A message, sticker or reaction could not be delivered.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// The platform refused to retract the target message (too old, not ours, …).
    #[error("Retract failed: {0}")]
    RetractFailed(String),

    /// The referenced message no longer exists on the platform.
    #[error("Target message not found: {0}")]
    TargetNotFound(String),

    /// The platform rejected the supplied credentials or token.
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// An operation exceeded its allowed time budget.
    #[error("Operation timed out after {ms}ms")]
    Timeout { ms: u64 },
}
