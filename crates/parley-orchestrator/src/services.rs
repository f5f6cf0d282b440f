use std::sync::Arc;
use std::time::Duration;

use parley_agent::prompt::PromptBuilder;
use parley_agent::Generator;
use parley_channels::Messenger;
use parley_core::ParleyConfig;

/// Collaborators and settings shared by every conversation.
pub struct Services {
    pub messenger: Arc<dyn Messenger>,
    pub generator: Arc<dyn Generator>,
    pub prompt: PromptBuilder,
    pub config: ParleyConfig,
}

impl Services {
    pub fn new(
        messenger: Arc<dyn Messenger>,
        generator: Arc<dyn Generator>,
        prompt: PromptBuilder,
        config: ParleyConfig,
    ) -> Self {
        Self {
            messenger,
            generator,
            prompt,
            config,
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.config.buffer.delay_ms)
    }

    pub fn typing_refresh(&self) -> Duration {
        Duration::from_millis(self.config.buffer.typing_refresh_ms)
    }

    pub fn message_gap(&self) -> Duration {
        Duration::from_millis(self.config.dispatch.message_gap_ms)
    }
}
