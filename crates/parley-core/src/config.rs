use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_DEBOUNCE_MS: u64 = 2_500;
/// Presence refresh period. Must stay below the platform's own typing-status
/// expiry (about 5 s on the platforms we target).
pub const DEFAULT_TYPING_REFRESH_MS: u64 = 3_000;
pub const DEFAULT_LEDGER_CAPACITY: usize = 20;
pub const DEFAULT_HISTORY_ENTRIES: usize = 50;

/// Top-level config (parley.toml + PARLEY_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParleyConfig {
    #[serde(default)]
    pub buffer: BufferConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub agent: AgentConfig,
}

/// Debounce and presence timing for inbound bursts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferConfig {
    /// Quiet period after the last inbound message before a batch is processed.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    #[serde(default = "default_typing_refresh_ms")]
    pub typing_refresh_ms: u64,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            delay_ms: DEFAULT_DEBOUNCE_MS,
            typing_refresh_ms: DEFAULT_TYPING_REFRESH_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Sent messages remembered per conversation (oldest evicted first).
    #[serde(default = "default_ledger_capacity")]
    pub capacity: usize,
    /// Records older than this are pruned by the periodic sweep.
    #[serde(default = "default_ledger_max_age_secs")]
    pub max_age_secs: u64,
    #[serde(default = "default_ledger_sweep_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_LEDGER_CAPACITY,
            max_age_secs: default_ledger_max_age_secs(),
            sweep_interval_secs: default_ledger_sweep_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_history_entries")]
    pub max_entries: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_HISTORY_ENTRIES,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Decode model output incrementally (true) or parse it once at the end.
    #[serde(default = "bool_true")]
    pub streaming: bool,
    /// Pause between two consecutive chat messages.
    #[serde(default = "default_message_gap_ms")]
    pub message_gap_ms: u64,
    /// Hold stickers decoded mid-stream until the text has been sent.
    #[serde(default = "bool_true")]
    pub defer_stickers: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            streaming: true,
            message_gap_ms: default_message_gap_ms(),
            defer_stickers: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// When true, only messages starting with `prefix` are answered.
    #[serde(default)]
    pub require_prefix: bool,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Conversations the bot answers in. Empty means every conversation;
    /// `"*"` is accepted as an explicit wildcard.
    #[serde(default)]
    pub allow_conversations: Vec<String>,
    /// Idle conversations are dropped from the registry after this long.
    #[serde(default = "default_idle_evict_secs")]
    pub idle_evict_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            require_prefix: false,
            prefix: default_prefix(),
            allow_conversations: Vec::new(),
            idle_evict_secs: default_idle_evict_secs(),
        }
    }
}

/// OpenAI-compatible chat completions endpoint used for generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Falls back to `OPENAI_API_KEY` when unset.
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            model: default_model(),
            max_tokens: default_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Optional persona file prepended to the tag instructions.
    pub persona_path: Option<String>,
}

fn bool_true() -> bool {
    true
}
fn default_delay_ms() -> u64 {
    DEFAULT_DEBOUNCE_MS
}
fn default_typing_refresh_ms() -> u64 {
    DEFAULT_TYPING_REFRESH_MS
}
fn default_ledger_capacity() -> usize {
    DEFAULT_LEDGER_CAPACITY
}
fn default_ledger_max_age_secs() -> u64 {
    60 * 60
}
fn default_ledger_sweep_secs() -> u64 {
    30 * 60
}
fn default_history_entries() -> usize {
    DEFAULT_HISTORY_ENTRIES
}
fn default_message_gap_ms() -> u64 {
    300
}
fn default_prefix() -> String {
    "!bot".to_string()
}
fn default_idle_evict_secs() -> u64 {
    60 * 60
}
fn default_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_max_tokens() -> u32 {
    2048
}

impl ParleyConfig {
    /// Load config from a TOML file with PARLEY_* env var overrides.
    ///
    /// Nested keys use a double underscore: `PARLEY_BUFFER__DELAY_MS=1500`.
    /// A missing file is not an error; every section has defaults.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: ParleyConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("PARLEY_").split("__"))
            .extract()
            .map_err(|e| crate::error::ParleyError::Config(e.to_string()))?;

        tracing::debug!(path = %path, "config loaded");
        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.parley/parley.toml", home)
}
