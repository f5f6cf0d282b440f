use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use parley_agent::openai::OpenAiGenerator;
use parley_agent::prompt::PromptBuilder;
use parley_agent::Generator;
use parley_core::ParleyConfig;
use parley_orchestrator::{ConversationRegistry, Services};
use tracing::{info, warn};

mod console;
mod inbound;

use console::ConsoleMessenger;

#[derive(Debug, Parser)]
#[command(name = "parley", version, about = "Chat agent front end (console messenger)")]
struct Cli {
    /// Config file. Defaults to $PARLEY_CONFIG, then ~/.parley/parley.toml.
    #[arg(short, long)]
    config: Option<String>,

    /// Parse each response once it is complete instead of streaming it.
    #[arg(long)]
    batch: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley_gateway=info,parley_orchestrator=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.or_else(|| std::env::var("PARLEY_CONFIG").ok());
    let mut config = ParleyConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        ParleyConfig::default()
    });
    if cli.batch {
        config.dispatch.streaming = false;
    }

    let generator = build_generator(&config)?;
    let prompt = match config.agent.persona_path.as_deref() {
        Some(path) => PromptBuilder::from_file(path),
        None => PromptBuilder::default(),
    };
    let messenger = Arc::new(ConsoleMessenger::new());
    let services = Services::new(messenger.clone(), generator, prompt, config.clone());
    let registry = Arc::new(ConversationRegistry::new(Arc::new(services)));

    tokio::spawn(maintenance(registry.clone(), config.clone()));

    info!(
        streaming = config.dispatch.streaming,
        debounce_ms = config.buffer.delay_ms,
        "parley ready; type `conversation: message` or plain text"
    );

    tokio::select! {
        _ = async {
            console::run_stdin(messenger, registry.clone(), config.gateway.clone()).await;
            info!("stdin closed, waiting for active conversations");
            drain(&registry, Duration::from_millis(config.buffer.delay_ms)).await;
        } => {}
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
    }

    let cancelled = registry.signal_all();
    info!(cancelled, "shutting down");
    Ok(())
}

fn build_generator(config: &ParleyConfig) -> anyhow::Result<Arc<dyn Generator>> {
    let api_key = config
        .provider
        .api_key
        .clone()
        .or_else(|| std::env::var("OPENAI_API_KEY").ok())
        .filter(|k| !k.is_empty())
        .context("no API key: set provider.api_key, PARLEY_PROVIDER__API_KEY or OPENAI_API_KEY")?;
    info!(base_url = %config.provider.base_url, model = %config.provider.model, "using OpenAI-compatible generator");
    Ok(Arc::new(OpenAiGenerator::new(
        api_key,
        config.provider.base_url.clone(),
    )))
}

/// Wait until every conversation has gone idle.
async fn drain(registry: &ConversationRegistry, debounce: Duration) {
    // Messages read just before EOF may not have been picked up yet.
    tokio::time::sleep(debounce).await;
    while !registry.all_idle() {
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
}

/// Periodic ledger pruning and idle-conversation eviction.
async fn maintenance(registry: Arc<ConversationRegistry>, config: ParleyConfig) {
    let max_idle = Duration::from_secs(config.gateway.idle_evict_secs);
    let max_age = chrono_secs(config.ledger.max_age_secs);

    let mut sweep = tokio::time::interval(Duration::from_secs(config.ledger.sweep_interval_secs.max(1)));
    let mut evict = tokio::time::interval((max_idle / 4).max(Duration::from_secs(1)));
    // Both fire immediately; skip the empty first round.
    sweep.tick().await;
    evict.tick().await;

    loop {
        tokio::select! {
            _ = sweep.tick() => {
                let removed = registry.sweep_ledgers(max_age).await;
                if removed > 0 {
                    info!(removed, "ledger sweep");
                }
            }
            _ = evict.tick() => {
                let evicted = registry.evict_idle(max_idle);
                if evicted > 0 {
                    info!(evicted, remaining = registry.len(), "evicted idle conversations");
                }
            }
        }
    }
}

fn chrono_secs(secs: u64) -> chrono::Duration {
    // Clamp to a century; chrono panics on out-of-range durations.
    const CENTURY: u64 = 100 * 365 * 24 * 3600;
    chrono::Duration::seconds(secs.min(CENTURY) as i64)
}
