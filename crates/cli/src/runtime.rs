//! Wiring: config in, orchestrator out.

use std::path::Path;
use std::sync::Arc;

use forgeloop_agent::{Orchestrator, OrchestratorConfig};
use forgeloop_config::AppConfig;
use forgeloop_core::event::{DomainEvent, EventBus};
use forgeloop_core::knowledge::KnowledgeStore;
use forgeloop_knowledge::SqliteKnowledgeStore;
use tokio::sync::broadcast;
use tracing::debug;

/// Open the configured SQLite store, creating its directory if needed.
pub async fn open_store(
    config: &AppConfig,
) -> Result<Arc<dyn KnowledgeStore>, Box<dyn std::error::Error>> {
    let path = &config.knowledge.database_path;
    if !path.contains(":memory:")
        && let Some(parent) = Path::new(path).parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    let store = SqliteKnowledgeStore::new(path)
        .await
        .map_err(|e| format!("Failed to open knowledge store: {e}"))?;
    Ok(Arc::new(store))
}

fn print_missing_key_help() {
    eprintln!();
    eprintln!("  ERROR: No API key configured!");
    eprintln!();
    eprintln!("  Set one of these environment variables:");
    eprintln!("    FORGELOOP_API_KEY   (generic)");
    eprintln!("    GLM_API_KEY         (Zhipu GLM)");
    eprintln!("    OPENAI_API_KEY      (OpenAI-compatible)");
    eprintln!();
    eprintln!("  Or add it to your config file:");
    eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
    eprintln!();
}

/// Build the gateway, tools and store described by `config`.
///
/// With `verbose`, domain events are logged at debug level.
pub async fn build_orchestrator(
    config: &AppConfig,
    verbose: bool,
) -> Result<Orchestrator, Box<dyn std::error::Error>> {
    if !config.has_api_key() {
        print_missing_key_help();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let gateway = forgeloop_providers::build_from_config(config)?;
    let tools = forgeloop_tools::default_registry(config.security.allowed_commands.clone());
    let store = open_store(config).await?;

    let bus = Arc::new(EventBus::default());
    if verbose {
        tokio::spawn(log_events(bus.subscribe()));
    }

    Ok(Orchestrator::new(
        Arc::new(gateway),
        Arc::new(tools),
        store,
        OrchestratorConfig::from_app(config),
    )
    .with_event_bus(bus))
}

async fn log_events(mut rx: broadcast::Receiver<Arc<DomainEvent>>) {
    loop {
        match rx.recv().await {
            Ok(event) => debug!(?event, "Domain event"),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(skipped, "Event log lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
