//! `forgeloop knowledge`: list stored patterns, best first.

use forgeloop_agent::KnowledgeSnapshot;
use forgeloop_config::AppConfig;
use forgeloop_core::knowledge::PatternQuery;

use crate::runtime;
use crate::terminal::render_knowledge;

pub async fn run(
    config: &AppConfig,
    pattern_type: Option<&str>,
    limit: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = runtime::open_store(config).await?;

    let mut query = PatternQuery::new().with_limit(limit);
    if let Some(t) = pattern_type {
        query = query.with_type(t);
    }

    let snapshot = KnowledgeSnapshot {
        patterns: store.search_patterns(query).await?,
        counts: store.counts().await?,
    };
    println!("{}", render_knowledge(&snapshot));

    let preferences = store.get_preferences(None).await?;
    if !preferences.is_empty() {
        println!("\n  Preferences:");
        for p in preferences.iter().take(limit) {
            println!(
                "    [{}] {} (confidence {:.0}%)",
                p.preference_type,
                p.value,
                p.confidence * 100.0
            );
        }
    }
    Ok(())
}
