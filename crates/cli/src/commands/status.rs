//! `forgeloop status`: configuration and knowledge totals.

use std::path::Path;

use forgeloop_config::AppConfig;

use crate::runtime;

pub async fn run(config: &AppConfig, config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Forgeloop Status");
    println!("================");
    println!("  Config file:   {}", config_path.display());
    println!("  Base URL:      {}", config.base_url);
    println!("  Model:         {}", config.model);
    println!("  Temperature:   {}", config.temperature);
    println!("  API key:       {}", if config.has_api_key() { "set" } else { "missing" });
    println!("  Knowledge DB:  {}", config.knowledge.database_path);
    println!("  Commands:      {}", config.security.allowed_commands.join(", "));
    println!(
        "  Learning:      {}",
        if config.agent.learning_enabled { "enabled" } else { "disabled" }
    );
    if let Some(cmd) = &config.agent.test_command {
        println!("  Test command:  {cmd}");
    }

    let tools = forgeloop_tools::default_registry(config.security.allowed_commands.clone());
    println!("\n  Tools:");
    for (name, description) in tools.descriptions() {
        println!("    {name:<14} {description}");
    }

    match runtime::open_store(config).await {
        Ok(store) => match store.counts().await {
            Ok(counts) => println!(
                "\n  Knowledge:     {} patterns, {} solutions, {} preferences",
                counts.patterns, counts.solutions, counts.preferences
            ),
            Err(e) => println!("\n  ⚠️  Knowledge store unreadable: {e}"),
        },
        Err(e) => println!("\n  ⚠️  {e}"),
    }

    if !config_path.exists() {
        println!("\n  ⚠️  No config file; run `forgeloop init` first");
    }
    Ok(())
}
