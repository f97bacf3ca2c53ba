//! `forgeloop init`: write a default configuration file.

use std::path::Path;

use forgeloop_config::AppConfig;

pub async fn run(config_path: &Path, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    println!("Forgeloop setup");
    println!("===============\n");

    if let Some(dir) = config_path.parent()
        && !dir.as_os_str().is_empty()
        && !dir.exists()
    {
        std::fs::create_dir_all(dir)?;
        println!("✅ Created config directory: {}", dir.display());
    }

    if config_path.exists() && !force {
        println!("⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or re-run with --force.\n");
        return Ok(());
    }

    std::fs::write(config_path, AppConfig::default_toml())?;
    println!("✅ Wrote config to: {}", config_path.display());
    println!("\nNext steps:");
    println!("  1. Set api_key in the file, or export FORGELOOP_API_KEY");
    println!("  2. Adjust security.allowed_commands for your toolchain");
    println!("  3. Run `forgeloop` to start a session\n");
    Ok(())
}
