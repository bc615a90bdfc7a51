//! `huddle init`: write a starter configuration.

use huddle_config::AppConfig;
use std::path::Path;

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = match config_path {
        Some(path) => path.to_path_buf(),
        None => AppConfig::config_dir().join("config.toml"),
    };

    println!("huddle setup");
    println!("============\n");

    if let Some(dir) = config_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        if !dir.exists() {
            std::fs::create_dir_all(dir)?;
            println!("✅ Created config directory: {}", dir.display());
        }
    }

    if config_path.exists() {
        println!("⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete it and re-run init.");
        return Ok(());
    }

    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("✅ Created config at: {}", config_path.display());
    println!("\nNext steps:");
    println!("  1. Add [[agents]] entries with a key, name and description");
    println!("  2. Export HUDDLE_API_KEY (or OPENROUTER_API_KEY / OPENAI_API_KEY)");
    println!("  3. huddle group create \"My team\" --agents writer,reviewer");

    Ok(())
}
