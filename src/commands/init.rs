use anyhow::{Context, Result};
use std::path::PathBuf;
use wikiclean::config::{Config, DEFAULT_CONFIG_FILE};

pub async fn init_config(path: PathBuf) -> Result<()> {
    let config_path = if path.is_dir() {
        path.join(DEFAULT_CONFIG_FILE)
    } else {
        path
    };

    if config_path.exists() {
        anyhow::bail!("Config file already exists: {}", config_path.display());
    }

    let toml_content = format!("# wikiclean configuration\n\n{}", Config::default().to_toml()?);
    std::fs::write(&config_path, toml_content)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;

    println!("Created configuration at: {}", config_path.display());
    println!("\nRun an import with:");
    println!("  wikiclean -c {} import <dump.xml.bz2> <output.sled>", config_path.display());

    Ok(())
}
