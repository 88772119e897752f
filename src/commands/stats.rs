use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::info;
use wikiclean::{config::Config, sink::SledSink};

pub async fn show_stats(config: Config, db: PathBuf) -> Result<()> {
    if !db.exists() {
        anyhow::bail!("Database not found: {}", db.display());
    }

    info!("Loading statistics from {}", db.display());
    let sink = SledSink::open(&db, &config.sink.tree)
        .with_context(|| format!("Failed to open database: {}", db.display()))?;

    println!("\nwikiclean Statistics:");
    println!("=====================");
    println!("Database: {}", db.display());
    println!("Tree:     {}", config.sink.tree);
    println!("Pages:    {}", sink.len());

    Ok(())
}
