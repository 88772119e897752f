use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::info;
use wikiclean::{config::Config, sink::SledSink};

#[derive(Serialize)]
struct ExportedPage<'a> {
    title: &'a str,
    text: &'a str,
}

pub async fn export_pages(config: Config, db: PathBuf, output: PathBuf) -> Result<()> {
    if !db.exists() {
        anyhow::bail!("Database not found: {}", db.display());
    }

    info!("Exporting {} to: {}", db.display(), output.display());

    let sink = SledSink::open(&db, &config.sink.tree)
        .with_context(|| format!("Failed to open database: {}", db.display()))?;
    let file = File::create(&output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    let mut writer = BufWriter::new(file);

    let mut count = 0usize;
    for row in sink.iter() {
        let (title, text) = row?;
        let json = serde_json::to_string(&ExportedPage {
            title: &title,
            text: &text,
        })?;
        writeln!(writer, "{}", json)?;
        count += 1;
    }
    writer.flush()?;

    println!("Exported {} pages to {}", count, output.display());

    Ok(())
}
