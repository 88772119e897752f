use anyhow::{Context, Result};
use clap::Args;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use wikiclean::{
    config::Config,
    import::{open_dump, DumpFormat, Identity, NamespaceFilter, StreamExtractor, TextTransform, WikiTextCleaner},
    pipeline::{RunOutcome, RunReport, Supervisor},
    sink::SledSink,
};

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// Dump file (.xml or .xml.bz2)
    pub data_in: PathBuf,

    /// Output database directory
    pub data_out: PathBuf,

    /// Number of transform workers
    #[arg(short, long)]
    pub processes: Option<usize>,

    /// Capacity of the raw page queue
    #[arg(long)]
    pub input_capacity: Option<usize>,

    /// Capacity of the cleaned page queue
    #[arg(long)]
    pub output_capacity: Option<usize>,

    /// Namespace to keep (repeatable)
    #[arg(short, long = "namespace")]
    pub namespaces: Vec<i32>,

    /// Keep pages from every namespace
    #[arg(long, conflicts_with = "namespaces")]
    pub all_namespaces: bool,

    /// Drop redirect pages
    #[arg(long)]
    pub skip_redirects: bool,

    /// Stop after this many pages
    #[arg(long)]
    pub max_pages: Option<u64>,

    /// Drop cleaned pages shorter than this many characters
    #[arg(long)]
    pub min_length: Option<usize>,

    /// Store wikitext as-is, without cleaning
    #[arg(long)]
    pub raw: bool,

    /// No progress display or summary
    #[arg(short, long)]
    pub quiet: bool,
}

impl ImportArgs {
    /// Command-line flags take precedence over the config file
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(workers) = self.processes {
            config.pipeline.workers = workers;
        }
        if let Some(capacity) = self.input_capacity {
            config.pipeline.input_capacity = capacity;
        }
        if let Some(capacity) = self.output_capacity {
            config.pipeline.output_capacity = capacity;
        }
        if let Some(min_length) = self.min_length {
            config.pipeline.min_body_length = min_length;
        }
        if !self.namespaces.is_empty() {
            config.extract.namespaces = self.namespaces.clone();
        }
        if self.all_namespaces {
            config.extract.all_namespaces = true;
        }
        if self.skip_redirects {
            config.extract.skip_redirects = true;
        }
        if self.max_pages.is_some() {
            config.extract.max_pages = self.max_pages;
        }
        if self.raw {
            config.cleaning.raw = true;
        }
    }
}

pub async fn import_dump(mut config: Config, args: ImportArgs) -> Result<i32> {
    args.apply_to(&mut config);
    config.validate()?;

    if !args.data_in.exists() {
        anyhow::bail!("Dump file not found: {}", args.data_in.display());
    }

    info!(
        "Importing from: {} (format: {:?})",
        args.data_in.display(),
        DumpFormat::detect(&args.data_in)
    );

    let reader = open_dump(&args.data_in)
        .with_context(|| format!("Failed to open dump: {}", args.data_in.display()))?;

    if let Some(parent) = args.data_out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory: {}", parent.display()))?;
    }
    let sink = SledSink::open(&args.data_out, &config.sink.tree)
        .with_context(|| format!("Failed to open output database: {}", args.data_out.display()))?
        .with_sync_writes(config.sink.sync_writes);

    let filter = if config.extract.all_namespaces {
        NamespaceFilter::Any
    } else {
        NamespaceFilter::only(config.extract.namespaces.iter().copied())
    };
    let extractor = StreamExtractor::new(filter)
        .with_skip_redirects(config.extract.skip_redirects)
        .with_max_pages(config.extract.max_pages);

    let transform: Arc<dyn TextTransform> = if config.cleaning.raw {
        Arc::new(Identity)
    } else {
        Arc::new(WikiTextCleaner::from_config(&config.cleaning))
    };

    let supervisor = Supervisor::new(config.pipeline.clone(), extractor, transform, Box::new(sink))
        .with_progress(!args.quiet);
    let cancel = supervisor.cancel_handle();

    let mut run = tokio::task::spawn_blocking(move || supervisor.run(reader));

    let report = tokio::select! {
        report = &mut run => report?,
        _ = wait_for_ctrl_c() => {
            info!("Received Ctrl+C, stopping");
            cancel.cancel();
            run.await?
        }
        _ = wait_for_sigterm() => {
            info!("Received SIGTERM, stopping");
            cancel.cancel();
            run.await?
        }
    };

    if !args.quiet {
        print_summary(&report, &args.data_out);
    }

    Ok(report.exit_code())
}

fn print_summary(report: &RunReport, data_out: &std::path::Path) {
    match report.outcome {
        RunOutcome::Completed => println!("\nImport Complete!"),
        RunOutcome::Cancelled => println!("\nImport stopped by request"),
        RunOutcome::Failed(ref e) => println!("\nImport stopped due to error: {}", e),
    }
    println!("================");

    let stats = &report.stats;
    println!("Pages read:         {}", stats.extracted);
    println!("Pages cleaned:      {}", stats.transformed);
    println!("Clean failures:     {}", stats.transform_failed);
    println!("Too short:          {}", stats.filtered_short);
    println!("Pages written:      {}", stats.written);
    println!("Duplicates:         {}", stats.duplicates);
    println!("Processing rate:    {:.1} pages/sec", stats.docs_per_second);
    println!("Elapsed time:       {:.1}s", report.elapsed.as_secs_f64());
    println!("\nOutput: {}", data_out.display());
}

/// True when the signal listener resolved with `Ok`; a failed listener is logged
fn signal_received(result: io::Result<()>, name: &str) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            warn!("Failed to listen for {}: {}", name, e);
            false
        }
    }
}

/// Resolves on Ctrl+C. Never resolves if the handler cannot be installed.
async fn wait_for_ctrl_c() {
    if !signal_received(signal::ctrl_c().await, "Ctrl+C") {
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn wait_for_sigterm() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!("Failed to register SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_sigterm() {
    std::future::pending::<()>().await
}
