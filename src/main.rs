//! wikiclean: Wikipedia dump to plaintext store

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{
    export::export_pages,
    import::{import_dump, ImportArgs},
    init::init_config,
    stats::show_stats,
};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use wikiclean::config::{Config, LogFormat, LogLevel, DEFAULT_CONFIG_FILE};

#[derive(Parser)]
#[command(name = "wikiclean")]
#[command(about = "Extract and clean Wikipedia dumps into a key-value store")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract, clean and store every page of a dump
    Import(ImportArgs),

    /// Show output database statistics
    Stats {
        /// Output database directory
        db: PathBuf,
    },

    /// Export an output database as JSON lines
    Export {
        /// Output database directory
        db: PathBuf,

        /// Output file
        output: PathBuf,
    },

    /// Write a default configuration file
    Init {
        /// Directory or file path
        #[arg(default_value = ".")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = if cli.config.exists() {
        Config::load(&cli.config)?
    } else {
        Config::default()
    };

    // Setup logging
    let level: Level = LogLevel::from_verbosity(cli.verbose)
        .unwrap_or(config.logging.level)
        .into();

    match config.logging.format {
        LogFormat::Text => {
            let subscriber = FmtSubscriber::builder()
                .with_max_level(level)
                .with_target(false)
                .with_writer(std::io::stderr)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        LogFormat::Json => {
            let subscriber = FmtSubscriber::builder()
                .json()
                .with_max_level(level)
                .with_writer(std::io::stderr)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }

    match cli.command {
        Commands::Import(args) => {
            let code = import_dump(config, args).await?;
            if code != 0 {
                std::process::exit(code);
            }
            Ok(())
        }
        Commands::Stats { db } => show_stats(config, db).await,
        Commands::Export { db, output } => export_pages(config, db, output).await,
        Commands::Init { path } => init_config(path).await,
    }
}
