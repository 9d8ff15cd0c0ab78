//! # Catalogue Harvester CLI (`harvest`)
//!
//! The `harvest` binary drives the pipeline: reference taxonomies, single
//! collections, single documents, full runs, and inspection of the result.
//!
//! ## Usage
//!
//! ```bash
//! harvest --config ./config/harvest.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `harvest refs` | Replace the reference taxonomy tables |
//! | `harvest collection <code>` | Append the documents of one catalogue code |
//! | `harvest document <stale-url>` | Append details, citations and context of one document |
//! | `harvest run` | References, then every catalogue code and its documents |
//! | `harvest export <table>` | Write a table as CSV |
//! | `harvest tables` | List tables with row and column counts |
//!
//! Log verbosity follows `RUST_LOG` (default `info`); logs go to stderr.

use catalogue_harvester::{config, export, harvest, stats};

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Catalogue Harvester CLI: mirrors a legal-document catalogue API into SQLite.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/harvest.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "harvest",
    about = "Harvest a hierarchical legal-document catalogue into SQLite",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/harvest.toml`. Database, API, retry and output
    /// settings are read from this file.
    #[arg(long, global = true, default_value = "./config/harvest.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch and flatten the reference taxonomies.
    ///
    /// Replaces the `categories`, `types` and `catalogue` tables.
    Refs,

    /// Fetch the documents of one catalogue code.
    ///
    /// Appends to the `collection` table, tagged with `catalogueCode`.
    Collection {
        /// Taxonomy key, e.g. a code from the `catalogue` table.
        code: String,
    },

    /// Fetch details, citations and context of one document.
    Document {
        /// The document's `staleUrl`, e.g. `/sb/2009/40/2024-01-01`.
        stale_url: String,
    },

    /// Run the full harvest.
    ///
    /// Refreshes the reference taxonomies, then harvests every catalogue
    /// code (or the ones given with `--code`) and all of their documents.
    Run {
        /// Restrict the run to these catalogue codes (repeatable).
        #[arg(long = "code")]
        codes: Vec<String>,

        /// Harvest at most this many catalogue codes.
        #[arg(long)]
        max_codes: Option<usize>,

        /// Harvest at most this many documents per catalogue code.
        #[arg(long)]
        max_documents: Option<usize>,

        /// Skip documents that fail instead of aborting the run.
        #[arg(long)]
        keep_going: bool,
    },

    /// Export a table as CSV.
    Export {
        /// Table name, e.g. `details`.
        table: String,

        /// Output file (defaults to `<output.dir>/<table>.csv`).
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// List tables with their row and column counts.
    Tables,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Refs => {
            harvest::run_refs(&cfg).await?;
        }
        Commands::Collection { code } => {
            harvest::run_collection(&cfg, &code).await?;
        }
        Commands::Document { stale_url } => {
            harvest::run_document(&cfg, &stale_url).await?;
        }
        Commands::Run {
            codes,
            max_codes,
            max_documents,
            keep_going,
        } => {
            let options = harvest::RunOptions {
                codes,
                max_codes,
                max_documents,
                keep_going,
            };
            harvest::run_harvest(&cfg, &options).await?;
        }
        Commands::Export { table, output } => {
            export::run_export(&cfg, &table, output.as_deref()).await?;
        }
        Commands::Tables => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
