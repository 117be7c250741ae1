//! # Genesis Interlinear CLI (`gx`)
//!
//! ## Usage
//!
//! ```bash
//! gx --config ./config/gx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `gx chunk` | Chunk the corpus per model and write reconciled records |
//! | `gx verify` | Check persisted records against the verse table |
//! | `gx span <from> <to>` | Print the text of a contiguous verse span |
//! | `gx init` | Create the SQLite database and tables |
//! | `gx index` | Load a record level and embed it for one model |
//! | `gx search "<refs>"` | Find records similar to the given verses |
//! | `gx serve` | Start the HTTP search server |
//!
//! Diagnostics go to stderr through `tracing`; set `GX_LOG` (e.g.
//! `GX_LOG=genesis_interlinear=debug`) to change the level.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use genesis_interlinear::models::{Language, VerseKey};
use genesis_interlinear::progress::ProgressMode;
use genesis_interlinear::{build, config, corpus, index, migrate, search, server, verify};

/// Genesis Interlinear: chunk, reconcile, verify, and search Hebrew/English
/// Genesis text.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/gx.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "gx",
    about = "Genesis Interlinear: verse-aligned chunking and semantic search",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/gx.toml")]
    config: PathBuf,

    /// Progress on stderr: `auto`, `off`, `human`, or `json`.
    #[arg(long, global = true, default_value = "auto")]
    progress: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Chunk the flattened corpus and write `agentic_<model>_records.json`.
    ///
    /// Every configured model is built unless `--model` is given.
    Chunk {
        /// Model to build (repeatable).
        #[arg(long = "model")]
        models: Vec<String>,

        /// Build and report without writing record files.
        #[arg(long)]
        dry_run: bool,
    },

    /// Check persisted records for verse-numbering and word-count issues.
    ///
    /// Defaults to every `agentic_*` level present in the records directory.
    Verify {
        /// Record level to check (repeatable).
        #[arg(long = "level")]
        levels: Vec<String>,
    },

    /// Print the text of the inclusive verse span `from..=to`.
    Span {
        /// First verse, `chapter:verse`.
        from: String,
        /// Last verse, `chapter:verse`.
        to: String,
        /// `english` or `hebrew`.
        #[arg(long, default_value = "english")]
        language: String,
    },

    /// Load a record level into the database and embed it.
    ///
    /// Only records whose embedded text changed since the last run are
    /// re-embedded unless `--rebuild` is given.
    Index {
        #[arg(long)]
        model: String,

        #[arg(long)]
        level: String,

        /// Clear this model's vectors for the level and embed everything.
        #[arg(long)]
        rebuild: bool,

        /// Show counts without embedding.
        #[arg(long)]
        dry_run: bool,
    },

    /// Search records similar to the given verses.
    Search {
        /// Verse references, e.g. `Gen 1:1-3` or `1:1, 2:4`.
        refs: String,

        #[arg(long, default_value = "hebrew_st")]
        model: String,

        #[arg(long, default_value = "pericope")]
        level: String,

        /// Number of results.
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Start the HTTP search server on `[server].bind`.
    Serve,
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_env("GX_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let progress = ProgressMode::from_flag(&cli.progress)?.reporter();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
        }
        Commands::Chunk { models, dry_run } => {
            build::run_chunk(&cfg, &models, dry_run, progress.as_ref())?;
        }
        Commands::Verify { levels } => {
            verify::run_verify(&cfg, &levels)?;
        }
        Commands::Span { from, to, language } => {
            let from: VerseKey = from.parse()?;
            let to: VerseKey = to.parse()?;
            let language: Language = language.parse()?;
            let table = corpus::VerseTable::load(&cfg.corpus.verses)?;
            println!("{}", table.span(from, to, language));
        }
        Commands::Index {
            model,
            level,
            rebuild,
            dry_run,
        } => {
            index::run_index(&cfg, &model, &level, rebuild, dry_run, progress.as_ref()).await?;
        }
        Commands::Search {
            refs,
            model,
            level,
            top_k,
        } => {
            search::run_search(&cfg, &model, &level, &refs, top_k).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
