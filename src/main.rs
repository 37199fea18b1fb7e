//! # BidVault CLI (`bidvault`)
//!
//! The `bidvault` binary is the interface for the ingestion pipeline and
//! the search index. It provides commands for database initialization,
//! single-file and folder ingestion, filtered similarity search, document
//! deletion, and index statistics.
//!
//! ## Usage
//!
//! ```bash
//! bidvault --config ./config/bidvault.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `bidvault init` | Create the SQLite database and run schema migrations |
//! | `bidvault ingest <file>` | Ingest one document |
//! | `bidvault ingest-folder <dir>` | Ingest every supported file under a directory |
//! | `bidvault search "<query>"` | Filtered similarity search over stored chunks |
//! | `bidvault delete <document-id>` | Remove all chunks of a document |
//! | `bidvault stats` | Show index totals and breakdowns |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! bidvault init --config ./config/bidvault.toml
//!
//! # Ingest a proposal with explicit tags
//! bidvault ingest proposal.pdf --source-type proposal --sector health --year 2022
//!
//! # Check what extraction would produce, without writing anything
//! bidvault ingest scan.pdf --dry-run
//!
//! # Search won health-sector proposals from 2020 onwards
//! bidvault search "community health worker training" \
//!     --sector health --won true --year-min 2020
//! ```

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use bidvault::config;
use bidvault::db;
use bidvault::metadata::{DocumentMetadata, Donor, SectionType, Sector, SourceType};
use bidvault::migrate;
use bidvault::pipeline::{IngestionOutcome, IngestionRequest, Pipeline};
use bidvault::search;
use bidvault::stats;
use bidvault::store::{SearchFilters, VectorStore};

/// BidVault CLI — ingestion and filtered similarity search for bid and
/// tender documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/bidvault.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "bidvault",
    about = "BidVault — ingestion and filtered similarity search for bid and tender documents",
    version,
    long_about = "BidVault detects each document's format and layout, extracts text with the \
    right tool chain (including OCR for scanned PDFs), chunks along document structure, tags \
    chunks with typed metadata, and serves filtered similarity search from SQLite."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/bidvault.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the chunk table with its
    /// filter indexes. Idempotent — running it multiple times is safe.
    Init,

    /// Ingest a single document.
    ///
    /// Detects the format, extracts text, chunks it, tags metadata,
    /// embeds each chunk, and stores everything. Tags given on the
    /// command line win over auto-tagging.
    Ingest {
        /// Path to a .pdf, .docx, .doc, or .txt file.
        file: PathBuf,

        #[command(flatten)]
        tags: TagArgs,

        /// Run detection, extraction, and chunking but write nothing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Ingest every supported file under a directory, recursively.
    ///
    /// Files are processed one at a time in path order; a failing file is
    /// reported and the walk continues.
    IngestFolder {
        /// Directory to walk.
        dir: PathBuf,

        #[command(flatten)]
        tags: TagArgs,

        /// Run detection, extraction, and chunking but write nothing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Search stored chunks by similarity, with metadata filters.
    ///
    /// All given filters must match (AND). Requires an embedding provider.
    Search {
        /// The search query string.
        query: String,

        /// Filter by source type (proposal, rfp, cv, ...).
        #[arg(long)]
        source_type: Option<SourceType>,

        /// Filter by sector (health, education, ...).
        #[arg(long)]
        sector: Option<Sector>,

        /// Filter by donor (world_bank, usaid, ...).
        #[arg(long)]
        donor: Option<Donor>,

        /// Filter by section type (methodology, team, ...).
        #[arg(long)]
        section_type: Option<SectionType>,

        /// Only chunks from documents written in or after this year.
        #[arg(long)]
        year_min: Option<i32>,

        /// Only chunks from documents written in or before this year.
        #[arg(long)]
        year_max: Option<i32>,

        /// Only chunks from won (true) or lost (false) bids.
        #[arg(long)]
        won: Option<bool>,

        /// Only chunks from one document.
        #[arg(long)]
        document_id: Option<String>,

        /// Maximum number of results.
        #[arg(long, default_value_t = 8)]
        top_k: usize,

        /// Discard results below this cosine similarity.
        #[arg(long, default_value_t = 0.5)]
        min_similarity: f32,
    },

    /// Delete all chunks belonging to a document.
    Delete {
        /// The document id reported at ingestion.
        document_id: String,
    },

    /// Show index totals and per-type breakdowns.
    Stats,
}

/// Metadata tags shared by the ingest commands. Anything not given is
/// auto-tagged from the document text.
#[derive(Args, Clone)]
struct TagArgs {
    /// Source type (proposal, rfp, cv, project, certificate, methodology, financial).
    #[arg(long)]
    source_type: Option<SourceType>,

    /// Sector (health, education, infrastructure, ...).
    #[arg(long)]
    sector: Option<Sector>,

    /// Donor (world_bank, usaid, afdb, ...).
    #[arg(long)]
    donor: Option<Donor>,

    /// Year the document was written (>= 2000).
    #[arg(long)]
    year: Option<i32>,

    /// Client organization name.
    #[arg(long)]
    client: Option<String>,

    /// Country the work concerns.
    #[arg(long)]
    country: Option<String>,

    /// Document language code.
    #[arg(long)]
    language: Option<String>,

    /// Whether the bid was won.
    #[arg(long)]
    won: Option<bool>,

    /// Tender value in USD.
    #[arg(long)]
    tender_value_usd: Option<f64>,

    /// Internal bid reference.
    #[arg(long)]
    bid_reference: Option<String>,

    /// Reuse a fixed document id instead of generating one.
    #[arg(long)]
    document_id: Option<String>,
}

impl TagArgs {
    fn into_metadata(self) -> DocumentMetadata {
        let mut meta = DocumentMetadata::default();
        if let Some(v) = self.source_type {
            meta.source_type = v;
        }
        if let Some(v) = self.sector {
            meta.sector = v;
        }
        if let Some(v) = self.donor {
            meta.donor = v;
        }
        if let Some(v) = self.year {
            meta.year = v;
        }
        if let Some(v) = self.client {
            meta.client = v;
        }
        if let Some(v) = self.country {
            meta.country = v;
        }
        if let Some(v) = self.language {
            meta.language = v;
        }
        meta.won = self.won;
        meta.tender_value_usd = self.tender_value_usd;
        if let Some(v) = self.bid_reference {
            meta.bid_reference = v;
        }
        meta.document_id = self.document_id;
        meta
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Ingest {
            file,
            tags,
            dry_run,
        } => {
            let pipeline = build_pipeline(&cfg, dry_run).await?;
            let outcome = pipeline
                .ingest(&IngestionRequest {
                    path: file,
                    metadata: tags.into_metadata(),
                    dry_run,
                })
                .await;
            print_outcome(&outcome);
            if !outcome.success {
                std::process::exit(1);
            }
        }
        Commands::IngestFolder {
            dir,
            tags,
            dry_run,
        } => {
            let pipeline = build_pipeline(&cfg, dry_run).await?;
            let outcomes = pipeline
                .ingest_folder(&dir, &tags.into_metadata(), dry_run)
                .await;
            for outcome in &outcomes {
                print_outcome(outcome);
            }
            let failed = outcomes.iter().filter(|o| !o.success).count();
            println!();
            println!(
                "{} ingested, {} failed ({} files total)",
                outcomes.len() - failed,
                failed,
                outcomes.len()
            );
        }
        Commands::Search {
            query,
            source_type,
            sector,
            donor,
            section_type,
            year_min,
            year_max,
            won,
            document_id,
            top_k,
            min_similarity,
        } => {
            let filters = SearchFilters {
                source_type,
                sector,
                donor,
                section_type,
                year_min,
                year_max,
                won,
                document_id,
            };
            search::run_search(&cfg, &query, filters, top_k, min_similarity).await?;
        }
        Commands::Delete { document_id } => {
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&pool).await?;
            let store = VectorStore::new(pool, cfg.embedding.dims.unwrap_or(0));
            let deleted = store.delete_by_document(&document_id).await?;
            store.pool().close().await;
            println!("Deleted {} chunks for document {}.", deleted, document_id);
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}

async fn build_pipeline(cfg: &config::Config, dry_run: bool) -> anyhow::Result<Pipeline> {
    if dry_run {
        return Ok(Pipeline::detached(cfg.clone()));
    }
    if !cfg.embedding.is_enabled() {
        anyhow::bail!("Ingestion requires embeddings. Set [embedding] provider in config, or use --dry-run.");
    }
    let dims = cfg
        .embedding
        .dims
        .ok_or_else(|| anyhow::anyhow!("embedding.dims required for ingestion"))?;
    let pool = db::connect(cfg).await?;
    migrate::run_migrations(&pool).await?;
    let store = VectorStore::new(pool, dims);
    Ok(Pipeline::new(cfg.clone(), store))
}

fn print_outcome(outcome: &IngestionOutcome) {
    let name = outcome.file.display();
    if outcome.success {
        println!(
            "ok   {} — {} ({} pages), {} chunks, {} stored via {} in {} ms",
            name,
            outcome.doc_type.as_deref().unwrap_or("unknown"),
            outcome.page_count,
            outcome.chunk_count,
            outcome.chunks_stored,
            outcome.extraction_method,
            outcome.duration_ms
        );
    } else {
        println!(
            "FAIL {} — {}",
            name,
            outcome.error.as_deref().unwrap_or("unknown error")
        );
    }
    for warning in &outcome.warnings {
        println!("     warning: {}", warning);
    }
    if outcome.success {
        println!("     document id: {}", outcome.document_id);
    }
}
