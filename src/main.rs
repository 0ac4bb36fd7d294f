//! # Docent CLI (`docent`)
//!
//! The `docent` binary drives the document QA service: index
//! initialization, document ingestion, one-shot questions, an interactive
//! chat loop, and index maintenance.
//!
//! ## Usage
//!
//! ```bash
//! docent --config ./config/docent.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docent init` | Create the index directory, SQLite file, and registry |
//! | `docent ingest <path>` | Ingest one document file |
//! | `docent ingest --all` | Ingest every supported file under the documents root |
//! | `docent query "<question>"` | Ask a one-shot question |
//! | `docent chat` | Interactive chat session |
//! | `docent stats` | Index counters and health |
//! | `docent cleanup` | Drop index entries for files that no longer exist |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the index
//! docent init --config ./config/docent.toml
//!
//! # Ingest the whole documents directory
//! docent ingest --all --config ./config/docent.toml
//!
//! # Ask a question
//! docent query "What are the gallery opening hours?"
//!
//! # Continue a conversation in a session
//! docent chat
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use docent::cache::IndexCache;
use docent::config;
use docent::fingerprint::Registry;
use docent::ingest::{IngestOutcome, IngestPipeline};
use docent::service::QaService;
use docent::store::IndexStore;

/// Docent CLI — retrieval-augmented question answering over a local
/// document collection.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/docent.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "docent",
    about = "Docent — retrieval-augmented question answering over mixed-format document collections",
    version,
    long_about = "Docent ingests PDF, Word, PowerPoint, Excel, and image documents into a local \
    vector index and answers questions over them with an LLM, optionally falling back to web \
    search for time-sensitive questions."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docent.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the index.
    ///
    /// Creates the index directory, the SQLite index file, and the
    /// registry sidecar. Idempotent; running it again is safe.
    Init,

    /// Ingest documents into the index.
    ///
    /// With a path, ingests that single file. With `--all`, walks the
    /// configured documents root and ingests every supported file.
    /// Unchanged files (same fingerprint) are skipped.
    Ingest {
        /// A single document file to ingest.
        path: Option<PathBuf>,

        /// Ingest every supported file under the documents root.
        #[arg(long)]
        all: bool,
    },

    /// Ask a one-shot question.
    ///
    /// Runs one query in a fresh session and prints the answer with its
    /// source attribution.
    Query {
        /// The question to answer.
        message: String,

        /// Continue an existing session instead of creating one.
        #[arg(long)]
        session: Option<String>,
    },

    /// Interactive chat loop.
    ///
    /// Keeps one session (and its history) for the whole conversation.
    /// Type `/clear` to drop the history, `exit` or Ctrl-D to leave.
    Chat,

    /// Show index counters and health.
    Stats,

    /// Remove index entries whose source files no longer exist.
    Cleanup,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("docent=info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let store = IndexStore::open(&cfg.index.dir).await?;
            store.close().await;
            let registry = Registry::load(&cfg.index.dir)?;
            registry.save()?;
            println!("Index initialized at {}", cfg.index.dir.display());
        }
        Commands::Ingest { path, all } => {
            let cache = Arc::new(IndexCache::new(cfg.index.dir.clone(), cfg.embedding.clone()));
            let pipeline = IngestPipeline::new(&cfg, cache);

            if all || path.is_none() {
                let report = pipeline.ingest_all(&cfg.documents.root).await?;
                println!(
                    "Ingested {}/{} files ({} unchanged, {} failed)",
                    report.succeeded, report.total, report.skipped_unchanged, report.failed
                );
            } else if let Some(path) = path {
                match pipeline.ingest(&path).await? {
                    IngestOutcome::Indexed => println!("Indexed {}", path.display()),
                    IngestOutcome::Unchanged => println!("Unchanged, skipped {}", path.display()),
                    IngestOutcome::Skipped => println!("Skipped {}", path.display()),
                }
            }
        }
        Commands::Query { message, session } => {
            let service = QaService::new(&cfg)?;
            let reply = service.handle_query(&message, session.as_deref()).await?;
            println!("{}", reply.response);
            println!();
            println!("  session: {}", reply.session_id);
            println!("  source:  {}", reply.source_type);
            for source in &reply.sources {
                println!(
                    "  - {} (chunk {}, score {:.3})",
                    source.source, source.chunk_index, source.score
                );
            }
        }
        Commands::Chat => {
            run_chat(&cfg).await?;
        }
        Commands::Stats => {
            let store = IndexStore::open(&cfg.index.dir).await?;
            let registry = Registry::load(&cfg.index.dir)?;
            println!("Index: {}", cfg.index.dir.display());
            println!("  sources (registry): {}", registry.len());
            println!("  sources (index):    {}", store.source_count().await?);
            println!("  chunks:             {}", store.chunk_count().await?);
            store.close().await;
        }
        Commands::Cleanup => {
            let store = IndexStore::open(&cfg.index.dir).await?;
            let mut registry = Registry::load(&cfg.index.dir)?;
            let missing: Vec<String> = registry
                .iter()
                .filter(|(source, _)| !PathBuf::from(source).exists())
                .map(|(source, _)| source.clone())
                .collect();
            let mut chunks_removed = 0u64;
            for source in &missing {
                chunks_removed += store.remove_source(source).await?;
                registry.remove(source);
            }
            registry.save()?;
            store.close().await;
            println!(
                "Removed {} vanished sources ({} chunks)",
                missing.len(),
                chunks_removed
            );
        }
    }

    Ok(())
}

/// Interactive chat over stdin, holding one session for the whole run.
async fn run_chat(cfg: &config::Config) -> Result<()> {
    let service = QaService::new(cfg)?;
    let mut session_id: Option<String> = None;

    println!("Docent chat. Type /clear to reset history, exit to quit.");
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let mut line = String::new();
        if std::io::stdin().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }
        if line == "/clear" {
            if let Some(id) = &session_id {
                service.clear_session(id).await;
                println!("(history cleared)");
            }
            continue;
        }

        let reply = service.handle_query(line, session_id.as_deref()).await?;
        session_id = Some(reply.session_id.clone());
        println!("{}", reply.response);
        println!("  [{}]", reply.source_type);
    }
    Ok(())
}
