//! # ragdesk CLI
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragdesk serve` | Start the HTTP server |
//! | `ragdesk search "<query>"` | Print ranked passages |
//! | `ragdesk ask "<question>"` | Stream a cited answer to stdout |
//! | `ragdesk corpus` | List loaded documents |
//! | `ragdesk doc <file>` | Print a document or one section |
//!
//! ## Examples
//!
//! ```bash
//! ragdesk --config ./config/ragdesk.toml serve
//! ragdesk search "api key" --limit 5
//! ragdesk ask "How much does the Starter plan cost?"
//! ragdesk doc pricing.md --section 2
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use ragdesk::config::{self, Config};
use ragdesk::corpus::CorpusStore;
use ragdesk::framer::{split_response, ResponseFramer};
use ragdesk::generation::create_gateway;
use ragdesk::models::Message;
use ragdesk::{doc, retrieve, server};

/// ragdesk — answer questions from a folder of documents, with citations.
#[derive(Parser)]
#[command(
    name = "ragdesk",
    about = "ragdesk — answer questions from a folder of documents, with citations",
    version,
    long_about = "ragdesk ranks the paragraphs of a local document folder against a question, \
    streams a generated answer, and lists the paragraphs the answer was based on."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/ragdesk.toml`. When the file does not exist,
    /// built-in defaults are used (documents in `./data`, offline generation
    /// unless `OPENAI_API_KEY` is set).
    #[arg(long, global = true, default_value = "./config/ragdesk.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server.
    ///
    /// Binds to `[server].bind` and serves `POST /api/chat`,
    /// `GET /api/doc`, and `GET /health`.
    Serve,

    /// Rank corpus paragraphs against a query.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of passages (defaults to `[retrieval].top_k`).
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Answer a question, streaming the reply to stdout.
    Ask {
        /// The question to answer.
        question: String,
    },

    /// List the documents currently in the corpus.
    Corpus,

    /// Print a document, or a single section of it.
    Doc {
        /// Document file name inside the corpus directory.
        file: String,

        /// 1-based paragraph number.
        #[arg(long)]
        section: Option<usize>,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_config(path: &Path) -> Result<Config> {
    if path.exists() {
        config::load_config(path)
    } else {
        warn!(path = %path.display(), "Config file not found, using defaults");
        Ok(Config::minimal())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = resolve_config(&cli.config)?;

    match cli.command {
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Search { query, limit } => {
            retrieve::run_search(&cfg, &query, limit).await?;
        }
        Commands::Ask { question } => {
            run_ask(&cfg, &question).await?;
        }
        Commands::Corpus => {
            run_corpus(&cfg).await?;
        }
        Commands::Doc { file, section } => {
            doc::run_doc(&cfg, &file, section).await?;
        }
    }

    Ok(())
}

async fn run_ask(cfg: &Config, question: &str) -> Result<()> {
    let store = Arc::new(CorpusStore::new(&cfg.corpus)?);
    let gateway = create_gateway(&cfg.generation)?;
    let framer = ResponseFramer::new(store, gateway, cfg.retrieval.top_k);

    let prepared = framer.prepare(vec![Message::user(question)]).await?;
    let mut rx = prepared.spawn().into_inner();

    // Print one item behind so the trailer, always last, is never echoed.
    let mut body = String::new();
    let mut pending: Option<String> = None;
    let mut stdout = std::io::stdout();
    while let Some(item) = rx.recv().await {
        let item = item?;
        if let Some(previous) = pending.replace(item) {
            write!(stdout, "{}", previous)?;
            stdout.flush()?;
            body.push_str(&previous);
        }
    }
    if let Some(last) = pending {
        body.push_str(&last);
    }
    println!();

    let (_, citations) = split_response(&body)?;
    if !citations.is_empty() {
        println!();
        println!("Sources:");
        for (i, c) in citations.iter().enumerate() {
            println!("  [{}] {} §{}", i + 1, c.filename, c.section);
        }
    }
    Ok(())
}

async fn run_corpus(cfg: &Config) -> Result<()> {
    let store = CorpusStore::new(&cfg.corpus)?;
    let snapshot = store.load().await;

    let version = snapshot
        .source_version
        .map(|t| {
            chrono::DateTime::<chrono::Utc>::from(t)
                .format("%Y-%m-%dT%H:%M:%SZ")
                .to_string()
        })
        .unwrap_or_else(|| "unreadable".to_string());

    println!("corpus:  {}", store.dir().display());
    println!("version: {}", version);
    println!();
    println!("{:<32} {:>10}", "DOCUMENT", "PARAGRAPHS");
    for doc in &snapshot.documents {
        println!("{:<32} {:>10}", doc.filename, doc.paragraphs.len());
    }
    println!();
    println!(
        "{} documents, {} paragraphs",
        snapshot.documents.len(),
        snapshot.paragraph_count()
    );
    Ok(())
}
