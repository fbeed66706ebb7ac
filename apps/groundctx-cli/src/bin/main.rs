use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use groundctx_core::config::{AppConfig, Config};
use groundctx_core::data_processor::CorpusSource;
use groundctx_core::error::Error;
use groundctx_core::traits::{Embedder, VectorIndex};
use groundctx_core::types::{IngestReport, RetrievalOptions};
use groundctx_embed::get_default_embedder;
use groundctx_llm::OpenAiClient;
use groundctx_rag::{ContextRetriever, DocumentIngestor, QueryExpander};
use groundctx_vector::LanceIndex;

/// Build a vector index from a corpus and assemble grounding context for queries.
#[derive(Parser)]
#[command(name = "groundctx", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the index unless one already exists.
    Ingest {
        /// CSV or JSON Lines corpus with `content` and `url` columns.
        #[arg(long)]
        corpus: Option<PathBuf>,

        /// Directory of .txt files, used instead of a table file.
        #[arg(long, conflicts_with = "corpus")]
        raw_texts: Option<PathBuf>,
    },

    /// Retrieve contexts and source URLs for a question.
    Query {
        text: String,

        #[arg(long)]
        num_chunks: Option<usize>,

        #[arg(long)]
        max_links: Option<usize>,

        /// Expand the query with the LLM before searching.
        #[arg(long, conflicts_with = "no_expand")]
        expand: bool,

        #[arg(long)]
        no_expand: bool,

        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show whether the index exists and how many chunks it holds.
    Status,
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).with_target(false).with_writer(std::io::stderr).init();
}

async fn open_index(config: &Config, settings: &AppConfig) -> anyhow::Result<Arc<LanceIndex>> {
    let path = config.resolve_path(&settings.storage.index_dir);
    let index = LanceIndex::open(&path, &settings.storage.table, settings.embedding.dim)
        .await
        .with_context(|| format!("opening vector index at {}", path.display()))?;
    Ok(Arc::new(index))
}

/// Open the index for reading only; `None` when its directory does not exist.
async fn open_index_read_only(config: &Config, settings: &AppConfig) -> anyhow::Result<Option<Arc<LanceIndex>>> {
    let path = config.resolve_path(&settings.storage.index_dir);
    let index = LanceIndex::open_existing(&path, &settings.storage.table, settings.embedding.dim)
        .await
        .with_context(|| format!("opening vector index at {}", path.display()))?;
    Ok(index.map(Arc::new))
}

fn load_embedder(settings: &AppConfig) -> anyhow::Result<Arc<dyn Embedder>> {
    Ok(Arc::from(get_default_embedder(&settings.embedding)?))
}

async fn ingest(config: &Config, settings: &AppConfig, corpus: Option<PathBuf>, raw_texts: Option<PathBuf>) -> anyhow::Result<()> {
    let table_path = config.resolve_path(&settings.corpus.path);
    let source = match (corpus, raw_texts) {
        (Some(path), _) => Some(CorpusSource::Table(path)),
        (None, Some(dir)) => Some(CorpusSource::TextDir { dir, export_to: Some(table_path) }),
        (None, None) => CorpusSource::discover(&table_path, &config.resolve_path(&settings.corpus.raw_texts_dir)),
    };
    let index = open_index(config, settings).await?;
    let embedder = load_embedder(settings)?;
    let ingestor = DocumentIngestor::new(settings, embedder, index)?;
    match ingestor.ingest(source.as_ref()).await? {
        IngestReport::Reused => println!("Index already exists; nothing to do."),
        IngestReport::Built(stats) => {
            println!("Indexed {} chunks from {} documents", stats.chunks, stats.documents);
            println!(
                "Skipped: {} unreadable rows, {} short documents, {} short chunks",
                stats.skipped_rows, stats.short_documents, stats.short_chunks
            );
        }
    }
    Ok(())
}

async fn query(config: &Config, settings: &AppConfig, text: &str, options: RetrievalOptions, json: bool) -> anyhow::Result<()> {
    let Some(index) = open_index_read_only(config, settings).await? else {
        return Err(Error::RetrievalPrecondition("vector index has not been built; run ingestion first".into()).into());
    };
    let embedder = load_embedder(settings)?;
    let mut retriever = ContextRetriever::new(embedder, index);
    if options.expansion_enabled {
        match OpenAiClient::from_llm_config(&settings.llm) {
            Ok(client) => retriever = retriever.with_expander(QueryExpander::new(Arc::new(client))),
            Err(e) => warn!(error = %e, "Query expansion unavailable"),
        }
    }

    let result = retriever.retrieve(text, options).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }
    for (i, context) in result.contexts.iter().enumerate() {
        println!("[{}] {}\n", i + 1, context);
    }
    if !result.source_urls.is_empty() {
        println!("Sources:");
        for url in &result.source_urls {
            println!("  {}", url);
        }
    }
    Ok(())
}

async fn status(config: &Config, settings: &AppConfig) -> anyhow::Result<()> {
    let index_dir = config.resolve_path(&settings.storage.index_dir);
    let Some(index) = open_index_read_only(config, settings).await? else {
        println!("No index at {}", index_dir.display());
        return Ok(());
    };
    let rows = index.count_rows().await?;
    if rows == 0 {
        println!("No index at {}", index_dir.display());
        return Ok(());
    }
    if index.is_partial().await? {
        println!("Index '{}' is unfinished: {} chunks, run ingest to rebuild", index.table_name(), rows);
        return Ok(());
    }
    println!("Index '{}': {} chunks", index.table_name(), rows);
    if let Some(fp) = index.fingerprint().await? {
        println!("Corpus fingerprint: {}", fp);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing();

    let config = Config::load().context("loading configuration")?;
    let settings = config.settings()?;
    info!(index_dir = %settings.storage.index_dir, table = %settings.storage.table, "Configuration loaded");

    match cli.command {
        Command::Ingest { corpus, raw_texts } => ingest(&config, &settings, corpus, raw_texts).await,
        Command::Query { text, num_chunks, max_links, expand, no_expand, json } => {
            let mut options = RetrievalOptions::from(&settings.rag);
            if let Some(n) = num_chunks { options.num_chunks = n; }
            if let Some(n) = max_links { options.max_links = n; }
            if expand { options.expansion_enabled = true; }
            if no_expand { options.expansion_enabled = false; }
            query(&config, &settings, &text, options, json).await
        }
        Command::Status => status(&config, &settings).await,
    }
}
