use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::TryStreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use docrag_core::config::{Config, RagSettings};
use docrag_core::types::Hit;
use docrag_embed::embedder_from_settings;
use docrag_pipeline::{build_prompt, distinct_sources, IndexStatus, ProgressEvent, Retriever, SYSTEM_PROMPT};

mod llm;

const PROBE_QUERY: &str = "What is the PTO policy?";
const PROBE_K: usize = 3;
const CHAT_CHECK_SYSTEM: &str = "You are a concise assistant.";
const CHAT_CHECK_PROMPT: &str = "Reply with 'OK' if you can read this.";

/// Ask questions about a local folder of documents.
#[derive(Parser, Debug)]
#[command(name = "docrag", version, about = "Retrieval-augmented answers over local documents")]
struct Cli {
    /// Document root; overrides data.docs_dir.
    #[arg(long, global = true)]
    docs: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Rebuild the index from the document root.
    Index,
    /// Show configuration, index health and a test retrieval.
    Status {
        /// Also send a short test message to the chat model.
        #[arg(long)]
        chat: bool,
    },
    /// Print the chunks closest to a query.
    Search {
        query: String,
        /// Number of chunks to retrieve (defaults to retrieval.top_k).
        #[arg(short, long, value_parser = clap::value_parser!(u16).range(1..=100))]
        k: Option<u16>,
    },
    /// Answer a question from the indexed documents.
    Ask {
        question: String,
        /// Number of chunks to retrieve (defaults to retrieval.top_k).
        #[arg(short, long, value_parser = clap::value_parser!(u16).range(1..=100))]
        k: Option<u16>,
        /// Print the grounded prompt instead of calling the language model.
        #[arg(long)]
        prompt_only: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine; real environment variables still apply.
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let mut settings = Config::load()?.settings().context("loading configuration")?;
    if let Some(docs) = cli.docs {
        settings.data.docs_dir = docs.to_string_lossy().to_string();
    }

    match cli.command {
        Commands::Index => run_index(&settings).await,
        Commands::Status { chat } => run_status(&settings, chat).await,
        Commands::Search { query, k } => run_search(&settings, &query, top_k(&settings, k)).await,
        Commands::Ask { question, k, prompt_only } => {
            run_ask(&settings, &question, top_k(&settings, k), prompt_only).await
        }
    }
}

fn top_k(settings: &RagSettings, k: Option<u16>) -> usize {
    k.map_or(settings.retrieval.top_k, usize::from)
}

async fn open_retriever(settings: &RagSettings) -> Result<Retriever> {
    let embedder = embedder_from_settings(&settings.embedding)?;
    Ok(Retriever::from_settings(settings, embedder).await?)
}

async fn run_index(settings: &RagSettings) -> Result<()> {
    let retriever = open_retriever(settings).await?;
    println!("docrag indexer\n==============");
    println!("Documents:  {}", settings.data.docs_path().display());
    println!("Index:      {} ({})", settings.data.persist_path().display(), settings.data.collection);

    let pb = ProgressBar::new_spinner();
    let bar_style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%) {msg}")?
        .progress_chars("#>-");

    let events = retriever.rebuild();
    futures::pin_mut!(events);
    let mut finished = None;
    while let Some(event) = events.try_next().await? {
        match &event {
            ProgressEvent::DocumentsLoaded { chunks, .. } => {
                pb.set_style(bar_style.clone());
                pb.set_length(*chunks as u64);
            }
            ProgressEvent::BatchIndexed { indexed, .. } => pb.set_position(*indexed as u64),
            ProgressEvent::NoDocuments { .. } => pb.println(event.to_string()),
            _ => {}
        }
        pb.set_message(event.to_string());
        if let ProgressEvent::Finished(summary) = event {
            finished = Some(summary);
        }
    }

    match finished {
        Some(summary) => {
            pb.finish_with_message(format!(
                "Ingested {} chunks from {} files.",
                summary.chunk_count, summary.document_count
            ));
            println!("Generation {} is live.", summary.index.generation());
            Ok(())
        }
        None => anyhow::bail!("rebuild stopped before publishing"),
    }
}

async fn run_status(settings: &RagSettings, chat: bool) -> Result<()> {
    println!("docrag status\n=============");
    println!("Documents:        {}", settings.data.docs_path().display());
    println!("Index directory:  {}", settings.data.persist_path().display());
    println!("Collection:       {}", settings.data.collection);
    println!(
        "Embedding model:  {:?} / {} ({} dims)",
        settings.embedding.provider, settings.embedding.model, settings.embedding.dimension
    );
    println!("Chat model:       {}", settings.llm.model);
    println!("Chunking:         {} chars, {} overlap", settings.chunking.max_chars, settings.chunking.overlap);
    println!("OPENAI_API_KEY:   {}", if settings.embedding.api_key().is_some() { "set" } else { "missing" });

    if chat {
        check_chat(settings).await;
    }

    let retriever = match open_retriever(settings).await {
        Ok(r) => r,
        Err(err) => {
            println!("Index:            unavailable ({err})");
            return Ok(());
        }
    };

    match retriever.check_index().await {
        IndexStatus::Ready { index, chunk_count } => {
            println!("Index:            ready, generation {}, {chunk_count} chunks", index.generation());
            let hits = retriever.retrieve(&index, PROBE_QUERY, PROBE_K).await?;
            println!("\nProbe \"{PROBE_QUERY}\" (k={PROBE_K}) -> {} hits", hits.len());
            print_hits(&hits);
        }
        IndexStatus::Empty { index: None } => println!("Index:            not built yet (run `docrag index`)"),
        IndexStatus::Empty { index: Some(index) } => {
            println!("Index:            empty, generation {}", index.generation());
        }
        IndexStatus::Stale { indexed_with, .. } => println!(
            "Index:            stale, built with '{indexed_with}', current embedder is '{}'",
            retriever.embedder().embedder_id()
        ),
        IndexStatus::CheckFailed(err) => println!("Index:            check failed: {err}"),
    }
    Ok(())
}

/// Sends a one-line message to the chat model and reports the reply.
async fn check_chat(settings: &RagSettings) {
    let reply = match llm::ChatClient::new(&settings.llm) {
        Ok(client) => client.complete(CHAT_CHECK_SYSTEM, CHAT_CHECK_PROMPT).await,
        Err(err) => Err(err),
    };
    match reply {
        Ok(text) => println!("Chat check:       {} replied \"{}\"", settings.llm.model, text.trim()),
        Err(err) => println!("Chat check:       failed ({err})"),
    }
}

async fn run_search(settings: &RagSettings, query: &str, k: usize) -> Result<()> {
    let retriever = open_retriever(settings).await?;
    let index = retriever.ensure_index().await?;
    let hits = retriever.retrieve(&index, query, k).await?;
    println!("Found {} results for: \"{query}\"", hits.len());
    print_hits(&hits);
    Ok(())
}

async fn run_ask(settings: &RagSettings, question: &str, k: usize, prompt_only: bool) -> Result<()> {
    // Fail on a missing key before spending any embedding calls.
    let chat = if prompt_only { None } else { Some(llm::ChatClient::new(&settings.llm)?) };

    let retriever = open_retriever(settings).await?;
    let index = retriever.ensure_index().await?;
    let hits = retriever.retrieve(&index, question, k).await?;
    if hits.is_empty() {
        eprintln!("No relevant chunks found. Try rebuilding the index or adding more docs.");
    }
    let prompt = build_prompt(question, &hits);

    match (ask_step(hits.len(), prompt_only), chat) {
        (AskStep::PrintPrompt, _) => println!("{prompt}"),
        (AskStep::CallModel, Some(chat)) => {
            let answer = chat.complete(SYSTEM_PROMPT, &prompt).await?;
            println!("{answer}");
            println!("\nRetrieved from:");
            for source in distinct_sources(&hits) {
                println!("  - {source}");
            }
        }
        (AskStep::CallModel, None) | (AskStep::Skip, _) => {}
    }
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum AskStep {
    PrintPrompt,
    CallModel,
    /// Nothing was retrieved; without context the model could only guess.
    Skip,
}

fn ask_step(hit_count: usize, prompt_only: bool) -> AskStep {
    if prompt_only {
        AskStep::PrintPrompt
    } else if hit_count == 0 {
        AskStep::Skip
    } else {
        AskStep::CallModel
    }
}

fn print_hits(hits: &[Hit]) {
    for (i, hit) in hits.iter().enumerate() {
        println!(
            "\n  {}. distance={:.4}  {}  (chunk {})",
            i + 1,
            hit.distance,
            hit.metadata.source_path,
            hit.metadata.chunk_index
        );
        let preview: String = hit.text.chars().take(240).collect();
        println!("     {}", preview.replace('\n', " "));
    }
}
