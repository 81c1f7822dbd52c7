use clap::{Parser, Subcommand, ValueEnum};
use ragline_embed::{Embedder, FastEmbedEmbedder, HashEmbedder};
use ragline_retriever::retrieval::{RetrievalConfig, RetrievalEngine};
use ragline_store::{DocumentStore, NewDocument};
use serde::Serialize;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

/// A CLI tool to manage and query the ragline retrieval database.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the SQLite database file
    #[arg(short, long, default_value = "ragline.db")]
    db: PathBuf,

    /// Embedding backend to use
    #[arg(short, long, default_value = "hash")]
    model: ModelKind,

    /// Vector dimension (hash backend only; fastembed reports its own)
    #[arg(long, default_value_t = 384)]
    dimension: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum ModelKind {
    /// Deterministic offline hash embedder
    Hash,
    /// Local ONNX model via fastembed (downloads on first use)
    Fastembed,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Insert and index the sample corpus (skips titles that already exist)
    Seed,
    /// Ingest a single document
    Add {
        #[arg(long)]
        title: String,
        #[arg(long)]
        content: String,
        #[arg(long, default_value = "text")]
        doc_type: String,
    },
    /// Update a document's title and content, then re-embed it
    Update {
        /// Document ID
        #[arg(long)]
        id: i64,
        #[arg(long)]
        title: String,
        #[arg(long)]
        content: String,
    },
    /// Retrieve the most relevant documents for a query
    Query {
        /// Query text
        text: String,
        /// Maximum number of results
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
        /// Minimum similarity score (0.0 to 1.0)
        #[arg(short, long)]
        threshold: Option<f32>,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Print the generation-ready context block for a query
    Context {
        /// Query text
        text: String,
    },
    /// Tombstone a document; its vector is compacted away on next rebuild
    Deactivate {
        /// Document ID
        id: i64,
    },
    /// Rebuild the vector index from the durable store
    Rebuild,
    /// Show engine and store statistics
    Status {
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq)]
enum OutputFormat {
    Summary,
    Json,
}

#[derive(Serialize)]
struct StatusOutput {
    state: ragline_retriever::retrieval::EngineState,
    model_id: String,
    dimension: usize,
    index_size: usize,
    active_documents: usize,
    embedding_records: usize,
}

const SAMPLE_DOCS: &[(&str, &str)] = &[
    (
        "AI Chatbot FAQ",
        "Q: What is this chatbot?\n\
         A: This is an AI-powered chatbot that can answer questions and have conversations.\n\n\
         Q: How does it work?\n\
         A: The chatbot uses language models and retrieval-augmented generation to provide accurate responses.\n\n\
         Q: Can I save my conversation history?\n\
         A: Yes, if you're logged in, your conversations are automatically saved.",
    ),
    (
        "Technical Documentation",
        "This chatbot is built with the following features:\n\
         - Token-based authentication for secure user sessions\n\
         - A retrieval pipeline for enhanced responses using document search\n\
         - Chat history storage and management\n\
         - Background tasks for maintenance\n\
         - API endpoints for integration",
    ),
    (
        "Getting Started Guide",
        "To get started with the chatbot:\n\
         1. Create an account using the signup endpoint\n\
         2. Verify your email address\n\
         3. Log in to get your tokens\n\
         4. Start chatting using the chat endpoint\n\
         5. View your chat history anytime",
    ),
];

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .init();

    let args = Args::parse();

    let store = DocumentStore::open(&args.db).await?;
    let embedder: Arc<dyn Embedder> = match args.model {
        ModelKind::Hash => Arc::new(HashEmbedder::new(args.dimension)),
        ModelKind::Fastembed => Arc::new(FastEmbedEmbedder::create().await?),
    };
    let config = RetrievalConfig::for_embedder(embedder.as_ref());
    let engine = RetrievalEngine::new(store.clone(), embedder, config);
    engine.initialize().await?;

    match args.command {
        Commands::Seed => {
            for (title, content) in SAMPLE_DOCS {
                if store.find_document_by_title(title).await?.is_some() {
                    println!("Document already exists: {title}");
                    continue;
                }
                let doc = store
                    .insert_document(&NewDocument::new(*title, *content))
                    .await?;
                engine.add_document(&doc).await?;
                println!("Added document: {title}");
            }
        }
        Commands::Add {
            title,
            content,
            doc_type,
        } => {
            let doc = store
                .insert_document(&NewDocument::new(title, content).with_doc_type(doc_type))
                .await?;
            engine.add_document(&doc).await?;
            println!("Added document {} ({})", doc.id, doc.title);
        }
        Commands::Update { id, title, content } => {
            if !store.update_document(id, &title, &content).await? {
                println!("No document with id {id}.");
            } else if let Some(doc) = store.get_document_if_active(id).await? {
                // Re-embed under the new content, then compact away the
                // stale index position left by the old vector
                engine.add_document(&doc).await?;
                engine.rebuild().await?;
                println!("Updated and re-embedded document {id}.");
            } else {
                println!("Updated document {id}, but it is inactive and was not re-embedded.");
            }
        }
        Commands::Query {
            text,
            top_k,
            threshold,
            format,
        } => {
            let results = engine.query(&text, top_k, threshold).await;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&results)?),
                OutputFormat::Summary => {
                    if results.is_empty() {
                        println!("No documents above the similarity threshold.");
                    }
                    for (i, result) in results.iter().enumerate() {
                        println!(
                            "{}. [{:.3}] {} (id {})",
                            i + 1,
                            result.similarity_score,
                            result.title,
                            result.document.id
                        );
                    }
                }
            }
        }
        Commands::Context { text } => {
            println!("{}", engine.generate_context(&text).await);
        }
        Commands::Deactivate { id } => {
            if store.deactivate_document(id).await? {
                println!("Deactivated document {id}; rebuild to compact the index.");
            } else {
                println!("No document with id {id}.");
            }
        }
        Commands::Rebuild => {
            engine.rebuild().await?;
            println!("Index rebuilt: {} vectors.", engine.index_size().await);
        }
        Commands::Status { format } => {
            let status = StatusOutput {
                state: engine.state().await,
                model_id: engine.config().model_id.clone(),
                dimension: engine.config().dimension,
                index_size: engine.index_size().await,
                active_documents: store.document_count().await?,
                embedding_records: store.embedding_count(&engine.config().model_id).await?,
            };
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&status)?),
                OutputFormat::Summary => {
                    println!("state:             {:?}", status.state);
                    println!("model:             {}", status.model_id);
                    println!("dimension:         {}", status.dimension);
                    println!("index size:        {}", status.index_size);
                    println!("active documents:  {}", status.active_documents);
                    println!("embedding records: {}", status.embedding_records);
                }
            }
        }
    }

    Ok(())
}
