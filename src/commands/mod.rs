
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::KbError;
use crate::config::Config;
use crate::corpus::{load_documents, sample_documents};
use crate::database::{CollectionRecord, CollectionStore, LanceIndex, SearchResult, VectorIndex};
use crate::embeddings::{BatchEmbedder, OllamaClient};
use crate::indexer::Indexer;
use crate::search::SearchService;

/// Characters of stored text shown per record by `list`
const DOCUMENT_PREVIEW_CHARS: usize = 100;
/// Leading embedding components shown per record by `list`
const EMBEDDING_PREVIEW_COMPONENTS: usize = 5;

/// Embed a corpus and rebuild the collection from it
#[inline]
pub async fn ingest(config: &Config, file: Option<&Path>, cancel: &CancellationToken) -> Result<()> {
    let documents = match file {
        Some(path) => load_documents(path)
            .with_context(|| format!("Failed to load documents from {}", path.display()))?,
        None => sample_documents(),
    };

    let bar = progress_bar();
    let embedder = batch_embedder(config, bar.clone())?;
    let store = open_store(config).await?;
    let collection = store.name().to_string();
    let indexer = Indexer::new(Arc::clone(&embedder), store);

    let embedded = indexer.embed_documents(&documents, cancel).await;
    bar.finish_and_clear();
    let corpus = embedded.with_context(|| untouched_message(&collection))?;
    info!("Embedded {} documents, writing to {}", corpus.len(), collection);

    let stats = indexer
        .write(&corpus)
        .await
        .with_context(|| emptied_message(&collection))?;

    println!(
        "Ingested {} documents using Ollama {}",
        stats.documents_ingested,
        embedder.model()
    );
    Ok(())
}

/// Print every stored record with a truncated preview
#[inline]
pub async fn list_documents(config: &Config) -> Result<()> {
    let collection = open_store(config).await?.get_existing().await?;
    let records = collection
        .fetch_all()
        .await
        .context("Failed to read collection")?;

    println!("Found {} documents:", records.len());
    println!();

    for record in &records {
        println!("{}", format_record(record));
        println!("---");
    }

    Ok(())
}

/// Remove every record from the collection
#[inline]
pub async fn delete_documents(config: &Config) -> Result<()> {
    let collection = open_store(config).await?.get_existing().await?;
    let removed = collection.delete_all().await?;

    if removed == 0 {
        println!("Collection is already empty");
    } else {
        println!(
            "Deleted {} documents from {}",
            removed,
            collection.name()
        );
    }
    Ok(())
}

/// Run one query and print the ranked results
#[inline]
pub async fn search(config: &Config, query: &str, limit: Option<usize>) -> Result<()> {
    let embedder = batch_embedder(config, ProgressBar::hidden())?;
    let service = SearchService::new(embedder, open_store(config).await?, config.search.result_count);

    let results = service
        .search_with_limit(query, limit.unwrap_or(service.result_count()))
        .await?;

    if results.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    for (rank, result) in results.iter().enumerate() {
        println!("{}", format_result(rank + 1, result));
        println!();
    }
    Ok(())
}

/// Serve the search page and API until `shutdown` fires
#[inline]
pub async fn serve(config: &Config, shutdown: CancellationToken) -> Result<()> {
    let client = OllamaClient::new(&config.ollama).context("Failed to initialize Ollama client")?;
    if let Err(e) = client.health_check().await {
        warn!("Ollama health check failed, searches will fail until it is reachable: {}", e);
    }

    let embedder = Arc::new(
        BatchEmbedder::new(Arc::new(client), config.ollama.concurrency),
    );
    let store = open_store(config).await?;
    match store.get_existing().await {
        Ok(collection) => info!("Serving collection {}", collection.name()),
        Err(KbError::CollectionNotFound(name)) => {
            warn!("Collection {} does not exist yet, run `kb-search ingest`", name);
        }
        Err(e) => return Err(e.into()),
    }

    let service = SearchService::new(embedder, store, config.search.result_count);
    let address = config.server.bind_address();
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;

    println!(
        "Server running at http://{}",
        listener.local_addr().context("Failed to read bound address")?
    );
    crate::server::serve(listener, service, shutdown).await?;
    Ok(())
}

/// Report Ollama and collection health
#[inline]
pub async fn show_status(config: &Config) -> Result<()> {
    println!("📊 kb-search Status Report");
    println!("{}", "=".repeat(50));
    println!();

    println!("🤖 Ollama Status:");
    match OllamaClient::new(&config.ollama) {
        Ok(client) => match client.health_check().await {
            Ok(()) => {
                println!(
                    "   ✅ Ollama: Connected ({})",
                    client.base_url()
                );
                println!("   📋 Model: {}", config.ollama.model);
                println!("   🚦 Concurrency: {}", config.ollama.concurrency);
            }
            Err(e) => {
                println!("   ⚠️  Ollama: Unhealthy - {}", e);
            }
        },
        Err(e) => {
            println!("   ❌ Ollama: Failed to configure client - {}", e);
        }
    }

    println!();
    println!("🔍 Vector Database Status:");
    match LanceIndex::new(config).await {
        Ok(index) => {
            println!(
                "   ✅ LanceDB: Connected ({})",
                config.vector_database_path().display()
            );
            match index.count(&config.store.collection).await {
                Ok(count) => println!(
                    "   📄 Collection {}: {} documents",
                    config.store.collection, count
                ),
                Err(KbError::CollectionNotFound(name)) => {
                    println!("   📭 Collection {} does not exist yet", name);
                }
                Err(e) => println!("   ❌ Collection {}: {}", config.store.collection, e),
            }
        }
        Err(e) => {
            println!("   ❌ LanceDB: Failed to connect - {}", e);
        }
    }

    println!();
    println!("💡 Next Steps:");
    println!("   • Use 'kb-search ingest' to embed and store the corpus");
    println!("   • Use 'kb-search search <query>' to query from the terminal");
    println!("   • Use 'kb-search serve' to start the search page");

    Ok(())
}

async fn open_store(config: &Config) -> Result<CollectionStore> {
    let index = LanceIndex::new(config)
        .await
        .context("Failed to initialize LanceDB vector index")?;
    Ok(CollectionStore::new(
        Arc::new(index),
        config.store.collection.clone(),
        config.ollama.embedding_dimension as usize,
    ))
}

fn batch_embedder(config: &Config, progress_bar: ProgressBar) -> Result<Arc<BatchEmbedder>> {
    let client = OllamaClient::new(&config.ollama).context("Failed to initialize Ollama client")?;
    Ok(Arc::new(
        BatchEmbedder::new(Arc::new(client), config.ollama.concurrency)
            .with_progress_bar(progress_bar),
    ))
}

fn untouched_message(collection: &str) -> String {
    format!("Ingestion failed, nothing was persisted. Collection {collection} was left untouched")
}

fn emptied_message(collection: &str) -> String {
    format!(
        "Ingestion failed, nothing was persisted. Collection {collection} is now empty; run `kb-search ingest` again"
    )
}

fn progress_bar() -> ProgressBar {
    if !console::user_attended_stderr() {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(0);
    if let Ok(style) =
        ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} Embedding documents")
    {
        bar.set_style(style);
    }
    bar
}

fn format_record(record: &CollectionRecord) -> String {
    let document: String = record.raw_text.chars().take(DOCUMENT_PREVIEW_CHARS).collect();
    let components: Vec<String> = record
        .embedding
        .iter()
        .take(EMBEDDING_PREVIEW_COMPONENTS)
        .map(f32::to_string)
        .collect();

    format!(
        "ID: {}\nTitle: {}\nDocument: {}...\nEmbedding: [{}...] ({} dimensions)",
        record.id,
        record.metadata.title,
        document,
        components.join(", "),
        record.embedding.len()
    )
}

fn format_result(rank: usize, result: &SearchResult) -> String {
    format!(
        "{}. {} (distance: {:.3})\n   {}",
        rank,
        result.title,
        result.distance,
        result.document.replace('\n', "\n   ")
    )
}
