use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use url::Url;

use crate::completions::CompletionClient;
use crate::config::Config;
use crate::embeddings::EmbeddingClient;
use crate::ingest::IngestPipeline;
use crate::rag::RagPipeline;
use crate::scrape::{BrowserFetcher, FetcherConfig};
use crate::server::AppState;
use crate::store::VectorStore;

/// Fetch, chunk, embed, and store every configured source page.
///
/// `urls` overrides the configured source list when non-empty. Rerunning
/// against pages that were already ingested inserts duplicate records.
#[inline]
pub async fn ingest(config: Config, urls: Vec<String>) -> Result<()> {
    let raw_urls = if urls.is_empty() {
        config.source_urls.clone()
    } else {
        urls
    };
    let urls = raw_urls
        .iter()
        .map(|raw| Url::parse(raw).with_context(|| format!("Invalid source URL: {}", raw)))
        .collect::<Result<Vec<_>>>()?;

    if urls.is_empty() {
        println!("No source URLs configured; nothing to ingest.");
        return Ok(());
    }

    let store = VectorStore::open(&config.store, config.openai.embedding_dimension)
        .await
        .context("Failed to open vector store")?;
    let embeddings =
        EmbeddingClient::new(&config.openai).context("Failed to create embedding client")?;
    let fetcher =
        BrowserFetcher::new(FetcherConfig::default()).context("Failed to launch browser")?;

    let pipeline = IngestPipeline::new(&fetcher, &embeddings, &store, config.chunking);
    let stats = pipeline.run(&urls).await.context("Ingestion failed")?;

    println!("Ingestion complete:");
    println!("  Pages fetched: {}", stats.pages);
    println!("  Chunks produced: {}", stats.chunks);
    println!("  Records inserted: {}", stats.records);

    let total = store.count().await.context("Failed to count records")?;
    println!("  Records in collection: {}", total);

    Ok(())
}

/// Start the chat server and run until interrupted.
#[inline]
pub async fn serve(config: Config) -> Result<()> {
    let store = VectorStore::open(&config.store, config.openai.embedding_dimension)
        .await
        .context("Failed to open vector store")?;

    let count = store.count().await.context("Failed to count records")?;
    if count == 0 {
        println!("Warning: the collection is empty. Run 'pitwall ingest' first;");
        println!("until then answers will rely on the model's built-in knowledge.");
    } else {
        info!("Collection holds {} records", count);
    }

    let embeddings =
        EmbeddingClient::new(&config.openai).context("Failed to create embedding client")?;
    let completions =
        CompletionClient::new(&config.openai).context("Failed to create completion client")?;

    let state = Arc::new(AppState {
        pipeline: RagPipeline::new(embeddings, completions, store),
    });

    println!("Serving chat API on http://{}", config.server.bind_addr);
    println!("Press Ctrl+C to stop");

    tokio::select! {
        result = crate::server::serve(state, config.server.bind_addr) => {
            result.context("Server failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            println!("\nReceived interrupt signal, shutting down");
        }
    }

    Ok(())
}

/// Report collection health: record count and store settings.
#[inline]
pub async fn status(config: Config) -> Result<()> {
    println!("Pitwall Status");
    println!("{}", "=".repeat(40));

    println!("Store:");
    println!("  Data directory: {}", config.store.data_dir.display());
    println!("  Collection: {}", config.store.collection);
    println!("  Metric: {}", config.store.metric);

    match VectorStore::open(&config.store, config.openai.embedding_dimension).await {
        Ok(store) => match store.count().await {
            Ok(count) => {
                println!("  Records: {}", count);
                if count == 0 {
                    println!("  (empty; run 'pitwall ingest' to populate)");
                }
            }
            Err(e) => println!("  Records: unavailable - {}", e),
        },
        Err(e) => println!("  Connection failed: {}", e),
    }

    println!("Models:");
    println!("  Embedding: {}", config.openai.embedding_model);
    println!("  Embedding dimension: {}", config.openai.embedding_dimension);
    println!("  Chat: {}", config.openai.chat_model);

    Ok(())
}

/// Print the effective configuration with the API key redacted.
#[inline]
pub fn show_config(config: &Config) -> Result<()> {
    println!("OpenAI:");
    println!("  Base URL: {}", config.openai.base_url);
    println!("  API key: {}", redact(&config.openai.api_key));
    println!("  Embedding model: {}", config.openai.embedding_model);
    println!("  Embedding dimension: {}", config.openai.embedding_dimension);
    println!("  Chat model: {}", config.openai.chat_model);

    println!("Store:");
    println!("  Data directory: {}", config.store.data_dir.display());
    println!("  Collection: {}", config.store.collection);
    println!("  Metric: {}", config.store.metric);

    println!("Chunking:");
    println!("  Chunk size: {}", config.chunking.chunk_size);
    println!("  Overlap: {}", config.chunking.overlap);

    println!("Server:");
    println!("  Bind address: {}", config.server.bind_addr);

    println!("Source URLs:");
    for url in &config.source_urls {
        println!("  {}", url);
    }

    Ok(())
}

fn redact(key: &str) -> String {
    // Counted in chars so a key with multi-byte characters never slices
    // inside a code point.
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        "********".to_string()
    } else {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    }
}
