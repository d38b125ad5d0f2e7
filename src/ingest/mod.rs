
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info};
use url::Url;
use uuid::Uuid;

use crate::chunking::{ChunkingConfig, chunk_text};
use crate::embeddings::EmbeddingClient;
use crate::scrape::FetchPage;
use crate::store::{ChunkRecord, VectorStore};
use crate::{PitwallError, Result};

/// Counters for a completed ingestion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub pages: usize,
    pub chunks: usize,
    pub records: usize,
}

/// Offline pipeline: fetch each source page, chunk it, embed each chunk,
/// and insert one record per chunk into the collection.
///
/// URLs are processed sequentially and the run fails fast: the first error
/// aborts the remaining queue, leaving already-inserted records in place.
/// Rerunning against the same URLs inserts duplicates; nothing de-duplicates.
pub struct IngestPipeline<'a> {
    fetcher: &'a dyn FetchPage,
    embeddings: &'a EmbeddingClient,
    store: &'a VectorStore,
    chunking: ChunkingConfig,
}

impl<'a> IngestPipeline<'a> {
    #[inline]
    pub fn new(
        fetcher: &'a dyn FetchPage,
        embeddings: &'a EmbeddingClient,
        store: &'a VectorStore,
        chunking: ChunkingConfig,
    ) -> Self {
        Self {
            fetcher,
            embeddings,
            store,
            chunking,
        }
    }

    #[inline]
    pub async fn run(&self, urls: &[Url]) -> Result<IngestStats> {
        info!("Starting ingestion of {} source pages", urls.len());

        let progress = ProgressBar::new(urls.len() as u64);
        progress.set_style(
            ProgressStyle::with_template("{spinner} [{pos}/{len}] {msg}")
                .expect("valid progress template"),
        );

        let mut stats = IngestStats::default();

        for url in urls {
            progress.set_message(url.to_string());

            let result = self.ingest_page(url, &mut stats).await;
            if let Err(e) = result {
                progress.abandon_with_message(format!("failed on {}", url));
                error!("Ingestion aborted at {}: {}", url, e);
                return Err(e);
            }

            stats.pages += 1;
            progress.inc(1);
        }

        progress.finish_with_message("done");
        info!(
            "Ingestion complete: {} pages, {} chunks, {} records",
            stats.pages, stats.chunks, stats.records
        );
        Ok(stats)
    }

    async fn ingest_page(&self, url: &Url, stats: &mut IngestStats) -> Result<()> {
        let text = self.fetcher.fetch(url).await.map_err(|e| {
            PitwallError::Scrape(format!("Failed to fetch {}: {}", url, e))
        })?;

        let chunks = chunk_text(&text, &self.chunking);
        info!("Fetched {}: {} chunks", url, chunks.len());
        stats.chunks += chunks.len();

        for chunk in chunks {
            let vector = self.embeddings.embed(&chunk.text).await.map_err(|e| {
                PitwallError::Embedding(format!(
                    "Failed to embed chunk {} of {}: {}",
                    chunk.index, url, e
                ))
            })?;

            let record = ChunkRecord {
                id: Uuid::new_v4().to_string(),
                vector,
                text: chunk.text,
                source_url: url.to_string(),
                chunk_index: chunk.index as u32,
                created_at: Utc::now().to_rfc3339(),
            };

            self.store.insert(record).await.map_err(|e| {
                PitwallError::Store(format!(
                    "Failed to insert chunk {} of {}: {}",
                    chunk.index, url, e
                ))
            })?;
            stats.records += 1;
        }

        Ok(())
    }
}
