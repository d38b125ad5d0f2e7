
use anyhow::anyhow;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::completions::{ChatMessage, CompletionClient};
use crate::embeddings::EmbeddingClient;
use crate::store::{ScoredRecord, VectorStore};
use crate::Result;

/// Number of nearest records injected into the prompt.
pub const SEARCH_LIMIT: usize = 10;

const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Outcome of the retrieval step.
///
/// Search being down is an explicit, recoverable state rather than a
/// swallowed exception: the pipeline continues with empty context either
/// way, but `Unavailable` is logged and distinguishable from "no hits".
#[derive(Debug, Clone, PartialEq)]
pub enum RetrievedContext {
    Hits(Vec<ScoredRecord>),
    Unavailable,
}

impl RetrievedContext {
    /// Concatenate the retrieved texts in result order. Unavailable search
    /// and zero hits both yield an empty string, never a missing one.
    #[inline]
    pub fn context_string(&self) -> String {
        match self {
            Self::Hits(records) => records
                .iter()
                .map(|r| r.text.as_str())
                .collect::<Vec<_>>()
                .join(CONTEXT_SEPARATOR),
            Self::Unavailable => String::new(),
        }
    }
}

/// The query pipeline: embed the question, retrieve nearby chunks, assemble
/// the prompt, and stream a completion.
///
/// Holds one of each client, constructed once per process; every invocation
/// is independent and the store is read-only here.
pub struct RagPipeline {
    embeddings: EmbeddingClient,
    completions: CompletionClient,
    store: VectorStore,
}

impl RagPipeline {
    #[inline]
    pub fn new(
        embeddings: EmbeddingClient,
        completions: CompletionClient,
        store: VectorStore,
    ) -> Self {
        Self {
            embeddings,
            completions,
            store,
        }
    }

    /// Answer the conversation's latest message, returning the token stream.
    ///
    /// Embedding and completion errors are fatal to the request; a search
    /// failure degrades to empty context.
    #[inline]
    pub async fn answer(
        &self,
        messages: &[ChatMessage],
    ) -> Result<mpsc::Receiver<Result<String>>> {
        let query = messages
            .last()
            .map(|m| m.content.as_str())
            .ok_or_else(|| anyhow!("conversation is empty"))?;

        let query_vector = self.embeddings.embed(query).await?;
        let context = self.retrieve(&query_vector).await;

        let system_prompt = build_system_prompt(&context.context_string(), query);

        // The system prompt is rebuilt on every query and never persisted
        // into the caller's conversation.
        let mut full_conversation = Vec::with_capacity(messages.len() + 1);
        full_conversation.push(ChatMessage::system(system_prompt));
        full_conversation.extend_from_slice(messages);

        self.completions.stream_chat(&full_conversation).await
    }

    async fn retrieve(&self, query_vector: &[f32]) -> RetrievedContext {
        match self.store.search(query_vector, SEARCH_LIMIT).await {
            Ok(records) => {
                debug!("Retrieved {} context records", records.len());
                RetrievedContext::Hits(records)
            }
            Err(e) => {
                warn!("Context retrieval unavailable, answering without it: {}", e);
                RetrievedContext::Unavailable
            }
        }
    }
}

/// Fixed instructional template with the retrieved context and the question
/// embedded. Always non-empty, even with empty context.
#[inline]
pub fn build_system_prompt(context: &str, question: &str) -> String {
    format!(
        "You are an AI assistant who knows everything about Formula One. \
         Use the below context to augment what you know about Formula One racing. \
         The context will provide you with the most recent page data from wikipedia, \
         the official F1 website and others. If the context doesn't include the info \
         you need answer based on your existing knowledge and don't mention the source \
         of your info or what the context does or doesn't include. Format responses \
         using markdown where applicable and don't return images.\n\
         -----------------------\n\
         START CONTEXT\n\
         {context}\n\
         END CONTEXT\n\
         -----------------------\n\
         QUESTION: {question}\n\
         -----------------------"
    )
}
