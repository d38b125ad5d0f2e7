#[cfg(test)]
mod tests;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::OpenAiConfig;
use crate::{PitwallError, Result};

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const EXPONENTIAL_BACKOFF_BASE: u64 = 2;

/// Client for an OpenAI-compatible embeddings API.
///
/// Every response is validated against the configured vector dimension so a
/// misconfigured model can never write vectors the collection cannot search.
#[derive(Debug, Clone)]
pub struct EmbeddingClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    dimension: usize,
    retry_attempts: u32,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
    encoding_format: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl EmbeddingClient {
    #[inline]
    pub fn new(config: &OpenAiConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS))
            .build()
            .map_err(|e| PitwallError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.as_str().trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.embedding_model.clone(),
            dimension: config.embedding_dimension,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        })
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    /// Embed a single text into a fixed-dimension vector.
    #[inline]
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!("Generating embedding for text (length: {})", text.len());

        let url = format!("{}/v1/embeddings", self.base_url);
        let request = EmbeddingRequest {
            model: &self.model,
            input: text,
            encoding_format: "float",
        };

        let response: EmbeddingResponse = self.post_with_retry(&url, &request).await?;

        let vector = response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| {
                PitwallError::Embedding("Embedding response contained no data".to_string())
            })?;

        if vector.len() != self.dimension {
            return Err(PitwallError::Embedding(format!(
                "Model '{}' returned a {}-dimension vector, expected {}",
                self.model,
                vector.len(),
                self.dimension
            )));
        }

        debug!("Generated embedding with {} dimensions", vector.len());
        Ok(vector)
    }

    /// POST a JSON body, retrying server and transport errors with
    /// exponential backoff. Client errors (4xx) are never retried.
    async fn post_with_retry<B, R>(&self, url: &str, body: &B) -> Result<R>
    where
        B: Serialize,
        R: for<'de> Deserialize<'de>,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!("HTTP request attempt {}/{}", attempt, self.retry_attempts);

            let result = self
                .http
                .post(url)
                .bearer_auth(&self.api_key)
                .json(body)
                .send()
                .await;

            match result {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response.json::<R>().await.map_err(|e| {
                            PitwallError::Embedding(format!(
                                "Failed to parse embedding response: {}",
                                e
                            ))
                        });
                    }

                    let detail = response.text().await.unwrap_or_default();
                    if status.is_server_error() {
                        warn!(
                            "Server error (status {}), attempt {}/{}",
                            status, attempt, self.retry_attempts
                        );
                        last_error = Some(PitwallError::Embedding(format!(
                            "HTTP {}: {}",
                            status, detail
                        )));
                    } else {
                        warn!("Client error (status {}), not retrying", status);
                        return Err(PitwallError::Embedding(format!(
                            "HTTP {}: {}",
                            status, detail
                        )));
                    }
                }
                Err(error) => {
                    warn!(
                        "Transport error: {}, attempt {}/{}",
                        error, attempt, self.retry_attempts
                    );
                    last_error = Some(PitwallError::Network(error.to_string()));
                }
            }

            if attempt < self.retry_attempts {
                let delay = Duration::from_millis(
                    EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1) * 1000,
                );
                debug!("Waiting {:?} before retry", delay);
                tokio::time::sleep(delay).await;
            }
        }

        Err(last_error.unwrap_or_else(|| {
            PitwallError::Embedding("Request failed after retries".to_string())
        }))
    }
}
