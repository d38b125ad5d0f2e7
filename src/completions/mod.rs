
use std::time::Duration;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::OpenAiConfig;
use crate::{PitwallError, Result};

const CONNECT_TIMEOUT_SECONDS: u64 = 30;
const TOKEN_CHANNEL_CAPACITY: usize = 32;

/// One message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    #[inline]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    #[inline]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Client for an OpenAI-compatible streaming chat completions API.
#[derive(Debug, Clone)]
pub struct CompletionClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl CompletionClient {
    #[inline]
    pub fn new(config: &OpenAiConfig) -> Result<Self> {
        // Connect timeout only: a healthy completion stream can stay open
        // far longer than any sane request timeout.
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECONDS))
            .build()
            .map_err(|e| PitwallError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.as_str().trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.chat_model.clone(),
        })
    }

    /// Submit a conversation and stream the generated answer token by token.
    ///
    /// A non-success response status is fatal and returned before any token
    /// is produced, so the caller never sees a partial stream for a failed
    /// request. Dropping the receiver stops forwarding; the upstream call is
    /// not forcibly cancelled.
    #[inline]
    pub async fn stream_chat(
        &self,
        messages: &[ChatMessage],
    ) -> Result<mpsc::Receiver<Result<String>>> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = json!({
            "model": self.model,
            "stream": true,
            "messages": messages,
        });

        debug!(
            "Starting streaming completion with {} messages",
            messages.len()
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| PitwallError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(PitwallError::Completion(format!(
                "HTTP {}: {}",
                status, detail
            )));
        }

        let (tx, rx) = mpsc::channel(TOKEN_CHANNEL_CAPACITY);
        let mut stream = response.bytes_stream();

        tokio::spawn(async move {
            // SSE events can split across body chunks; buffer until a full
            // line is available.
            let mut buffer = String::new();

            while let Some(item) = stream.next().await {
                match item {
                    Ok(bytes) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));

                        while let Some(pos) = buffer.find('\n') {
                            let line: String = buffer.drain(..=pos).collect();
                            let line = line.trim();
                            if line.is_empty() {
                                continue;
                            }
                            if line == "data: [DONE]" {
                                return;
                            }

                            let Some(data) = line.strip_prefix("data: ") else {
                                continue;
                            };
                            let Ok(event) = serde_json::from_str::<Value>(data) else {
                                warn!("Skipping malformed stream event");
                                continue;
                            };
                            if let Some(content) =
                                event["choices"][0]["delta"]["content"].as_str()
                            {
                                if !content.is_empty()
                                    && tx.send(Ok(content.to_string())).await.is_err()
                                {
                                    // Receiver dropped: the caller went away.
                                    return;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx
                            .send(Err(PitwallError::Completion(format!(
                                "Stream interrupted: {}",
                                e
                            ))))
                            .await;
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }
}
