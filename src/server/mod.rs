#[cfg(test)]
mod tests;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tracing::{error, info};

use crate::completions::ChatMessage;
use crate::rag::RagPipeline;
use crate::{PitwallError, Result};

/// Process-wide state shared by all requests: the query pipeline with its
/// clients and the read-only collection, constructed once at startup.
pub struct AppState {
    pub pipeline: RagPipeline,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
}

#[inline]
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(chat))
        .with_state(state)
}

/// Bind and serve until the process is stopped.
#[inline]
pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| PitwallError::Network(format!("Failed to bind {}: {}", addr, e)))?;

    info!("Listening on {}", addr);

    axum::serve(listener, router(state))
        .await
        .map_err(|e| PitwallError::Network(format!("Server error: {}", e)))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

/// Chat endpoint: runs the query pipeline and relays the token stream as an
/// incrementally written plain-text body.
///
/// A pipeline error before the first token fails the whole request; once
/// streaming has begun, a mid-stream error terminates the body. Dropping
/// the response (caller disconnect) drops the receiver, which stops the
/// relay.
async fn chat(State(state): State<Arc<AppState>>, Json(request): Json<ChatRequest>) -> Response {
    if request.messages.is_empty() {
        return (StatusCode::BAD_REQUEST, "messages must not be empty").into_response();
    }

    let mut rx = match state.pipeline.answer(&request.messages).await {
        Ok(rx) => rx,
        Err(e) => {
            error!("Chat request failed: {}", e);
            return (StatusCode::BAD_GATEWAY, "upstream request failed").into_response();
        }
    };

    let body_stream = async_stream::stream! {
        while let Some(item) = rx.recv().await {
            match item {
                Ok(token) => yield Ok(Bytes::from(token)),
                Err(e) => {
                    error!("Completion stream interrupted: {}", e);
                    yield Err(std::io::Error::other(e.to_string()));
                    break;
                }
            }
        }
    };

    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(body_stream),
    )
        .into_response()
}
