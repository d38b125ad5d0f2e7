use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::json;
use tempfile::TempDir;
use tower::ServiceExt;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::*;
use crate::completions::CompletionClient;
use crate::config::{OpenAiConfig, StoreConfig};
use crate::embeddings::EmbeddingClient;
use crate::store::{SimilarityMetric, VectorStore};

const TEST_DIMENSION: usize = 4;

async fn test_state(server: &MockServer) -> (Arc<AppState>, TempDir) {
    let temp_dir = TempDir::new().expect("temp dir");
    let store = VectorStore::open(
        &StoreConfig {
            data_dir: temp_dir.path().to_path_buf(),
            collection: "test_chunks".to_string(),
            metric: SimilarityMetric::Euclidean,
        },
        TEST_DIMENSION,
    )
    .await
    .expect("store opens");

    let config = OpenAiConfig {
        api_key: "sk-test".to_string(),
        base_url: Url::parse(&server.uri()).expect("valid uri"),
        embedding_model: "text-embedding-3-small".to_string(),
        chat_model: "gpt-4".to_string(),
        embedding_dimension: TEST_DIMENSION,
    };

    let pipeline = RagPipeline::new(
        EmbeddingClient::new(&config).expect("embedding client"),
        CompletionClient::new(&config).expect("completion client"),
        store,
    );

    (Arc::new(AppState { pipeline }), temp_dir)
}

async fn mock_embeddings(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "embedding": [1.0, 0.0, 0.0, 0.0] }],
        })))
        .mount(server)
        .await;
}

async fn mock_completions(server: &MockServer, tokens: &[&str]) {
    let mut sse = String::new();
    for token in tokens {
        let event = json!({ "choices": [{ "delta": { "content": token } }] });
        sse.push_str(&format!("data: {}\n\n", event));
    }
    sse.push_str("data: [DONE]\n\n");
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
        .mount(server)
        .await;
}

fn chat_request(body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("valid request")
}

#[tokio::test]
async fn health_endpoint_responds() {
    let server = MockServer::start().await;
    let (state, _dir) = test_state(&server).await;

    let response = router(state)
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .expect("valid request"),
        )
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn empty_messages_are_rejected() {
    let server = MockServer::start().await;
    let (state, _dir) = test_state(&server).await;

    let response = router(state)
        .oneshot(chat_request(json!({ "messages": [] })))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn chat_streams_the_answer() {
    let server = MockServer::start().await;
    mock_embeddings(&server).await;
    mock_completions(&server, &["Lewis", " Hamilton"]).await;
    let (state, _dir) = test_state(&server).await;

    let response = router(state)
        .oneshot(chat_request(json!({
            "messages": [{ "role": "user", "content": "Who has seven titles?" }],
        })))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body collects");
    assert_eq!(&body[..], b"Lewis Hamilton");
}

#[tokio::test]
async fn completion_failure_fails_the_whole_request() {
    let server = MockServer::start().await;
    mock_embeddings(&server).await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("overloaded"))
        .mount(&server)
        .await;
    let (state, _dir) = test_state(&server).await;

    let response = router(state)
        .oneshot(chat_request(json!({
            "messages": [{ "role": "user", "content": "anything" }],
        })))
        .await
        .expect("router responds");

    // No partial stream: the request fails as a whole.
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn embedding_failure_fails_the_whole_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(500).set_body_string("down"))
        .mount(&server)
        .await;
    mock_completions(&server, &["never sent"]).await;
    let (state, _dir) = test_state(&server).await;

    let response = router(state)
        .oneshot(chat_request(json!({
            "messages": [{ "role": "user", "content": "anything" }],
        })))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}
