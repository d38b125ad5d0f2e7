#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// End-to-end coverage of the two pipelines working against the same
// collection: ingest a page, then answer a question over HTTP and verify
// the ingested text reaches the completion request as context.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::json;
use tempfile::TempDir;
use tower::ServiceExt;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use pitwall::chunking::ChunkingConfig;
use pitwall::completions::CompletionClient;
use pitwall::config::{OpenAiConfig, StoreConfig};
use pitwall::embeddings::EmbeddingClient;
use pitwall::ingest::IngestPipeline;
use pitwall::rag::RagPipeline;
use pitwall::scrape::FetchPage;
use pitwall::server::{AppState, router};
use pitwall::store::{SimilarityMetric, VectorStore};

const TEST_DIMENSION: usize = 4;

struct StubFetcher {
    pages: HashMap<String, String>,
}

#[async_trait]
impl FetchPage for StubFetcher {
    async fn fetch(&self, url: &Url) -> pitwall::Result<String> {
        self.pages
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| pitwall::PitwallError::Scrape(format!("no stub page for {}", url)))
    }
}

fn openai_config(server: &MockServer) -> OpenAiConfig {
    OpenAiConfig {
        api_key: "sk-test".to_string(),
        base_url: Url::parse(&server.uri()).expect("valid uri"),
        embedding_model: "text-embedding-3-small".to_string(),
        chat_model: "gpt-4".to_string(),
        embedding_dimension: TEST_DIMENSION,
    }
}

async fn open_store(temp_dir: &TempDir) -> VectorStore {
    VectorStore::open(
        &StoreConfig {
            data_dir: temp_dir.path().to_path_buf(),
            collection: "test_chunks".to_string(),
            metric: SimilarityMetric::Euclidean,
        },
        TEST_DIMENSION,
    )
    .await
    .expect("store opens")
}

async fn mock_openai(server: &MockServer, answer_tokens: &[&str]) {
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "embedding": [1.0, 0.0, 0.0, 0.0] }],
        })))
        .mount(server)
        .await;

    let mut sse = String::new();
    for token in answer_tokens {
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

#[tokio::test]
async fn ingested_page_feeds_the_chat_answer() {
    let server = MockServer::start().await;
    mock_openai(&server, &["Max", " Verstappen"]).await;

    let document = "Max Verstappen won the most recent drivers' championship.";
    let source = Url::parse("https://example.com/standings").expect("valid url");
    let fetcher = StubFetcher {
        pages: HashMap::from([(source.to_string(), document.to_string())]),
    };

    let temp_dir = TempDir::new().expect("temp dir");
    let store = open_store(&temp_dir).await;
    let config = openai_config(&server);
    let embeddings = EmbeddingClient::new(&config).expect("embedding client");

    // Offline pass: populate the collection from the stub page.
    let stats = IngestPipeline::new(&fetcher, &embeddings, &store, ChunkingConfig::default())
        .run(std::slice::from_ref(&source))
        .await
        .expect("ingestion succeeds");
    assert_eq!(stats.records, 1);

    // Online pass: ask a question over the same collection.
    let state = Arc::new(AppState {
        pipeline: RagPipeline::new(
            embeddings,
            CompletionClient::new(&config).expect("completion client"),
            store,
        ),
    });

    let response = router(state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/chat")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({
                        "messages": [{ "role": "user", "content": "Who is the champion?" }],
                    })
                    .to_string(),
                ))
                .expect("valid request"),
        )
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body collects");
    assert_eq!(&body[..], b"Max Verstappen");

    // The stored chunk must have been spliced into the completion request's
    // system message.
    let requests = server.received_requests().await.expect("recorded requests");
    let completion_request = requests
        .iter()
        .find(|r| r.url.path() == "/v1/chat/completions")
        .expect("completion request was made");
    let payload: serde_json::Value =
        serde_json::from_slice(&completion_request.body).expect("json body");

    let system_content = payload["messages"][0]["content"]
        .as_str()
        .expect("system message content");
    assert_eq!(payload["messages"][0]["role"], "system");
    assert!(system_content.contains(document));
    assert!(system_content.contains("QUESTION: Who is the champion?"));
    assert_eq!(payload["messages"][1]["role"], "user");
    assert_eq!(payload["messages"][1]["content"], "Who is the champion?");
}

#[tokio::test]
async fn reingesting_the_same_page_duplicates_records() {
    let server = MockServer::start().await;
    mock_openai(&server, &[]).await;

    let source = Url::parse("https://example.com/f1").expect("valid url");
    let fetcher = StubFetcher {
        pages: HashMap::from([(
            source.to_string(),
            "Formula One is a motorsport.".to_string(),
        )]),
    };

    let temp_dir = TempDir::new().expect("temp dir");
    let store = open_store(&temp_dir).await;
    let config = openai_config(&server);
    let embeddings = EmbeddingClient::new(&config).expect("embedding client");
    let pipeline = IngestPipeline::new(&fetcher, &embeddings, &store, ChunkingConfig::default());

    pipeline
        .run(std::slice::from_ref(&source))
        .await
        .expect("first run succeeds");
    pipeline
        .run(std::slice::from_ref(&source))
        .await
        .expect("second run succeeds");

    // Nothing de-duplicates; reruns append.
    assert_eq!(store.count().await.expect("count"), 2);
}
