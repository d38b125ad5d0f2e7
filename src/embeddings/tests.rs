use serde_json::json;
use url::Url;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::*;

fn test_config(base_url: &str, dimension: usize) -> OpenAiConfig {
    OpenAiConfig {
        api_key: "sk-test".to_string(),
        base_url: Url::parse(base_url).expect("valid test url"),
        embedding_model: "text-embedding-3-small".to_string(),
        chat_model: "gpt-4".to_string(),
        embedding_dimension: dimension,
    }
}

#[tokio::test]
async fn embeds_text_into_vector() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "text-embedding-3-small",
            "input": "Who won in Monza?",
            "encoding_format": "float",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "embedding": [0.1, 0.2, 0.3, 0.4] }],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = EmbeddingClient::new(&test_config(&server.uri(), 4)).expect("client builds");
    let vector = client.embed("Who won in Monza?").await.expect("embeds");

    assert_eq!(vector, vec![0.1, 0.2, 0.3, 0.4]);
}

#[tokio::test]
async fn rejects_wrong_dimension() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "embedding": [0.1, 0.2] }],
        })))
        .mount(&server)
        .await;

    let client = EmbeddingClient::new(&test_config(&server.uri(), 4)).expect("client builds");
    let result = client.embed("short vector").await;

    assert!(matches!(result, Err(PitwallError::Embedding(_))));
}

#[tokio::test]
async fn client_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .expect(1)
        .mount(&server)
        .await;

    let client = EmbeddingClient::new(&test_config(&server.uri(), 4))
        .expect("client builds")
        .with_retry_attempts(3);
    let result = client.embed("anything").await;

    assert!(matches!(result, Err(PitwallError::Embedding(_))));
}

#[tokio::test]
async fn server_errors_are_retried_until_attempts_run_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(500).set_body_string("overloaded"))
        .expect(3)
        .mount(&server)
        .await;

    let client = EmbeddingClient::new(&test_config(&server.uri(), 4))
        .expect("client builds")
        .with_retry_attempts(3);
    let result = client.embed("anything").await;

    // All three attempts hit the server (verified by the mock expectation)
    // before the error surfaces.
    assert!(matches!(result, Err(PitwallError::Embedding(_))));
}

#[tokio::test]
async fn empty_data_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
        .mount(&server)
        .await;

    let client = EmbeddingClient::new(&test_config(&server.uri(), 4)).expect("client builds");
    let result = client.embed("anything").await;

    assert!(matches!(result, Err(PitwallError::Embedding(_))));
}
