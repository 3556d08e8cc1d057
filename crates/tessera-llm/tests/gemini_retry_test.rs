//! HTTP-level tests for the Gemini backend retry policy.
//!
//! Backoff delays are scaled down to milliseconds via the config so the
//! retry ladder runs in test time; the production delay arithmetic is
//! covered by unit tests on the delay function.

use serde_json::json;
use tessera_core::LlmBackend;
use tessera_llm::{GeminiBackend, GeminiConfig};
use wiremock::matchers::{method, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn success_body() -> serde_json::Value {
    json!({
        "candidates": [{
            "content": {
                "role": "model",
                "parts": [{"text": "[{\"operation\":\"create\",\"label\":\"Ahab\",\"entity_type\":\"person\",\"description\":\"captain\"}]"}]
            }
        }],
        "usageMetadata": {
            "promptTokenCount": 42,
            "candidatesTokenCount": 17,
            "totalTokenCount": 59
        }
    })
}

fn test_config(server: &MockServer) -> GeminiConfig {
    GeminiConfig::default()
        .with_base_url(server.uri())
        .with_api_key("test-key")
        .with_backoff_ms(5, 20)
}

#[tokio::test]
async fn test_transient_429_retried_until_success() {
    let server = MockServer::start().await;

    // First two attempts are rate-limited, then the call succeeds.
    Mock::given(method("POST"))
        .and(path_regex(r"^/models/.*:generateContent$"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/models/.*:generateContent$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(success_body()))
        .mount(&server)
        .await;

    let backend = GeminiBackend::new(test_config(&server)).unwrap();
    let response = backend.generate("system", "user").await.unwrap();

    assert!(response.content.contains("Ahab"));
    assert_eq!(response.usage.prompt_tokens, 42);
    assert_eq!(response.usage.completion_tokens, 17);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3, "expected exactly three HTTP calls");
}

#[tokio::test]
async fn test_server_error_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path_regex(r"^/models/.*:generateContent$"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/models/.*:generateContent$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(success_body()))
        .mount(&server)
        .await;

    let backend = GeminiBackend::new(test_config(&server)).unwrap();
    let response = backend.generate("system", "user").await.unwrap();
    assert!(!response.content.is_empty());

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
}

#[tokio::test]
async fn test_retries_bounded_at_four_requests() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path_regex(r"^/models/.*:generateContent$"))
        .respond_with(ResponseTemplate::new(429).set_body_string("still busy"))
        .mount(&server)
        .await;

    let backend = GeminiBackend::new(test_config(&server)).unwrap();
    let result = backend.generate("system", "user").await;
    assert!(result.is_err());

    // 1 initial attempt + 3 retries, never more.
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 4);
}

#[tokio::test]
async fn test_non_retryable_status_fails_immediately() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path_regex(r"^/models/.*:generateContent$"))
        .respond_with(ResponseTemplate::new(400).set_body_string("malformed prompt"))
        .mount(&server)
        .await;

    let backend = GeminiBackend::new(test_config(&server)).unwrap();
    let err = backend.generate("system", "user").await.unwrap_err();

    let message = err.to_string();
    assert!(message.contains("400"), "status missing from error: {}", message);
    assert!(
        message.contains("malformed prompt"),
        "body missing from error: {}",
        message
    );

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1, "non-retryable errors must not retry");
}

#[tokio::test]
async fn test_request_carries_json_mime_and_system_instruction() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path_regex(r"^/models/.*:generateContent$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(success_body()))
        .mount(&server)
        .await;

    let backend = GeminiBackend::new(test_config(&server)).unwrap();
    backend.generate("extract entities", "chunk text here").await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = requests[0].body_json().unwrap();
    assert_eq!(
        body["generationConfig"]["responseMimeType"],
        "application/json"
    );
    assert_eq!(
        body["systemInstruction"]["parts"][0]["text"],
        "extract entities"
    );
    assert_eq!(body["contents"][0]["parts"][0]["text"], "chunk text here");
    assert_eq!(
        requests[0].headers.get("x-goog-api-key").unwrap().to_str().unwrap(),
        "test-key"
    );
}

#[tokio::test]
async fn test_thought_parts_excluded_from_content() {
    let server = MockServer::start().await;

    let body = json!({
        "candidates": [{
            "content": {
                "role": "model",
                "parts": [
                    {"text": "thinking about whales", "thought": true},
                    {"text": "[]"}
                ]
            }
        }],
        "usageMetadata": {"promptTokenCount": 1, "candidatesTokenCount": 1, "totalTokenCount": 2}
    });
    Mock::given(method("POST"))
        .and(path_regex(r"^/models/.*:generateContent$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;

    let backend = GeminiBackend::new(test_config(&server)).unwrap();
    let response = backend.generate("s", "u").await.unwrap();
    assert_eq!(response.content, "[]");
}
