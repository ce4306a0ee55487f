//! Backend clients against wiremock servers.
//!
//! Covers:
//! - Ollama model listing and generation, including token counting
//! - 404 from the engine as `ModelNotFound`
//! - Remote wire dialects (chat completions, Anthropic, Google)
//! - Credentials kept out of error messages
//! - Remote error classification (401, 429 with Retry-After, 500)
//! - Timeouts

mod common;

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

use infroute::core::provider::ProviderId;
use infroute::error::{RemoteErrorKind, RouteError};
use infroute::providers::{HttpRemoteClient, LocalEngine, OllamaClient, RemoteClient};

use common::logger::TestLogger;

const TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// Ollama
// =============================================================================

#[tokio::test]
async fn ollama_lists_installed_models() {
    let log = TestLogger::new("ollama_lists_installed_models");
    log.phase("setup");
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [
                {"name": "llama3.2:latest", "size": 2_019_393_189_u64,
                 "details": {"family": "llama", "parameter_size": "3.2B"}},
                {"name": "codellama:7b", "size": 3_825_819_519_u64}
            ]
        })))
        .mount(&server)
        .await;

    log.phase("execute");
    let client = OllamaClient::new(server.uri()).unwrap();
    let models = client.list_models(TIMEOUT).await.unwrap();

    log.phase("verify");
    assert_eq!(models.len(), 2);
    assert_eq!(models[0].name, "llama3.2:latest");
    assert_eq!(models[0].family.as_deref(), Some("llama"));
    assert_eq!(models[1].size_bytes, 3_825_819_519);
    log.finish_ok();
}

#[tokio::test]
async fn ollama_generate_counts_prompt_and_eval_tokens() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({"model": "llama3", "stream": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": "4",
            "done": true,
            "done_reason": "stop",
            "prompt_eval_count": 11,
            "eval_count": 2
        })))
        .mount(&server)
        .await;

    let client = OllamaClient::new(server.uri()).unwrap();
    let completion = client.generate("llama3", "What is 2+2?", TIMEOUT).await.unwrap();
    assert_eq!(completion.text, "4");
    assert_eq!(completion.tokens_consumed, 13);
    assert_eq!(completion.finish_reason.as_deref(), Some("stop"));
}

#[tokio::test]
async fn ollama_missing_model_is_model_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({"error": "model 'nope' not found"})),
        )
        .mount(&server)
        .await;

    let client = OllamaClient::new(server.uri()).unwrap();
    let err = client.generate("nope", "hi", TIMEOUT).await.unwrap_err();
    assert!(matches!(err, RouteError::ModelNotFound { ref model, .. } if model == "nope"));
}

#[tokio::test]
async fn ollama_slow_response_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"models": []}))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let client = OllamaClient::new(server.uri()).unwrap();
    let err = client
        .list_models(Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(matches!(err, RouteError::Timeout { .. }));
    assert!(err.is_transient());
}

// =============================================================================
// Remote Dialects
// =============================================================================

#[tokio::test]
async fn chat_completions_dialect_uses_bearer_auth() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({"model": "gpt-4o-mini"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "four"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 1, "total_tokens": 13}
        })))
        .mount(&server)
        .await;

    let client = HttpRemoteClient::new(ProviderId::OpenAI, server.uri(), "sk-test").unwrap();
    let completion = client.send("gpt-4o-mini", "What is 2+2?", TIMEOUT).await.unwrap();
    assert_eq!(completion.text, "four");
    assert_eq!(completion.tokens_consumed, 13);
}

#[tokio::test]
async fn anthropic_dialect_sends_version_header() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .and(header("x-api-key", "sk-ant"))
        .and(header("anthropic-version", "2023-06-01"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{"type": "text", "text": "fo"}, {"type": "text", "text": "ur"}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 14, "output_tokens": 3}
        })))
        .mount(&server)
        .await;

    let client = HttpRemoteClient::new(ProviderId::Anthropic, server.uri(), "sk-ant").unwrap();
    let completion = client
        .send("claude-3.5-haiku-20241022", "What is 2+2?", TIMEOUT)
        .await
        .unwrap();
    assert_eq!(completion.text, "four");
    assert_eq!(completion.tokens_consumed, 17);
    assert_eq!(completion.finish_reason.as_deref(), Some("end_turn"));
}

#[tokio::test]
async fn google_dialect_passes_key_in_header() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-2.5-flash:generateContent"))
        .and(header("x-goog-api-key", "g-key"))
        .and(query_param_is_missing("key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"content": {"parts": [{"text": "4"}]}, "finishReason": "STOP"}],
            "usageMetadata": {"totalTokenCount": 9}
        })))
        .mount(&server)
        .await;

    let client = HttpRemoteClient::new(ProviderId::Google, server.uri(), "g-key").unwrap();
    let completion = client.send("gemini-2.5-flash", "2+2?", TIMEOUT).await.unwrap();
    assert_eq!(completion.text, "4");
    assert_eq!(completion.tokens_consumed, 9);
}

#[tokio::test]
async fn google_key_stays_out_of_error_messages() {
    const KEY: &str = "SECRET-GOOGLE-KEY";

    // Nothing listens on the discard port.
    let dead = HttpRemoteClient::new(ProviderId::Google, "http://127.0.0.1:9/v1beta", KEY).unwrap();
    let err = dead.send("gemini-2.5-flash", "2+2?", TIMEOUT).await.unwrap_err();
    assert!(matches!(err, RouteError::Transport { .. }));
    assert!(!err.to_string().contains(KEY), "key leaked: {err}");
    assert!(!format!("{err:?}").contains(KEY));

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream failed"))
        .mount(&server)
        .await;
    let client = HttpRemoteClient::new(ProviderId::Google, server.uri(), KEY).unwrap();
    let err = client.send("gemini-2.5-flash", "2+2?", TIMEOUT).await.unwrap_err();
    assert!(!err.to_string().contains(KEY), "key leaked: {err}");
}

// =============================================================================
// Remote Errors
// =============================================================================

async fn failing_openai(template: ResponseTemplate) -> RouteError {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(template)
        .mount(&server)
        .await;
    HttpRemoteClient::new(ProviderId::OpenAI, server.uri(), "sk-test")
        .unwrap()
        .send("gpt-4o", "hi", TIMEOUT)
        .await
        .unwrap_err()
}

#[tokio::test]
async fn unauthorized_is_auth_error() {
    let err = failing_openai(
        ResponseTemplate::new(401).set_body_json(json!({"error": {"message": "bad key"}})),
    )
    .await;
    assert!(matches!(
        err,
        RouteError::RemoteApi { kind: RemoteErrorKind::Auth, status: Some(401), .. }
    ));
    assert!(!err.is_transient());
    assert!(!err.is_recoverable_in_auto());
}

#[tokio::test]
async fn rate_limit_carries_retry_after() {
    let err = failing_openai(
        ResponseTemplate::new(429)
            .insert_header("retry-after", "42")
            .set_body_string("slow down"),
    )
    .await;
    assert!(matches!(err, RouteError::RemoteApi { kind: RemoteErrorKind::RateLimit, .. }));
    assert_eq!(err.retry_after(), Some(Duration::from_secs(42)));
}

#[tokio::test]
async fn server_error_is_other_remote_error() {
    let err = failing_openai(ResponseTemplate::new(500).set_body_string("boom")).await;
    assert!(matches!(
        err,
        RouteError::RemoteApi { kind: RemoteErrorKind::Other, status: Some(500), ref message, .. }
            if message == "boom"
    ));
}

#[tokio::test]
async fn malformed_body_is_parse_error() {
    let err = failing_openai(ResponseTemplate::new(200).set_body_string("not json")).await;
    assert!(matches!(err, RouteError::ParseResponse { .. }));
}
