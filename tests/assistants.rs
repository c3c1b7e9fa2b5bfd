//! Backend adapters against mock HTTP servers.

mod common;

use chatbridge::assistant::{
    self, Assistant, AssistantKind, AssistantOptions, ChatAssistant, QueryAssistant,
};
use chatbridge::error::{AssistantError, ConfigError};
use common::{closed_port_url, serve_once};

const OLLAMA_GOLDEN: &str = r#"{"model":"llama3","created_at":"2024-05-09T16:05:10.372Z","message":{"role":"assistant","content":"Hello! How are you today?"},"done":true}"#;

const TRANSFORMERS_GOLDEN: &str = r#"{"output":"Resubmit documents by mail, print for paper-based programs, or fill out a new IMM1344 for family sponsorship."}"#;

// ---------------------------------------------------------------------------
// Chat-style adapter
// ---------------------------------------------------------------------------

#[tokio::test]
async fn chat_acknowledge_returns_message_content() {
    let (url, server) = serve_once(200, OLLAMA_GOLDEN).await;

    let a = ChatAssistant::new(AssistantOptions::new(format!("{url}/api/chat"))).unwrap();
    let got = a.acknowledge("Hello").await.unwrap();
    assert_eq!(got, "Hello! How are you today?");

    let request = server.await.unwrap();
    assert!(request.starts_with("POST /api/chat "), "got: {request}");
    let body = request.split("\r\n\r\n").nth(1).unwrap();
    let payload: serde_json::Value = serde_json::from_str(body).unwrap();
    assert_eq!(payload["model"], "llama3");
    assert_eq!(payload["messages"][0]["role"], "user");
    assert_eq!(payload["messages"][0]["content"], "Hello");
}

#[tokio::test]
async fn chat_empty_content_is_empty_reply() {
    let (url, _server) = serve_once(200, r#"{"message":{"role":"assistant","content":""}}"#).await;

    let a = ChatAssistant::new(AssistantOptions::new(url)).unwrap();
    let err = a.acknowledge("Hello").await.unwrap_err();
    assert!(matches!(err, AssistantError::EmptyReply { .. }), "got: {err:?}");
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn chat_sends_bearer_token_when_configured() {
    let (url, server) = serve_once(200, OLLAMA_GOLDEN).await;

    let a = ChatAssistant::new(AssistantOptions {
        url,
        api_key: Some("sk-test".to_string()),
        model: Some("mistral".to_string()),
    })
    .unwrap();
    a.acknowledge("Hello").await.unwrap();

    let request = server.await.unwrap().to_lowercase();
    assert!(request.contains("authorization: bearer sk-test"));
    assert!(request.contains(r#""model":"mistral""#));
}

#[tokio::test]
async fn chat_non_json_body_is_malformed() {
    let (url, _server) = serve_once(200, "<html>oops</html>").await;

    let a = ChatAssistant::new(AssistantOptions::new(url)).unwrap();
    let err = a.acknowledge("Hello").await.unwrap_err();
    assert!(matches!(err, AssistantError::MalformedResponse { .. }), "got: {err:?}");
}

// ---------------------------------------------------------------------------
// Query-style adapter
// ---------------------------------------------------------------------------

#[tokio::test]
async fn oversized_body_is_malformed_and_not_retried() {
    let body = format!(r#"{{"output":"{}"}}"#, "x".repeat(assistant::MAX_RESPONSE_BYTES));
    let (url, _server) = serve_once(200, &body).await;

    let a = QueryAssistant::new(AssistantOptions::new(url)).unwrap();
    let err = a.acknowledge("Hello").await.unwrap_err();
    assert!(matches!(err, AssistantError::MalformedResponse { .. }), "got: {err:?}");
    assert!(err.to_string().contains("too large"), "got: {err}");
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn query_acknowledge_returns_output() {
    let (url, server) = serve_once(200, TRANSFORMERS_GOLDEN).await;

    let a = QueryAssistant::new(AssistantOptions::new(format!("{url}/generate"))).unwrap();
    let got = a.acknowledge("Visa").await.unwrap();
    assert_eq!(
        got,
        "Resubmit documents by mail, print for paper-based programs, or fill out a new IMM1344 for family sponsorship."
    );

    let request = server.await.unwrap();
    assert!(request.starts_with("GET /generate?text=Visa "), "got: {request}");
}

#[tokio::test]
async fn query_missing_output_is_empty_reply() {
    let (url, _server) = serve_once(200, r#"{"detail":"ok"}"#).await;

    let a = QueryAssistant::new(AssistantOptions::new(url)).unwrap();
    assert!(matches!(
        a.acknowledge("Visa").await,
        Err(AssistantError::EmptyReply { .. })
    ));
}

#[tokio::test]
async fn server_error_status_is_retryable_transport_failure() {
    let (url, _server) = serve_once(503, r#"{"error":"loading model"}"#).await;

    let a = QueryAssistant::new(AssistantOptions::new(url)).unwrap();
    let err = a.acknowledge("Visa").await.unwrap_err();
    match &err {
        AssistantError::TransportFailure { status, .. } => assert_eq!(*status, Some(503)),
        other => panic!("expected TransportFailure, got {other:?}"),
    }
    assert!(err.is_retryable());
}

#[tokio::test]
async fn client_error_status_is_not_retryable() {
    let (url, _server) = serve_once(404, "not found").await;

    let a = ChatAssistant::new(AssistantOptions::new(url)).unwrap();
    let err = a.acknowledge("Hello").await.unwrap_err();
    assert!(matches!(
        err,
        AssistantError::TransportFailure {
            status: Some(404),
            ..
        }
    ));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn connection_refused_is_transport_failure() {
    let url = closed_port_url().await;

    let a = QueryAssistant::new(AssistantOptions::new(url)).unwrap();
    let err = a.acknowledge("Visa").await.unwrap_err();
    assert!(matches!(
        err,
        AssistantError::TransportFailure { status: None, .. }
    ));
    assert!(err.is_retryable());
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

#[test]
fn empty_url_fails_construction_for_every_kind() {
    for kind in [AssistantKind::Chat, AssistantKind::Query] {
        let err = assistant::build(kind, AssistantOptions::default()).err();
        assert_eq!(err, Some(ConfigError::MissingUrl), "kind {kind:?}");
    }
}

#[test]
fn factory_builds_requested_kind() {
    let chat = assistant::build(
        AssistantKind::Chat,
        AssistantOptions::new("http://localhost:11434/api/chat"),
    )
    .unwrap();
    assert_eq!(chat.provider(), "ollama");

    let query = assistant::build(
        AssistantKind::Query,
        AssistantOptions::new("http://localhost:8000/generate"),
    )
    .unwrap();
    assert_eq!(query.provider(), "transformers");
}
