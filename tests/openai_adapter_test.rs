//! Integration tests for the OpenAI-compatible model adapter
//!
//! Uses a mockito server in place of the chat completions endpoint.

use mockito::{Matcher, Server};
use serde_json::json;

use corawiki::adapters::llm::OpenAiCompatibleModel;
use corawiki::domain::models::{ChatMessage, ModelRequest};
use corawiki::domain::ports::ModelAdapter;
use corawiki::LlmConfig;

fn config(base_url: String) -> LlmConfig {
    LlmConfig {
        base_url,
        model: "test-model".to_string(),
        timeout_secs: 5,
        max_retries: 1,
        initial_backoff_ms: 1,
        max_backoff_ms: 5,
        ..LlmConfig::default()
    }
}

fn request() -> ModelRequest {
    ModelRequest {
        messages: vec![ChatMessage::system("prompt"), ChatMessage::user("query")],
        tools: Vec::new(),
        max_tokens: Some(256),
    }
}

#[tokio::test]
async fn test_tool_call_response_is_normalized() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .match_header("authorization", "Bearer sk-test-key-123")
        .match_body(Matcher::PartialJson(json!({"model": "test-model", "max_tokens": 256})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "choices": [{
                    "message": {
                        "role": "assistant",
                        "content": null,
                        "tool_calls": [{
                            "id": "call_abc",
                            "type": "function",
                            "function": {"name": "list_dir", "arguments": "{\"targetPath\":\"src\"}"}
                        }]
                    }
                }],
                "usage": {"prompt_tokens": 120, "completion_tokens": 8, "total_tokens": 128}
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let model =
        OpenAiCompatibleModel::with_api_key(config(server.url()), Some("sk-test-key-123".into()))
            .unwrap();
    assert!(model.is_configured());
    let response = model.complete(request()).await.unwrap();

    mock.assert_async().await;
    assert_eq!(response.tool_calls.len(), 1);
    assert_eq!(response.tool_calls[0].id, "call_abc");
    assert_eq!(response.tool_calls[0].name, "list_dir");
    assert_eq!(response.tool_calls[0].arguments, r#"{"targetPath":"src"}"#);
    assert_eq!(response.usage.total_tokens, 128);
}

#[tokio::test]
async fn test_unauthorized_is_not_retried() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .with_status(401)
        .with_body(r#"{"error":"bad key"}"#)
        .expect(1)
        .create_async()
        .await;

    let model =
        OpenAiCompatibleModel::with_api_key(config(server.url()), Some("sk-wrong-key".into()))
            .unwrap();
    let result = model.complete(request()).await;

    mock.assert_async().await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_server_error_is_retried() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .with_status(500)
        .with_body("internal error")
        .expect(2)
        .create_async()
        .await;

    let model =
        OpenAiCompatibleModel::with_api_key(config(server.url()), Some("sk-test-key-123".into()))
            .unwrap();
    let result = model.complete(request()).await;

    mock.assert_async().await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_missing_key_fails_without_request() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .expect(0)
        .create_async()
        .await;

    let model = OpenAiCompatibleModel::with_api_key(config(server.url()), None).unwrap();
    assert!(!model.is_configured());
    assert!(model.complete(request()).await.is_err());
    mock.assert_async().await;
}
