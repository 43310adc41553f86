//! OpenAI-compatible chat completions adapter.
//!
//! Speaks the `/chat/completions` wire format with function tools and
//! normalizes the response variants providers return: string, array, or
//! null content; `reasoning_content` / `reasoning` traces; tool call
//! arguments as strings or objects; and the legacy `function_call` field.

use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    ChatMessage, LlmConfig, ModelRequest, ModelResponse, Role, TokenUsage, ToolCall,
};
use crate::domain::ports::ModelAdapter;

use super::errors::LlmError;

/// Chat completions client for any OpenAI-compatible endpoint.
pub struct OpenAiCompatibleModel {
    http_client: Client,
    config: LlmConfig,
    api_key: Option<String>,
}

impl OpenAiCompatibleModel {
    /// Build the client; the API key is resolved from the config and environment.
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let api_key = config.resolve_api_key();
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: LlmConfig, api_key: Option<String>) -> Result<Self, LlmError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(4)
            .build()?;
        Ok(Self {
            http_client,
            config,
            api_key,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    fn build_body(&self, request: &ModelRequest) -> Value {
        let mut body = json!({
            "model": self.config.model,
            "messages": request.messages.iter().map(wire_message).collect::<Vec<_>>(),
            "temperature": self.config.temperature,
            "max_tokens": request.max_tokens.unwrap_or(self.config.max_tokens),
        });
        if !request.tools.is_empty() {
            body["tools"] = request
                .tools
                .iter()
                .map(|tool| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": tool.name,
                            "description": tool.description,
                            "parameters": tool.parameters,
                        }
                    })
                })
                .collect();
            body["tool_choice"] = json!("auto");
        }
        body
    }

    async fn send_once(&self, api_key: &str, body: &Value) -> Result<Value, LlmError> {
        let response = self
            .http_client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            return Err(LlmError::from_status(status, body));
        }
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|err| LlmError::MalformedResponse(err.to_string()))
    }

    /// Send with exponential backoff on transient errors.
    async fn send_with_retry(&self, api_key: &str, body: &Value) -> Result<Value, LlmError> {
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(self.config.initial_backoff_ms))
            .with_max_interval(Duration::from_millis(self.config.max_backoff_ms))
            .with_max_elapsed_time(None)
            .build();
        let attempts = AtomicU32::new(0);
        let attempts = &attempts;
        let max_retries = self.config.max_retries;

        backoff::future::retry(policy, move || async move {
            let attempt = attempts.fetch_add(1, Ordering::Relaxed);
            match self.send_once(api_key, body).await {
                Ok(value) => Ok(value),
                Err(err) if err.is_transient() && attempt < max_retries => {
                    warn!(attempt = attempt + 1, error = %err, "Transient model error, retrying");
                    Err(backoff::Error::transient(err))
                }
                Err(err) => Err(backoff::Error::permanent(err)),
            }
        })
        .await
    }
}

#[async_trait]
impl ModelAdapter for OpenAiCompatibleModel {
    fn name(&self) -> &str {
        &self.config.model
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    #[instrument(skip(self, request), fields(model = %self.config.model, messages = request.messages.len()))]
    async fn complete(&self, request: ModelRequest) -> DomainResult<ModelResponse> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(DomainError::ModelNotConfigured(format!(
                "no API key; set {} or llm.api_key",
                self.config.api_key_env
            )));
        };
        let body = self.build_body(&request);
        let value = self.send_with_retry(api_key, &body).await?;
        let response = normalize_response(&value)?;
        debug!(
            tool_calls = response.tool_calls.len(),
            total_tokens = response.usage.total_tokens,
            "Model response received"
        );
        Ok(response)
    }
}

fn wire_message(message: &ChatMessage) -> Value {
    match message.role {
        Role::Assistant if !message.tool_calls.is_empty() => json!({
            "role": "assistant",
            "content": if message.content.is_empty() { Value::Null } else { json!(message.content) },
            "tool_calls": message.tool_calls.iter().map(|call| json!({
                "id": call.id,
                "type": "function",
                "function": {"name": call.name, "arguments": call.arguments},
            })).collect::<Vec<_>>(),
        }),
        Role::Tool => json!({
            "role": "tool",
            "tool_call_id": message.tool_call_id,
            "content": message.content,
        }),
        role => json!({
            "role": role.as_str(),
            "content": message.content,
        }),
    }
}

/// Normalize a chat completion body into a [`ModelResponse`].
pub fn normalize_response(body: &Value) -> Result<ModelResponse, LlmError> {
    let message = body
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .filter(|message| message.is_object())
        .ok_or_else(|| LlmError::MalformedResponse("response has no choices[0].message".into()))?;

    let content = normalize_content(message.get("content"));
    let reasoning = ["reasoning_content", "reasoning"]
        .iter()
        .find_map(|key| message.get(*key).and_then(Value::as_str))
        .filter(|text| !text.trim().is_empty())
        .map(String::from);

    let mut tool_calls: Vec<ToolCall> = message
        .get("tool_calls")
        .and_then(Value::as_array)
        .map(|calls| {
            calls
                .iter()
                .enumerate()
                .filter_map(|(index, call)| {
                    let function = call.get("function").unwrap_or(call);
                    let name = function.get("name").and_then(Value::as_str)?;
                    let id = call
                        .get("id")
                        .and_then(Value::as_str)
                        .map_or_else(|| format!("call_{index}"), String::from);
                    Some(ToolCall::new(id, name, arguments_string(function.get("arguments"))))
                })
                .collect()
        })
        .unwrap_or_default();

    if tool_calls.is_empty() {
        if let Some(function) = message.get("function_call") {
            if let Some(name) = function.get("name").and_then(Value::as_str) {
                tool_calls.push(ToolCall::new(
                    "call_0",
                    name,
                    arguments_string(function.get("arguments")),
                ));
            }
        }
    }

    Ok(ModelResponse {
        content,
        reasoning,
        tool_calls,
        usage: normalize_usage(body.get("usage")),
    })
}

fn normalize_content(content: Option<&Value>) -> Option<String> {
    match content? {
        Value::String(text) => Some(text.clone()),
        Value::Array(parts) => {
            let text: Vec<&str> = parts
                .iter()
                .filter_map(|part| match part {
                    Value::String(text) => Some(text.as_str()),
                    Value::Object(_) => part.get("text").and_then(Value::as_str),
                    _ => None,
                })
                .collect();
            if text.is_empty() {
                None
            } else {
                Some(text.join(""))
            }
        }
        _ => None,
    }
}

fn arguments_string(arguments: Option<&Value>) -> String {
    match arguments {
        Some(Value::String(raw)) => raw.clone(),
        Some(Value::Null) | None => "{}".to_string(),
        Some(other) => other.to_string(),
    }
}

fn normalize_usage(usage: Option<&Value>) -> TokenUsage {
    let Some(usage) = usage else {
        return TokenUsage::default();
    };
    let field = |name: &str| usage.get(name).and_then(Value::as_u64).unwrap_or(0);
    let mut normalized = TokenUsage::new(field("prompt_tokens"), field("completion_tokens"));
    if let Some(total) = usage.get("total_tokens").and_then(Value::as_u64) {
        normalized.total_tokens = total;
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::ToolSpec;

    #[test]
    fn test_normalize_string_content() {
        let body = json!({
            "choices": [{"message": {"role": "assistant", "content": "plan text"}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        });
        let response = normalize_response(&body).unwrap();
        assert_eq!(response.text_content(), "plan text");
        assert_eq!(response.usage.total_tokens, 15);
        assert!(!response.has_tool_calls());
    }

    #[test]
    fn test_normalize_array_and_null_content() {
        let body = json!({"choices": [{"message": {"content": [{"type": "text", "text": "a"}, "b"]}}]});
        assert_eq!(normalize_response(&body).unwrap().text_content(), "ab");
        let body = json!({"choices": [{"message": {"content": null}}]});
        assert_eq!(normalize_response(&body).unwrap().content, None);
    }

    #[test]
    fn test_normalize_tool_call_arguments() {
        let body = json!({"choices": [{"message": {
            "content": null,
            "reasoning_content": "thinking",
            "tool_calls": [
                {"id": "c1", "type": "function", "function": {"name": "list_dir", "arguments": "{\"targetPath\":\".\"}"}},
                {"type": "function", "function": {"name": "read_skeleton", "arguments": {"filePath": "src/a.ts"}}}
            ]
        }}]});
        let response = normalize_response(&body).unwrap();
        assert_eq!(response.reasoning.as_deref(), Some("thinking"));
        assert_eq!(response.tool_calls[0].id, "c1");
        assert_eq!(response.tool_calls[0].arguments, r#"{"targetPath":"."}"#);
        assert_eq!(response.tool_calls[1].id, "call_1");
        let args: Value = serde_json::from_str(&response.tool_calls[1].arguments).unwrap();
        assert_eq!(args["filePath"], "src/a.ts");
    }

    #[test]
    fn test_normalize_legacy_function_call() {
        let body = json!({"choices": [{"message": {
            "function_call": {"name": "list_dir", "arguments": "{}"}
        }}]});
        let response = normalize_response(&body).unwrap();
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].name, "list_dir");
    }

    #[test]
    fn test_missing_choices_is_malformed() {
        assert!(matches!(
            normalize_response(&json!({"error": "x"})),
            Err(LlmError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_body_includes_tools_only_when_offered() {
        let model = OpenAiCompatibleModel::with_api_key(LlmConfig::default(), Some("k".into())).unwrap();
        let mut request = ModelRequest {
            messages: vec![
                ChatMessage::system("s"),
                ChatMessage::assistant_tool_calls("", vec![ToolCall::new("c1", "list_dir", "{}")]),
                ChatMessage::tool_result("c1", "entries"),
            ],
            tools: Vec::new(),
            max_tokens: Some(256),
        };
        let body = model.build_body(&request);
        assert!(body.get("tools").is_none());
        assert_eq!(body["max_tokens"], 256);
        assert_eq!(body["messages"][1]["content"], Value::Null);
        assert_eq!(body["messages"][2]["tool_call_id"], "c1");

        request.tools.push(ToolSpec {
            name: "list_dir".into(),
            description: "d".into(),
            parameters: json!({"type": "object"}),
        });
        let body = model.build_body(&request);
        assert_eq!(body["tools"][0]["function"]["name"], "list_dir");
        assert_eq!(body["tool_choice"], "auto");
    }

    #[tokio::test]
    async fn test_unconfigured_model_refuses() {
        let model = OpenAiCompatibleModel::with_api_key(LlmConfig::default(), None).unwrap();
        assert!(!model.is_configured());
        let err = model
            .complete(ModelRequest {
                messages: vec![ChatMessage::user("q")],
                tools: Vec::new(),
                max_tokens: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::ModelNotConfigured(_)));
    }
}
