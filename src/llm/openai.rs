//! OpenAI chat-completions provider.
//!
//! [`OpenAiClient`] implements [`LanguageModelClient`] over the
//! `/chat/completions` endpoint using `reqwest`. Tools are sent in the
//! function-calling format and tool calls in the reply are decoded back into
//! [`ToolCall`]s.
//!
//! Request encoding and response decoding are plain functions
//! ([`build_request_body`], [`parse_response`]) so they can be tested without
//! a network.

use crate::config::LlmSettings;
use crate::error::{PatchwrightError, Result};
use crate::llm::{
    ChatMessage, GeneratedMessage, GenerationRequest, LanguageModelClient, ToolCall,
};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::env;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

// =============================================================================
// OpenAI API Errors
// =============================================================================

/// Errors specific to OpenAI API interactions.
#[derive(Error, Debug)]
pub enum OpenAiApiError {
    /// Rate limit exceeded.
    #[error("Rate limit exceeded: {message} (retry after {retry_after_secs}s)")]
    RateLimited {
        message: String,
        retry_after_secs: u64,
    },

    /// Authentication failed - check API key.
    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    /// API key not found in environment.
    #[error("API key not found in environment variable '{env_var}'")]
    ApiKeyNotFound { env_var: String },

    /// Invalid request - check prompt/parameters.
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// Context length exceeded.
    #[error("Context length exceeded: {message}")]
    ContextLengthExceeded { message: String },

    /// Server error - may be transient.
    #[error("Server error: {message}")]
    ServerError { message: String },

    /// Network/connection error.
    #[error("Connection error: {message}")]
    ConnectionError { message: String },

    /// Timeout waiting for response.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// Invalid response from API.
    #[error("Invalid API response: {message}")]
    InvalidResponse { message: String },
}

impl OpenAiApiError {
    /// Classify an error from HTTP status code and response body.
    #[must_use]
    pub fn from_response(status_code: u16, body: &str) -> Self {
        let message = Self::error_message(body);
        let lower = message.to_lowercase();

        match status_code {
            429 => Self::RateLimited {
                retry_after_secs: Self::extract_retry_after(&message).unwrap_or(60),
                message,
            },
            401 | 403 => Self::AuthenticationFailed { message },
            400 if lower.contains("context_length") || lower.contains("maximum context") => {
                Self::ContextLengthExceeded { message }
            }
            400 | 404 | 422 => Self::InvalidRequest { message },
            500..=599 => Self::ServerError { message },
            _ => Self::InvalidResponse {
                message: format!("HTTP {}: {}", status_code, message),
            },
        }
    }

    /// Pull `error.message` out of an API error body, falling back to the
    /// raw body.
    fn error_message(body: &str) -> String {
        serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|v| {
                v.get("error")
                    .and_then(|e| e.get("message"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .unwrap_or_else(|| body.trim().to_string())
    }

    /// Extract retry-after seconds from an error message.
    fn extract_retry_after(message: &str) -> Option<u64> {
        let lower = message.to_lowercase();
        [
            r"retry.?after[:\s]+(\d+)",
            r"try again in (\d+)",
            r"(\d+)\s*seconds?",
        ]
        .iter()
        .filter_map(|pattern| regex::Regex::new(pattern).ok())
        .find_map(|re| {
            re.captures(&lower)
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse::<u64>().ok())
        })
    }
}

impl From<OpenAiApiError> for PatchwrightError {
    fn from(err: OpenAiApiError) -> Self {
        PatchwrightError::generation(err.to_string())
    }
}

// =============================================================================
// Wire format
// =============================================================================

/// Encode tool-call arguments the way the API expects them: a JSON string.
///
/// Arguments that were kept verbatim because they did not parse are sent
/// back unchanged.
fn encode_arguments(arguments: &Value) -> String {
    match arguments {
        Value::String(raw) => raw.clone(),
        other => other.to_string(),
    }
}

fn encode_message(message: &ChatMessage) -> Value {
    let mut object = Map::new();
    object.insert("role".to_string(), json!(message.role.as_str()));
    object.insert(
        "content".to_string(),
        message.content.as_ref().map_or(Value::Null, |c| json!(c)),
    );

    if !message.tool_calls.is_empty() {
        let calls: Vec<Value> = message
            .tool_calls
            .iter()
            .map(|call| {
                json!({
                    "id": call.id,
                    "type": "function",
                    "function": {
                        "name": call.name,
                        "arguments": encode_arguments(&call.arguments),
                    }
                })
            })
            .collect();
        object.insert("tool_calls".to_string(), Value::Array(calls));
    }

    if let Some(id) = &message.tool_call_id {
        object.insert("tool_call_id".to_string(), json!(id));
    }

    Value::Object(object)
}

/// Build the JSON body for a chat-completions request.
#[must_use]
pub fn build_request_body(request: &GenerationRequest) -> Value {
    let mut body = json!({
        "model": request.model,
        "temperature": request.temperature,
        "messages": request.messages.iter().map(encode_message).collect::<Vec<_>>(),
    });

    if !request.tools.is_empty() {
        let tools: Vec<Value> = request
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
        body["tools"] = Value::Array(tools);
        body["tool_choice"] = json!("auto");
    }

    body
}

/// Decode a chat-completions response body into the first choice's message.
///
/// # Errors
///
/// Returns `InvalidResponse` if the body is not JSON or has no choices.
pub fn parse_response(body: &str) -> std::result::Result<GeneratedMessage, OpenAiApiError> {
    let value: Value = serde_json::from_str(body).map_err(|e| OpenAiApiError::InvalidResponse {
        message: format!("Failed to parse response: {}", e),
    })?;

    let message = value
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .ok_or_else(|| OpenAiApiError::InvalidResponse {
            message: "response contains no choices".to_string(),
        })?;

    let content = message
        .get("content")
        .and_then(Value::as_str)
        .map(str::to_string);

    let tool_calls = message
        .get("tool_calls")
        .and_then(Value::as_array)
        .map(|calls| calls.iter().filter_map(decode_tool_call).collect())
        .unwrap_or_default();

    Ok(GeneratedMessage {
        content,
        tool_calls,
    })
}

fn decode_tool_call(call: &Value) -> Option<ToolCall> {
    let function = call.get("function")?;
    let name = function.get("name")?.as_str()?;
    let id = call.get("id").and_then(Value::as_str).unwrap_or_default();

    let arguments = match function.get("arguments") {
        Some(Value::String(raw)) => {
            serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone()))
        }
        Some(other) => other.clone(),
        None => Value::Object(Map::new()),
    };

    Some(ToolCall::new(id, name, arguments))
}

// =============================================================================
// OpenAI Client
// =============================================================================

/// Chat-completions client for OpenAI-compatible endpoints.
///
/// # Example
///
/// ```rust,ignore
/// use patchwright::llm::OpenAiClient;
///
/// let client = OpenAiClient::new()
///     .with_api_base("http://localhost:8080/v1")
///     .with_timeout(60);
/// ```
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key_env: String,
    api_key: Option<String>,
    api_base: String,
    timeout_secs: u64,
}

impl Default for OpenAiClient {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenAiClient {
    /// Default timeout for requests.
    pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

    /// Default API base URL.
    pub const DEFAULT_API_BASE: &'static str = "https://api.openai.com/v1";

    /// Default API key environment variable.
    pub const DEFAULT_API_KEY_ENV: &'static str = "OPENAI_API_KEY";

    /// Create a client with default endpoint and credentials lookup.
    #[must_use]
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key_env: Self::DEFAULT_API_KEY_ENV.to_string(),
            api_key: None,
            api_base: Self::DEFAULT_API_BASE.to_string(),
            timeout_secs: Self::DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Create a client from configuration.
    #[must_use]
    pub fn from_settings(settings: &LlmSettings) -> Self {
        Self::new()
            .with_api_key_env(&settings.api_key_env)
            .with_api_base(&settings.api_base)
            .with_timeout(settings.timeout_secs)
    }

    /// Set the environment variable name for the API key.
    #[must_use]
    pub fn with_api_key_env(mut self, env_var: &str) -> Self {
        self.api_key_env = env_var.to_string();
        self
    }

    /// Use an explicit API key instead of reading the environment.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set a custom API base URL (for proxies or compatible servers).
    #[must_use]
    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    /// Set the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// The chat-completions endpoint URL.
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }

    fn get_api_key(&self) -> std::result::Result<String, OpenAiApiError> {
        if let Some(key) = &self.api_key {
            return Ok(key.clone());
        }
        env::var(&self.api_key_env).map_err(|_| OpenAiApiError::ApiKeyNotFound {
            env_var: self.api_key_env.clone(),
        })
    }

    async fn execute_request(
        &self,
        request: &GenerationRequest,
    ) -> std::result::Result<GeneratedMessage, OpenAiApiError> {
        let api_key = self.get_api_key()?;
        let body = build_request_body(request);

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(api_key)
            .timeout(Duration::from_secs(self.timeout_secs))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    OpenAiApiError::Timeout {
                        timeout_secs: self.timeout_secs,
                    }
                } else {
                    OpenAiApiError::ConnectionError {
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| OpenAiApiError::ConnectionError {
                message: format!("Failed to read response body: {}", e),
            })?;

        if !status.is_success() {
            return Err(OpenAiApiError::from_response(status.as_u16(), &text));
        }

        parse_response(&text)
    }
}

#[async_trait]
impl LanguageModelClient for OpenAiClient {
    async fn generate(&self, request: GenerationRequest) -> Result<GeneratedMessage> {
        let start = Instant::now();
        debug!(
            "Sending {} messages ({} chars) to {} with {} tools",
            request.messages.len(),
            request.content_len(),
            request.model,
            request.tools.len()
        );

        let reply = self.execute_request(&request).await?;

        debug!(
            "Received {} chars and {} tool calls in {}ms",
            reply.text().len(),
            reply.tool_calls.len(),
            start.elapsed().as_millis()
        );
        Ok(reply)
    }

    fn provider_name(&self) -> &str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{Role, ToolSchema};
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use std::sync::{Arc, Mutex};

    fn sample_request() -> GenerationRequest {
        GenerationRequest::new("gpt-4o", 0.4)
            .with_message(ChatMessage::system("be careful"))
            .with_message(ChatMessage::user("add a license"))
    }

    // =========================================================================
    // Error classification
    // =========================================================================

    #[test]
    fn test_from_response_rate_limited_with_retry_hint() {
        let body = r#"{"error":{"message":"Rate limit reached. Please try again in 20s.","type":"requests"}}"#;
        let err = OpenAiApiError::from_response(429, body);
        match &err {
            OpenAiApiError::RateLimited {
                retry_after_secs, ..
            } => assert_eq!(*retry_after_secs, 20),
            other => panic!("Expected RateLimited, got {:?}", other),
        }
        assert!(err.to_string().contains("retry after 20s"));
    }

    #[test]
    fn test_from_response_authentication() {
        let err = OpenAiApiError::from_response(401, r#"{"error":{"message":"Incorrect API key"}}"#);
        assert!(matches!(err, OpenAiApiError::AuthenticationFailed { .. }));
        assert!(err.to_string().contains("Incorrect API key"));
    }

    #[test]
    fn test_from_response_context_length() {
        let body = r#"{"error":{"message":"This model's maximum context length is 128000 tokens","code":"context_length_exceeded"}}"#;
        let err = OpenAiApiError::from_response(400, body);
        assert!(matches!(err, OpenAiApiError::ContextLengthExceeded { .. }));
    }

    #[test]
    fn test_from_response_server_error_keeps_raw_body() {
        let err = OpenAiApiError::from_response(503, "upstream unavailable");
        assert!(matches!(err, OpenAiApiError::ServerError { .. }));
        assert_eq!(err.to_string(), "Server error: upstream unavailable");
    }

    #[test]
    fn test_api_error_converts_to_generation_error() {
        let err: PatchwrightError = OpenAiApiError::Timeout { timeout_secs: 3 }.into();
        assert!(matches!(err, PatchwrightError::Generation { .. }));
        assert!(err.to_string().contains("3s"));
    }

    // =========================================================================
    // Wire format
    // =========================================================================

    #[test]
    fn test_request_body_without_tools() {
        let body = build_request_body(&sample_request());

        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "add a license");
        assert!(body.get("tools").is_none());
        assert!(body.get("tool_choice").is_none());
    }

    #[test]
    fn test_request_body_with_tools_and_tool_turns() {
        let call = ToolCall::new("call_1", "create_file", json!({"file_path": "LICENSE"}));
        let request = sample_request()
            .with_message(GeneratedMessage::from_tool_calls(vec![call]).into_assistant_message())
            .with_message(ChatMessage::tool_result("call_1", "ok"))
            .with_tools(vec![ToolSchema {
                name: "create_file".to_string(),
                description: "Create a file".to_string(),
                parameters: json!({"type": "object"}),
            }]);

        let body = build_request_body(&request);

        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "create_file");

        let assistant = &body["messages"][2];
        assert_eq!(assistant["content"], Value::Null);
        assert_eq!(assistant["tool_calls"][0]["id"], "call_1");
        assert_eq!(
            assistant["tool_calls"][0]["function"]["arguments"],
            r#"{"file_path":"LICENSE"}"#
        );

        let tool = &body["messages"][3];
        assert_eq!(tool["role"], "tool");
        assert_eq!(tool["tool_call_id"], "call_1");
    }

    #[test]
    fn test_unparseable_arguments_round_trip_verbatim() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":null,
            "tool_calls":[{"id":"c9","type":"function","function":{"name":"modify_file","arguments":"{not json"}}]}}]}"#;
        let reply = parse_response(body).unwrap();
        assert_eq!(reply.tool_calls[0].arguments, Value::String("{not json".to_string()));

        let echoed = build_request_body(
            &GenerationRequest::new("m", 0.0).with_message(reply.into_assistant_message()),
        );
        assert_eq!(
            echoed["messages"][0]["tool_calls"][0]["function"]["arguments"],
            "{not json"
        );
    }

    #[test]
    fn test_parse_text_reply() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"README.md\nsrc/lib.rs"}}]}"#;
        let reply = parse_response(body).unwrap();
        assert_eq!(reply.text(), "README.md\nsrc/lib.rs");
        assert!(!reply.has_tool_calls());
    }

    #[test]
    fn test_parse_missing_content_is_empty_text() {
        let body = r#"{"choices":[{"message":{"role":"assistant"}}]}"#;
        assert_eq!(parse_response(body).unwrap().text(), "");
    }

    #[test]
    fn test_parse_rejects_malformed_bodies() {
        assert!(parse_response("not json").is_err());
        assert!(parse_response(r#"{"choices":[]}"#).is_err());
    }

    // =========================================================================
    // Client
    // =========================================================================

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let client = OpenAiClient::new().with_api_base("http://localhost:9/v1/");
        assert_eq!(client.endpoint(), "http://localhost:9/v1/chat/completions");
    }

    #[tokio::test]
    async fn test_missing_api_key_is_generation_error() {
        let client = OpenAiClient::new()
            .with_api_key_env("PATCHWRIGHT_TEST_KEY_THAT_IS_NEVER_SET_4f1c")
            .with_api_base("http://127.0.0.1:9");

        let err = client.generate(sample_request()).await.unwrap_err();
        assert!(matches!(err, PatchwrightError::Generation { .. }));
        assert!(err.to_string().contains("PATCHWRIGHT_TEST_KEY_THAT_IS_NEVER_SET_4f1c"));
    }

    async fn stub_server(status: StatusCode, reply: Value) -> (String, Arc<Mutex<Option<Value>>>) {
        let captured = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&captured);
        let app = Router::new().route(
            "/v1/chat/completions",
            post(move |Json(body): Json<Value>| {
                let sink = Arc::clone(&sink);
                let reply = reply.clone();
                async move {
                    *sink.lock().unwrap() = Some(body);
                    (status, Json(reply))
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}/v1", addr), captured)
    }

    #[tokio::test]
    async fn test_generate_against_stub_server() {
        let reply = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_7",
                        "type": "function",
                        "function": {
                            "name": "create_file",
                            "arguments": "{\"file_path\":\"LICENSE\",\"content\":\"MIT\"}"
                        }
                    }]
                }
            }]
        });
        let (base, captured) = stub_server(StatusCode::OK, reply).await;
        let client = OpenAiClient::new().with_api_key("sk-test").with_api_base(&base);

        let message = client.generate(sample_request()).await.unwrap();

        assert_eq!(message.content, None);
        assert_eq!(message.tool_calls.len(), 1);
        assert_eq!(message.tool_calls[0].id, "call_7");
        assert_eq!(message.tool_calls[0].arguments["content"], "MIT");

        let sent = captured.lock().unwrap().clone().unwrap();
        assert_eq!(sent["model"], "gpt-4o");
        assert_eq!(sent["messages"][0]["role"], Role::System.as_str());
    }

    #[tokio::test]
    async fn test_generate_maps_http_errors() {
        let (base, _captured) = stub_server(
            StatusCode::UNAUTHORIZED,
            json!({"error": {"message": "bad key"}}),
        )
        .await;
        let client = OpenAiClient::new().with_api_key("sk-bad").with_api_base(&base);

        let err = client.generate(sample_request()).await.unwrap_err();
        assert!(matches!(err, PatchwrightError::Generation { .. }));
        assert!(err.to_string().contains("bad key"));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_generation_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = OpenAiClient::new()
            .with_api_key("sk-test")
            .with_api_base(&format!("http://{}/v1", addr))
            .with_timeout(5);

        let err = client.generate(sample_request()).await.unwrap_err();
        assert!(matches!(err, PatchwrightError::Generation { .. }));
    }
}
