//! Language model client abstraction.
//!
//! This module provides a trait-based abstraction over chat-completion
//! providers with structured tool calling. The orchestrator only ever talks
//! to [`LanguageModelClient`], so providers and test doubles are
//! interchangeable.
//!
//! # Architecture
//!
//! A call takes an ordered list of role-tagged [`ChatMessage`]s, an optional
//! set of callable [`ToolSchema`]s, a model identifier and a temperature,
//! and returns one [`GeneratedMessage`]: free text, a list of [`ToolCall`]s,
//! or both. The trait is:
//!
//! - **Object-safe**: used as `Arc<dyn LanguageModelClient>`
//! - **Thread-safe**: `Send + Sync` so tasks can share one client
//! - **Async-first**: calls are network suspension points
//!
//! # Example
//!
//! ```rust,ignore
//! use patchwright::llm::{ChatMessage, GenerationRequest, LanguageModelClient};
//!
//! let request = GenerationRequest::new("gpt-4o", 0.4)
//!     .with_message(ChatMessage::system("You are a careful engineer."))
//!     .with_message(ChatMessage::user("Summarize this repository."));
//!
//! let reply = client.generate(request).await?;
//! println!("{}", reply.text());
//! ```

pub mod openai;

pub use openai::{OpenAiApiError, OpenAiClient};

use crate::config::LlmSettings;
use crate::error::{PatchwrightError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

// =============================================================================
// Messages
// =============================================================================

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions framing the conversation
    System,
    /// The requester
    User,
    /// The model
    Assistant,
    /// Result of a tool invocation
    Tool,
}

impl Role {
    /// Wire name of the role.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned call identifier, echoed back in the tool result
    pub id: String,
    /// Name of the tool to invoke
    pub name: String,
    /// Parsed argument record. Arguments that failed to parse as JSON are
    /// kept verbatim as a JSON string.
    pub arguments: Value,
}

impl ToolCall {
    /// Create a tool call.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// One entry of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// A system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::text(Role::System, content)
    }

    /// A user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::text(Role::User, content)
    }

    /// A plain assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(Role::Assistant, content)
    }

    /// The result of the tool call identified by `call_id`.
    #[must_use]
    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.into()),
        }
    }
}

/// JSON-schema description of a callable tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON schema of the argument object
    pub parameters: Value,
}

// =============================================================================
// Requests and responses
// =============================================================================

/// Everything needed for one generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub messages: Vec<ChatMessage>,
    pub model: String,
    pub temperature: f32,
    pub tools: Vec<ToolSchema>,
}

impl GenerationRequest {
    /// Create an empty request for `model`.
    #[must_use]
    pub fn new(model: impl Into<String>, temperature: f32) -> Self {
        Self {
            messages: Vec::new(),
            model: model.into(),
            temperature,
            tools: Vec::new(),
        }
    }

    /// Append one message.
    #[must_use]
    pub fn with_message(mut self, message: ChatMessage) -> Self {
        self.messages.push(message);
        self
    }

    /// Replace the conversation.
    #[must_use]
    pub fn with_messages(mut self, messages: Vec<ChatMessage>) -> Self {
        self.messages = messages;
        self
    }

    /// Expose tools to the model.
    #[must_use]
    pub fn with_tools(mut self, tools: Vec<ToolSchema>) -> Self {
        self.tools = tools;
        self
    }

    /// Total characters of message content, for logging.
    #[must_use]
    pub fn content_len(&self) -> usize {
        self.messages
            .iter()
            .map(|m| m.content.as_deref().map_or(0, str::len))
            .sum()
    }
}

/// One message generated by the model.
///
/// An empty or missing text body is a valid response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneratedMessage {
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
}

impl GeneratedMessage {
    /// A text-only reply.
    #[must_use]
    pub fn from_text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    /// A reply consisting only of tool calls.
    #[must_use]
    pub fn from_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: None,
            tool_calls,
        }
    }

    /// Text body, or `""` when the model returned none.
    #[must_use]
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }

    /// Check whether the model requested any tools.
    #[must_use]
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Convert into the assistant message to append to the conversation.
    #[must_use]
    pub fn into_assistant_message(self) -> ChatMessage {
        ChatMessage {
            role: Role::Assistant,
            content: self.content,
            tool_calls: self.tool_calls,
            tool_call_id: None,
        }
    }
}

// =============================================================================
// Client trait
// =============================================================================

/// Abstraction for language model calls.
///
/// Implementations wrap a specific provider API. Failures of transport,
/// authentication or protocol surface as [`PatchwrightError::Generation`].
#[async_trait]
pub trait LanguageModelClient: Send + Sync {
    /// Generate one message for the given conversation.
    ///
    /// # Errors
    ///
    /// Returns a `Generation` error if the provider is unreachable, rejects
    /// the request, or returns something that cannot be parsed.
    async fn generate(&self, request: GenerationRequest) -> Result<GeneratedMessage>;

    /// Short provider identifier used in logs.
    fn provider_name(&self) -> &str;
}

/// Create a client from configuration.
///
/// # Errors
///
/// Returns `InvalidConfig` if the provider is unknown.
pub fn create_client(settings: &LlmSettings) -> Result<Arc<dyn LanguageModelClient>> {
    match settings.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiClient::from_settings(settings))),
        other => Err(PatchwrightError::invalid_config(
            "llm.provider",
            format!("unknown provider '{}'. Valid options: openai", other),
        )),
    }
}
