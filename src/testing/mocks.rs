//! Scripted language model for deterministic tests.
//!
//! [`ScriptedLanguageModel`] replays a queue of canned replies in order and
//! records every request it receives, so tests can assert both on what the
//! orchestrator did and on what it sent.

use crate::error::{PatchwrightError, Result};
use crate::llm::{GeneratedMessage, GenerationRequest, LanguageModelClient, ToolCall};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

type CallHook = Box<dyn Fn(u32) + Send + Sync>;

enum ScriptedReply {
    Message(GeneratedMessage),
    Error(String),
}

/// Language model that answers from a script.
///
/// Replies are consumed front to back. Once the script is exhausted the
/// fallback reply is returned, or a `Generation` error when none is set.
///
/// # Example
///
/// ```rust,ignore
/// let model = ScriptedLanguageModel::new()
///     .with_text("README.md")
///     .with_tool_calls(vec![ToolCall::new("c1", "delete_file", json!({"file_path": "README.md"}))])
///     .with_text("DONE");
///
/// assert_eq!(model.call_count(), 0);
/// ```
pub struct ScriptedLanguageModel {
    script: Mutex<VecDeque<ScriptedReply>>,
    fallback: Option<GeneratedMessage>,
    requests: Mutex<Vec<GenerationRequest>>,
    call_count: AtomicU32,
    on_call: Option<CallHook>,
}

impl std::fmt::Debug for ScriptedLanguageModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedLanguageModel")
            .field("call_count", &self.call_count())
            .field("has_fallback", &self.fallback.is_some())
            .finish()
    }
}

impl Default for ScriptedLanguageModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedLanguageModel {
    /// Create a model with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
            call_count: AtomicU32::new(0),
            on_call: None,
        }
    }

    /// Queue a reply.
    #[must_use]
    pub fn with_reply(self, reply: GeneratedMessage) -> Self {
        self.push(ScriptedReply::Message(reply));
        self
    }

    /// Queue a text-only reply.
    #[must_use]
    pub fn with_text(self, text: &str) -> Self {
        self.with_reply(GeneratedMessage::from_text(text))
    }

    /// Queue a reply that only requests tools.
    #[must_use]
    pub fn with_tool_calls(self, calls: Vec<ToolCall>) -> Self {
        self.with_reply(GeneratedMessage::from_tool_calls(calls))
    }

    /// Queue a generation failure.
    #[must_use]
    pub fn with_error(self, message: &str) -> Self {
        self.push(ScriptedReply::Error(message.to_string()));
        self
    }

    /// Reply returned once the script runs out.
    #[must_use]
    pub fn with_fallback(mut self, reply: GeneratedMessage) -> Self {
        self.fallback = Some(reply);
        self
    }

    /// Run `hook` with the 1-based call number before each reply.
    #[must_use]
    pub fn with_on_call(mut self, hook: impl Fn(u32) + Send + Sync + 'static) -> Self {
        self.on_call = Some(Box::new(hook));
        self
    }

    fn push(&self, reply: ScriptedReply) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(reply);
        }
    }

    /// Number of `generate` calls so far.
    #[must_use]
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Every request received, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    /// Number of scripted replies not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.script.lock().map(|s| s.len()).unwrap_or_default()
    }
}

#[async_trait]
impl LanguageModelClient for ScriptedLanguageModel {
    async fn generate(&self, request: GenerationRequest) -> Result<GeneratedMessage> {
        let call = self.call_count.fetch_add(1, Ordering::SeqCst) + 1;
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        if let Some(hook) = &self.on_call {
            hook(call);
        }

        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        match next {
            Some(ScriptedReply::Message(reply)) => Ok(reply),
            Some(ScriptedReply::Error(message)) => Err(PatchwrightError::generation(message)),
            None => self
                .fallback
                .clone()
                .ok_or_else(|| PatchwrightError::generation("script exhausted")),
        }
    }

    fn provider_name(&self) -> &str {
        "scripted"
    }
}
