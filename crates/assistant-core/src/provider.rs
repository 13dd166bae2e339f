//! LLM Provider Strategy Pattern
//!
//! Defines the single interface the orchestrator uses to talk to a language
//! model backend. Concrete vendors live in `assistant-runtime`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use assistant_core::provider::{LlmProvider, ProviderRequest};
//!
//! let provider = OllamaProvider::from_env();
//! let response = provider.send(ProviderRequest::new("session-1", history)).await?;
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::capability::ToolDefinition;
use crate::error::Result;
use crate::message::{Message, ToolCall};

fn default_temperature() -> f32 { 0.7 }
fn default_max_tokens() -> u32 { 2048 }

/// Everything a provider needs for one round-trip
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// Session the request belongs to
    pub session_id: String,

    /// Snapshot of the conversation, oldest first
    pub messages: Vec<Message>,

    /// Tool catalogue; `None` means "no tools offered", never an empty list
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,

    /// System prompt sent alongside the messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Model override; providers fall back to their configured model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Temperature for sampling (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl ProviderRequest {
    pub fn new(session_id: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            session_id: session_id.into(),
            messages,
            tools: None,
            system_prompt: None,
            model: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }

    /// Attach a tool catalogue, normalizing an empty list to `None`
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = (!tools.is_empty()).then_some(tools);
        self
    }
}

/// Reason the model stopped generating
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Stop,
    Length,
    ToolUse,
    ContentFilter,
    Error,
}

/// Response from one provider round-trip
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// The generated text (possibly empty when tools are requested)
    pub text: String,

    /// Requested tool invocations, in emission order
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,

    /// Tokens consumed by the round-trip, if reported
    #[serde(default)]
    pub token_count: u32,

    /// Model that generated this response
    pub model: String,

    #[serde(default)]
    pub stop_reason: Option<StopReason>,
}

impl ProviderResponse {
    /// A final text answer
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            stop_reason: Some(StopReason::Stop),
            ..Default::default()
        }
    }

    /// A response requesting tool invocations
    pub fn tool_calls(text: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            text: text.into(),
            tool_calls: calls,
            stop_reason: Some(StopReason::ToolUse),
            ..Default::default()
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Information about a model
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    pub context_length: Option<u32>,
}

/// Strategy trait for LLM providers
///
/// Implement this trait to add support for new LLM backends.
/// The orchestrator works exclusively through this interface.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name (e.g., "Ollama")
    fn name(&self) -> &str;

    /// Send the conversation and tool catalogue, returning text and/or tool calls
    async fn send(&self, request: ProviderRequest) -> Result<ProviderResponse>;

    /// Check if the provider is available and configured correctly
    async fn health_check(&self) -> Result<bool>;

    /// List available models
    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        Ok(Vec::new())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults() {
        let request = ProviderRequest::new("s", Vec::new());
        assert!((request.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(request.max_tokens, 2048);
        assert!(request.tools.is_none());
    }

    #[test]
    fn test_empty_tool_list_becomes_none() {
        let request = ProviderRequest::new("s", Vec::new()).with_tools(Vec::new());
        assert!(request.tools.is_none());

        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("tools").is_none());
    }

    #[test]
    fn test_response_constructors() {
        assert!(!ProviderResponse::text("hi").has_tool_calls());
        let call = ToolCall::new("1", "echo", crate::capability::Parameters::new());
        let response = ProviderResponse::tool_calls("", vec![call]);
        assert!(response.has_tool_calls());
        assert_eq!(response.stop_reason, Some(StopReason::ToolUse));
    }
}
