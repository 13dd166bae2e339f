//! Ollama LLM Provider
//!
//! Implementation of `LlmProvider` for local Ollama inference, using the
//! native `/api/chat` tool-calling protocol.

use std::collections::HashMap;
use std::time::Duration;

use assistant_core::{
    capability::{Parameters, ToolDefinition},
    error::{AssistantError, Result},
    message::{Message, Role, ToolCall},
    provider::{LlmProvider, ModelInfo, ProviderRequest, ProviderResponse, StopReason},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Ollama provider configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OllamaConfig {
    /// Ollama host URL
    pub host: String,

    /// Ollama port
    pub port: u16,

    /// Model used when a request carries no override
    pub model: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost".into(),
            port: 11434,
            model: "llama3.2".into(),
            timeout_secs: 120,
        }
    }
}

impl OllamaConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read `OLLAMA_HOST`, `OLLAMA_PORT`, `OLLAMA_MODEL`, `OLLAMA_TIMEOUT_SECS`
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            host: lookup("OLLAMA_HOST").unwrap_or(defaults.host),
            port: lookup("OLLAMA_PORT")
                .and_then(|p| p.trim().parse().ok())
                .unwrap_or(defaults.port),
            model: lookup("OLLAMA_MODEL")
                .filter(|m| !m.trim().is_empty())
                .unwrap_or(defaults.model),
            timeout_secs: lookup("OLLAMA_TIMEOUT_SECS")
                .and_then(|t| t.trim().parse().ok())
                .unwrap_or(defaults.timeout_secs),
        }
    }

    /// Base URL, e.g. `http://localhost:11434`
    pub fn base_url(&self) -> String {
        format!("{}:{}", self.host.trim_end_matches('/'), self.port)
    }
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ChatTool>>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ChatToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct ChatToolCall {
    function: ChatFunctionCall,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct ChatFunctionCall {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Serialize)]
struct ChatTool {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: ChatFunction,
}

#[derive(Debug, Serialize)]
struct ChatFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: String,
    message: ChatMessage,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Debug, Deserialize)]
struct TagModel {
    name: String,
}

// ============================================================================
// Provider
// ============================================================================

/// Ollama LLM provider
pub struct OllamaProvider {
    client: reqwest::Client,
    config: OllamaConfig,
}

impl OllamaProvider {
    /// Create a new Ollama provider with custom host/port
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self> {
        Self::from_config(OllamaConfig {
            host: host.into(),
            port,
            ..Default::default()
        })
    }

    /// Create from configuration
    pub fn from_config(config: OllamaConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AssistantError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_config(OllamaConfig::from_env())
    }

    /// Create with default localhost settings
    pub fn localhost() -> Result<Self> {
        Self::from_config(OllamaConfig::default())
    }

    pub fn config(&self) -> &OllamaConfig {
        &self.config
    }

    /// Convert assistant messages to Ollama format, system prompt first
    fn convert_messages(messages: &[Message], system_prompt: Option<&str>) -> Vec<ChatMessage> {
        let mut call_names: HashMap<&str, &str> = HashMap::new();
        let mut converted = Vec::with_capacity(messages.len() + 1);

        if let Some(prompt) = system_prompt {
            converted.push(ChatMessage {
                role: "system".into(),
                content: prompt.to_string(),
                tool_calls: Vec::new(),
                tool_name: None,
            });
        }

        for message in messages {
            for call in message.calls() {
                call_names.insert(call.id.as_str(), call.name.as_str());
            }

            converted.push(ChatMessage {
                role: message.role.to_string(),
                content: message.text().to_string(),
                tool_calls: message
                    .calls()
                    .iter()
                    .map(|call| ChatToolCall {
                        function: ChatFunctionCall {
                            name: call.name.clone(),
                            arguments: call.input.clone().into(),
                        },
                    })
                    .collect(),
                tool_name: match message.role {
                    Role::Tool => message
                        .tool_call_id
                        .as_deref()
                        .and_then(|id| call_names.get(id))
                        .map(|name| (*name).to_string()),
                    Role::User | Role::Assistant => None,
                },
            });
        }

        converted
    }

    fn convert_tools(tools: &[ToolDefinition]) -> Result<Vec<ChatTool>> {
        tools
            .iter()
            .map(|tool| {
                Ok(ChatTool {
                    tool_type: "function",
                    function: ChatFunction {
                        name: tool.name.clone(),
                        description: tool.description.clone(),
                        parameters: serde_json::to_value(&tool.input_schema)?,
                    },
                })
            })
            .collect()
    }

    fn build_request(&self, request: &ProviderRequest) -> Result<ChatRequest> {
        Ok(ChatRequest {
            model: request
                .model
                .clone()
                .unwrap_or_else(|| self.config.model.clone()),
            messages: Self::convert_messages(&request.messages, request.system_prompt.as_deref()),
            tools: request
                .tools
                .as_deref()
                .map(Self::convert_tools)
                .transpose()?,
            stream: false,
            options: ChatOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        })
    }

    /// Convert an Ollama response, minting ids for the tool calls
    fn convert_response(response: ChatResponse) -> ProviderResponse {
        let tool_calls: Vec<ToolCall> = response
            .message
            .tool_calls
            .into_iter()
            .map(|call| {
                let input = Self::convert_arguments(&call.function.name, call.function.arguments);
                ToolCall::new(format!("call_{}", uuid::Uuid::new_v4().simple()), call.function.name, input)
            })
            .collect();

        let stop_reason = if tool_calls.is_empty() {
            match response.done_reason.as_deref() {
                Some("length") => Some(StopReason::Length),
                Some("stop") | None => Some(StopReason::Stop),
                Some(_) => None,
            }
        } else {
            Some(StopReason::ToolUse)
        };

        ProviderResponse {
            text: response.message.content,
            tool_calls,
            token_count: response.prompt_eval_count.unwrap_or(0) + response.eval_count.unwrap_or(0),
            model: response.model,
            stop_reason,
        }
    }

    /// Tool arguments as parameters
    ///
    /// Some models send the arguments as a JSON-encoded string. When that
    /// string does not parse, it is kept verbatim under `input` so the
    /// capability still sees what the model sent.
    fn convert_arguments(tool: &str, arguments: Value) -> Parameters {
        match arguments {
            Value::Object(map) => Parameters::from(map),
            Value::String(raw) => match serde_json::from_str::<Parameters>(&raw) {
                Ok(params) => params,
                Err(e) => {
                    tracing::warn!(tool, error = %e, "Tool arguments are not a JSON object, passing them as input");
                    Parameters::new().with("input", raw)
                }
            },
            Value::Null => Parameters::new(),
            other => {
                tracing::warn!(tool, arguments = %other, "Unexpected tool argument shape, passing it as input");
                Parameters::new().with("input", other)
            }
        }
    }

    fn map_transport_error(err: &reqwest::Error) -> AssistantError {
        if err.is_connect() || err.is_timeout() {
            AssistantError::ProviderUnavailable(err.to_string())
        } else {
            AssistantError::Provider(err.to_string())
        }
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "Ollama"
    }

    async fn send(&self, request: ProviderRequest) -> Result<ProviderResponse> {
        let body = self.build_request(&request)?;
        let url = format!("{}/api/chat", self.config.base_url());

        tracing::debug!(
            model = %body.model,
            messages = body.messages.len(),
            tools = body.tools.as_ref().map_or(0, Vec::len),
            "Sending Ollama chat request"
        );

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::map_transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AssistantError::Provider(format!("Ollama returned {status}: {detail}")));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| AssistantError::Provider(format!("Invalid Ollama response: {e}")))?;

        Ok(Self::convert_response(chat))
    }

    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/api/tags", self.config.base_url());
        match self.client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(e) => {
                tracing::warn!("Ollama health check failed: {}", e);
                Ok(false)
            }
        }
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = format!("{}/api/tags", self.config.base_url());
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Self::map_transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AssistantError::Provider(format!("Ollama returned {status}: {detail}")));
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| AssistantError::Provider(format!("Invalid Ollama model list: {e}")))?;

        Ok(tags
            .models
            .into_iter()
            .map(|m| ModelInfo {
                id: m.name.clone(),
                name: m.name,
                context_length: None, // Not exposed by /api/tags
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assistant_core::capability::{InputSchema, PropertySchema};
    use serde_json::json;

    #[test]
    fn test_config_defaults() {
        let config = OllamaConfig::default();
        assert_eq!(config.host, "http://localhost");
        assert_eq!(config.port, 11434);
        assert_eq!(config.base_url(), "http://localhost:11434");
    }

    #[test]
    fn test_config_from_lookup() {
        let config = OllamaConfig::from_lookup(|key| match key {
            "OLLAMA_HOST" => Some("http://gpu-box/".into()),
            "OLLAMA_PORT" => Some("not a port".into()),
            "OLLAMA_MODEL" => Some("qwen2.5".into()),
            _ => None,
        });
        assert_eq!(config.base_url(), "http://gpu-box:11434");
        assert_eq!(config.model, "qwen2.5");
    }

    #[test]
    fn test_message_conversion() {
        let call = ToolCall::new("c1", "calculator", Parameters::new().with("a", 1));
        let messages = vec![
            Message::user("Add one"),
            Message::assistant_with_tool_calls("", vec![call]),
            Message::tool("c1", "1"),
        ];

        let converted = OllamaProvider::convert_messages(&messages, Some("You are helpful."));
        assert_eq!(converted.len(), 4);
        assert_eq!(converted[0].role, "system");
        assert_eq!(converted[2].tool_calls[0].function.name, "calculator");
        assert_eq!(converted[2].tool_calls[0].function.arguments, json!({"a": 1}));
        assert_eq!(converted[3].role, "tool");
        assert_eq!(converted[3].tool_name.as_deref(), Some("calculator"));
    }

    #[test]
    fn test_request_omits_tools_when_none() {
        let provider = OllamaProvider::localhost().unwrap();
        let request = ProviderRequest::new("s", vec![Message::user("hi")]);

        let body = serde_json::to_value(provider.build_request(&request).unwrap()).unwrap();
        assert!(body.get("tools").is_none());
        assert_eq!(body["stream"], json!(false));
        assert_eq!(body["model"], json!("llama3.2"));
        assert_eq!(body["options"]["num_predict"], json!(2048));
    }

    #[test]
    fn test_request_includes_tool_schema() {
        let provider = OllamaProvider::localhost().unwrap();
        let tool = ToolDefinition {
            name: "hello_world".into(),
            description: "Greets someone".into(),
            input_schema: InputSchema::new().required_property("input", PropertySchema::string("Name")),
        };
        let mut request = ProviderRequest::new("s", vec![Message::user("hi")]).with_tools(vec![tool]);
        request.model = Some("mistral".into());

        let body = serde_json::to_value(provider.build_request(&request).unwrap()).unwrap();
        assert_eq!(body["model"], json!("mistral"));
        assert_eq!(body["tools"][0]["type"], json!("function"));
        assert_eq!(body["tools"][0]["function"]["parameters"]["required"], json!(["input"]));
    }

    #[test]
    fn test_response_with_tool_calls() {
        let raw = json!({
            "model": "llama3.2",
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [
                    {"function": {"name": "calculator", "arguments": {"operation": "add", "a": 15, "b": 27}}},
                    {"function": {"name": "hello_world", "arguments": "{\"input\": \"Alice\"}"}}
                ]
            },
            "done_reason": "stop",
            "prompt_eval_count": 10,
            "eval_count": 5
        });

        let response = OllamaProvider::convert_response(serde_json::from_value(raw).unwrap());
        assert_eq!(response.tool_calls.len(), 2);
        assert_ne!(response.tool_calls[0].id, response.tool_calls[1].id);
        assert_eq!(response.tool_calls[0].input.f64("b"), Some(27.0));
        assert_eq!(response.tool_calls[1].input.str("input"), Some("Alice"));
        assert_eq!(response.stop_reason, Some(StopReason::ToolUse));
        assert_eq!(response.token_count, 15);
    }

    #[test]
    fn test_malformed_string_arguments_are_kept_as_input() {
        let raw = json!({
            "model": "llama3.2",
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [
                    {"function": {"name": "hello_world", "arguments": "{\"input\": \"Alice\""}},
                    {"function": {"name": "hello_world", "arguments": "Alice"}},
                    {"function": {"name": "system_info"}}
                ]
            }
        });

        let response = OllamaProvider::convert_response(serde_json::from_value(raw).unwrap());
        assert_eq!(response.tool_calls.len(), 3);
        assert_eq!(response.tool_calls[0].input.str("input"), Some("{\"input\": \"Alice\""));
        assert_eq!(response.tool_calls[1].input.str("input"), Some("Alice"));
        assert!(response.tool_calls[2].input.is_empty());
    }

    /// Answers a single HTTP request with a fixed status and body
    async fn serve_once(status_line: &'static str, body: &'static str) -> u16 {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = vec![0; 8192];
            let _ = socket.read(&mut request).await;
            let reply = format!(
                "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(reply.as_bytes()).await.unwrap();
        });
        port
    }

    #[tokio::test]
    async fn test_list_models_checks_status() {
        let port = serve_once("500 Internal Server Error", r#"{"error":"model store corrupt"}"#).await;
        let provider = OllamaProvider::new("http://127.0.0.1", port).unwrap();

        let err = provider.list_models().await.unwrap_err();
        assert!(
            matches!(&err, AssistantError::Provider(msg) if msg.contains("500") && msg.contains("model store corrupt")),
            "unexpected error: {err}"
        );
    }

    #[tokio::test]
    async fn test_list_models_parses_tags() {
        let port = serve_once("200 OK", r#"{"models":[{"name":"llama3.2:latest"}]}"#).await;
        let provider = OllamaProvider::new("http://127.0.0.1", port).unwrap();

        let models = provider.list_models().await.unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].id, "llama3.2:latest");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_unavailable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let provider = OllamaProvider::new("http://127.0.0.1", port).unwrap();

        let err = provider.list_models().await.unwrap_err();
        assert!(matches!(err, AssistantError::ProviderUnavailable(_)), "unexpected error: {err}");
        assert!(!provider.health_check().await.unwrap());
    }

    #[test]
    fn test_plain_response() {
        let raw = json!({
            "model": "llama3.2",
            "message": {"role": "assistant", "content": "Hello, World!"},
            "done_reason": "length"
        });

        let response = OllamaProvider::convert_response(serde_json::from_value(raw).unwrap());
        assert_eq!(response.text, "Hello, World!");
        assert!(response.tool_calls.is_empty());
        assert_eq!(response.stop_reason, Some(StopReason::Length));
    }
}
