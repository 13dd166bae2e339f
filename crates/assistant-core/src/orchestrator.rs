//! Tool-Calling Orchestrator
//!
//! Drives the request → execute → respond loop. Each turn appends the user
//! message, asks the provider for a completion, runs any requested
//! capabilities in the order the model emitted them, feeds the results back
//! and repeats until the model answers without tool calls or the iteration
//! bound is hit.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::sync::Arc;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::capability::{Capability, CapabilityContext};
use crate::error::{AssistantError, Result};
use crate::message::{Message, ToolCall};
use crate::provider::{LlmProvider, ProviderRequest};
use crate::registry::CapabilityRegistry;
use crate::session::{SessionId, SessionStore};

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful personal assistant. \
Use the available tools when they help answer the request, then reply concisely.";

const DEFAULT_MAX_ITERATIONS: usize = 10;

/// Orchestrator configuration
#[derive(Clone, Debug, PartialEq)]
pub struct OrchestratorConfig {
    /// System prompt used when a turn does not supply its own
    pub system_prompt: Option<String>,

    /// Maximum model round-trips per turn before giving up
    pub max_iterations: usize,

    /// Model override passed to the provider
    pub model: Option<String>,

    /// Temperature for sampling
    pub temperature: f32,

    /// Maximum tokens to generate per round-trip
    pub max_tokens: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            system_prompt: Some(DEFAULT_SYSTEM_PROMPT.into()),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            model: None,
            temperature: 0.7,
            max_tokens: 2048,
        }
    }
}

impl OrchestratorConfig {
    /// Load from `ASSISTANT_*` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup; invalid values keep their defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(model) = lookup("ASSISTANT_MODEL").filter(|m| !m.trim().is_empty()) {
            config.model = Some(model);
        }
        if let Some(prompt) = lookup("ASSISTANT_SYSTEM_PROMPT") {
            config.system_prompt = (!prompt.trim().is_empty()).then_some(prompt);
        }
        if let Some(temperature) = parse_var::<f32>(&lookup, "ASSISTANT_TEMPERATURE") {
            config.temperature = temperature;
        }
        if let Some(max_tokens) = parse_var::<u32>(&lookup, "ASSISTANT_MAX_TOKENS") {
            config.max_tokens = max_tokens;
        }
        match parse_var::<usize>(&lookup, "ASSISTANT_MAX_ITERATIONS") {
            Some(0) => tracing::warn!("ASSISTANT_MAX_ITERATIONS must be positive, keeping default"),
            Some(n) => config.max_iterations = n,
            None => {}
        }

        config
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(AssistantError::Config("max_iterations must be greater than zero".into()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(AssistantError::Config(format!(
                "temperature must be within 0.0..=2.0, got {}",
                self.temperature
            )));
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    raw.trim().parse().map_or_else(
        |_| {
            tracing::warn!(key, value = %raw, "Ignoring invalid configuration value");
            None
        },
        Some,
    )
}

/// Per-turn options
#[derive(Clone, Debug, Default)]
pub struct TurnOptions {
    /// System prompt for this turn; falls back to the configured one
    pub system_prompt: Option<String>,

    /// Iteration bound for this turn; falls back to the configured one
    pub max_iterations: Option<usize>,

    /// Cancels the turn when fired
    pub cancellation: CancellationToken,
}

impl TurnOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub const fn max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = Some(max);
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }
}

/// The tool-calling orchestrator
pub struct Orchestrator {
    provider: Arc<dyn LlmProvider>,
    registry: Arc<CapabilityRegistry>,
    sessions: SessionStore,
    config: OrchestratorConfig,
}

impl Orchestrator {
    /// Create a new orchestrator
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        registry: Arc<CapabilityRegistry>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            provider,
            registry,
            sessions: SessionStore::new(),
            config,
        }
    }

    /// Create with default configuration
    pub fn with_defaults(provider: Arc<dyn LlmProvider>, registry: Arc<CapabilityRegistry>) -> Self {
        Self::new(provider, registry, OrchestratorConfig::default())
    }

    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    /// Process one user message with the configured defaults
    pub async fn ask(&self, session_id: &str, user_text: &str) -> Result<String> {
        self.process_input(session_id, user_text, TurnOptions::default()).await
    }

    /// Run one full turn for `session_id` and return the model's final answer
    ///
    /// Turns on the same session are serialized; turns on different sessions
    /// run concurrently. The session lock is never held across the provider
    /// call. Clearing the session while the turn runs ends it with
    /// `Cancelled`, and none of its remaining writes land.
    pub async fn process_input(
        &self,
        session_id: &str,
        user_text: &str,
        options: TurnOptions,
    ) -> Result<String> {
        let max_iterations = options.max_iterations.unwrap_or(self.config.max_iterations);
        validate_input(session_id, user_text, max_iterations)?;

        let cancellation = options.cancellation;
        if cancellation.is_cancelled() {
            return Err(AssistantError::Cancelled);
        }

        let session = SessionId::from(session_id);
        let mut turn = self.sessions.begin_turn(&session);
        tokio::select! {
            () = turn.acquire() => {}
            () = cancellation.cancelled() => return Err(AssistantError::Cancelled),
        }

        if !turn.append(Message::user(user_text)) {
            return Err(session_cleared(&session));
        }

        let tools = self.registry.to_tool_definitions();
        let tools = (!tools.is_empty()).then_some(tools);
        let system_prompt = options
            .system_prompt
            .or_else(|| self.config.system_prompt.clone());

        for iteration in 1..=max_iterations {
            let Some(messages) = turn.snapshot() else {
                return Err(session_cleared(&session));
            };
            let request = ProviderRequest {
                session_id: session_id.to_string(),
                messages,
                tools: tools.clone(),
                system_prompt: system_prompt.clone(),
                model: self.config.model.clone(),
                temperature: self.config.temperature,
                max_tokens: self.config.max_tokens,
            };

            tracing::debug!(
                session = %session,
                iteration,
                messages = request.messages.len(),
                "Requesting model completion"
            );

            let response = tokio::select! {
                response = self.provider.send(request) => response?,
                () = cancellation.cancelled() => return Err(AssistantError::Cancelled),
            };

            if !response.has_tool_calls() {
                if !turn.append(Message::assistant(response.text.clone())) {
                    return Err(session_cleared(&session));
                }
                tracing::info!(
                    session = %session,
                    iterations = iteration,
                    tokens = response.token_count,
                    "Turn completed"
                );
                return Ok(response.text);
            }

            let mut round = Vec::with_capacity(response.tool_calls.len() + 1);
            let mut results = Vec::with_capacity(response.tool_calls.len());
            for call in &response.tool_calls {
                if cancellation.is_cancelled() {
                    return Err(AssistantError::Cancelled);
                }
                let content = self.execute_call(&session, call, &cancellation).await;
                results.push(Message::tool(call.id.clone(), content));
            }
            if cancellation.is_cancelled() {
                return Err(AssistantError::Cancelled);
            }

            // The call message and its results land together so a cancelled
            // round never leaves calls without results.
            round.push(Message::assistant_with_tool_calls(response.text, response.tool_calls));
            round.extend(results);
            if !turn.append_all(round) {
                return Err(session_cleared(&session));
            }
        }

        tracing::warn!(session = %session, max_iterations, "Iteration bound reached without a final answer");
        Err(AssistantError::MaxIterationsExceeded(max_iterations))
    }

    /// Run a single tool call and render its outcome as text for the model
    async fn execute_call(
        &self,
        session: &SessionId,
        call: &ToolCall,
        cancellation: &CancellationToken,
    ) -> String {
        let Some(capability) = self.registry.try_get(&call.name) else {
            tracing::warn!(tool = %call.name, "Model requested an unregistered capability");
            return format!("Error: Tool '{}' not found in capability registry.", call.name);
        };

        tracing::debug!(tool = %call.name, call_id = %call.id, "Executing capability");

        let context = CapabilityContext::from_parameters(call.input.clone())
            .with_cancellation(cancellation.clone())
            .with_session(session.as_str());

        match invoke(capability.as_ref(), context).await {
            Ok(result) => {
                if !result.success {
                    tracing::warn!(
                        tool = %call.name,
                        error = result.error_message.as_deref().unwrap_or_default(),
                        "Capability reported failure"
                    );
                }
                result.to_model_text()
            }
            Err(message) => {
                tracing::warn!(tool = %call.name, error = %message, "Capability raised an exception");
                format!("Exception executing tool '{}': {}", call.name, message)
            }
        }
    }

    /// Clear one session's history; returns whether it existed
    pub fn clear_history(&self, session_id: &str) -> bool {
        self.sessions.clear(&SessionId::from(session_id))
    }

    pub fn clear_all_histories(&self) {
        self.sessions.clear_all();
    }

    /// Number of sessions with history
    pub fn active_session_count(&self) -> usize {
        self.sessions.active_count()
    }

    /// Number of messages in a session; 0 for unknown sessions
    pub fn message_count(&self, session_id: &str) -> usize {
        self.sessions.message_count(&SessionId::from(session_id))
    }

    /// Snapshot of a session's history
    pub fn history(&self, session_id: &str) -> Vec<Message> {
        self.sessions.snapshot(&SessionId::from(session_id))
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Get the capability registry
    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }

    /// Get configuration
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }
}

/// A turn whose session was cleared under it ends as cancelled
fn session_cleared(session: &SessionId) -> AssistantError {
    tracing::info!(session = %session, "Session cleared during a running turn");
    AssistantError::Cancelled
}

fn validate_input(session_id: &str, user_text: &str, max_iterations: usize) -> Result<()> {
    if session_id.trim().is_empty() {
        return Err(AssistantError::Validation("session id must not be empty".into()));
    }
    if user_text.trim().is_empty() {
        return Err(AssistantError::Validation("input must not be empty".into()));
    }
    if max_iterations == 0 {
        return Err(AssistantError::Validation("max iterations must be greater than zero".into()));
    }
    Ok(())
}

/// Execute a capability, turning both `Err` and panics into a message
async fn invoke(
    capability: &dyn Capability,
    context: CapabilityContext,
) -> std::result::Result<crate::capability::CapabilityResult, String> {
    match AssertUnwindSafe(capability.execute(context)).catch_unwind().await {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(err)) => Err(err.to_string()),
        Err(panic) => Err(panic_message(panic.as_ref())),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "capability panicked".into())
}

/// Builder for an [`Orchestrator`]
pub struct OrchestratorBuilder {
    provider: Option<Arc<dyn LlmProvider>>,
    registry: Option<Arc<CapabilityRegistry>>,
    capabilities: Vec<Arc<dyn Capability>>,
    config: OrchestratorConfig,
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            registry: None,
            capabilities: Vec::new(),
            config: OrchestratorConfig::default(),
        }
    }

    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Use an existing registry (shared with other components)
    pub fn registry(mut self, registry: Arc<CapabilityRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn capability<C: Capability + 'static>(mut self, capability: C) -> Self {
        self.capabilities.push(Arc::new(capability));
        self
    }

    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub const fn temperature(mut self, temp: f32) -> Self {
        self.config.temperature = temp;
        self
    }

    pub const fn max_iterations(mut self, max: usize) -> Self {
        self.config.max_iterations = max;
        self
    }

    pub fn build(self) -> Result<Orchestrator> {
        let provider = self
            .provider
            .ok_or_else(|| AssistantError::Config("Provider is required".into()))?;
        self.config.validate()?;

        let registry = self.registry.unwrap_or_default();
        registry.register_range(self.capabilities)?;

        Ok(Orchestrator::new(provider, registry, self.config))
    }
}
