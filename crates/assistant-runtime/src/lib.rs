//! # assistant-runtime
//!
//! Language-model providers for the personal assistant.
//!
//! ## Providers
//!
//! - **Ollama** (default): local inference with native tool calling
//!
//! ## Usage
//!
//! ```rust,ignore
//! use assistant_runtime::OllamaProvider;
//!
//! let provider = OllamaProvider::new("http://localhost", 11434)?;
//! let orchestrator = Orchestrator::builder()
//!     .provider(Arc::new(provider))
//!     .build()?;
//! ```

#[cfg(feature = "ollama")]
pub mod ollama;

#[cfg(feature = "ollama")]
pub use ollama::{OllamaConfig, OllamaProvider};

// Re-export core types for convenience
pub use assistant_core::{
    AssistantError, LlmProvider, Message, ModelInfo, ProviderRequest, ProviderResponse, Result,
    Role, ToolCall,
};
