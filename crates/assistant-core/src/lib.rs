//! # assistant-core
//!
//! Tool-calling orchestration for the personal assistant: a provider-agnostic
//! loop that lets a language model invoke registered capabilities.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Orchestrator                          │
//! │  ┌──────────────┐  ┌──────────────┐  ┌────────────────────┐  │
//! │  │ SessionStore │  │  Capability  │  │    LlmProvider     │  │
//! │  │  (history)   │──│   Registry   │──│    (Strategy)      │  │
//! │  └──────────────┘  └──────────────┘  └────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `LlmProvider` trait keeps the loop independent of the backend; new
//! capabilities are added by implementing `Capability` and registering them.

pub mod capability;
pub mod error;
pub mod message;
pub mod orchestrator;
pub mod provider;
pub mod registry;
pub mod session;

pub use capability::{
    Capability, CapabilityContext, CapabilityResult, InputSchema, Parameters, PropertySchema,
    ToolDefinition,
};
pub use error::{AssistantError, Result};
pub use message::{Message, Role, ToolCall};
pub use orchestrator::{Orchestrator, OrchestratorBuilder, OrchestratorConfig, TurnOptions};
pub use provider::{LlmProvider, ModelInfo, ProviderRequest, ProviderResponse, StopReason};
pub use registry::CapabilityRegistry;
pub use session::{Session, SessionId, SessionStore, SessionTurn};

pub use tokio_util::sync::CancellationToken;
