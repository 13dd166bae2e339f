//! Error Types

use thiserror::Error;

/// Result type alias for assistant operations
pub type Result<T> = std::result::Result<T, AssistantError>;

/// Assistant error types
#[derive(Error, Debug)]
pub enum AssistantError {
    /// Caller supplied an invalid argument (empty session id, empty input, ...)
    #[error("Validation error: {0}")]
    Validation(String),

    /// A capability with the same name is already registered
    #[error("Capability already registered: {0}")]
    DuplicateCapability(String),

    /// Capability not found in registry
    #[error("Capability not found: {0}")]
    CapabilityNotFound(String),

    /// Capability execution failed unexpectedly
    #[error("Capability execution error: {0}")]
    CapabilityExecution(String),

    /// The loop ran out of iterations before the model produced a final answer
    #[error("Maximum iterations ({0}) exceeded without a final answer")]
    MaxIterationsExceeded(usize),

    /// LLM provider error
    #[error("Provider error: {0}")]
    Provider(String),

    /// Provider unavailable or not responding
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The turn was cancelled by the caller
    #[error("Turn cancelled")]
    Cancelled,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl AssistantError {
    /// Check if error is retryable
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ProviderUnavailable(_))
    }

    /// Errors the caller caused and must fix before calling again
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::DuplicateCapability(_)
                | Self::CapabilityNotFound(_)
                | Self::MaxIterationsExceeded(_)
        )
    }

    /// Stable machine-readable code
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::DuplicateCapability(_) => "DUPLICATE_CAPABILITY",
            Self::CapabilityNotFound(_) => "CAPABILITY_NOT_FOUND",
            Self::CapabilityExecution(_) => "CAPABILITY_ERROR",
            Self::MaxIterationsExceeded(_) => "MAX_ITERATIONS_EXCEEDED",
            Self::Provider(_) => "PROVIDER_ERROR",
            Self::ProviderUnavailable(_) => "PROVIDER_UNAVAILABLE",
            Self::Cancelled => "CANCELLED",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Json(_) | Self::Other(_) => "INTERNAL_ERROR",
        }
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(msg) => format!("Invalid request: {msg}"),
            Self::DuplicateCapability(name) => format!("The capability '{name}' is already registered."),
            Self::CapabilityNotFound(name) => format!("The capability '{name}' is not available."),
            Self::MaxIterationsExceeded(_) => "The request took too many steps to process. Please try a simpler query.".into(),
            Self::Provider(msg) => format!("The AI service encountered an error: {msg}"),
            Self::ProviderUnavailable(_) => "The AI service is currently unavailable. Please try again.".into(),
            Self::Cancelled => "The request was cancelled.".into(),
            _ => "An unexpected error occurred.".into(),
        }
    }
}

impl From<anyhow::Error> for AssistantError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
