//! Crate-wide error types.

use thiserror::Error;

/// Top-level error for operations that span more than one subsystem
/// (lifecycle bring-up, pipeline execution, conversation I/O).
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("provider error: {0}")]
    Provider(#[from] crate::llm::ProviderError),

    #[error("conversation store error: {0}")]
    Store(#[from] StoreError),

    #[error("tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("pipeline error: {0}")]
    Pipeline(String),
}

/// Errors raised by the conversation and preference stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("conversation {0} not found")]
    NotFound(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while managing or invoking function tools.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),

    #[error("remote server {0} unavailable")]
    RemoteUnavailable(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("execution error: {0}")]
    Execution(String),
}

/// Classification of a provider-side failure, used to decide the retry
/// strategy in [`crate::llm::provider`]. Mirrors the original's string-match
/// dispatch over vendor error messages, but as a closed enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Rotate to the next configured API key and retry.
    RetryKey,
    /// Pop the oldest history entry and retry.
    TrimHistory,
    /// Strip image components and retry.
    DropImages,
    /// Drop the tool schema and retry.
    DropTools,
    /// Disable the system prompt and retry.
    DropSystemPrompt,
    /// Not retriable; surface as `role = err`.
    Fatal,
}

impl ErrorClass {
    /// Classify a raw provider error message the way the original
    /// classifies vendor errors: by matching on recognizable substrings.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_ascii_lowercase();
        if lower.contains("rate limit") || lower.contains("429") || lower.contains("invalid_api_key")
        {
            ErrorClass::RetryKey
        } else if lower.contains("maximum context length") || lower.contains("context_length_exceeded")
        {
            ErrorClass::TrimHistory
        } else if lower.contains("image") && (lower.contains("unsupported") || lower.contains("not supported"))
        {
            ErrorClass::DropImages
        } else if lower.contains("tool") && (lower.contains("unsupported") || lower.contains("not supported"))
        {
            ErrorClass::DropTools
        } else if lower.contains("system") && lower.contains("not supported") {
            ErrorClass::DropSystemPrompt
        } else {
            ErrorClass::Fatal
        }
    }
}
