//! LLM provider abstraction: wire types, the uniform chat contract with
//! retry/degrade machinery, and vendor tool-schema formatters.

pub mod formatters;
pub mod provider;
pub mod types;

pub use provider::{ChatStream, LLMProvider, ProviderError, RetryingProvider, VendorBackend};
pub use types::{
    FinishReason, ImageRef, LLMResponse, ProviderRequest, ResponseRole, Role, Tool, ToolCall,
    ToolCallsResult, ToolResult, TokenUsage,
};
