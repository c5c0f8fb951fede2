//! Shared LLM wire types: messages, tool calls, provider requests/responses.
//!
//! Adapted from the single-vendor `Message`/`Tool`/`ToolCall` set in the
//! original provider module; generalized here to the vendor-agnostic
//! contract the pipeline's LLM-request stage drives.

use crate::conversation::HistoryEntry;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Message role in conversation history and in provider requests.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool call requested by the assistant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// A tool definition advertised to the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// The result of executing one tool call, paired back to its id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub content: String,
    pub is_error: bool,
}

/// A reference to an image attached to a user turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRef {
    pub url_or_path: String,
}

/// The collected outcome of one tool-call round trip: the assistant segment
/// that requested the calls, paired with the tool entries that answer them.
#[derive(Debug, Clone, Default)]
pub struct ToolCallsResult {
    pub assistant_tool_calls: Vec<ToolCall>,
    pub assistant_text: String,
    pub tool_entries: Vec<ToolResult>,
}

impl ToolCallsResult {
    pub fn is_empty(&self) -> bool {
        self.tool_entries.is_empty()
    }

    /// Render this round trip as the pair of history entries the call loop
    /// appends: one assistant entry carrying `tool_calls`, followed by one
    /// tool entry per result, all tagged `_tool_call_history`.
    pub fn to_history_entries(&self) -> Vec<HistoryEntry> {
        let mut entries = Vec::with_capacity(1 + self.tool_entries.len());
        entries.push(HistoryEntry {
            role: Role::Assistant,
            content: self.assistant_text.clone(),
            tool_calls: Some(self.assistant_tool_calls.clone()),
            tool_call_id: None,
            no_save: false,
            tool_call_history: true,
        });
        for result in &self.tool_entries {
            entries.push(HistoryEntry {
                role: Role::Tool,
                content: result.content.clone(),
                tool_calls: None,
                tool_call_id: Some(result.tool_call_id.clone()),
                no_save: false,
                tool_call_history: true,
            });
        }
        entries
    }
}

/// Everything the LLM-request stage assembles before calling a provider.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    pub prompt: String,
    pub image_refs: Vec<ImageRef>,
    pub session_id: String,
    pub system_prompt: Option<String>,
    pub tools: Option<Vec<Tool>>,
    pub contexts: Vec<HistoryEntry>,
    pub tool_calls_result: Option<ToolCallsResult>,
}

impl ProviderRequest {
    pub fn new(prompt: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            image_refs: Vec::new(),
            session_id: session_id.into(),
            system_prompt: None,
            tools: None,
            contexts: Vec::new(),
            tool_calls_result: None,
        }
    }
}

/// Why a provider call or stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
}

#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cached_tokens: u32,
}

/// The role tag carried on an [`LLMResponse`] — distinct from [`Role`]
/// because providers can also answer with `err`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseRole {
    Assistant,
    Tool,
    Err,
}

/// One completion from a provider: either a streamed chunk (`is_chunk =
/// true`) or the terminal, persistable response.
#[derive(Debug, Clone)]
pub struct LLMResponse {
    pub role: ResponseRole,
    pub completion_text: String,
    pub result_chain: Option<crate::message::MessageChain>,
    pub tool_calls: Vec<ToolCall>,
    pub is_chunk: bool,
    pub finish_reason: Option<FinishReason>,
    pub usage: TokenUsage,
    pub raw: HashMap<String, serde_json::Value>,
}

impl LLMResponse {
    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self {
            role: ResponseRole::Assistant,
            completion_text: text.into(),
            result_chain: None,
            tool_calls: Vec::new(),
            is_chunk: false,
            finish_reason: Some(FinishReason::Stop),
            usage: TokenUsage::default(),
            raw: HashMap::new(),
        }
    }

    pub fn chunk(text: impl Into<String>) -> Self {
        Self {
            role: ResponseRole::Assistant,
            completion_text: text.into(),
            result_chain: None,
            tool_calls: Vec::new(),
            is_chunk: true,
            finish_reason: None,
            usage: TokenUsage::default(),
            raw: HashMap::new(),
        }
    }

    pub fn tool_calls(calls: Vec<ToolCall>, text: impl Into<String>) -> Self {
        Self {
            role: ResponseRole::Tool,
            completion_text: text.into(),
            result_chain: None,
            tool_calls: calls,
            is_chunk: false,
            finish_reason: Some(FinishReason::ToolCalls),
            usage: TokenUsage::default(),
            raw: HashMap::new(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            role: ResponseRole::Err,
            completion_text: message.into(),
            result_chain: None,
            tool_calls: Vec::new(),
            is_chunk: false,
            finish_reason: None,
            usage: TokenUsage::default(),
            raw: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_calls_result_renders_history_in_order() {
        let result = ToolCallsResult {
            assistant_tool_calls: vec![ToolCall { id: "t1".into(), name: "add".into(), arguments: serde_json::json!({}) }],
            assistant_text: String::new(),
            tool_entries: vec![ToolResult { tool_call_id: "t1".into(), content: "3".into(), is_error: false }],
        };
        let entries = result.to_history_entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].role, Role::Assistant);
        assert_eq!(entries[1].role, Role::Tool);
        assert_eq!(entries[1].tool_call_id.as_deref(), Some("t1"));
        assert!(entries[0].tool_call_history && entries[1].tool_call_history);
    }
}
