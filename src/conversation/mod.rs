//! Conversation model, store contract and session-binding manager.

pub mod manager;
pub mod store;

pub use manager::ConversationManager;
pub use store::{ConversationStore, InMemoryConversationStore};

use crate::llm::{Role, ToolCall};
use serde::{Deserialize, Serialize};

/// One role-tagged entry in a conversation's history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
    pub tool_calls: Option<Vec<ToolCall>>,
    pub tool_call_id: Option<String>,

    /// Ephemeral: stripped before persistence, never written to storage.
    #[serde(skip)]
    pub no_save: bool,

    /// Marks assistant/tool entries produced by a tool-call round trip so a
    /// later read can re-apply the pruning rule in §4.4.4.
    #[serde(default)]
    pub tool_call_history: bool,
}

impl HistoryEntry {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
            no_save: false,
            tool_call_history: false,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
            no_save: false,
            tool_call_history: false,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
            no_save: false,
            tool_call_history: false,
        }
    }
}

/// Prune a history list so only complete `assistant(tool_calls) +
/// tool(...)*` groups survive: a bare tool entry, or an assistant entry
/// whose `tool_calls` lack any following tool replies, is dropped. Entries
/// not marked `tool_call_history` pass through untouched. Mirrors
/// `_process_tool_message_pairs` in the original LLM-request stage.
pub fn prune_tool_pairs(entries: Vec<HistoryEntry>) -> Vec<HistoryEntry> {
    let mut out = Vec::with_capacity(entries.len());
    let mut i = 0;
    while i < entries.len() {
        let entry = &entries[i];
        if !entry.tool_call_history {
            out.push(entries[i].clone());
            i += 1;
            continue;
        }

        if entry.role == Role::Assistant {
            let expected_ids: Vec<&str> = entry
                .tool_calls
                .as_ref()
                .map(|calls| calls.iter().map(|c| c.id.as_str()).collect())
                .unwrap_or_default();

            let mut j = i + 1;
            let mut collected = Vec::new();
            while j < entries.len() && entries[j].tool_call_history && entries[j].role == Role::Tool {
                collected.push(j);
                j += 1;
            }

            let collected_ids: Vec<&str> = collected.iter().map(|&k| entries[k].tool_call_id.as_deref().unwrap_or("")).collect();

            if !expected_ids.is_empty() && collected_ids == expected_ids {
                out.push(entries[i].clone());
                for &k in &collected {
                    out.push(entries[k].clone());
                }
            }
            // else: orphaned assistant tool_calls entry (and any stray tool
            // replies that don't match) are dropped entirely.
            i = j;
        } else {
            // A bare tool entry not preceded by a matching assistant: drop.
            i += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ToolCall;

    fn tool_call(id: &str) -> ToolCall {
        ToolCall { id: id.into(), name: "add".into(), arguments: serde_json::json!({}) }
    }

    #[test]
    fn keeps_complete_groups() {
        let mut assistant = HistoryEntry::assistant("");
        assistant.tool_calls = Some(vec![tool_call("t1")]);
        assistant.tool_call_history = true;

        let mut tool = HistoryEntry {
            role: Role::Tool,
            content: "3".into(),
            tool_calls: None,
            tool_call_id: Some("t1".into()),
            no_save: false,
            tool_call_history: true,
        };
        let _ = &mut tool;

        let entries = vec![HistoryEntry::user("2+1"), assistant, tool, HistoryEntry::assistant("3")];
        let pruned = prune_tool_pairs(entries);
        assert_eq!(pruned.len(), 4);
    }

    #[test]
    fn drops_orphan_tool_calls() {
        let mut assistant = HistoryEntry::assistant("");
        assistant.tool_calls = Some(vec![tool_call("t1")]);
        assistant.tool_call_history = true;

        let entries = vec![HistoryEntry::user("hi"), assistant];
        let pruned = prune_tool_pairs(entries);
        assert_eq!(pruned.len(), 1);
        assert_eq!(pruned[0].role, Role::User);
    }

    #[test]
    fn drops_bare_tool_entry() {
        let tool = HistoryEntry {
            role: Role::Tool,
            content: "3".into(),
            tool_calls: None,
            tool_call_id: Some("t1".into()),
            no_save: false,
            tool_call_history: true,
        };
        let pruned = prune_tool_pairs(vec![tool]);
        assert!(pruned.is_empty());
    }

    #[test]
    fn passes_through_non_tool_marked_entries() {
        let entries = vec![HistoryEntry::user("hi"), HistoryEntry::assistant("hello")];
        let pruned = prune_tool_pairs(entries.clone());
        assert_eq!(pruned, entries);
    }
}
