//! Fourth stage (§6.4, §4.4): the largest stage. Builds a provider request,
//! drives the call loop (including tool-call round trips), and writes the
//! resulting history back to the conversation. Grounded on
//! `astrbot.core.pipeline.process_stage.method.llm_request.LLMRequestSubStage`.

use crate::conversation::{prune_tool_pairs, HistoryEntry};
use crate::event::InboundEvent;
use crate::llm::{
    LLMProvider, LLMResponse, ProviderRequest, ResponseRole, Role, ToolCall, ToolCallsResult, ToolResult,
};
use crate::message::{ImageSource, MessageChain, MessageComponent};
use crate::pipeline::{PipelineContext, Stage, StageOutcome};
use crate::plugin::EventKind;
use crate::result::{ChainStream, EventResult};
use crate::tools::FunctionToolManager;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;

pub struct LlmRequestStage;

#[async_trait::async_trait]
impl Stage for LlmRequestStage {
    fn name(&self) -> &'static str {
        "llm_request"
    }

    async fn pre_process(&self, event: &mut InboundEvent, ctx: &PipelineContext) -> StageOutcome {
        let Some(provider) = ctx.provider.clone() else {
            return StageOutcome::Continue;
        };

        let mut req = match event.extras.provider_request.take() {
            Some(req) => req,
            None => {
                let prompt = strip_wake_prefixes(&event.message_str, ctx.config.llm_wake_prefix.as_deref(), &ctx.config.wake_prefixes);
                let image_refs = extract_image_refs(&event.chain);
                if prompt.trim().is_empty() && image_refs.is_empty() {
                    return StageOutcome::Continue;
                }
                let mut req = ProviderRequest::new(prompt, event.unified_origin().as_str());
                req.image_refs = image_refs;
                req
            }
        };

        let session = event.unified_origin().as_str().to_string();
        let conversation = match ctx.conversations.current_or_create(&session).await {
            Ok(conversation) => conversation,
            Err(err) => {
                event.set_result(EventResult::text(format!("Request failed. type=ConversationError msg={err}")).stop());
                return StageOutcome::Stop;
            }
        };

        req.contexts = prune_tool_pairs(conversation.history.clone());
        let catalog = ctx.tools.catalog().await;
        req.tools = if catalog.is_empty() { None } else { Some(catalog) };

        event.extras.provider_request = Some(req);
        for handler in on_llm_request_handlers(event) {
            let stop_result = handler.call(event).await;
            if let Some(result) = stop_result {
                let stopped = result.is_stopped();
                event.set_result(result);
                if stopped {
                    return StageOutcome::Stop;
                }
            }
        }
        let mut req = event.extras.provider_request.take().expect("request survives the hook loop");

        truncate_context_window(&mut req.contexts, ctx.config.max_context_length, ctx.config.dequeue_context_length);

        let prior_contexts = req.contexts.clone();
        let user_entry = HistoryEntry::user(req.prompt.clone());
        req.contexts.push(user_entry.clone());

        let streaming = ctx.config.streaming_response;

        if streaming {
            let (tx, rx) = mpsc::unbounded_channel();
            event.set_result(EventResult::streaming(ChainStream { receiver: rx }));
            spawn_streaming_round_trip(provider, ctx.tools.clone(), ctx.conversations.clone(), session, conversation.id, prior_contexts, user_entry, req, tx);
            return StageOutcome::Continue;
        }

        let (outcome, appended) = run_call_loop(provider.as_ref(), &ctx.tools, req, false, None).await;
        persist_history(&ctx.conversations, &session, conversation.id, prior_contexts, user_entry, appended, &outcome).await;

        match outcome {
            LoopOutcome::Assistant(text) => {
                event.set_result(EventResult::llm_final(MessageChain::from_text(text)));
            }
            LoopOutcome::Error(message) => {
                event.set_result(EventResult::text(message));
            }
        }

        StageOutcome::Continue
    }
}

fn on_llm_request_handlers(event: &InboundEvent) -> Vec<crate::plugin::HandlerMetadata> {
    event
        .extras
        .activated_handlers
        .iter()
        .filter(|h| h.event_kind == EventKind::OnLlmRequest)
        .cloned()
        .collect()
}

/// Strip the configured LLM wake prefix from `text`, counted in code points
/// (the pinned resolution of the byte-vs-codepoint open question). If the
/// LLM wake prefix itself begins with one of the generic wake prefixes,
/// that outer prefix is stripped first.
fn strip_wake_prefixes(text: &str, llm_wake_prefix: Option<&str>, wake_prefixes: &[String]) -> String {
    let Some(llm_prefix) = llm_wake_prefix else {
        return text.to_string();
    };

    let outer = wake_prefixes.iter().find(|p| llm_prefix.starts_with(p.as_str()));
    let mut remaining: Vec<char> = text.chars().collect();

    if let Some(outer) = outer {
        remaining = strip_codepoint_prefix(&remaining, outer);
    }
    remaining = strip_codepoint_prefix(&remaining, llm_prefix);
    remaining.into_iter().collect()
}

fn strip_codepoint_prefix(text: &[char], prefix: &str) -> Vec<char> {
    let prefix_chars: Vec<char> = prefix.chars().collect();
    if text.len() >= prefix_chars.len() && text[..prefix_chars.len()] == prefix_chars[..] {
        text[prefix_chars.len()..].to_vec()
    } else {
        text.to_vec()
    }
}

fn extract_image_refs(chain: &MessageChain) -> Vec<crate::llm::ImageRef> {
    chain
        .components
        .iter()
        .filter_map(|c| match c {
            MessageComponent::Image { source } => Some(crate::llm::ImageRef {
                url_or_path: match source {
                    ImageSource::Url(s) | ImageSource::Path(s) | ImageSource::Base64(s) => s.clone(),
                },
            }),
            _ => None,
        })
        .collect()
}

/// Truncate to the last `(max_context_length - dequeue_context_length + 1)
/// * 2` entries, then advance the start to the first `user` entry so the
/// trimmed history begins at a user turn (§4.4).
fn truncate_context_window(contexts: &mut Vec<HistoryEntry>, max_context_length: Option<usize>, dequeue_context_length: usize) {
    let Some(max) = max_context_length else { return };
    if max == 0 || contexts.len() / 2 <= max {
        return;
    }

    let keep = (max.saturating_sub(dequeue_context_length) + 1) * 2;
    let start = contexts.len().saturating_sub(keep);
    let mut trimmed = contexts[start..].to_vec();
    if let Some(idx) = trimmed.iter().position(|e| e.role == Role::User) {
        trimmed = trimmed[idx..].to_vec();
    }
    *contexts = trimmed;
}

enum LoopOutcome {
    Assistant(String),
    Error(String),
}

/// Shared tool-round-trip + call-loop driver (§4.4's pseudocode), used by
/// both the streaming and non-streaming paths. `chunks`, when present,
/// receives each streamed partial chain as it arrives.
async fn run_call_loop(
    provider: &dyn LLMProvider,
    tools: &FunctionToolManager,
    mut req: ProviderRequest,
    streaming: bool,
    chunks: Option<mpsc::UnboundedSender<MessageChain>>,
) -> (LoopOutcome, Vec<HistoryEntry>) {
    let mut appended = Vec::new();

    loop {
        let final_response = if streaming {
            fetch_streaming_final(provider, &req, &chunks).await
        } else {
            match provider.text_chat(&req).await {
                Ok(response) => response,
                Err(err) => LLMResponse::error(format!("Request failed. type=Fatal msg={err}")),
            }
        };

        match final_response.role {
            ResponseRole::Err => return (LoopOutcome::Error(final_response.completion_text), appended),
            ResponseRole::Assistant => return (LoopOutcome::Assistant(final_response.completion_text), appended),
            ResponseRole::Tool => {
                let round_trip = execute_tool_round_trip(tools, &final_response.tool_calls).await;
                if round_trip.is_empty() {
                    return (LoopOutcome::Assistant(final_response.completion_text), appended);
                }
                let entries = round_trip.to_history_entries();
                appended.extend(entries.iter().cloned());
                req.contexts.extend(entries);
                req.tool_calls_result = Some(round_trip);
                req.tools = None;
                req.prompt = String::new();
            }
        }
    }
}

async fn fetch_streaming_final(provider: &dyn LLMProvider, req: &ProviderRequest, chunks: &Option<mpsc::UnboundedSender<MessageChain>>) -> LLMResponse {
    let mut stream = match provider.text_chat_stream(req).await {
        Ok(stream) => stream,
        Err(err) => return LLMResponse::error(format!("Request failed. type=Fatal msg={err}")),
    };

    let mut final_response = None;
    while let Some(item) = stream.next().await {
        match item {
            Ok(response) if response.is_chunk => {
                if let Some(tx) = chunks {
                    let _ = tx.send(MessageChain::from_text(response.completion_text));
                }
            }
            Ok(response) => final_response = Some(response),
            Err(err) => {
                final_response = Some(LLMResponse::error(format!("Request failed. type=Fatal msg={err}")));
                break;
            }
        }
    }
    final_response.unwrap_or_else(|| LLMResponse::error("Request failed. type=Fatal msg=stream ended without a final response"))
}

/// §4.4.3: tools belonging to a disabled plugin are silently skipped (the
/// manager's deactivation flag stands in for per-platform plugin gating);
/// execution errors become a `"error: <msg>"` tool entry rather than
/// aborting the round trip.
async fn execute_tool_round_trip(tools: &FunctionToolManager, calls: &[ToolCall]) -> ToolCallsResult {
    let mut tool_entries = Vec::new();
    let mut invoked_calls = Vec::new();

    for call in calls {
        match tools.execute(call).await {
            None => continue,
            Some(Ok(content)) => {
                invoked_calls.push(call.clone());
                tool_entries.push(ToolResult { tool_call_id: call.id.clone(), content, is_error: false });
            }
            Some(Err(err)) => {
                invoked_calls.push(call.clone());
                tool_entries.push(ToolResult { tool_call_id: call.id.clone(), content: format!("error: {err}"), is_error: true });
            }
        }
    }

    ToolCallsResult { assistant_tool_calls: invoked_calls, assistant_text: String::new(), tool_entries }
}

#[allow(clippy::too_many_arguments)]
fn spawn_streaming_round_trip(
    provider: Arc<dyn LLMProvider>,
    tools: Arc<FunctionToolManager>,
    conversations: Arc<crate::conversation::ConversationManager>,
    session: String,
    conversation_id: uuid::Uuid,
    prior_contexts: Vec<HistoryEntry>,
    user_entry: HistoryEntry,
    req: ProviderRequest,
    chunk_tx: mpsc::UnboundedSender<MessageChain>,
) {
    tokio::spawn(async move {
        let (outcome, appended) = run_call_loop(provider.as_ref(), tools.as_ref(), req, true, Some(chunk_tx.clone())).await;
        let final_text = match &outcome {
            LoopOutcome::Assistant(text) => text.clone(),
            LoopOutcome::Error(message) => message.clone(),
        };
        let _ = chunk_tx.send(MessageChain::from_text(final_text));
        persist_history(&conversations, &session, conversation_id, prior_contexts, user_entry, appended, &outcome).await;
    });
}

async fn persist_history(
    conversations: &crate::conversation::ConversationManager,
    session: &str,
    conversation_id: uuid::Uuid,
    prior_contexts: Vec<HistoryEntry>,
    user_entry: HistoryEntry,
    appended: Vec<HistoryEntry>,
    outcome: &LoopOutcome,
) {
    if let LoopOutcome::Error(_) = outcome {
        // A provider-fatal failure is surfaced to the user but never
        // written to the persisted dialogue (§4.4 Failure).
        return;
    }

    let mut history = prior_contexts;
    history.push(user_entry);
    history.extend(appended);
    if let LoopOutcome::Assistant(text) = outcome {
        history.push(HistoryEntry::assistant(text.clone()));
    }
    history.retain(|entry| !entry.no_save);

    let _ = conversations.update(session, conversation_id, history).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_wake_prefixes_strips_outer_then_llm_prefix() {
        let wake_prefixes = vec!["/bot".to_string()];
        let result = strip_wake_prefixes("/bot! hello", Some("/bot!"), &wake_prefixes);
        assert_eq!(result, " hello");
    }

    #[test]
    fn strip_wake_prefixes_counts_codepoints_not_bytes() {
        // "héllo" has 5 code points but 6 UTF-8 bytes; stripping a 1-codepoint
        // prefix must leave "éllo", not silently mis-slice mid-codepoint.
        let result = strip_wake_prefixes("héllo", Some("h"), &[]);
        assert_eq!(result, "éllo");
    }

    #[test]
    fn no_llm_wake_prefix_leaves_text_untouched() {
        assert_eq!(strip_wake_prefixes("hi", None, &[]), "hi");
    }

    #[test]
    fn truncate_context_window_keeps_trailing_entries_starting_at_user() {
        let mut contexts = vec![
            HistoryEntry::system("sys"),
            HistoryEntry::user("a"),
            HistoryEntry::assistant("b"),
            HistoryEntry::user("c"),
            HistoryEntry::assistant("d"),
        ];
        truncate_context_window(&mut contexts, Some(1), 0);
        assert_eq!(contexts.len(), 2);
        assert_eq!(contexts[0].content, "c");
    }

    #[test]
    fn truncate_context_window_noop_under_limit() {
        let mut contexts = vec![HistoryEntry::user("a"), HistoryEntry::assistant("b")];
        truncate_context_window(&mut contexts, Some(10), 0);
        assert_eq!(contexts.len(), 2);
    }
}
