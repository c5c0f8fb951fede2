//! Inbound events and the unified session identifier.

use crate::llm::ProviderRequest;
use crate::message::MessageChain;
use crate::plugin::HandlerMetadata;
use crate::result::EventResult;
use std::collections::HashMap;
use std::sync::Arc;

/// Role of the sender within the originating chat, as far as this core
/// needs to know (used by permission-style stages; richer roles are an
/// adapter concern).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderRole {
    Member,
    Admin,
}

#[derive(Debug, Clone)]
pub struct Sender {
    pub id: String,
    pub nickname: Option<String>,
    pub role: SenderRole,
}

/// The `(platform, message-type, session-id)` triple, colon-joined. Keys the
/// conversation mapping. Each field must not itself contain `:`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnifiedOrigin(String);

impl UnifiedOrigin {
    pub fn new(platform: &str, message_type: &str, session_id: &str) -> Self {
        debug_assert!(!platform.contains(':') && !message_type.contains(':') && !session_id.contains(':'));
        Self(format!("{platform}:{message_type}:{session_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split back into its three fields. Only ever used for display/debug
    /// purposes, never to recover structured routing information.
    pub fn parts(&self) -> Option<(&str, &str, &str)> {
        let mut it = self.0.splitn(3, ':');
        Some((it.next()?, it.next()?, it.next()?))
    }
}

impl std::fmt::Display for UnifiedOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Scratchpad keys used by stages to pass private state across the pipeline
/// run. Each key has a static type, unlike the source's untyped dict.
#[derive(Debug, Default)]
pub struct Extras {
    pub provider_request: Option<ProviderRequest>,
    pub activated_handlers: Vec<HandlerMetadata>,
    pub tool_call_result: Option<MessageChain>,
    other: HashMap<String, serde_json::Value>,
}

impl Extras {
    pub fn set_other(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.other.insert(key.into(), value);
    }

    pub fn get_other(&self, key: &str) -> Option<&serde_json::Value> {
        self.other.get(key)
    }
}

/// An inbound message event, carried through the entire pipeline run.
pub struct InboundEvent {
    pub platform_id: String,
    pub platform_name: String,
    pub message_type: String,
    pub session_id_raw: String,
    pub sender: Sender,
    pub chain: MessageChain,
    pub message_str: String,
    pub is_wake: bool,
    pub is_at_or_wake_command: bool,
    pub extras: Extras,
    result: Option<EventResult>,
    stopped: bool,
    /// True once some stage has performed an actual send for this event
    /// (used by the web-chat empty-send guard).
    pub has_sent: bool,
}

impl InboundEvent {
    pub fn new(
        platform_id: impl Into<String>,
        platform_name: impl Into<String>,
        message_type: impl Into<String>,
        session_id_raw: impl Into<String>,
        sender: Sender,
        chain: MessageChain,
    ) -> Self {
        let message_str = chain.as_plain_text();
        Self {
            platform_id: platform_id.into(),
            platform_name: platform_name.into(),
            message_type: message_type.into(),
            session_id_raw: session_id_raw.into(),
            sender,
            chain,
            message_str,
            is_wake: false,
            is_at_or_wake_command: false,
            extras: Extras::default(),
            result: None,
            stopped: false,
            has_sent: false,
        }
    }

    pub fn unified_origin(&self) -> UnifiedOrigin {
        UnifiedOrigin::new(&self.platform_name, &self.message_type, &self.session_id_raw)
    }

    pub fn get_platform_id(&self) -> &str {
        &self.platform_id
    }

    pub fn sender_outline(&self) -> String {
        match &self.sender.nickname {
            Some(name) => format!("{}/{}", name, self.sender.id),
            None => self.sender.id.clone(),
        }
    }

    /// Short preview used in the dispatcher's log line.
    pub fn message_outline(&self) -> String {
        const MAX: usize = 80;
        let text = self.message_str.trim();
        if text.chars().count() <= MAX {
            text.to_string()
        } else {
            let truncated: String = text.chars().take(MAX).collect();
            format!("{truncated}…")
        }
    }

    pub fn set_result(&mut self, result: EventResult) {
        self.result = Some(result);
    }

    pub fn result(&self) -> Option<&EventResult> {
        self.result.as_ref()
    }

    pub fn take_result(&mut self) -> Option<EventResult> {
        self.result.take()
    }

    pub fn stop(&mut self) {
        self.stopped = true;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }
}

/// Shared, clonable handle some stages need to stash in `extras` (a
/// provider request references the conversation it was built against).
pub type SharedChain = Arc<MessageChain>;
