//! Event result: what a pipeline run produces for the reply stage to send.

use crate::message::MessageChain;
use tokio::sync::mpsc;

/// Whether the pipeline should keep running later stages/handlers after
/// this result is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    Continue,
    Stop,
}

/// What kind of content a result carries, distinguishing plain handler
/// output from the LLM-request stage's streaming states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Generic,
    LlmFinal,
    StreamingInProgress,
    StreamingFinal,
}

/// A handle to an asynchronous stream of chains, used by
/// [`ContentKind::StreamingInProgress`] results. The producer pushes chunks
/// as they arrive; the reply stage owns the receiving half.
pub struct ChainStream {
    pub receiver: mpsc::UnboundedReceiver<MessageChain>,
}

impl std::fmt::Debug for ChainStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainStream").finish_non_exhaustive()
    }
}

/// What a stage or handler leaves behind for later stages and, ultimately,
/// the reply stage.
#[derive(Debug)]
pub struct EventResult {
    pub chain: MessageChain,
    pub propagation: Propagation,
    pub content_kind: ContentKind,
    pub stream: Option<ChainStream>,
}

impl Default for EventResult {
    fn default() -> Self {
        Self {
            chain: MessageChain::new(),
            propagation: Propagation::Continue,
            content_kind: ContentKind::Generic,
            stream: None,
        }
    }
}

impl EventResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            chain: MessageChain::from_text(text),
            ..Default::default()
        }
    }

    pub fn llm_final(chain: MessageChain) -> Self {
        Self {
            chain,
            content_kind: ContentKind::LlmFinal,
            ..Default::default()
        }
    }

    pub fn streaming(stream: ChainStream) -> Self {
        Self {
            content_kind: ContentKind::StreamingInProgress,
            stream: Some(stream),
            ..Default::default()
        }
    }

    pub fn streaming_final() -> Self {
        Self {
            content_kind: ContentKind::StreamingFinal,
            ..Default::default()
        }
    }

    pub fn stop(mut self) -> Self {
        self.propagation = Propagation::Stop;
        self
    }

    pub fn is_stopped(&self) -> bool {
        self.propagation == Propagation::Stop
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_result_defaults_to_continue() {
        let result = EventResult::text("hi");
        assert!(!result.is_stopped());
        assert_eq!(result.content_kind, ContentKind::Generic);
    }

    #[test]
    fn stop_flips_propagation() {
        let result = EventResult::text("hi").stop();
        assert!(result.is_stopped());
    }
}
