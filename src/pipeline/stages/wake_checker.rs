//! First stage in the fixed order (§6.1): decides whether this message
//! counts as directed at the bot at all.

use crate::message::MessageComponent;
use crate::pipeline::{PipelineContext, Stage, StageOutcome};
use crate::event::InboundEvent;

pub struct WakeCheckerStage;

#[async_trait::async_trait]
impl Stage for WakeCheckerStage {
    fn name(&self) -> &'static str {
        "wake_checker"
    }

    async fn pre_process(&self, event: &mut InboundEvent, ctx: &PipelineContext) -> StageOutcome {
        let mentions_bot = event.chain.components.iter().any(|c| matches!(c, MessageComponent::At { .. } | MessageComponent::AtAll));

        let wake_prefixes = &ctx.config.wake_prefixes;
        let matches_prefix = wake_prefixes.is_empty()
            || wake_prefixes.iter().any(|prefix| event.message_str.starts_with(prefix.as_str()));

        event.is_at_or_wake_command = mentions_bot || matches_prefix;
        event.is_wake = event.is_at_or_wake_command;

        StageOutcome::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::conversation::{ConversationManager, InMemoryConversationStore};
    use crate::event::{Sender, SenderRole};
    use crate::message::MessageChain;
    use crate::preferences::InMemoryPreferenceStore;
    use crate::tools::FunctionToolManager;
    use std::sync::Arc;

    async fn context(wake_prefixes: Vec<String>) -> PipelineContext {
        let mut config = PipelineConfig::default();
        config.wake_prefixes = wake_prefixes;
        let conversations = ConversationManager::start(Arc::new(InMemoryConversationStore::new()), Arc::new(InMemoryPreferenceStore::new())).await;
        PipelineContext::new(Arc::new(config), Arc::new(crate::plugin::HandlerRegistry::new()), conversations, Arc::new(FunctionToolManager::new()), None)
    }

    fn event(text: &str) -> InboundEvent {
        InboundEvent::new("tg", "tg", "friend_message", "u1", Sender { id: "u1".into(), nickname: None, role: SenderRole::Member }, MessageChain::from_text(text))
    }

    #[tokio::test]
    async fn prefix_match_wakes() {
        let ctx = context(vec!["/bot".into()]).await;
        let mut event = event("/bot hi");
        WakeCheckerStage.pre_process(&mut event, &ctx).await;
        assert!(event.is_wake);
        assert!(event.is_at_or_wake_command);
    }

    #[tokio::test]
    async fn no_prefix_match_does_not_wake() {
        let ctx = context(vec!["/bot".into()]).await;
        let mut event = event("hello there");
        WakeCheckerStage.pre_process(&mut event, &ctx).await;
        assert!(!event.is_wake);
    }

    #[tokio::test]
    async fn empty_wake_prefixes_always_wakes() {
        let ctx = context(vec![]).await;
        let mut event = event("hello there");
        WakeCheckerStage.pre_process(&mut event, &ctx).await;
        assert!(event.is_wake);
    }
}
