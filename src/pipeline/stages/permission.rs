//! Third stage (§6.3, §6 step 5): waking prerequisites, admin-only command
//! gating, and command/regex-trigger dispatch to plugin-contributed
//! `AdapterMessage` handlers. A message that never woke the bot (no prefix,
//! no at-mention) ends the run here rather than reaching the LLM-request
//! stage; an admin-only command from a non-admin sender ends it with a
//! denial reply. A handler that produces a result short-circuits the
//! LLM-request stage entirely — that is the "command sub-stage" branch from
//! §6's `Process` step.

use crate::event::{InboundEvent, SenderRole};
use crate::pipeline::{PipelineContext, Stage, StageOutcome};
use crate::plugin::EventKind;
use crate::result::EventResult;

pub struct PermissionStage;

#[async_trait::async_trait]
impl Stage for PermissionStage {
    fn name(&self) -> &'static str {
        "permission"
    }

    async fn pre_process(&self, event: &mut InboundEvent, ctx: &PipelineContext) -> StageOutcome {
        if !event.is_wake {
            return StageOutcome::Stop;
        }

        let requires_admin = ctx
            .config
            .admin_only_prefixes
            .iter()
            .any(|prefix| event.message_str.starts_with(prefix.as_str()));

        if requires_admin && event.sender.role != SenderRole::Admin {
            event.set_result(EventResult::text("permission denied: admin only").stop());
            return StageOutcome::Stop;
        }

        let adapter_handlers: Vec<_> = event
            .extras
            .activated_handlers
            .iter()
            .filter(|h| h.event_kind == EventKind::AdapterMessage)
            .cloned()
            .collect();

        for handler in adapter_handlers {
            if let Some(result) = handler.call(event).await {
                let stopped = result.is_stopped();
                event.set_result(result);
                if stopped {
                    return StageOutcome::Stop;
                }
            }
        }

        StageOutcome::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::conversation::{ConversationManager, InMemoryConversationStore};
    use crate::event::Sender;
    use crate::message::MessageChain;
    use crate::preferences::InMemoryPreferenceStore;
    use crate::tools::FunctionToolManager;
    use std::sync::Arc;

    async fn context(admin_only_prefixes: Vec<String>) -> PipelineContext {
        let mut config = PipelineConfig::default();
        config.admin_only_prefixes = admin_only_prefixes;
        let conversations = ConversationManager::start(Arc::new(InMemoryConversationStore::new()), Arc::new(InMemoryPreferenceStore::new())).await;
        PipelineContext::new(Arc::new(config), Arc::new(crate::plugin::HandlerRegistry::new()), conversations, Arc::new(FunctionToolManager::new()), None)
    }

    fn event(text: &str, role: SenderRole, is_wake: bool) -> InboundEvent {
        let mut event = InboundEvent::new("tg", "tg", "friend_message", "u1", Sender { id: "u1".into(), nickname: None, role }, MessageChain::from_text(text));
        event.is_wake = is_wake;
        event
    }

    #[tokio::test]
    async fn unwoken_message_stops() {
        let ctx = context(vec![]).await;
        let mut event = event("hi", SenderRole::Member, false);
        let outcome = PermissionStage.pre_process(&mut event, &ctx).await;
        assert_eq!(outcome, StageOutcome::Stop);
    }

    #[tokio::test]
    async fn admin_command_from_member_is_denied() {
        let ctx = context(vec!["/reload".into()]).await;
        let mut event = event("/reload", SenderRole::Member, true);
        let outcome = PermissionStage.pre_process(&mut event, &ctx).await;
        assert_eq!(outcome, StageOutcome::Stop);
        assert!(event.result().unwrap().is_stopped());
    }

    #[tokio::test]
    async fn admin_command_from_admin_proceeds() {
        let ctx = context(vec!["/reload".into()]).await;
        let mut event = event("/reload", SenderRole::Admin, true);
        let outcome = PermissionStage.pre_process(&mut event, &ctx).await;
        assert_eq!(outcome, StageOutcome::Continue);
    }

    struct CommandHandler;
    #[async_trait::async_trait]
    impl crate::plugin::Handler for CommandHandler {
        async fn call(&self, _event: &mut InboundEvent) -> Option<EventResult> {
            Some(EventResult::text("pong").stop())
        }
    }

    #[tokio::test]
    async fn adapter_message_handler_short_circuits_llm_request() {
        let ctx = context(vec![]).await;
        let mut event = event("/ping", SenderRole::Member, true);
        event.extras.activated_handlers = vec![crate::plugin::HandlerMetadata::new(EventKind::AdapterMessage, "ping", "core", 0, "", Arc::new(CommandHandler))];
        let outcome = PermissionStage.pre_process(&mut event, &ctx).await;
        assert_eq!(outcome, StageOutcome::Stop);
        assert_eq!(event.result().unwrap().chain.as_plain_text(), "pong");
    }
}
