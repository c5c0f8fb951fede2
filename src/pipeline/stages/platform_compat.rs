//! Second stage (§6.2): marks every activated handler's platform-compatible
//! flag for `event.platform_id`, then caches the compatible subset in
//! `extras.activated_handlers` so the LLM-request and reply stages don't
//! need to re-query the registry. Grounded on
//! `astrbot.core.pipeline.platform_compatibility.stage.PlatformCompatibilityStage`.

use crate::event::InboundEvent;
use crate::pipeline::{PipelineContext, Stage, StageOutcome};
use crate::plugin::{is_enabled_for_platform, EventKind};

const RELEVANT_KINDS: [EventKind; 4] = [
    EventKind::AdapterMessage,
    EventKind::OnLlmRequest,
    EventKind::OnLlmResponse,
    EventKind::OnAfterMessageSent,
];

pub struct PlatformCompatStage;

#[async_trait::async_trait]
impl Stage for PlatformCompatStage {
    fn name(&self) -> &'static str {
        "platform_compatibility"
    }

    async fn pre_process(&self, event: &mut InboundEvent, ctx: &PipelineContext) -> StageOutcome {
        let enable_map = ctx.platform_enable_map.read().unwrap().clone();
        let mut compatible = Vec::new();

        for kind in RELEVANT_KINDS {
            let handlers = ctx.handlers.get_by_event_kind(kind, true, None, &enable_map);
            for handler in handlers {
                let is_compatible = is_enabled_for_platform(&enable_map, &handler.plugin_path, &event.platform_id);
                handler.set_platform_compatible(is_compatible);
                if is_compatible {
                    compatible.push(handler);
                }
            }
        }

        event.extras.activated_handlers = compatible;
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
    use crate::plugin::{Handler, HandlerMetadata, HandlerRegistry, PlatformEnableMap};
    use crate::preferences::InMemoryPreferenceStore;
    use crate::result::EventResult;
    use crate::tools::FunctionToolManager;
    use std::sync::Arc;

    struct NoopHandler;
    #[async_trait::async_trait]
    impl Handler for NoopHandler {
        async fn call(&self, _event: &mut InboundEvent) -> Option<EventResult> {
            None
        }
    }

    async fn context(enable_map: PlatformEnableMap) -> PipelineContext {
        let conversations = ConversationManager::start(Arc::new(InMemoryConversationStore::new()), Arc::new(InMemoryPreferenceStore::new())).await;
        let ctx = PipelineContext::new(Arc::new(PipelineConfig::default()), Arc::new(HandlerRegistry::new()), conversations, Arc::new(FunctionToolManager::new()), None);
        *ctx.platform_enable_map.write().unwrap() = enable_map;
        ctx
    }

    fn event() -> InboundEvent {
        InboundEvent::new("tg", "tg", "friend_message", "u1", Sender { id: "u1".into(), nickname: None, role: SenderRole::Member }, MessageChain::from_text("hi"))
    }

    #[tokio::test]
    async fn disabled_plugin_handler_is_excluded_from_cache() {
        let mut map = PlatformEnableMap::new();
        map.entry("tg".into()).or_default().insert("p".into(), false);
        let ctx = context(map).await;
        ctx.handlers.append(HandlerMetadata::new(EventKind::OnLlmRequest, "h1", "p", 0, "", Arc::new(NoopHandler)));

        let mut event = event();
        PlatformCompatStage.pre_process(&mut event, &ctx).await;
        assert!(event.extras.activated_handlers.is_empty());
    }

    #[tokio::test]
    async fn enabled_handler_is_cached_and_marked_compatible() {
        let ctx = context(PlatformEnableMap::new()).await;
        ctx.handlers.append(HandlerMetadata::new(EventKind::OnLlmRequest, "h1", "p", 0, "", Arc::new(NoopHandler)));

        let mut event = event();
        PlatformCompatStage.pre_process(&mut event, &ctx).await;
        assert_eq!(event.extras.activated_handlers.len(), 1);
        assert!(event.extras.activated_handlers[0].is_platform_compatible());
    }
}
