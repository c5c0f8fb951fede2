//! Lifecycle coordinator: brings up every manager, owns the event queue,
//! fires `RuntimeReady` once, and tears everything down on graceful stop.
//! Grounded on `astrbot.core.core_lifecycle.AstrBotCoreLifecycle`, with the
//! "global singletons become explicit dependencies" redesign from §9 design
//! notes — nothing here is a process-wide static.

use crate::bus::{self, EventBus};
use crate::config::PipelineConfig;
use crate::conversation::{ConversationManager, ConversationStore};
use crate::event::{InboundEvent, Sender, SenderRole};
use crate::llm::LLMProvider;
use crate::message::MessageChain;
use crate::pipeline::stages::{LlmRequestStage, PermissionStage, PlatformCompatStage, ReplyStage, WakeCheckerStage};
use crate::pipeline::{PipelineContext, PipelineScheduler, Stage};
use crate::plugin::{EventKind, HandlerRegistry};
use crate::preferences::PreferenceStore;
use crate::tools::FunctionToolManager;
use log::info;
use std::sync::Arc;
use tokio::task::JoinHandle;

pub struct RuntimeHandle {
    pub ctx: Arc<PipelineContext>,
    pub bus: EventBus,
    dispatcher: JoinHandle<()>,
}

impl RuntimeHandle {
    /// Publish an inbound event onto the bus for pipeline processing.
    pub async fn publish(&self, event: InboundEvent) {
        self.bus.publish(event).await;
    }

    /// Cancel the dispatcher, flush the conversation manager, and fire the
    /// `RuntimeReady` kind's counterpart: nothing — shutdown has no
    /// equivalent broadcast event, only the flush guarantee from §9.
    pub async fn shutdown(self) {
        self.dispatcher.abort();
        self.ctx.conversations.shutdown().await;
    }
}

fn default_stages() -> Vec<Arc<dyn Stage>> {
    vec![
        Arc::new(WakeCheckerStage),
        Arc::new(PlatformCompatStage),
        Arc::new(PermissionStage),
        Arc::new(LlmRequestStage),
        Arc::new(ReplyStage),
    ]
}

/// Bring up the conversation manager, handler registry, tool manager and
/// event bus, then fire every registered `RuntimeReady` handler once before
/// returning the running handle.
pub async fn start(
    config: PipelineConfig,
    conversation_store: Arc<dyn ConversationStore>,
    preference_store: Arc<dyn PreferenceStore>,
    tools: Arc<FunctionToolManager>,
    provider: Option<Arc<dyn LLMProvider>>,
) -> RuntimeHandle {
    let handlers = Arc::new(HandlerRegistry::new());
    let conversations = ConversationManager::start(conversation_store, preference_store).await;
    let event_queue_capacity = config.event_queue_capacity;

    let ctx = Arc::new(PipelineContext::new(Arc::new(config), handlers.clone(), conversations, tools, provider));

    fire_runtime_ready(&ctx).await;

    let scheduler = Arc::new(PipelineScheduler::new(default_stages(), ctx.clone()));
    let (bus, dispatcher) = bus::spawn(event_queue_capacity, scheduler);

    info!("runtime started");
    crate::logger::log("runtime started");
    RuntimeHandle { ctx, bus, dispatcher }
}

async fn fire_runtime_ready(ctx: &PipelineContext) {
    let handlers = ctx.handlers.get_by_event_kind(EventKind::RuntimeReady, true, None, &ctx.platform_enable_map.read().unwrap().clone());
    let mut synthetic_event = InboundEvent::new(
        "system",
        "system",
        "runtime_ready",
        "system",
        Sender { id: "system".into(), nickname: None, role: SenderRole::Admin },
        MessageChain::new(),
    );
    for handler in handlers {
        if handler.call(&mut synthetic_event).await.map(|r| r.is_stopped()).unwrap_or(false) {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::InMemoryConversationStore;
    use crate::plugin::{Handler, HandlerMetadata};
    use crate::preferences::InMemoryPreferenceStore;
    use crate::result::EventResult;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct ReadyFlag(Arc<AtomicBool>);
    #[async_trait::async_trait]
    impl Handler for ReadyFlag {
        async fn call(&self, _event: &mut InboundEvent) -> Option<EventResult> {
            self.0.store(true, Ordering::SeqCst);
            None
        }
    }

    #[tokio::test]
    async fn runtime_ready_fires_once_on_start() {
        let fired = Arc::new(AtomicBool::new(false));
        let handlers = Arc::new(HandlerRegistry::new());
        handlers.append(HandlerMetadata::new(EventKind::RuntimeReady, "boot", "core", 0, "", Arc::new(ReadyFlag(fired.clone()))));

        let conversations = ConversationManager::start(Arc::new(InMemoryConversationStore::new()), Arc::new(InMemoryPreferenceStore::new())).await;
        let ctx = PipelineContext::new(Arc::new(PipelineConfig::default()), handlers, conversations, Arc::new(FunctionToolManager::new()), None);
        fire_runtime_ready(&ctx).await;

        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn start_and_shutdown_round_trip() {
        let handle = start(
            PipelineConfig::default(),
            Arc::new(InMemoryConversationStore::new()),
            Arc::new(InMemoryPreferenceStore::new()),
            Arc::new(FunctionToolManager::new().register_all_builtin()),
            None,
        )
        .await;
        handle.shutdown().await;
    }
}
