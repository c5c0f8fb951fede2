//! Staged event pipeline: the onion-model scheduler and its stage
//! contract. Grounded on `astrbot.core.pipeline.stage.Stage` and
//! `astrbot.core.pipeline.scheduler.PipelineScheduler`.

pub mod context;
pub mod stages;

pub use context::PipelineContext;

use crate::event::InboundEvent;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// What a stage wants to happen next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    /// Do this stage's work, then let the driver move straight to the next
    /// stage — no post-processing callback. Corresponds to the source's
    /// plain-coroutine branch.
    Continue,
    /// Run all later stages first (the suspension point), then call
    /// [`Stage::post_process`] on this stage. Corresponds to the source's
    /// async-generator branch with exactly one `yield`.
    Suspend,
    /// Abort the whole run: no later stage and no post-processing runs.
    Stop,
}

#[async_trait::async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    async fn pre_process(&self, event: &mut InboundEvent, ctx: &PipelineContext) -> StageOutcome;

    /// Run only when `pre_process` returned [`StageOutcome::Suspend`] and
    /// the run was not stopped while later stages ran.
    async fn post_process(&self, _event: &mut InboundEvent, _ctx: &PipelineContext) {}
}

/// Fixed-order stage list plus the onion-model driver (spec §4.2, §6).
pub struct PipelineScheduler {
    stages: Vec<Arc<dyn Stage>>,
    ctx: Arc<PipelineContext>,
}

impl PipelineScheduler {
    pub fn new(stages: Vec<Arc<dyn Stage>>, ctx: Arc<PipelineContext>) -> Self {
        Self { stages, ctx }
    }

    /// Run the full stage list for one event, then apply the web-chat
    /// empty-send guard.
    pub async fn execute(&self, event: &mut InboundEvent) {
        self.run_from(0, event).await;

        if event.platform_name == "webchat" && !event.has_sent {
            if let Some(adapter) = self.ctx.adapter(&event.platform_id) {
                let _ = adapter.send(&event.session_id_raw, &crate::message::MessageChain::new()).await;
            }
        }
    }

    fn run_from<'a>(&'a self, index: usize, event: &'a mut InboundEvent) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            if event.is_stopped() {
                return;
            }
            let Some(stage) = self.stages.get(index) else { return };

            match stage.pre_process(event, &self.ctx).await {
                StageOutcome::Stop => event.stop(),
                StageOutcome::Continue => {
                    self.run_from(index + 1, event).await;
                }
                StageOutcome::Suspend => {
                    self.run_from(index + 1, event).await;
                    if !event.is_stopped() {
                        stage.post_process(event, &self.ctx).await;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::conversation::{ConversationManager, InMemoryConversationStore};
    use crate::event::{InboundEvent, Sender, SenderRole};
    use crate::message::MessageChain;
    use crate::preferences::InMemoryPreferenceStore;
    use crate::tools::FunctionToolManager;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct RecordingStage {
        label: &'static str,
        outcome: StageOutcome,
        trace: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait::async_trait]
    impl Stage for RecordingStage {
        fn name(&self) -> &'static str {
            self.label
        }
        async fn pre_process(&self, _event: &mut InboundEvent, _ctx: &PipelineContext) -> StageOutcome {
            self.trace.lock().unwrap().push(format!("{}:pre", self.label));
            self.outcome
        }
        async fn post_process(&self, _event: &mut InboundEvent, _ctx: &PipelineContext) {
            self.trace.lock().unwrap().push(format!("{}:post", self.label));
        }
    }

    async fn context() -> Arc<PipelineContext> {
        let conversations = ConversationManager::start(Arc::new(InMemoryConversationStore::new()), Arc::new(InMemoryPreferenceStore::new())).await;
        Arc::new(PipelineContext::new(
            Arc::new(PipelineConfig::default()),
            Arc::new(crate::plugin::HandlerRegistry::new()),
            conversations,
            Arc::new(FunctionToolManager::new()),
            None,
        ))
    }

    fn event() -> InboundEvent {
        InboundEvent::new("tg", "tg", "friend_message", "u1", Sender { id: "u1".into(), nickname: None, role: SenderRole::Member }, MessageChain::from_text("hi"))
    }

    #[tokio::test]
    async fn suspending_stage_runs_post_after_later_stages() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let stages: Vec<Arc<dyn Stage>> = vec![
            Arc::new(RecordingStage { label: "A", outcome: StageOutcome::Suspend, trace: trace.clone() }),
            Arc::new(RecordingStage { label: "B", outcome: StageOutcome::Continue, trace: trace.clone() }),
        ];
        let scheduler = PipelineScheduler::new(stages, context().await);
        let mut event = event();
        scheduler.execute(&mut event).await;

        let recorded = trace.lock().unwrap().clone();
        assert_eq!(recorded, vec!["A:pre", "B:pre", "A:post"]);
    }

    #[tokio::test]
    async fn stop_skips_remaining_stages_and_post_process() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let stages: Vec<Arc<dyn Stage>> = vec![
            Arc::new(RecordingStage { label: "A", outcome: StageOutcome::Suspend, trace: trace.clone() }),
            Arc::new(RecordingStage { label: "B", outcome: StageOutcome::Stop, trace: trace.clone() }),
            Arc::new(RecordingStage { label: "C", outcome: StageOutcome::Continue, trace: trace.clone() }),
        ];
        let scheduler = PipelineScheduler::new(stages, context().await);
        let mut event = event();
        scheduler.execute(&mut event).await;

        let recorded = trace.lock().unwrap().clone();
        assert_eq!(recorded, vec!["A:pre", "B:pre"]);
    }

    #[tokio::test]
    async fn dispatcher_runs_stages_in_declared_order() {
        let order = Arc::new(AtomicUsize::new(0));
        struct OrderCheckingStage {
            expected: usize,
            order: Arc<AtomicUsize>,
        }
        #[async_trait::async_trait]
        impl Stage for OrderCheckingStage {
            fn name(&self) -> &'static str {
                "order"
            }
            async fn pre_process(&self, _event: &mut InboundEvent, _ctx: &PipelineContext) -> StageOutcome {
                assert_eq!(self.order.fetch_add(1, Ordering::SeqCst), self.expected);
                StageOutcome::Continue
            }
        }
        let stages: Vec<Arc<dyn Stage>> = (0..5)
            .map(|i| Arc::new(OrderCheckingStage { expected: i, order: order.clone() }) as Arc<dyn Stage>)
            .collect();
        let scheduler = PipelineScheduler::new(stages, context().await);
        let mut event = event();
        scheduler.execute(&mut event).await;
        assert_eq!(order.load(Ordering::SeqCst), 5);
    }
}
