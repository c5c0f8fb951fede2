//! Fifth and final stage (§6.5, §4.8): dispatches the event result to the
//! originating platform adapter, applying path mapping, the emptiness
//! check, and segmented-reply pacing.

use crate::config::IntervalMethod;
use crate::event::InboundEvent;
use crate::message::{MessageChain, MessageComponent};
use crate::path_mapping;
use crate::pipeline::{PipelineContext, Stage, StageOutcome};
use crate::plugin::EventKind;
use crate::result::ContentKind;
use rand::Rng;
use std::time::Duration;

pub struct ReplyStage;

#[async_trait::async_trait]
impl Stage for ReplyStage {
    fn name(&self) -> &'static str {
        "reply"
    }

    async fn pre_process(&self, event: &mut InboundEvent, ctx: &PipelineContext) -> StageOutcome {
        let Some(result) = event.take_result() else {
            return StageOutcome::Continue;
        };

        let adapter = ctx.adapter(&event.platform_id);

        match result.content_kind {
            ContentKind::StreamingFinal => {
                // Already dispatched by its producer.
            }
            ContentKind::StreamingInProgress => {
                if let (Some(adapter), Some(stream)) = (&adapter, result.stream) {
                    let fallback_to_segments = !ctx.config.segmented_reply.enable;
                    let _ = adapter.send_streaming(&event.session_id_raw, stream, fallback_to_segments).await;
                    event.has_sent = true;
                }
            }
            ContentKind::Generic | ContentKind::LlmFinal => {
                let mut chain = result.chain;
                apply_path_mapping(&mut chain, &ctx.config.path_mapping_rules);

                if chain.is_empty() {
                    run_after_sent_hooks(event, ctx).await;
                    return StageOutcome::Stop;
                }

                let only_llm = result.content_kind == ContentKind::LlmFinal;
                let segment = ctx.config.segmented_reply.enable && (!ctx.config.segmented_reply.only_llm_result || only_llm);

                if let Some(adapter) = &adapter {
                    if segment {
                        send_segmented(adapter.as_ref(), &event.session_id_raw, chain, &ctx.config.segmented_reply).await;
                    } else {
                        let _ = adapter.send(&event.session_id_raw, &chain).await;
                    }
                    event.has_sent = true;
                }
            }
        }

        run_after_sent_hooks(event, ctx).await;
        StageOutcome::Continue
    }
}

fn apply_path_mapping(chain: &mut MessageChain, raw_rules: &[String]) {
    if raw_rules.is_empty() {
        return;
    }
    let rules = path_mapping::parse_rules(raw_rules);
    for component in &mut chain.components {
        if let MessageComponent::File { source, .. } = component {
            *source = path_mapping::apply(&rules, source);
        }
    }
}

async fn send_segmented(adapter: &dyn crate::adapter::PlatformAdapter, session_id: &str, mut chain: MessageChain, config: &crate::config::SegmentedReplyConfig) {
    let decorations = chain.extract_decorations();

    let mut first = true;
    for component in chain.components {
        if component.is_empty() {
            continue;
        }
        if !first {
            tokio::time::sleep(pacing_delay(&component, config)).await;
        }
        first = false;

        let mut segment = MessageChain::new();
        segment.components.extend(decorations.iter().cloned());
        segment.components.push(component);

        let _ = adapter.send(session_id, &segment).await;
    }
}

fn pacing_delay(component: &MessageComponent, config: &crate::config::SegmentedReplyConfig) -> Duration {
    match config.interval_method {
        IntervalMethod::Log => {
            let word_count = match component {
                MessageComponent::Plain { text } => text.split_whitespace().count().max(1),
                _ => 1,
            };
            let seconds = config.log_base.max(1.001).log(word_count as f64 + 1.0).max(0.0);
            Duration::from_secs_f64(seconds)
        }
        IntervalMethod::Random => {
            let (lo, hi) = config.interval;
            let seconds = if hi > lo { rand::thread_rng().gen_range(lo..hi) } else { lo };
            Duration::from_secs_f64(seconds.max(0.0))
        }
    }
}

async fn run_after_sent_hooks(event: &mut InboundEvent, _ctx: &PipelineContext) {
    let handlers: Vec<_> = event
        .extras
        .activated_handlers
        .iter()
        .filter(|h| h.event_kind == EventKind::OnAfterMessageSent)
        .cloned()
        .collect();

    for handler in handlers {
        if let Some(result) = handler.call(event).await {
            let stopped = result.is_stopped();
            event.set_result(result);
            if stopped {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::PlatformAdapter;
    use crate::config::PipelineConfig;
    use crate::conversation::{ConversationManager, InMemoryConversationStore};
    use crate::error::CoreError;
    use crate::event::{Sender, SenderRole};
    use crate::preferences::InMemoryPreferenceStore;
    use crate::result::{ChainStream, EventResult};
    use crate::tools::FunctionToolManager;
    use std::sync::{Arc, Mutex};

    struct RecordingAdapter {
        sent: Mutex<Vec<MessageChain>>,
    }

    #[async_trait::async_trait]
    impl PlatformAdapter for RecordingAdapter {
        fn name(&self) -> &str {
            "recording"
        }
        fn id(&self) -> &str {
            "tg"
        }
        async fn send(&self, _session_id: &str, chain: &MessageChain) -> Result<(), CoreError> {
            self.sent.lock().unwrap().push(chain.clone());
            Ok(())
        }
        async fn send_streaming(&self, _session_id: &str, _stream: ChainStream, _fallback: bool) -> Result<(), CoreError> {
            Ok(())
        }
        async fn terminate(&self) -> Result<(), CoreError> {
            Ok(())
        }
    }

    async fn context() -> (PipelineContext, Arc<RecordingAdapter>) {
        let conversations = ConversationManager::start(Arc::new(InMemoryConversationStore::new()), Arc::new(InMemoryPreferenceStore::new())).await;
        let ctx = PipelineContext::new(Arc::new(PipelineConfig::default()), Arc::new(crate::plugin::HandlerRegistry::new()), conversations, Arc::new(FunctionToolManager::new()), None);
        let adapter = Arc::new(RecordingAdapter { sent: Mutex::new(Vec::new()) });
        ctx.register_adapter(adapter.clone());
        (ctx, adapter)
    }

    fn event() -> InboundEvent {
        InboundEvent::new("tg", "tg", "friend_message", "u1", Sender { id: "u1".into(), nickname: None, role: SenderRole::Member }, MessageChain::from_text("hi"))
    }

    #[tokio::test]
    async fn ordinary_chain_is_sent_once() {
        let (ctx, adapter) = context().await;
        let mut event = event();
        event.set_result(EventResult::text("hello"));
        ReplyStage.pre_process(&mut event, &ctx).await;
        assert_eq!(adapter.sent.lock().unwrap().len(), 1);
        assert!(event.has_sent);
    }

    #[tokio::test]
    async fn empty_chain_is_dropped_and_stops() {
        let (ctx, adapter) = context().await;
        let mut event = event();
        event.set_result(EventResult::text("   "));
        let outcome = ReplyStage.pre_process(&mut event, &ctx).await;
        assert_eq!(outcome, StageOutcome::Stop);
        assert!(adapter.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn segmented_reply_sends_one_message_per_component_with_decorations() {
        let (mut ctx, adapter) = context().await;
        ctx.config = Arc::new({
            let mut c = PipelineConfig::default();
            c.segmented_reply.enable = true;
            c.segmented_reply.only_llm_result = false;
            c.segmented_reply.interval = (0.0, 0.0);
            c
        });
        let mut event = event();
        let chain = MessageChain::new()
            .push(MessageComponent::At { target_id: "u1".into(), display_name: None })
            .push(MessageComponent::Plain { text: "a".into() })
            .push(MessageComponent::Plain { text: "b".into() });
        event.set_result(EventResult { chain, ..EventResult::text("") });

        ReplyStage.pre_process(&mut event, &ctx).await;
        let sent = adapter.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|c| c.components.iter().any(|comp| matches!(comp, MessageComponent::At { .. }))));
    }
}
