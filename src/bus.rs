//! Event bus: a bounded FIFO queue plus the single dispatcher loop that
//! spawns one concurrent pipeline run per event without awaiting it (§4.1).

use crate::event::InboundEvent;
use crate::pipeline::PipelineScheduler;
use log::{error, info};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub struct EventBus {
    sender: mpsc::Sender<InboundEvent>,
}

impl EventBus {
    /// Enqueue an event. Blocks (yielding) when the queue is full — this is
    /// the system's only backpressure mechanism.
    pub async fn publish(&self, event: InboundEvent) {
        if self.sender.send(event).await.is_err() {
            error!("event bus dispatcher has shut down; dropping event");
        }
    }

    pub fn sender(&self) -> mpsc::Sender<InboundEvent> {
        self.sender.clone()
    }
}

/// Own the queue and run the dispatcher loop until the sender side is
/// dropped. Returns the bus handle and the dispatcher's join handle so the
/// lifecycle coordinator can publish events and later await shutdown.
pub fn spawn(capacity: usize, scheduler: Arc<PipelineScheduler>) -> (EventBus, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<InboundEvent>(capacity);

    let handle = tokio::spawn(async move {
        while let Some(mut event) = rx.recv().await {
            let outline = format!("[{}] {}: {}", event.platform_name, event.sender_outline(), event.message_outline());
            info!("{outline}");
            crate::logger::log(&outline);
            let scheduler = scheduler.clone();
            tokio::spawn(async move {
                scheduler.execute(&mut event).await;
            });
        }
    });

    (EventBus { sender: tx }, handle)
}
