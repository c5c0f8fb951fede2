//! The platform adapter contract (spec §6). Concrete adapters — the actual
//! IM/webhook/web-chat integrations — are external collaborators; this
//! trait is the minimal surface the reply stage and lifecycle coordinator
//! drive.

use crate::error::CoreError;
use crate::message::MessageChain;
use crate::result::ChainStream;

#[async_trait::async_trait]
pub trait PlatformAdapter: Send + Sync {
    fn name(&self) -> &str;
    fn id(&self) -> &str;

    async fn send(&self, session_id: &str, chain: &MessageChain) -> Result<(), CoreError>;

    /// Send a stream of chains. `fallback_to_segments` tells an adapter
    /// that can't stream verbatim to instead segment-and-send as chunks
    /// complete.
    async fn send_streaming(&self, session_id: &str, stream: ChainStream, fallback_to_segments: bool) -> Result<(), CoreError>;

    async fn terminate(&self) -> Result<(), CoreError>;
}
