//! Plugin and handler model: the contract stages consult to discover
//! user-contributed hooks.

pub mod registry;

pub use registry::HandlerRegistry;

use crate::event::InboundEvent;
use crate::result::EventResult;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The kind of pipeline moment a handler is bound to. `RuntimeReady` is
/// exempt from platform filtering (it fires once, before any platform is
/// even relevant) — renamed from the source's "AstrBot loaded" event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    AdapterMessage,
    OnLlmRequest,
    OnLlmResponse,
    OnAfterMessageSent,
    RuntimeReady,
}

/// A plugin-contributed callback. Handlers are plain async callbacks: they
/// run once per invocation and return an optional result, rather than
/// themselves suspending — the onion model lives at the stage level
/// (`crate::pipeline`), per the design note that either placement is
/// acceptable.
#[async_trait::async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, event: &mut InboundEvent) -> Option<EventResult>;
}

/// Metadata carried alongside a handler: everything the registry indexes
/// on, plus the flag [`crate::pipeline::stages::platform_compat`] sets.
pub struct HandlerMetadata {
    pub event_kind: EventKind,
    pub name: String,
    pub plugin_path: String,
    pub priority: i32,
    pub description: String,
    platform_compatible: Arc<AtomicBool>,
    callback: Arc<dyn Handler>,
}

impl Clone for HandlerMetadata {
    fn clone(&self) -> Self {
        Self {
            event_kind: self.event_kind,
            name: self.name.clone(),
            plugin_path: self.plugin_path.clone(),
            priority: self.priority,
            description: self.description.clone(),
            platform_compatible: self.platform_compatible.clone(),
            callback: self.callback.clone(),
        }
    }
}

impl std::fmt::Debug for HandlerMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerMetadata")
            .field("event_kind", &self.event_kind)
            .field("name", &self.name)
            .field("plugin_path", &self.plugin_path)
            .field("priority", &self.priority)
            .finish()
    }
}

impl HandlerMetadata {
    pub fn new(
        event_kind: EventKind,
        name: impl Into<String>,
        plugin_path: impl Into<String>,
        priority: i32,
        description: impl Into<String>,
        callback: Arc<dyn Handler>,
    ) -> Self {
        Self {
            event_kind,
            name: name.into(),
            plugin_path: plugin_path.into(),
            priority,
            description: description.into(),
            platform_compatible: Arc::new(AtomicBool::new(true)),
            callback,
        }
    }

    pub fn is_platform_compatible(&self) -> bool {
        self.platform_compatible.load(Ordering::SeqCst)
    }

    pub fn set_platform_compatible(&self, compatible: bool) {
        self.platform_compatible.store(compatible, Ordering::SeqCst);
    }

    pub async fn call(&self, event: &mut InboundEvent) -> Option<EventResult> {
        self.callback.call(event).await
    }
}

/// `platform-id -> plugin-name -> enabled`. A plugin with no entry for a
/// platform is treated as enabled, matching the source's default.
pub type PlatformEnableMap = HashMap<String, HashMap<String, bool>>;

pub fn is_enabled_for_platform(map: &PlatformEnableMap, plugin_name: &str, platform_id: &str) -> bool {
    map.get(platform_id).and_then(|plugins| plugins.get(plugin_name)).copied().unwrap_or(true)
}

/// A loaded plugin: owns its handlers' lifetime and responds to
/// lifecycle hooks. Load/reload, like persistence, stays an external
/// concern — this trait is the minimal seam the lifecycle coordinator
/// drives.
#[async_trait::async_trait]
pub trait Plugin: Send + Sync {
    fn path(&self) -> &str;
    async fn initialize(&self) -> Result<(), crate::error::CoreError>;
    async fn terminate(&self) -> Result<(), crate::error::CoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_entry_defaults_to_enabled() {
        let map = PlatformEnableMap::new();
        assert!(is_enabled_for_platform(&map, "my-plugin", "tg"));
    }

    #[test]
    fn explicit_false_disables() {
        let mut map = PlatformEnableMap::new();
        map.entry("tg".into()).or_default().insert("my-plugin".into(), false);
        assert!(!is_enabled_for_platform(&map, "my-plugin", "tg"));
        assert!(is_enabled_for_platform(&map, "other-plugin", "tg"));
    }
}
