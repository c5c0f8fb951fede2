//! Handler registry: a priority-ordered, platform-filterable index of
//! plugin-contributed handlers. Grounded on
//! `astrbot.core.star.star_handler.StarHandlerRegistry`, which keeps a
//! `heapq` max-heap keyed on negated priority; here a sorted `Vec` per
//! event kind gives the same descending-priority iteration without needing
//! a heap's pop-one-at-a-time shape (callers always want the whole list).

use super::{EventKind, HandlerMetadata, PlatformEnableMap};
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Default)]
pub struct HandlerRegistry {
    by_kind: RwLock<HashMap<EventKind, Vec<HandlerMetadata>>>,
    by_plugin: RwLock<HashMap<String, Vec<String>>>,
    activated_plugins: RwLock<std::collections::HashSet<String>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_plugin_activated(&self, plugin_path: &str) {
        self.activated_plugins.write().unwrap().insert(plugin_path.to_string());
    }

    pub fn mark_plugin_deactivated(&self, plugin_path: &str) {
        self.activated_plugins.write().unwrap().remove(plugin_path);
    }

    fn plugin_activated(&self, plugin_path: &str) -> bool {
        self.activated_plugins.read().unwrap().contains(plugin_path)
    }

    /// Insert honoring priority: descending order within the event kind's
    /// bucket. Ties are broken by insertion order, same as a heap gives no
    /// stronger guarantee between equal keys.
    pub fn append(&self, handler: HandlerMetadata) {
        self.mark_plugin_activated(&handler.plugin_path);
        let kind = handler.event_kind;
        let mut by_plugin = self.by_plugin.write().unwrap();
        by_plugin.entry(handler.plugin_path.clone()).or_default().push(handler.name.clone());
        drop(by_plugin);

        let mut by_kind = self.by_kind.write().unwrap();
        let bucket = by_kind.entry(kind).or_default();
        let insert_at = bucket.partition_point(|existing| existing.priority >= handler.priority);
        bucket.insert(insert_at, handler);
    }

    /// Handlers for `kind` in descending-priority order. `RuntimeReady`
    /// ignores `platform_id`/enable-map filtering entirely, matching the
    /// source's special case for its "loaded" event.
    pub fn get_by_event_kind(
        &self,
        kind: EventKind,
        only_activated: bool,
        platform_id: Option<&str>,
        enable_map: &PlatformEnableMap,
    ) -> Vec<HandlerMetadata> {
        let by_kind = self.by_kind.read().unwrap();
        let Some(bucket) = by_kind.get(&kind) else { return Vec::new() };

        bucket
            .iter()
            .filter(|h| !only_activated || self.plugin_activated(&h.plugin_path))
            .filter(|h| {
                if kind == EventKind::RuntimeReady {
                    return true;
                }
                match platform_id {
                    Some(platform_id) => super::is_enabled_for_platform(enable_map, &h.plugin_path, platform_id),
                    None => true,
                }
            })
            .cloned()
            .collect()
    }

    pub fn get_by_plugin_path(&self, plugin_path: &str) -> Vec<HandlerMetadata> {
        let names = self.by_plugin.read().unwrap().get(plugin_path).cloned().unwrap_or_default();
        let by_kind = self.by_kind.read().unwrap();
        by_kind
            .values()
            .flatten()
            .filter(|h| names.contains(&h.name))
            .cloned()
            .collect()
    }

    pub fn remove(&self, name: &str) {
        let mut by_kind = self.by_kind.write().unwrap();
        for bucket in by_kind.values_mut() {
            bucket.retain(|h| h.name != name);
        }
    }

    pub fn clear(&self) {
        self.by_kind.write().unwrap().clear();
        self.by_plugin.write().unwrap().clear();
        self.activated_plugins.write().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::InboundEvent;
    use crate::result::EventResult;

    struct NoopHandler;
    #[async_trait::async_trait]
    impl super::super::Handler for NoopHandler {
        async fn call(&self, _event: &mut InboundEvent) -> Option<EventResult> {
            None
        }
    }

    fn handler(name: &str, plugin: &str, priority: i32) -> HandlerMetadata {
        HandlerMetadata::new(EventKind::AdapterMessage, name, plugin, priority, "", std::sync::Arc::new(NoopHandler))
    }

    #[test]
    fn get_by_event_kind_is_descending_priority() {
        let registry = HandlerRegistry::new();
        registry.append(handler("low", "p", 1));
        registry.append(handler("high", "p", 10));
        registry.append(handler("mid", "p", 5));

        let ordered = registry.get_by_event_kind(EventKind::AdapterMessage, false, None, &PlatformEnableMap::new());
        let names: Vec<&str> = ordered.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["high", "mid", "low"]);
    }

    #[test]
    fn deactivated_plugin_is_filtered_when_only_activated() {
        let registry = HandlerRegistry::new();
        registry.append(handler("h1", "p", 1));
        registry.mark_plugin_deactivated("p");

        let visible = registry.get_by_event_kind(EventKind::AdapterMessage, true, None, &PlatformEnableMap::new());
        assert!(visible.is_empty());

        let all = registry.get_by_event_kind(EventKind::AdapterMessage, false, None, &PlatformEnableMap::new());
        assert_eq!(all.len(), 1);
    }

    #[test]
    fn platform_disabled_handler_is_excluded() {
        let registry = HandlerRegistry::new();
        registry.append(handler("h1", "p", 1));
        let mut map = PlatformEnableMap::new();
        map.entry("tg".into()).or_default().insert("p".into(), false);

        let visible = registry.get_by_event_kind(EventKind::AdapterMessage, true, Some("tg"), &map);
        assert!(visible.is_empty());
    }

    #[test]
    fn runtime_ready_ignores_platform_filter() {
        let registry = HandlerRegistry::new();
        registry.append(HandlerMetadata::new(EventKind::RuntimeReady, "h1", "p", 0, "", std::sync::Arc::new(NoopHandler)));
        let mut map = PlatformEnableMap::new();
        map.entry("tg".into()).or_default().insert("p".into(), false);

        let visible = registry.get_by_event_kind(EventKind::RuntimeReady, true, Some("tg"), &map);
        assert_eq!(visible.len(), 1);
    }

    #[test]
    fn remove_drops_handler_from_all_buckets() {
        let registry = HandlerRegistry::new();
        registry.append(handler("h1", "p", 1));
        registry.remove("h1");
        assert!(registry.get_by_event_kind(EventKind::AdapterMessage, false, None, &PlatformEnableMap::new()).is_empty());
    }
}
