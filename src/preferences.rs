//! Preference (key-value) store contract.
//!
//! One persistent key is mandated: `session_conversation`, a map from
//! unified origin to dialogue id. Two more hold fully-qualified names of
//! deactivated plugins and deactivated tools. Backing choice is external
//! (spec §1); an in-memory implementation is provided for tests and for
//! embedding without a real backend.

use std::collections::HashMap;
use std::sync::RwLock;

pub const KEY_SESSION_CONVERSATION: &str = "session_conversation";
pub const KEY_INACTIVATED_PLUGINS: &str = "inactivated_plugins";
pub const KEY_INACTIVATED_LLM_TOOLS: &str = "inactivated_llm_tools";

#[async_trait::async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn get(&self, key: &str) -> Option<serde_json::Value>;
    async fn put(&self, key: &str, value: serde_json::Value);
}

#[derive(Default)]
pub struct InMemoryPreferenceStore {
    values: RwLock<HashMap<String, serde_json::Value>>,
}

impl InMemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl PreferenceStore for InMemoryPreferenceStore {
    async fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.values.read().unwrap().get(key).cloned()
    }

    async fn put(&self, key: &str, value: serde_json::Value) {
        self.values.write().unwrap().insert(key.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = InMemoryPreferenceStore::new();
        store.put(KEY_INACTIVATED_PLUGINS, serde_json::json!(["foo"])).await;
        let value = store.get(KEY_INACTIVATED_PLUGINS).await.unwrap();
        assert_eq!(value, serde_json::json!(["foo"]));
    }

    #[tokio::test]
    async fn missing_key_is_none() {
        let store = InMemoryPreferenceStore::new();
        assert!(store.get("nope").await.is_none());
    }
}
