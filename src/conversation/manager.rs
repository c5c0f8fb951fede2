//! Binds a unified-origin session to its current dialogue and caches the
//! binding, flushing it to the preference store periodically and on
//! shutdown. Grounded on `astrbot.core.conversation_mgr.ConversationManager`.

use super::store::{Conversation, ConversationStore};
use super::HistoryEntry;
use crate::llm::Role;
use crate::preferences::{PreferenceStore, KEY_SESSION_CONVERSATION};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use uuid::Uuid;

const FLUSH_INTERVAL: Duration = Duration::from_secs(60);

pub struct ConversationManager {
    store: Arc<dyn ConversationStore>,
    prefs: Arc<dyn PreferenceStore>,
    /// unified-origin -> current dialogue id, warm-loaded at startup.
    session_current: Arc<RwLock<HashMap<String, Uuid>>>,
    flush_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ConversationManager {
    /// Warm-load the session -> dialogue map from the preference store and
    /// spawn the periodic flush task.
    pub async fn start(store: Arc<dyn ConversationStore>, prefs: Arc<dyn PreferenceStore>) -> Arc<Self> {
        let loaded: HashMap<String, Uuid> = prefs
            .get(KEY_SESSION_CONVERSATION)
            .await
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default();

        let manager = Arc::new(Self {
            store,
            prefs,
            session_current: Arc::new(RwLock::new(loaded)),
            flush_task: std::sync::Mutex::new(None),
        });

        let weak = Arc::downgrade(&manager);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(FLUSH_INTERVAL);
            ticker.tick().await; // first tick fires immediately; skip it
            loop {
                ticker.tick().await;
                match weak.upgrade() {
                    Some(manager) => manager.flush().await,
                    None => break,
                }
            }
        });
        *manager.flush_task.lock().unwrap() = Some(handle);
        manager
    }

    /// Persist the current in-memory session map. Must also be called on
    /// graceful shutdown so the last mutations since the previous tick are
    /// not lost.
    pub async fn flush(&self) {
        let snapshot = self.session_current.read().await.clone();
        if let Ok(value) = serde_json::to_value(&snapshot) {
            self.prefs.put(KEY_SESSION_CONVERSATION, value).await;
        }
    }

    pub async fn shutdown(&self) {
        self.flush().await;
        if let Some(handle) = self.flush_task.lock().unwrap().take() {
            handle.abort();
        }
    }

    pub async fn get_current_id(&self, session: &str) -> Option<Uuid> {
        self.session_current.read().await.get(session).copied()
    }

    /// Get the current dialogue for a session, creating one on demand.
    pub async fn current_or_create(&self, session: &str) -> Result<Conversation, crate::error::StoreError> {
        if let Some(id) = self.get_current_id(session).await {
            if let Ok(conversation) = self.store.get_conversation(session, id).await {
                return Ok(conversation);
            }
        }
        self.new_dialogue(session).await
    }

    pub async fn new_dialogue(&self, session: &str) -> Result<Conversation, crate::error::StoreError> {
        let conversation = self.store.new_conversation(session).await?;
        self.session_current.write().await.insert(session.to_string(), conversation.id);
        self.flush().await;
        Ok(conversation)
    }

    pub async fn switch(&self, session: &str, id: Uuid) -> Result<(), crate::error::StoreError> {
        // Verify the dialogue exists before switching to it.
        self.store.get_conversation(session, id).await?;
        self.session_current.write().await.insert(session.to_string(), id);
        self.flush().await;
        Ok(())
    }

    pub async fn delete_current(&self, session: &str) -> Result<(), crate::error::StoreError> {
        if let Some(id) = self.session_current.write().await.remove(session) {
            self.store.delete_conversation(session, id).await?;
            self.flush().await;
        }
        Ok(())
    }

    pub async fn get(&self, session: &str, id: Uuid) -> Result<Conversation, crate::error::StoreError> {
        self.store.get_conversation(session, id).await
    }

    pub async fn list(&self, session: &str) -> Result<Vec<Conversation>, crate::error::StoreError> {
        self.store.get_conversations(session).await
    }

    pub async fn update(&self, session: &str, id: Uuid, history: Vec<HistoryEntry>) -> Result<(), crate::error::StoreError> {
        self.store.update_conversation(session, id, history).await
    }

    pub async fn update_title(&self, session: &str, id: Uuid, title: String) -> Result<(), crate::error::StoreError> {
        self.store.update_title(session, id, title).await
    }

    pub async fn update_persona(&self, session: &str, id: Uuid, persona_id: Option<String>) -> Result<(), crate::error::StoreError> {
        self.store.update_persona_id(session, id, persona_id).await
    }

    /// Reconstruct the dialogue as newest-first user/assistant pairs and
    /// paginate. Each "pair" is a user entry plus everything up to (but not
    /// including) the next user entry, so a tool round trip stays attached
    /// to the user turn that triggered it. Pairs are reversed before
    /// flattening: this matches the original's `contexts.insert(0, ...)`
    /// accumulation, which is not a plain reverse of the flat entry list —
    /// reversing flat entries would interleave user/assistant turns.
    pub async fn human_readable(
        &self,
        session: &str,
        id: Uuid,
        page: usize,
        page_size: usize,
    ) -> Result<Vec<HistoryEntry>, crate::error::StoreError> {
        let conversation = self.store.get_conversation(session, id).await?;
        let groups = group_into_pairs(&conversation.history);
        let newest_first: Vec<&Vec<HistoryEntry>> = groups.iter().rev().collect();

        let start = page.saturating_sub(1).saturating_mul(page_size);
        let page_groups = newest_first.into_iter().skip(start).take(page_size);

        Ok(page_groups.flat_map(|group| group.iter().cloned()).collect())
    }
}

fn group_into_pairs(history: &[HistoryEntry]) -> Vec<Vec<HistoryEntry>> {
    let mut groups: Vec<Vec<HistoryEntry>> = Vec::new();
    let mut current: Vec<HistoryEntry> = Vec::new();
    for entry in history {
        if entry.role == Role::User && !current.is_empty() {
            groups.push(std::mem::take(&mut current));
        }
        current.push(entry.clone());
    }
    if !current.is_empty() {
        groups.push(current);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::store::InMemoryConversationStore;
    use crate::preferences::InMemoryPreferenceStore;

    async fn manager() -> Arc<ConversationManager> {
        ConversationManager::start(Arc::new(InMemoryConversationStore::new()), Arc::new(InMemoryPreferenceStore::new())).await
    }

    #[tokio::test]
    async fn current_or_create_makes_one_dialogue() {
        let manager = manager().await;
        let first = manager.current_or_create("s1").await.unwrap();
        let second = manager.current_or_create("s1").await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn switch_changes_current() {
        let manager = manager().await;
        let first = manager.current_or_create("s1").await.unwrap();
        let second = manager.new_dialogue("s1").await.unwrap();
        assert_ne!(first.id, second.id);
        manager.switch("s1", first.id).await.unwrap();
        assert_eq!(manager.get_current_id("s1").await, Some(first.id));
    }

    #[tokio::test]
    async fn human_readable_is_newest_first_and_keeps_pairs_together() {
        let manager = manager().await;
        let conversation = manager.new_dialogue("s1").await.unwrap();
        let history = vec![
            HistoryEntry::user("first"),
            HistoryEntry::assistant("first reply"),
            HistoryEntry::user("second"),
            HistoryEntry::assistant("second reply"),
        ];
        manager.update("s1", conversation.id, history).await.unwrap();

        let page = manager.human_readable("s1", conversation.id, 1, 1).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].content, "second");
        assert_eq!(page[1].content, "second reply");

        let page2 = manager.human_readable("s1", conversation.id, 2, 1).await.unwrap();
        assert_eq!(page2[0].content, "first");
    }

    #[tokio::test]
    async fn flush_persists_session_map() {
        let store = Arc::new(InMemoryConversationStore::new());
        let prefs = Arc::new(InMemoryPreferenceStore::new());
        let manager = ConversationManager::start(store, prefs.clone()).await;
        manager.current_or_create("s1").await.unwrap();
        manager.flush().await;
        let saved = prefs.get(KEY_SESSION_CONVERSATION).await.unwrap();
        assert!(saved.get("s1").is_some());
    }
}
