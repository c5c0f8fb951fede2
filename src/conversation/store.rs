//! Conversation store contract.
//!
//! Persistence choice is out of scope (spec §1): this module specifies only
//! the interface the conversation manager drives, plus an in-memory
//! implementation sufficient for tests and for embedding without a real
//! backend. History is persisted as JSON text, matching the original's
//! `json.dumps(history)` column.

use super::HistoryEntry;
use crate::error::StoreError;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub user: String,
    pub title: Option<String>,
    pub persona_id: Option<String>,
    pub history: Vec<HistoryEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    fn new(user: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user: user.into(),
            title: None,
            persona_id: None,
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[async_trait::async_trait]
pub trait ConversationStore: Send + Sync {
    async fn new_conversation(&self, user: &str) -> Result<Conversation, StoreError>;
    async fn get_conversation(&self, user: &str, id: Uuid) -> Result<Conversation, StoreError>;
    async fn get_conversations(&self, user: &str) -> Result<Vec<Conversation>, StoreError>;
    async fn update_conversation(&self, user: &str, id: Uuid, history: Vec<HistoryEntry>) -> Result<(), StoreError>;
    async fn update_title(&self, user: &str, id: Uuid, title: String) -> Result<(), StoreError>;
    async fn update_persona_id(&self, user: &str, id: Uuid, persona_id: Option<String>) -> Result<(), StoreError>;
    async fn delete_conversation(&self, user: &str, id: Uuid) -> Result<(), StoreError>;
}

/// In-memory conversation store, keyed by `(user, id)`.
#[derive(Default)]
pub struct InMemoryConversationStore {
    conversations: RwLock<HashMap<(String, Uuid), Conversation>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn new_conversation(&self, user: &str) -> Result<Conversation, StoreError> {
        let conversation = Conversation::new(user);
        self.conversations
            .write()
            .unwrap()
            .insert((user.to_string(), conversation.id), conversation.clone());
        Ok(conversation)
    }

    async fn get_conversation(&self, user: &str, id: Uuid) -> Result<Conversation, StoreError> {
        self.conversations
            .read()
            .unwrap()
            .get(&(user.to_string(), id))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn get_conversations(&self, user: &str) -> Result<Vec<Conversation>, StoreError> {
        let mut list: Vec<Conversation> = self
            .conversations
            .read()
            .unwrap()
            .iter()
            .filter(|((u, _), _)| u == user)
            .map(|(_, c)| c.clone())
            .collect();
        list.sort_by_key(|c| c.created_at);
        Ok(list)
    }

    async fn update_conversation(&self, user: &str, id: Uuid, history: Vec<HistoryEntry>) -> Result<(), StoreError> {
        let mut guard = self.conversations.write().unwrap();
        let conversation = guard
            .get_mut(&(user.to_string(), id))
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        conversation.history = history;
        conversation.updated_at = Utc::now();
        Ok(())
    }

    async fn update_title(&self, user: &str, id: Uuid, title: String) -> Result<(), StoreError> {
        let mut guard = self.conversations.write().unwrap();
        let conversation = guard
            .get_mut(&(user.to_string(), id))
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        conversation.title = Some(title);
        conversation.updated_at = Utc::now();
        Ok(())
    }

    async fn update_persona_id(&self, user: &str, id: Uuid, persona_id: Option<String>) -> Result<(), StoreError> {
        let mut guard = self.conversations.write().unwrap();
        let conversation = guard
            .get_mut(&(user.to_string(), id))
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        conversation.persona_id = persona_id;
        conversation.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_conversation(&self, user: &str, id: Uuid) -> Result<(), StoreError> {
        self.conversations.write().unwrap().remove(&(user.to_string(), id));
        Ok(())
    }
}
