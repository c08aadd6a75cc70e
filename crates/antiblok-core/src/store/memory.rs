//! In-memory [`StateStore`] implementation for tests.
//!
//! A `HashMap` behind `std::sync::RwLock`; "persisting" the default
//! record is simply inserting it, which gives the same observable
//! contract as the file-backed store.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::dialog::UserConversationState;

use super::StateStore;

/// In-memory conversation-state store.
#[derive(Default)]
pub struct InMemoryStateStore {
    table: RwLock<HashMap<String, UserConversationState>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn load_or_create(&self, user_id: &str) -> Result<UserConversationState> {
        let mut table = self.table.write().unwrap();
        let state = table
            .entry(user_id.to_string())
            .or_insert_with(UserConversationState::new);
        Ok(state.clone())
    }

    async fn save(&self, user_id: &str, state: &UserConversationState) -> Result<()> {
        let mut table = self.table.write().unwrap();
        table.insert(user_id.to_string(), state.clone());
        Ok(())
    }

    async fn remove(&self, user_id: &str) -> Result<bool> {
        let mut table = self.table.write().unwrap();
        Ok(table.remove(user_id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_load_creates_default() {
        let store = InMemoryStateStore::new();
        let state = store.load_or_create("u1").await.unwrap();
        assert_eq!(state.branch, None);
        assert!(state.asked_question_ids.is_empty());
        assert!(!state.thread_id.is_empty());
    }

    #[tokio::test]
    async fn test_second_load_returns_identical_record() {
        let store = InMemoryStateStore::new();
        let first = store.load_or_create("u1").await.unwrap();
        let second = store.load_or_create("u1").await.unwrap();
        assert_eq!(first.thread_id, second.thread_id);
    }

    #[tokio::test]
    async fn test_save_then_load_roundtrip() {
        let store = InMemoryStateStore::new();
        let mut state = store.load_or_create("u1").await.unwrap();
        state.asked_question_ids.insert("when_what".to_string());
        store.save("u1", &state).await.unwrap();

        let loaded = store.load_or_create("u1").await.unwrap();
        assert!(loaded.asked_question_ids.contains("when_what"));
    }

    #[tokio::test]
    async fn test_remove() {
        let store = InMemoryStateStore::new();
        let first = store.load_or_create("u1").await.unwrap();
        assert!(store.remove("u1").await.unwrap());
        assert!(!store.remove("u1").await.unwrap());

        let fresh = store.load_or_create("u1").await.unwrap();
        assert_ne!(fresh.thread_id, first.thread_id);
    }
}
