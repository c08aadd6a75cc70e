//! Conversation-state persistence abstraction.
//!
//! The [`StateStore`] trait defines the narrow contract the dialogue
//! engine needs: load-or-create, save, and explicit operator removal.
//! Implementations must be `Send + Sync`; the JSON-file store lives in
//! the application crate, the in-memory store here serves tests.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::dialog::UserConversationState;

/// Abstract storage backend for per-user conversation state.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the state for a user. On first access a default record is
    /// created **and persisted** before it is returned, so a concurrent
    /// load for the same id observes the identical record (same
    /// `thread_id`) rather than minting a second default.
    async fn load_or_create(&self, user_id: &str) -> Result<UserConversationState>;

    /// Persist the state for a user.
    async fn save(&self, user_id: &str, state: &UserConversationState) -> Result<()>;

    /// Remove a user's record (explicit operator action). Returns
    /// whether a record existed.
    async fn remove(&self, user_id: &str) -> Result<bool>;
}
