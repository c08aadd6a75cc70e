//! The engine that ties retrieval, dialogue, and persistence together.
//!
//! All mutation of a user's conversational state goes through a
//! per-user lock shard, so concurrent messages from the same user are
//! serialized end to end and neither update is lost. The knowledge-base
//! index is shared behind an `Arc` and swapped atomically on rebuild.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, RwLock};

use anyhow::Result;
use uuid::Uuid;

use antiblok_core::classify::{classify, CaseBranch};
use antiblok_core::dialog::{self, AnswerMetadata, NextAction, UserConversationState};
use antiblok_core::index::KbIndex;
use antiblok_core::retrieve::{retrieve, Snippet};
use antiblok_core::store::StateStore;
use antiblok_core::text::clean_markdown;

/// Shown when neither a provided answer nor the knowledge base has
/// anything to say.
pub const OFFTOPIC_FALLBACK: &str =
    "Я консультирую по блокировкам счетов/карт, 115-ФЗ, ЗСК и комплаенсу.\n\
     Опишите кейс: что заблокировали, когда, и что написал банк.";

/// A final answer ready for delivery, with its correlation keys.
#[derive(Debug, Clone)]
pub struct ComposedAnswer {
    pub answer_id: String,
    pub thread_id: String,
    pub text: String,
}

pub struct Assistant {
    index: RwLock<Arc<KbIndex>>,
    store: Arc<dyn StateStore>,
    top_k: usize,
    max_snippet_chars: usize,
    user_locks: Vec<tokio::sync::Mutex<()>>,
}

impl Assistant {
    pub fn new(
        index: KbIndex,
        store: Arc<dyn StateStore>,
        top_k: usize,
        max_snippet_chars: usize,
        lock_shards: usize,
    ) -> Self {
        let shard_count = lock_shards.max(1);
        Self {
            index: RwLock::new(Arc::new(index)),
            store,
            top_k,
            max_snippet_chars,
            user_locks: (0..shard_count)
                .map(|_| tokio::sync::Mutex::new(()))
                .collect(),
        }
    }

    /// Replace the served index. In-flight retrievals keep their old
    /// `Arc`; new ones see the rebuilt index.
    pub fn swap_index(&self, index: KbIndex) {
        *self.index.write().unwrap() = Arc::new(index);
    }

    pub fn index(&self) -> Arc<KbIndex> {
        Arc::clone(&self.index.read().unwrap())
    }

    pub fn retrieve(&self, query: &str) -> Vec<Snippet> {
        let index = self.index();
        retrieve(query, &index, self.top_k, self.max_snippet_chars)
    }

    pub fn classify(&self, text: &str) -> Option<CaseBranch> {
        classify(text)
    }

    fn user_lock(&self, user_id: &str) -> &tokio::sync::Mutex<()> {
        let mut hasher = DefaultHasher::new();
        user_id.hash(&mut hasher);
        &self.user_locks[(hasher.finish() as usize) % self.user_locks.len()]
    }

    /// Advance a user's dialogue with an inbound message and persist
    /// the resulting state.
    pub async fn handle_message(&self, user_id: &str, text: &str) -> Result<NextAction> {
        let _guard = self.user_lock(user_id).lock().await;
        let mut state = self.store.load_or_create(user_id).await?;
        let action = dialog::on_incoming_message(&mut state, text);
        self.store.save(user_id, &state).await?;
        if let NextAction::CommentRecorded { answer_id, .. } = &action {
            tracing::info!(user = user_id, answer = %answer_id, "feedback comment recorded");
        }
        Ok(action)
    }

    /// Compose the final answer for a free-form query.
    ///
    /// Preference order: a non-empty externally produced answer, then
    /// the best knowledge-base snippet, then the fixed off-topic
    /// prompt. The result passes through the repeat-loop guard before
    /// delivery and its metadata is recorded on the user's state.
    pub async fn compose_answer(
        &self,
        user_id: &str,
        query: &str,
        produced: Option<&str>,
    ) -> Result<ComposedAnswer> {
        let snippets = self.retrieve(query);
        let rag_used = !snippets.is_empty();

        let llm_text = produced.map(str::trim).filter(|text| !text.is_empty());
        let llm_used = llm_text.is_some();
        let raw = match llm_text {
            Some(text) => clean_markdown(text),
            None => match snippets.into_iter().next() {
                Some(snippet) => snippet.text,
                None => OFFTOPIC_FALLBACK.to_string(),
            },
        };

        let _guard = self.user_lock(user_id).lock().await;
        let mut state = self.store.load_or_create(user_id).await?;
        let text = dialog::on_answer_produced(&mut state, &raw).into_text();

        let answer_id = Uuid::new_v4().to_string();
        dialog::record_answer_metadata(
            &mut state,
            AnswerMetadata {
                answer_id: answer_id.clone(),
                query_fingerprint: dialog::query_fingerprint(query),
                rag_used,
                llm_used,
            },
        );
        let thread_id = state.thread_id.clone();
        self.store.save(user_id, &state).await?;

        Ok(ComposedAnswer {
            answer_id,
            thread_id,
            text,
        })
    }

    /// Put a user into the awaiting-comment sub-state for `answer_id`.
    pub async fn await_comment(&self, user_id: &str, answer_id: &str) -> Result<()> {
        let _guard = self.user_lock(user_id).lock().await;
        let mut state = self.store.load_or_create(user_id).await?;
        dialog::await_comment(&mut state, answer_id);
        self.store.save(user_id, &state).await
    }

    /// Current state of a user, creating the default if absent.
    pub async fn user_state(&self, user_id: &str) -> Result<UserConversationState> {
        self.store.load_or_create(user_id).await
    }

    /// Drop a user's record entirely. Returns whether one existed.
    pub async fn clear_user(&self, user_id: &str) -> Result<bool> {
        let _guard = self.user_lock(user_id).lock().await;
        self.store.remove(user_id).await
    }
}
