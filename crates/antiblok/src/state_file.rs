//! JSON-file [`StateStore`] implementation.
//!
//! The whole user-state table is one JSON object mapping user id to
//! record. Every write serializes the full table through a temp file
//! plus rename. Same-user create races are serialized through per-user
//! lock shards and snapshot writes through a dedicated mutex, so no
//! write is ever silently skipped.
//!
//! A table file that is unreadable or malformed is treated as absent
//! and reinitialized, never fatal.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;

use antiblok_core::dialog::UserConversationState;
use antiblok_core::store::StateStore;

pub struct JsonStateStore {
    path: PathBuf,
    table: RwLock<HashMap<String, UserConversationState>>,
    shards: Vec<tokio::sync::Mutex<()>>,
    file_lock: tokio::sync::Mutex<()>,
    /// Records untouched for longer than this are reinitialized on
    /// load. `None` keeps records forever.
    retention_secs: Option<i64>,
}

impl JsonStateStore {
    pub fn open(path: &Path, retention_days: Option<i64>, lock_shards: usize) -> Result<Self> {
        let table = match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str::<HashMap<String, UserConversationState>>(&raw) {
                Ok(table) => table,
                Err(err) => {
                    tracing::warn!(path = %path.display(), %err, "reinitializing malformed state table");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };

        let shard_count = lock_shards.max(1);
        Ok(Self {
            path: path.to_path_buf(),
            table: RwLock::new(table),
            shards: (0..shard_count).map(|_| tokio::sync::Mutex::new(())).collect(),
            file_lock: tokio::sync::Mutex::new(()),
            retention_secs: retention_days.map(|days| days * 86_400),
        })
    }

    /// Number of records currently in the table.
    pub fn user_count(&self) -> usize {
        self.table.read().unwrap().len()
    }

    fn shard(&self, user_id: &str) -> &tokio::sync::Mutex<()> {
        let mut hasher = DefaultHasher::new();
        user_id.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % self.shards.len()]
    }

    fn expired(&self, state: &UserConversationState) -> bool {
        match self.retention_secs {
            Some(limit) => Utc::now().timestamp() - state.updated_at > limit,
            None => false,
        }
    }

    async fn persist(&self) -> Result<()> {
        let _guard = self.file_lock.lock().await;
        let body = {
            let table = self.table.read().unwrap();
            serde_json::to_string_pretty(&*table)?
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, body)
            .with_context(|| format!("Failed to write state table: {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[async_trait]
impl StateStore for JsonStateStore {
    async fn load_or_create(&self, user_id: &str) -> Result<UserConversationState> {
        let _guard = self.shard(user_id).lock().await;

        let existing = {
            let table = self.table.read().unwrap();
            table.get(user_id).cloned()
        };
        if let Some(state) = existing {
            if !self.expired(&state) {
                return Ok(state);
            }
            tracing::info!(user = user_id, "retention expired, reinitializing record");
        }

        let fresh = UserConversationState::new();
        {
            let mut table = self.table.write().unwrap();
            table.insert(user_id.to_string(), fresh.clone());
        }
        self.persist().await?;
        Ok(fresh)
    }

    async fn save(&self, user_id: &str, state: &UserConversationState) -> Result<()> {
        {
            let mut table = self.table.write().unwrap();
            table.insert(user_id.to_string(), state.clone());
        }
        self.persist().await
    }

    async fn remove(&self, user_id: &str) -> Result<bool> {
        let _guard = self.shard(user_id).lock().await;
        let removed = {
            let mut table = self.table.write().unwrap();
            table.remove(user_id).is_some()
        };
        if removed {
            self.persist().await?;
        }
        Ok(removed)
    }
}
