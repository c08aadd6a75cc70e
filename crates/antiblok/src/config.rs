use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub kb: KbConfig,
    pub data: DataConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub state: StateConfig,
}

/// Knowledge-base source: a directory of markdown files.
#[derive(Debug, Deserialize, Clone)]
pub struct KbConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

/// Persisted artifacts: the index snapshot and the state table.
#[derive(Debug, Deserialize, Clone)]
pub struct DataConfig {
    pub index_path: PathBuf,
    pub state_path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_max_snippet_chars")]
    pub max_snippet_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            max_snippet_chars: default_max_snippet_chars(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StateConfig {
    /// Days after which an untouched user record is reinitialized.
    /// Unset means records are kept forever.
    #[serde(default)]
    pub retention_days: Option<i64>,
    #[serde(default = "default_lock_shards")]
    pub lock_shards: usize,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            retention_days: None,
            lock_shards: default_lock_shards(),
        }
    }
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string()]
}

fn default_top_k() -> usize {
    3
}

fn default_max_snippet_chars() -> usize {
    1400
}

fn default_lock_shards() -> usize {
    16
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if config.retrieval.max_snippet_chars == 0 {
        anyhow::bail!("retrieval.max_snippet_chars must be >= 1");
    }
    if config.state.lock_shards == 0 {
        anyhow::bail!("state.lock_shards must be >= 1");
    }
    if let Some(days) = config.state.retention_days {
        if days < 0 {
            anyhow::bail!("state.retention_days must be >= 0");
        }
    }

    Ok(config)
}
