//! # Antiblok CLI (`abk`)
//!
//! The `abk` binary is the primary interface for the account-blocking
//! assistant. It provides commands for rebuilding the knowledge-base
//! index, searching it, classifying messages, running the dialogue, and
//! managing persisted user state.
//!
//! ## Usage
//!
//! ```bash
//! abk --config ./config/abk.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `abk rebuild` | Rescan the knowledge base and write a fresh index snapshot |
//! | `abk search "<query>"` | Retrieve the top-ranked knowledge-base snippets |
//! | `abk classify "<text>"` | Show the case branch a message classifies into |
//! | `abk chat --user <id> "<text>"` | Advance a user's dialogue with a message |
//! | `abk stats` | Print index and state-store statistics |
//! | `abk state clear --user <id>` | Drop a user's persisted conversation state |

mod assistant;
mod config;
mod scan;
mod snapshot;
mod state_file;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use antiblok_core::dialog::NextAction;

/// Antiblok CLI — an assistant engine for bank account-blocking cases.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/abk.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "abk",
    about = "Antiblok — an assistant engine for bank account-blocking cases",
    version,
    long_about = "Antiblok scans a Markdown knowledge base into a BM25 index, classifies \
    user messages into case branches (115-ФЗ, ЗСК, 161-ФЗ, ФНС, ФССП), drives a scripted \
    clarifying dialogue per user, and composes retrieval-backed answers."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/abk.toml`. Knowledge-base, data-file, and
    /// retrieval settings are read from this file.
    #[arg(long, global = true, default_value = "./config/abk.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Rescan the knowledge base and rewrite the index snapshot.
    ///
    /// Walks the configured KB root, tokenizes every matching Markdown
    /// file, and writes the resulting index to the snapshot path. This
    /// command is idempotent — rebuilding an unchanged KB produces a
    /// byte-for-byte identical snapshot.
    Rebuild,

    /// Retrieve the top-ranked knowledge-base snippets for a query.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of snippets to return.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Classify a message into a case branch.
    ///
    /// Prints the matched branch tag, or `no match` when no rule fires.
    Classify {
        /// The message text to classify.
        text: String,
    },

    /// Advance a user's dialogue with an inbound message.
    ///
    /// Prints the next clarifying question if one remains; otherwise
    /// composes and prints a final answer. `--answer` supplies an
    /// externally produced answer to prefer over KB snippets.
    Chat {
        /// User identifier the conversation state is keyed by.
        #[arg(long)]
        user: String,

        /// The inbound message text.
        text: String,

        /// Externally produced answer text to deliver instead of a
        /// knowledge-base snippet.
        #[arg(long)]
        answer: Option<String>,
    },

    /// Print index and state-store statistics.
    Stats,

    /// Manage persisted user conversation state.
    State {
        #[command(subcommand)]
        action: StateAction,
    },
}

/// State management subcommands.
#[derive(Subcommand)]
enum StateAction {
    /// Drop a user's record from the state store.
    Clear {
        /// User identifier to clear.
        #[arg(long)]
        user: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Rebuild => {
            let index = snapshot::rebuild(&cfg)?;
            println!(
                "Indexed {} documents ({} terms).",
                index.document_count,
                index.vocabulary_size()
            );
        }
        Commands::Search { query, limit } => {
            let index = snapshot::load_or_rebuild(&cfg)?;
            let snippets = antiblok_core::retrieve::retrieve(
                &query,
                &index,
                limit.unwrap_or(cfg.retrieval.top_k),
                cfg.retrieval.max_snippet_chars,
            );
            if snippets.is_empty() {
                println!("No results.");
            }
            for (rank, snippet) in snippets.iter().enumerate() {
                println!("{}. {}", rank + 1, snippet.text);
                println!();
            }
        }
        Commands::Classify { text } => match antiblok_core::classify::classify(&text) {
            Some(branch) => println!("{branch}"),
            None => println!("no match"),
        },
        Commands::Chat { user, text, answer } => {
            let engine = build_assistant(&cfg)?;
            match engine.handle_message(&user, &text).await? {
                NextAction::AskClarifyingQuestion { question, .. } => {
                    println!("{question}");
                }
                NextAction::CommentRecorded { answer_id, .. } => {
                    println!("Comment recorded for answer {answer_id}.");
                }
                NextAction::DelegateToFreeForm { text, .. } => {
                    let composed = engine
                        .compose_answer(&user, &text, answer.as_deref())
                        .await?;
                    println!("{}", composed.text);
                    println!();
                    println!(
                        "answer {} (thread {})",
                        composed.answer_id, composed.thread_id
                    );
                }
            }
        }
        Commands::Stats => {
            let index = snapshot::load_or_rebuild(&cfg)?;
            let store = open_store(&cfg)?;
            println!("Documents:   {}", index.document_count);
            println!("Vocabulary:  {} terms", index.vocabulary_size());
            println!("Avg doc len: {:.1} tokens", index.avgdl());
            println!("Users:       {}", store.user_count());
        }
        Commands::State {
            action: StateAction::Clear { user },
        } => {
            let store = open_store(&cfg)?;
            if antiblok_core::store::StateStore::remove(&store, &user).await? {
                println!("Cleared state for user {user}.");
            } else {
                println!("No state for user {user}.");
            }
        }
    }

    Ok(())
}

fn open_store(cfg: &config::Config) -> anyhow::Result<state_file::JsonStateStore> {
    state_file::JsonStateStore::open(
        &cfg.data.state_path,
        cfg.state.retention_days,
        cfg.state.lock_shards,
    )
}

fn build_assistant(cfg: &config::Config) -> anyhow::Result<assistant::Assistant> {
    let index = snapshot::load_or_rebuild(cfg)?;
    let store = Arc::new(open_store(cfg)?);
    Ok(assistant::Assistant::new(
        index,
        store,
        cfg.retrieval.top_k,
        cfg.retrieval.max_snippet_chars,
        cfg.state.lock_shards,
    ))
}
