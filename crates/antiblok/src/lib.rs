//! # Antiblok
//!
//! A local-first assistant engine for bank account-blocking cases
//! (115-ФЗ, ЗСК, 161-ФЗ, ФНС, ФССП).
//!
//! Antiblok scans a Markdown knowledge base into a BM25 index, classifies
//! each user message into a case branch, drives a scripted clarifying
//! dialogue per user, and composes final answers with a retrieval-backed
//! fallback ladder.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌─────────────┐   ┌────────────┐
//! │ KB scan   │──▶│ BM25 index  │──▶│  snapshot   │
//! │ (*.md)    │   │ (in memory) │   │ (JSON file) │
//! └───────────┘   └──────┬──────┘   └────────────┘
//!                        │
//!                        ▼
//!                 ┌─────────────┐   ┌────────────┐
//!                 │  Assistant  │──▶│ state file  │
//!                 │ (dialogue)  │   │ (JSON, TTL) │
//!                 └──────┬──────┘   └────────────┘
//!                        │
//!                        ▼
//!                 ┌─────────────┐
//!                 │ CLI (abk)   │
//!                 └─────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`scan`] | Knowledge-base file discovery |
//! | [`snapshot`] | Index persistence and rebuild |
//! | [`state_file`] | JSON-file user-state store |
//! | [`assistant`] | The dialogue + retrieval engine |

pub mod assistant;
pub mod config;
pub mod scan;
pub mod snapshot;
pub mod state_file;
