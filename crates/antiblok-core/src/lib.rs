//! # Antiblok Core
//!
//! Shared logic for the Antiblok assistant: text normalization and
//! tokenization, the lexical knowledge-base index, BM25 retrieval,
//! case-branch classification, the per-user dialogue state machine,
//! and the state-store abstraction.
//!
//! This crate performs no filesystem or network I/O. Everything here is
//! deterministic and directly testable; persistence and orchestration
//! live in the `antiblok` application crate.

pub mod classify;
pub mod dialog;
pub mod index;
pub mod retrieve;
pub mod store;
pub mod text;
