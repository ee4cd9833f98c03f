//! Fermi Storage Layer
//!
//! Retrieval and learned-rule backends for the estimation pipeline.
//!
//! # Architecture
//!
//! - `InMemorySearchIndex`: hashed bag-of-words embeddings scored by cosine
//!   similarity, implementing `SearchBackend`
//! - `SqliteRuleStore`: SQLite persistence for learned rules, implementing
//!   `LearnedRuleStore`
//! - Null and in-memory variants for tests and runs without persistence
//!
//! # Examples
//!
//! ```no_run
//! use fermi_store::SqliteRuleStore;
//!
//! let store = SqliteRuleStore::new("fermi-rules.db").unwrap();
//! ```

#![warn(missing_docs)]

pub mod embedding;
pub mod rules;
pub mod search;

use thiserror::Error;

pub use rules::{rule_key, InMemoryRuleStore, NullRuleStore, SqliteRuleStore};
pub use search::{InMemorySearchIndex, NullSearchBackend};

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Invalid data format
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Search failed
    #[error("Search error: {0}")]
    Search(String),
}
