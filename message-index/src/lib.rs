//! Persistent full-text index over decrypted chat messages.
//!
//! The index lives in a single directory: the tantivy segments plus a small
//! SQLite side table for index metadata (schema version, dataset fingerprint,
//! last build time). A [`MessageIndex`] is shared by reference (usually in an
//! `Arc`); searches and metadata reads take a shared lock, every committed
//! batch, metadata write, reset and close takes the exclusive one.

pub mod config;
pub mod document;
pub mod fingerprint;
pub mod query;
pub mod schema;
pub mod search;
pub mod store;
pub mod tokenizer;

mod indexer;
mod meta;

pub use config::IndexConfig;
pub use search::{SearchFilter, SearchResults};
pub use store::MessageIndex;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// The index could not be opened, created or recreated.
    #[error("initialization error: {0}")]
    Initialization(String),
    /// A message could not be turned into a document.
    #[error("encode error: {0}")]
    Encode(String),
    #[error("query error: {0}")]
    Query(String),
    /// Engine or metadata read/write failure, including undecodable stored messages.
    #[error("storage error: {0}")]
    Storage(String),
    #[error("index not initialized")]
    NotInitialized,
}
