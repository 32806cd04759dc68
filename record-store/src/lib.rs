//! Storage layer for the hybrid search service.
//!
//! Three concerns live here because they share the predicate model:
//! the relational store adapter ([`store::SqliteStore`]), the dense vector
//! index ([`flat_index::FlatIndex`]), and the filter compiler
//! ([`filters::compile_filters`]) that turns the wire DSL into typed
//! predicates both retrievers consume.

pub mod filters;
pub mod flat_index;
pub mod geo;
pub mod sql;
pub mod store;

use std::path::PathBuf;

use thiserror::Error;

pub use filters::{compile_filters, filters_to_dsl, CompiledFilter};
pub use flat_index::FlatIndex;
pub use store::SqliteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid identifier `{0}`; only [A-Za-z0-9_] is allowed")]
    InvalidIdentifier(String),
    #[error("corrupt vector index at {path}: {reason}")]
    CorruptIndex { path: PathBuf, reason: String },
    #[error("vector dimension mismatch: index holds {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("vector id {0} already present; use upsert to replace it")]
    DuplicateVectorId(i64),
}
