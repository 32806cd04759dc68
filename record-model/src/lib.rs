//! Shared models for the hybrid table search service: table schema
//! declarations, the compiled filter predicate type, and the schema registry.

pub mod predicate;
pub mod schema;

pub use predicate::{FilterValue, Predicate};
pub use schema::{
    FilterDataType, FilterDescriptor, FilterKind, SchemaError, SchemaRegistry, TableSchema,
};

/// A database row hydrated into JSON form. The core never interprets
/// values outside the declared text and filter columns.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Returns true when `name` is safe to interpolate as a SQL identifier
/// (`^[A-Za-z0-9_]+$`). Values are always bound, never interpolated.
pub fn is_valid_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
