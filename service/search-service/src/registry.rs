//! Per-table vector index lifecycle.
//!
//! The registry owns every `FlatIndex` and hands the orchestrator
//! read-only access. Startup loads the persisted index when present (a
//! successful load is immediately usable, no rebuild), otherwise builds
//! from the store and persists. Rebuild holds the per-table write lock for
//! its whole duration, so readers never observe a half-built index.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use embedding_provider::Embedder;
use parking_lot::RwLock;
use record_model::{Row, SchemaRegistry, TableSchema};
use record_store::{FlatIndex, SqliteStore};
use tracing::{info, warn};

use crate::error::{Result, ServiceError};

pub struct IndexRegistry {
    schemas: SchemaRegistry,
    indexes_dir: PathBuf,
    embedder: Arc<dyn Embedder>,
    indexes: RwLock<HashMap<String, Arc<RwLock<FlatIndex>>>>,
}

impl IndexRegistry {
    pub fn new(schemas: SchemaRegistry, indexes_dir: PathBuf, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            schemas,
            indexes_dir,
            embedder,
            indexes: RwLock::new(HashMap::new()),
        }
    }

    pub fn schemas(&self) -> &SchemaRegistry {
        &self.schemas
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Canonical on-disk location of a table's vector index.
    pub fn index_path(&self, table: &str) -> PathBuf {
        self.indexes_dir.join(format!("{table}.index"))
    }

    /// Read handle for the orchestrator; `None` for unknown or
    /// lexical-only tables.
    pub fn index_for(&self, table: &str) -> Option<Arc<RwLock<FlatIndex>>> {
        self.indexes.read().get(table).cloned()
    }

    /// Startup procedure: load-or-build the vector index of every hybrid
    /// table and register it under the table name.
    pub fn initialize(&self, store: &SqliteStore) -> Result<()> {
        for schema in self.schemas.iter().filter(|s| s.hybrid) {
            let index = self.load_or_build(schema, store, true)?;
            self.indexes
                .write()
                .insert(schema.name.clone(), Arc::new(RwLock::new(index)));
        }
        Ok(())
    }

    fn load_or_build(
        &self,
        schema: &TableSchema,
        store: &SqliteStore,
        allow_load: bool,
    ) -> Result<FlatIndex> {
        let path = self.index_path(&schema.name);
        let dimension = self.embedder.info().dimension;

        if allow_load && path.exists() {
            match FlatIndex::load(&path) {
                Ok(index) if index.dimension() == dimension => {
                    info!(table = %schema.name, entries = index.len(), "loaded vector index from {}", path.display());
                    return Ok(index);
                }
                Ok(index) => {
                    warn!(
                        table = %schema.name,
                        found = index.dimension(),
                        expected = dimension,
                        "persisted index dimension mismatch; rebuilding"
                    );
                }
                Err(err) => {
                    warn!(table = %schema.name, %err, "failed to load persisted index; rebuilding");
                }
            }
        }

        let index = self.build_from_store(schema, store)?;
        index.save(&path)?;
        info!(table = %schema.name, entries = index.len(), "built and saved vector index to {}", path.display());
        Ok(index)
    }

    fn build_from_store(&self, schema: &TableSchema, store: &SqliteStore) -> Result<FlatIndex> {
        let dimension = self.embedder.info().dimension;
        let mut index = FlatIndex::new(dimension);

        let rows = match store.fetch_all(&schema.name) {
            Ok(rows) => rows,
            Err(err) => {
                // The store is external; an unreachable table yields an
                // empty index rather than refusing to start.
                warn!(table = %schema.name, %err, "could not fetch rows to build index; index will be empty");
                return Ok(index);
            }
        };
        if rows.is_empty() {
            warn!(table = %schema.name, "no rows found when building vector index; index will be empty");
            return Ok(index);
        }

        for row in &rows {
            let Some(id) = row_id(row) else {
                warn!(table = %schema.name, "row without integer id skipped during index build");
                continue;
            };
            let Some(text) = embedding_text(schema, row) else {
                warn!(table = %schema.name, id, "row has no usable text; skipped during index build");
                continue;
            };
            let vector = self.embedder.embed(&text)?;
            index.upsert(id, &vector)?;
        }
        Ok(index)
    }

    /// Re-embeds a single record and replaces its index entry. A no-op for
    /// lexical-only tables; unknown records are an error the transport
    /// maps to 404.
    pub fn upsert_record(&self, store: &SqliteStore, table: &str, id: i64) -> Result<()> {
        let schema = self
            .schemas
            .get(table)
            .ok_or_else(|| ServiceError::TableNotFound(table.to_string()))?;

        let row = store
            .fetch_by_id(table, id)?
            .ok_or_else(|| ServiceError::RecordNotFound {
                table: table.to_string(),
                id,
            })?;

        if !schema.hybrid {
            return Ok(());
        }
        let Some(handle) = self.index_for(table) else {
            return Err(ServiceError::TableNotFound(table.to_string()));
        };

        match embedding_text(schema, &row) {
            Some(text) => {
                let vector = self.embedder.embed(&text)?;
                handle.write().upsert(id, &vector)?;
            }
            None => {
                // A record that lost its text must not keep a stale vector.
                warn!(table, id, "record has no usable text; removing any index entry");
                handle.write().remove(id);
            }
        }
        Ok(())
    }

    /// Full rebuild of one table's index from the store, bypassing the
    /// persisted file. Readers are excluded for the duration.
    pub fn rebuild(&self, store: &SqliteStore, table: &str) -> Result<()> {
        let schema = self
            .schemas
            .get(table)
            .ok_or_else(|| ServiceError::TableNotFound(table.to_string()))?;
        if !schema.hybrid {
            return Ok(());
        }

        let handle = {
            let mut map = self.indexes.write();
            map.entry(schema.name.clone())
                .or_insert_with(|| {
                    Arc::new(RwLock::new(FlatIndex::new(self.embedder.info().dimension)))
                })
                .clone()
        };

        let mut guard = handle.write();
        let rebuilt = self.load_or_build(schema, store, false)?;
        *guard = rebuilt;
        Ok(())
    }

    /// Rebuilds every configured table in declaration order.
    pub fn rebuild_all(&self, store: &SqliteStore) -> Result<()> {
        for name in self.schemas.names().map(str::to_string).collect::<Vec<_>>() {
            self.rebuild(store, &name)?;
        }
        Ok(())
    }
}

fn row_id(row: &Row) -> Option<i64> {
    row.get("id").and_then(|v| v.as_i64())
}

/// Embedding input: declared text columns, lowercased and space-joined.
/// Null or missing columns are skipped; a row with no text at all yields
/// `None`.
pub fn embedding_text(schema: &TableSchema, row: &Row) -> Option<String> {
    let mut parts: Vec<String> = Vec::with_capacity(schema.text_columns.len());
    for column in &schema.text_columns {
        match row.get(column) {
            Some(serde_json::Value::String(s)) if !s.trim().is_empty() => {
                parts.push(s.trim().to_lowercase());
            }
            Some(serde_json::Value::Number(n)) => parts.push(n.to_string()),
            _ => {}
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    }
}
