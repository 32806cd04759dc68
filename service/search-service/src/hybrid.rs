//! Hybrid retrieval pipeline.
//!
//! Lexical and semantic retrieval run under the same compiled pre-filter,
//! fuse by ordered union (lexical first, first occurrence wins), and the
//! fused id list is hydrated back into rows. Retriever failures degrade to
//! an empty stream with a warning; only an unknown table is an error.

use std::collections::{HashMap, HashSet};

use record_model::Row;
use record_store::{compile_filters, CompiledFilter, SqliteStore};
use tracing::warn;

use crate::error::{Result, ServiceError};
use crate::registry::IndexRegistry;

/// Fields stripped from every response row.
pub const RESPONSE_FIELD_DENYLIST: [&str; 4] = [
    "embedding",
    "created_at",
    "updated_at",
    "last_embedding_generated_at",
];

/// Runs a hybrid search request against one table. Returns hydrated rows
/// in fusion order; the union of both retrievers may exceed `top` (each
/// stream is bounded by `top` before fusion, the union is not re-capped).
pub fn search(
    registry: &IndexRegistry,
    store: &SqliteStore,
    table: &str,
    query: &str,
    top: usize,
    filter_string: &str,
) -> Result<Vec<Row>> {
    let schema = registry
        .schemas()
        .get(table)
        .ok_or_else(|| ServiceError::TableNotFound(table.to_string()))?;

    let top = top.max(1);
    let query = query.trim().to_lowercase();
    let has_query = !query.is_empty();
    let filters = compile_filters(filter_string, schema);

    let (lexical_ids, semantic_ids) = if has_query {
        let lexical_ids = run_lexical(store, schema, &query, &filters, top);
        let semantic_ids = run_semantic(registry, store, schema, &query, &filters, top);
        (lexical_ids, semantic_ids)
    } else {
        // No query text: the filter scan is the only retriever.
        let lexical_ids = store
            .filtered_ids_limited(&schema.name, &filters, top)
            .unwrap_or_else(|err| {
                warn!(table = %schema.name, %err, "filtered id scan failed; returning no rows");
                Vec::new()
            });
        (lexical_ids, Vec::new())
    };

    let fused = fuse(&lexical_ids, &semantic_ids);
    if fused.is_empty() {
        return Ok(Vec::new());
    }

    hydrate(store, &schema.name, &fused)
}

fn run_lexical(
    store: &SqliteStore,
    schema: &record_model::TableSchema,
    query: &str,
    filters: &[CompiledFilter],
    top: usize,
) -> Vec<i64> {
    let result = if filters.is_empty() {
        store.lexical_search(&schema.name, &schema.text_columns, query, top)
    } else {
        store.lexical_search_filtered(&schema.name, &schema.text_columns, query, filters, top)
    };
    result.unwrap_or_else(|err| {
        warn!(table = %schema.name, %err, "lexical retrieval failed; degrading to empty stream");
        Vec::new()
    })
}

fn run_semantic(
    registry: &IndexRegistry,
    store: &SqliteStore,
    schema: &record_model::TableSchema,
    query: &str,
    filters: &[CompiledFilter],
    top: usize,
) -> Vec<i64> {
    if !schema.hybrid {
        return Vec::new();
    }
    let Some(handle) = registry.index_for(&schema.name) else {
        warn!(table = %schema.name, "hybrid table has no registered vector index; using lexical only");
        return Vec::new();
    };

    let vector = match registry.embedder().embed(query) {
        Ok(v) => v,
        Err(err) => {
            warn!(table = %schema.name, %err, "query embedding failed; degrading to lexical only");
            return Vec::new();
        }
    };

    let hits = if filters.is_empty() {
        handle.read().search_top_k(&vector, top)
    } else {
        // The vector index is pre-filtered with exactly the same predicate
        // set the lexical retriever saw.
        let allowed = match store.filtered_ids(&schema.name, filters) {
            Ok(ids) => ids.into_iter().collect::<HashSet<i64>>(),
            Err(err) => {
                warn!(table = %schema.name, %err, "allowed-id scan failed; degrading to lexical only");
                return Vec::new();
            }
        };
        handle.read().search_top_k_filtered(&vector, top, &allowed)
    };

    match hits {
        // Negative ids are "no result" slot markers and never reach fusion.
        Ok(hits) => hits
            .into_iter()
            .map(|(id, _)| id)
            .filter(|&id| id >= 0)
            .collect(),
        Err(err) => {
            warn!(table = %schema.name, %err, "vector search failed; degrading to lexical only");
            Vec::new()
        }
    }
}

/// Ordered deduplicating union: every lexical id in order, then every
/// not-yet-seen semantic id in order.
pub fn fuse(lexical_ids: &[i64], semantic_ids: &[i64]) -> Vec<i64> {
    let mut seen = HashSet::with_capacity(lexical_ids.len() + semantic_ids.len());
    let mut fused = Vec::with_capacity(lexical_ids.len() + semantic_ids.len());
    for &id in lexical_ids.iter().chain(semantic_ids.iter()) {
        if seen.insert(id) {
            fused.push(id);
        }
    }
    fused
}

/// Fetches rows for the fused ids and re-emits them in fusion order. Ids
/// absent from the fetch (deleted rows still present in the vector index)
/// are silently skipped.
fn hydrate(store: &SqliteStore, table: &str, fused: &[i64]) -> Result<Vec<Row>> {
    let rows = match store.fetch_by_ids(table, fused) {
        Ok(rows) => rows,
        Err(err) => {
            warn!(table, %err, "row hydration failed; returning no rows");
            return Ok(Vec::new());
        }
    };

    let mut by_id: HashMap<i64, Row> = HashMap::with_capacity(rows.len());
    for row in rows {
        if let Some(id) = row.get("id").and_then(|v| v.as_i64()) {
            by_id.insert(id, row);
        }
    }

    Ok(fused
        .iter()
        .filter_map(|id| by_id.remove(id))
        .map(sanitize_row)
        .collect())
}

/// Strips internal fields from a response row.
pub fn sanitize_row(mut row: Row) -> Row {
    for field in RESPONSE_FIELD_DENYLIST {
        row.remove(field);
    }
    row
}
