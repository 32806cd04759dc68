//! Relational store adapter.
//!
//! Wraps a SQLite connection with the capability set the retrieval engine
//! needs: row fetch by id list, full-text id search (native FTS5), filtered
//! id enumeration, and the combinations of the two. Each searchable table
//! gets an external-content FTS5 mirror `<table>_fts` kept current by
//! triggers, so lexical search stays in sync with row writes without an
//! explicit reindex step.
//!
//! Every table and column name is validated before interpolation; values
//! are always bound parameters.

use std::path::Path;

use rusqlite::types::{Value, ValueRef};
use rusqlite::{params_from_iter, Connection, OpenFlags};
use serde_json::Number;
use tracing::debug;

use record_model::Row;

use crate::sql::{build_conditions, check_identifier};
use crate::{CompiledFilter, StoreError};

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Opens (or creates) the database at `path` and registers the scalar
    /// functions predicates depend on.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Read-write connection to an existing database only; used by
    /// request-scoped adapters so a typo'd path fails loudly instead of
    /// silently creating an empty database.
    pub fn open_existing(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_URI,
        )?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        // journal_mode reports the resulting mode, so it must be queried.
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        // INSERT OR REPLACE must fire the delete triggers that keep the
        // FTS mirror in sync.
        conn.pragma_update(None, "recursive_triggers", true)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        crate::geo::register_sql_functions(&conn)?;
        Ok(Self { conn })
    }

    /// Runs raw DDL/seed statements. Intended for schema setup and tests;
    /// the retrieval paths never pass request input here.
    pub fn execute_batch(&self, sql: &str) -> Result<(), StoreError> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    /// Creates the FTS5 mirror and its sync triggers for `table` if absent.
    /// Safe to call on every startup; on first creation the mirror is
    /// populated from existing rows.
    pub fn ensure_fts(&self, table: &str, text_columns: &[String]) -> Result<(), StoreError> {
        check_identifier(table)?;
        for col in text_columns {
            check_identifier(col)?;
        }
        let fts = format!("{table}_fts");

        let exists: bool = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [&fts],
                |row| row.get::<_, i64>(0),
            )
            .map(|n| n > 0)?;
        if exists {
            return Ok(());
        }

        let cols = text_columns
            .iter()
            .map(|c| format!("\"{c}\""))
            .collect::<Vec<_>>()
            .join(", ");
        let new_cols = text_columns
            .iter()
            .map(|c| format!("new.\"{c}\""))
            .collect::<Vec<_>>()
            .join(", ");
        let old_cols = text_columns
            .iter()
            .map(|c| format!("old.\"{c}\""))
            .collect::<Vec<_>>()
            .join(", ");

        let ddl = format!(
            "CREATE VIRTUAL TABLE \"{fts}\" USING fts5({cols}, content=\"{table}\", content_rowid='id');\n\
             CREATE TRIGGER \"{fts}_ai\" AFTER INSERT ON \"{table}\" BEGIN\n\
               INSERT INTO \"{fts}\"(rowid, {cols}) VALUES (new.id, {new_cols});\n\
             END;\n\
             CREATE TRIGGER \"{fts}_ad\" AFTER DELETE ON \"{table}\" BEGIN\n\
               INSERT INTO \"{fts}\"(\"{fts}\", rowid, {cols}) VALUES ('delete', old.id, {old_cols});\n\
             END;\n\
             CREATE TRIGGER \"{fts}_au\" AFTER UPDATE ON \"{table}\" BEGIN\n\
               INSERT INTO \"{fts}\"(\"{fts}\", rowid, {cols}) VALUES ('delete', old.id, {old_cols});\n\
               INSERT INTO \"{fts}\"(rowid, {cols}) VALUES (new.id, {new_cols});\n\
             END;\n\
             INSERT INTO \"{fts}\"(\"{fts}\") VALUES ('rebuild');"
        );
        self.conn.execute_batch(&ddl)?;
        Ok(())
    }

    /// All rows of `table`; used only by full index rebuilds.
    pub fn fetch_all(&self, table: &str) -> Result<Vec<Row>, StoreError> {
        check_identifier(table)?;
        let mut stmt = self.conn.prepare(&format!("SELECT * FROM \"{table}\""))?;
        collect_rows(&mut stmt, [])
    }

    pub fn fetch_by_id(&self, table: &str, id: i64) -> Result<Option<Row>, StoreError> {
        check_identifier(table)?;
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT * FROM \"{table}\" WHERE \"id\" = ?1"))?;
        let mut rows = collect_rows(&mut stmt, [Value::Integer(id)])?;
        Ok(rows.pop())
    }

    /// Rows for `ids`, order unspecified; callers reorder as needed.
    pub fn fetch_by_ids(&self, table: &str, ids: &[i64]) -> Result<Vec<Row>, StoreError> {
        check_identifier(table)?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let mut stmt = self.conn.prepare(&format!(
            "SELECT * FROM \"{table}\" WHERE \"id\" IN ({placeholders})"
        ))?;
        collect_rows(&mut stmt, ids.iter().map(|&id| Value::Integer(id)))
    }

    /// Full-text id search over `text_columns`, best match first.
    pub fn lexical_search(
        &self,
        table: &str,
        text_columns: &[String],
        query_text: &str,
        limit: usize,
    ) -> Result<Vec<i64>, StoreError> {
        check_identifier(table)?;
        let Some(match_expr) = build_match_expression(text_columns, query_text)? else {
            return Ok(Vec::new());
        };
        let fts = format!("{table}_fts");
        let sql = format!(
            "SELECT rowid FROM \"{fts}\" WHERE \"{fts}\" MATCH ?1 ORDER BY rank LIMIT ?2"
        );
        debug!(%sql, %match_expr, "lexical search");
        let mut stmt = self.conn.prepare(&sql)?;
        collect_ids(
            &mut stmt,
            [Value::Text(match_expr), Value::Integer(limit as i64)],
        )
    }

    /// Full-text search composed with the compiled predicate conjunction.
    pub fn lexical_search_filtered(
        &self,
        table: &str,
        text_columns: &[String],
        query_text: &str,
        filters: &[CompiledFilter],
        limit: usize,
    ) -> Result<Vec<i64>, StoreError> {
        check_identifier(table)?;
        let Some(match_expr) = build_match_expression(text_columns, query_text)? else {
            return Ok(Vec::new());
        };
        let cond = build_conditions(filters, Some(table))?;
        if cond.is_empty() {
            return self.lexical_search(table, text_columns, query_text, limit);
        }

        let fts = format!("{table}_fts");
        let sql = format!(
            "SELECT \"{fts}\".rowid FROM \"{fts}\" \
             JOIN \"{table}\" ON \"{table}\".\"id\" = \"{fts}\".rowid \
             WHERE \"{fts}\" MATCH ? AND {} ORDER BY \"{fts}\".rank LIMIT ?",
            cond.clause
        );
        debug!(%sql, %match_expr, "filtered lexical search");

        let mut params: Vec<Value> = Vec::with_capacity(cond.params.len() + 2);
        params.push(Value::Text(match_expr));
        params.extend(cond.params);
        params.push(Value::Integer(limit as i64));

        let mut stmt = self.conn.prepare(&sql)?;
        collect_ids(&mut stmt, params)
    }

    /// Every id matching the conjunction; no limit. Used to materialize the
    /// allowed-id set for filtered vector search.
    pub fn filtered_ids(
        &self,
        table: &str,
        filters: &[CompiledFilter],
    ) -> Result<Vec<i64>, StoreError> {
        self.filtered_ids_inner(table, filters, None)
    }

    /// Filtered ids with a limit; serves requests that carry no query text.
    pub fn filtered_ids_limited(
        &self,
        table: &str,
        filters: &[CompiledFilter],
        limit: usize,
    ) -> Result<Vec<i64>, StoreError> {
        self.filtered_ids_inner(table, filters, Some(limit))
    }

    fn filtered_ids_inner(
        &self,
        table: &str,
        filters: &[CompiledFilter],
        limit: Option<usize>,
    ) -> Result<Vec<i64>, StoreError> {
        check_identifier(table)?;
        let cond = build_conditions(filters, None)?;

        let mut sql = format!("SELECT \"id\" FROM \"{table}\"");
        let mut params: Vec<Value> = Vec::new();
        if !cond.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&cond.clause);
            params.extend(cond.params);
        }
        if let Some(limit) = limit {
            sql.push_str(" LIMIT ?");
            params.push(Value::Integer(limit as i64));
        }
        debug!(%sql, "filtered id scan");

        let mut stmt = self.conn.prepare(&sql)?;
        collect_ids(&mut stmt, params)
    }

    /// Insert-or-replace a row given as a JSON object. Column names come
    /// from the caller's object and are identifier-checked.
    pub fn upsert_row(&self, table: &str, row: &Row) -> Result<(), StoreError> {
        check_identifier(table)?;
        let mut columns = Vec::with_capacity(row.len());
        let mut params = Vec::with_capacity(row.len());
        for (column, value) in row {
            check_identifier(column)?;
            columns.push(format!("\"{column}\""));
            params.push(json_to_sql(value));
        }
        let placeholders = vec!["?"; params.len()].join(", ");
        let sql = format!(
            "INSERT OR REPLACE INTO \"{table}\" ({}) VALUES ({placeholders})",
            columns.join(", ")
        );
        self.conn.execute(&sql, params_from_iter(params))?;
        Ok(())
    }

    pub fn delete_row(&self, table: &str, id: i64) -> Result<usize, StoreError> {
        check_identifier(table)?;
        let n = self.conn.execute(
            &format!("DELETE FROM \"{table}\" WHERE \"id\" = ?1"),
            [Value::Integer(id)],
        )?;
        Ok(n)
    }
}

/// Builds the FTS5 match expression, scoped to `columns`. Queries of three
/// or fewer non-space characters run in prefix mode; longer queries match
/// any token (the natural-language analogue). Token quoting neutralizes
/// FTS operators and the `+ - ( ) * ?` specials.
fn build_match_expression(
    columns: &[String],
    query_text: &str,
) -> Result<Option<String>, StoreError> {
    for col in columns {
        check_identifier(col)?;
    }
    let trimmed = query_text.trim();
    if trimmed.is_empty() || columns.is_empty() {
        return Ok(None);
    }
    let scope = format!(
        "{{{}}}",
        columns
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    );

    let compact_len = trimmed.chars().filter(|c| !c.is_whitespace()).count();
    let expr = if compact_len <= 3 {
        format!("\"{}\"*", fts_quote(trimmed))
    } else {
        trimmed
            .split_whitespace()
            .map(|token| format!("\"{}\"", fts_quote(token)))
            .collect::<Vec<_>>()
            .join(" OR ")
    };
    Ok(Some(format!("{scope} : ({expr})")))
}

fn fts_quote(token: &str) -> String {
    token.replace('"', "\"\"")
}

fn collect_ids<P>(stmt: &mut rusqlite::Statement<'_>, params: P) -> Result<Vec<i64>, StoreError>
where
    P: IntoIterator<Item = Value>,
{
    let rows = stmt.query_map(params_from_iter(params), |row| row.get::<_, i64>(0))?;
    let mut out = Vec::new();
    for id in rows {
        out.push(id?);
    }
    Ok(out)
}

fn collect_rows<P>(stmt: &mut rusqlite::Statement<'_>, params: P) -> Result<Vec<Row>, StoreError>
where
    P: IntoIterator<Item = Value>,
{
    let column_names: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect();
    let rows = stmt.query_map(params_from_iter(params), |row| {
        let mut out = Row::new();
        for (idx, name) in column_names.iter().enumerate() {
            out.insert(name.clone(), value_to_json(row.get_ref(idx)?));
        }
        Ok(out)
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn value_to_json(value: ValueRef<'_>) -> serde_json::Value {
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(v) => serde_json::Value::Number(v.into()),
        ValueRef::Real(v) => Number::from_f64(v)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        ValueRef::Text(v) => serde_json::Value::String(String::from_utf8_lossy(v).into_owned()),
        // Binary payloads (stored embeddings and the like) have no JSON
        // representation worth shipping.
        ValueRef::Blob(_) => serde_json::Value::Null,
    }
}

fn json_to_sql(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Integer(*b as i64),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Integer(i)
            } else {
                Value::Real(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => Value::Text(s.clone()),
        other => Value::Text(other.to_string()),
    }
}
