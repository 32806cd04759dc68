//! Lowering of compiled predicates to SQL.
//!
//! Identifiers are validated before interpolation; values are always bound
//! parameters. The output is a conjunction fragment plus its parameter
//! vector, ready to compose after a `WHERE` or an `AND`.

use record_model::{is_valid_identifier, FilterValue, Predicate};
use rusqlite::types::Value;

use crate::{CompiledFilter, StoreError};

/// A `WHERE`-composable conjunction. `clause` is empty when no predicate
/// survived compilation.
#[derive(Debug, Default, Clone)]
pub struct SqlCondition {
    pub clause: String,
    pub params: Vec<Value>,
}

impl SqlCondition {
    pub fn is_empty(&self) -> bool {
        self.clause.is_empty()
    }
}

/// Builds the AND-joined condition for `filters`. When `qualifier` is set,
/// plain column references are prefixed with it (needed when the search
/// joins the FTS mirror against the base table).
pub fn build_conditions(
    filters: &[CompiledFilter],
    qualifier: Option<&str>,
) -> Result<SqlCondition, StoreError> {
    if let Some(q) = qualifier {
        check_identifier(q)?;
    }
    let mut clauses: Vec<String> = Vec::new();
    let mut params: Vec<Value> = Vec::new();

    for filter in filters {
        match &filter.predicate {
            Predicate::Equal { column, value } => {
                clauses.push(format!("{} = ?", column_ref(column, qualifier)?));
                params.push(to_sql_value(value));
            }
            Predicate::InSet { column, values } => {
                // An empty set never reaches SQL; the compiler drops the
                // whole clause instead of emitting FALSE.
                if values.is_empty() {
                    continue;
                }
                let placeholders = vec!["?"; values.len()].join(", ");
                clauses.push(format!(
                    "{} IN ({placeholders})",
                    column_ref(column, qualifier)?
                ));
                params.extend(values.iter().map(to_sql_value));
            }
            Predicate::RangeMin { column, min } => {
                clauses.push(format!("{} >= ?", column_ref(column, qualifier)?));
                params.push(to_sql_value(min));
            }
            Predicate::RangeMax { column, max } => {
                clauses.push(format!("{} <= ?", column_ref(column, qualifier)?));
                params.push(to_sql_value(max));
            }
            Predicate::RangeBoth { column, min, max } => {
                let col = column_ref(column, qualifier)?;
                clauses.push(format!("{col} >= ?"));
                params.push(to_sql_value(min));
                clauses.push(format!("{col} <= ?"));
                params.push(to_sql_value(max));
            }
            Predicate::Like { column, pattern } => {
                clauses.push(format!("{} LIKE ?", column_ref(column, qualifier)?));
                params.push(Value::Text(format!("%{pattern}%")));
            }
            Predicate::Within {
                lat_column,
                lon_column,
                center_lat,
                center_lon,
                max_km,
            } => {
                clauses.push(format!(
                    "haversine_km(?, ?, {}, {}) <= ?",
                    column_ref(lat_column, qualifier)?,
                    column_ref(lon_column, qualifier)?
                ));
                params.push(Value::Real(*center_lat));
                params.push(Value::Real(*center_lon));
                params.push(Value::Real(*max_km));
            }
        }
    }

    Ok(SqlCondition {
        clause: clauses.join(" AND "),
        params,
    })
}

pub(crate) fn check_identifier(name: &str) -> Result<(), StoreError> {
    if is_valid_identifier(name) {
        Ok(())
    } else {
        Err(StoreError::InvalidIdentifier(name.to_string()))
    }
}

fn column_ref(column: &str, qualifier: Option<&str>) -> Result<String, StoreError> {
    check_identifier(column)?;
    Ok(match qualifier {
        Some(q) => format!("\"{q}\".\"{column}\""),
        None => format!("\"{column}\""),
    })
}

/// Dates bind as `YYYY-MM-DD HH:MM:SS` text, which compares correctly
/// against SQLite's datetime text representation.
fn to_sql_value(value: &FilterValue) -> Value {
    match value {
        FilterValue::Int(v) => Value::Integer(*v),
        FilterValue::Decimal(v) => Value::Real(*v),
        FilterValue::Text(v) => Value::Text(v.clone()),
        FilterValue::Date(v) => Value::Text(v.format("%Y-%m-%d %H:%M:%S").to_string()),
    }
}
