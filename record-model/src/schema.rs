//! Table schema declarations and the process-lifetime registry.
//!
//! Schemas are built once at startup from configuration and are immutable
//! afterwards. Validation failures here are configuration errors and abort
//! startup; nothing in this module is reachable from request input.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::is_valid_identifier;

/// How a filter clause is interpreted by the compiler and the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    Exact,
    In,
    Range,
    Like,
    Distance,
}

/// Declared value type of a filterable column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterDataType {
    Int,
    Decimal,
    String,
    Enum,
    Date,
    Geo,
}

/// A single filterable column declared on a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterDescriptor {
    pub column: String,
    pub kind: FilterKind,
    pub data_type: FilterDataType,
    #[serde(default)]
    pub valid_enum_values: Option<Vec<String>>,
}

impl FilterDescriptor {
    pub fn new(column: impl Into<String>, kind: FilterKind, data_type: FilterDataType) -> Self {
        Self {
            column: column.into(),
            kind,
            data_type,
            valid_enum_values: None,
        }
    }

    pub fn with_enum_values(mut self, values: Vec<String>) -> Self {
        self.valid_enum_values = Some(values);
        self
    }
}

/// Immutable declaration of a searchable table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    /// Columns used for both lexical and semantic indexing, in order.
    pub text_columns: Vec<String>,
    /// When false, only lexical retrieval runs and no vector index exists.
    pub hybrid: bool,
    #[serde(default)]
    pub filters: Vec<FilterDescriptor>,
    #[serde(default)]
    pub latitude_column: Option<String>,
    #[serde(default)]
    pub longitude_column: Option<String>,
}

impl TableSchema {
    /// Looks up the filter descriptor declared for `column`, if any.
    pub fn filter_for(&self, column: &str) -> Option<&FilterDescriptor> {
        self.filters.iter().find(|f| f.column == column)
    }

    /// Checks the structural invariants of a declared schema.
    pub fn validate(&self) -> Result<(), SchemaError> {
        if !is_valid_identifier(&self.name) {
            return Err(SchemaError::InvalidTableName(self.name.clone()));
        }
        if self.text_columns.is_empty() {
            return Err(SchemaError::NoTextColumns(self.name.clone()));
        }
        for col in &self.text_columns {
            if !is_valid_identifier(col) {
                return Err(SchemaError::InvalidColumnName {
                    table: self.name.clone(),
                    column: col.clone(),
                });
            }
        }
        for geo_col in [&self.latitude_column, &self.longitude_column]
            .into_iter()
            .flatten()
        {
            if !is_valid_identifier(geo_col) {
                return Err(SchemaError::InvalidColumnName {
                    table: self.name.clone(),
                    column: geo_col.clone(),
                });
            }
        }
        for filter in &self.filters {
            if !is_valid_identifier(&filter.column) {
                return Err(SchemaError::InvalidColumnName {
                    table: self.name.clone(),
                    column: filter.column.clone(),
                });
            }
            if filter.kind == FilterKind::Distance {
                if filter.data_type != FilterDataType::Geo {
                    return Err(SchemaError::DistanceNotGeo {
                        table: self.name.clone(),
                        column: filter.column.clone(),
                    });
                }
                if self.latitude_column.is_none() || self.longitude_column.is_none() {
                    return Err(SchemaError::MissingGeoBinding {
                        table: self.name.clone(),
                        column: filter.column.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum SchemaError {
    #[error("invalid table name `{0}`; only [A-Za-z0-9_] is allowed")]
    InvalidTableName(String),
    #[error("invalid column name `{column}` on table `{table}`")]
    InvalidColumnName { table: String, column: String },
    #[error("table `{0}` declares no text columns")]
    NoTextColumns(String),
    #[error("distance filter `{column}` on table `{table}` must have data_type geo")]
    DistanceNotGeo { table: String, column: String },
    #[error("distance filter `{column}` on table `{table}` requires latitude_column and longitude_column")]
    MissingGeoBinding { table: String, column: String },
    #[error("table `{0}` declared more than once")]
    DuplicateTable(String),
}

/// Process-lifetime lookup of declared tables. Built once at startup;
/// lookup is O(1) and enumeration order follows the declaration order.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    tables: Vec<TableSchema>,
    by_name: HashMap<String, usize>,
}

impl SchemaRegistry {
    pub fn new(tables: Vec<TableSchema>) -> Result<Self, SchemaError> {
        let mut by_name = HashMap::with_capacity(tables.len());
        for (idx, table) in tables.iter().enumerate() {
            table.validate()?;
            if by_name.insert(table.name.clone(), idx).is_some() {
                return Err(SchemaError::DuplicateTable(table.name.clone()));
            }
        }
        Ok(Self { tables, by_name })
    }

    pub fn get(&self, name: &str) -> Option<&TableSchema> {
        self.by_name.get(name).map(|&idx| &self.tables[idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = &TableSchema> {
        self.tables.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|t| t.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
