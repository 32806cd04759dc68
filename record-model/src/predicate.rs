//! Compiled filter predicates.
//!
//! A `Predicate` is the typed output of the filter compiler, consumed by
//! both the relational search (as a SQL conjunction) and the vector search
//! (to materialize the allowed-id set). It is a closed sum type; the store
//! adapter matches exhaustively when lowering to SQL.

use std::fmt;

use chrono::NaiveDateTime;

/// A converted filter value, tagged with the declared data type.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Int(i64),
    Decimal(f64),
    Text(String),
    Date(NaiveDateTime),
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Int(v) => write!(f, "{v}"),
            FilterValue::Decimal(v) => write!(f, "{v}"),
            FilterValue::Text(v) => write!(f, "{v}"),
            FilterValue::Date(v) => write!(f, "{}", v.format("%Y-%m-%dT%H:%M:%S")),
        }
    }
}

/// One compiled predicate over a declared column.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Equal {
        column: String,
        value: FilterValue,
    },
    InSet {
        column: String,
        values: Vec<FilterValue>,
    },
    RangeMin {
        column: String,
        min: FilterValue,
    },
    RangeMax {
        column: String,
        max: FilterValue,
    },
    RangeBoth {
        column: String,
        min: FilterValue,
        max: FilterValue,
    },
    Like {
        column: String,
        pattern: String,
    },
    /// Great-circle distance filter bound to the owning table's lat/lon
    /// columns. Radius is kilometers.
    Within {
        lat_column: String,
        lon_column: String,
        center_lat: f64,
        center_lon: f64,
        max_km: f64,
    },
}

impl Predicate {
    /// The declared filter column this predicate originated from. For
    /// `Within` that is the declared geo column name recorded separately by
    /// the compiler, so it is not derivable here; distance predicates
    /// report their latitude column instead.
    pub fn column(&self) -> &str {
        match self {
            Predicate::Equal { column, .. }
            | Predicate::InSet { column, .. }
            | Predicate::RangeMin { column, .. }
            | Predicate::RangeMax { column, .. }
            | Predicate::RangeBoth { column, .. }
            | Predicate::Like { column, .. } => column,
            Predicate::Within { lat_column, .. } => lat_column,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn filter_values_display_in_dsl_form() {
        assert_eq!(FilterValue::Int(42).to_string(), "42");
        assert_eq!(FilterValue::Decimal(20.5).to_string(), "20.5");
        assert_eq!(FilterValue::Decimal(20.0).to_string(), "20");
        assert_eq!(FilterValue::Text("ativo".into()).to_string(), "ativo");

        let date = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(12, 30, 0)
            .unwrap();
        assert_eq!(FilterValue::Date(date).to_string(), "2024-03-01T12:30:00");
    }
}
