//! Filter DSL compiler.
//!
//! The wire format is `column:value` clauses joined by `;`. Each clause is
//! checked against the table's declared filter descriptors and compiled to
//! a typed [`Predicate`]. Parsing is tolerant: an unknown column, a bad
//! token, or an enum value outside its allowlist drops that fragment with a
//! warning and the rest of the request proceeds. A single bad token must
//! never blank out a whole page of results.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use record_model::{FilterDataType, FilterDescriptor, FilterKind, FilterValue, Predicate, TableSchema};
use tracing::warn;

/// A compiled clause: the declared column, its descriptor tags, and the
/// typed predicate both retrievers consume.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFilter {
    pub column: String,
    pub kind: FilterKind,
    pub data_type: FilterDataType,
    pub predicate: Predicate,
}

/// Parses a raw filter string against `schema`. Clauses appear in input
/// order; a repeated column replaces its earlier clause in place.
pub fn compile_filters(raw: &str, schema: &TableSchema) -> Vec<CompiledFilter> {
    let mut compiled: Vec<CompiledFilter> = Vec::new();
    if raw.trim().is_empty() || schema.filters.is_empty() {
        return compiled;
    }

    for clause in raw.split(';') {
        if clause.trim().is_empty() {
            continue;
        }
        let Some((column, value)) = clause.split_once(':') else {
            warn!(table = %schema.name, clause, "skipping malformed filter clause (missing `:`)");
            continue;
        };
        let column = column.trim();
        // Only the value side is case-folded; column names keep their case.
        let value = value.trim().to_lowercase();

        let Some(descriptor) = schema.filter_for(column) else {
            warn!(table = %schema.name, column, "filter column not declared for table; skipping");
            continue;
        };

        let Some(predicate) = compile_clause(&value, descriptor, schema) else {
            warn!(table = %schema.name, column, value = %value, "could not parse filter value; clause dropped");
            continue;
        };

        let entry = CompiledFilter {
            column: descriptor.column.clone(),
            kind: descriptor.kind,
            data_type: descriptor.data_type,
            predicate,
        };
        match compiled.iter().position(|f| f.column == entry.column) {
            Some(pos) => compiled[pos] = entry,
            None => compiled.push(entry),
        }
    }
    compiled
}

fn compile_clause(
    value: &str,
    descriptor: &FilterDescriptor,
    schema: &TableSchema,
) -> Option<Predicate> {
    match descriptor.kind {
        FilterKind::Exact | FilterKind::Like => compile_single(value, descriptor),
        FilterKind::In => compile_in(value, descriptor),
        FilterKind::Range => compile_range(value, descriptor),
        FilterKind::Distance => compile_distance(value, descriptor, schema),
    }
}

fn compile_single(value: &str, descriptor: &FilterDescriptor) -> Option<Predicate> {
    if !enum_allows(value, descriptor) {
        warn!(
            column = %descriptor.column,
            value,
            "enum value not in allowlist; clause dropped"
        );
        return None;
    }
    let converted = convert(value, descriptor.data_type)?;
    Some(match descriptor.kind {
        FilterKind::Like => Predicate::Like {
            column: descriptor.column.clone(),
            pattern: value.to_string(),
        },
        _ => Predicate::Equal {
            column: descriptor.column.clone(),
            value: converted,
        },
    })
}

fn compile_in(value: &str, descriptor: &FilterDescriptor) -> Option<Predicate> {
    let mut values = Vec::new();
    for token in value.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        if !enum_allows(token, descriptor) {
            warn!(
                column = %descriptor.column,
                token,
                "enum value not in allowlist; excluded from IN set"
            );
            continue;
        }
        match convert(token, descriptor.data_type) {
            Some(v) => values.push(v),
            None => warn!(
                column = %descriptor.column,
                token,
                "could not convert value in IN set; token dropped"
            ),
        }
    }
    if values.is_empty() {
        // All tokens invalid means "ignore this filter", never an
        // always-false predicate.
        return None;
    }
    Some(Predicate::InSet {
        column: descriptor.column.clone(),
        values,
    })
}

/// Range grammar: `lo-hi`, `lo-`, `-hi`, or a single token (exact match).
/// The separator is the first `-` whose two sides both convert; this keeps
/// date values, which contain `-` themselves, usable as range endpoints.
fn compile_range(value: &str, descriptor: &FilterDescriptor) -> Option<Predicate> {
    for (pos, _) in value.match_indices('-') {
        let lo = value[..pos].trim();
        let hi = value[pos + 1..].trim();
        if lo.is_empty() && hi.is_empty() {
            continue;
        }
        let min = if lo.is_empty() {
            None
        } else {
            match convert(lo, descriptor.data_type) {
                Some(v) => Some(v),
                None => continue,
            }
        };
        let max = if hi.is_empty() {
            None
        } else {
            match convert(hi, descriptor.data_type) {
                Some(v) => Some(v),
                None => continue,
            }
        };
        let column = descriptor.column.clone();
        return match (min, max) {
            (Some(min), Some(max)) => Some(Predicate::RangeBoth { column, min, max }),
            (Some(min), None) => Some(Predicate::RangeMin { column, min }),
            (None, Some(max)) => Some(Predicate::RangeMax { column, max }),
            (None, None) => continue,
        };
    }

    // No workable separator: a single token is an exact match.
    convert(value, descriptor.data_type).map(|v| Predicate::Equal {
        column: descriptor.column.clone(),
        value: v,
    })
}

fn compile_distance(
    value: &str,
    descriptor: &FilterDescriptor,
    schema: &TableSchema,
) -> Option<Predicate> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    if parts.len() != 3 {
        warn!(
            column = %descriptor.column,
            value,
            "distance filter must be `latitude,longitude,radius_km`"
        );
        return None;
    }
    let center_lat: f64 = parts[0].parse().ok()?;
    let center_lon: f64 = parts[1].parse().ok()?;
    let max_km: f64 = parts[2].parse().ok()?;

    if !(-90.0..=90.0).contains(&center_lat) || !(-180.0..=180.0).contains(&center_lon) {
        warn!(column = %descriptor.column, center_lat, center_lon, "latitude/longitude out of range");
        return None;
    }
    if max_km <= 0.0 {
        warn!(column = %descriptor.column, max_km, "distance radius must be positive");
        return None;
    }

    // Schema validation guarantees the binding exists for declared
    // distance filters; a missing one here is a dropped clause, not a panic.
    let (Some(lat_column), Some(lon_column)) =
        (schema.latitude_column.clone(), schema.longitude_column.clone())
    else {
        warn!(table = %schema.name, column = %descriptor.column, "distance filter without lat/lon binding");
        return None;
    };

    Some(Predicate::Within {
        lat_column,
        lon_column,
        center_lat,
        center_lon,
        max_km,
    })
}

fn enum_allows(token: &str, descriptor: &FilterDescriptor) -> bool {
    if descriptor.data_type != FilterDataType::Enum {
        return true;
    }
    match &descriptor.valid_enum_values {
        // Tokens arrive lowercased; the allowlist is folded to match.
        Some(allowed) => allowed.iter().any(|v| v.to_lowercase() == token),
        None => true,
    }
}

/// Converts a lowercased token into the declared value type. Empty input
/// only converts for string-like types.
fn convert(token: &str, data_type: FilterDataType) -> Option<FilterValue> {
    if token.is_empty()
        && !matches!(data_type, FilterDataType::String | FilterDataType::Enum)
    {
        return None;
    }
    match data_type {
        FilterDataType::Int => token.parse::<i64>().ok().map(FilterValue::Int),
        FilterDataType::Decimal => token.parse::<f64>().ok().map(FilterValue::Decimal),
        FilterDataType::Date => parse_date(token).map(FilterValue::Date),
        FilterDataType::String | FilterDataType::Enum => {
            Some(FilterValue::Text(token.to_string()))
        }
        // Geo values never pass through scalar conversion.
        FilterDataType::Geo => None,
    }
}

/// ISO-8601 with `T` or space separator; a trailing `Z` (or offset) is
/// taken as UTC. Tokens arrive lowercased, so fold back up first.
fn parse_date(token: &str) -> Option<NaiveDateTime> {
    let token = token.to_uppercase();
    if let Ok(dt) = DateTime::parse_from_rfc3339(&token) {
        return Some(dt.naive_utc());
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&token, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(&token, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

impl fmt::Display for CompiledFilter {
    /// Re-serializes the clause in DSL form. Compiling the rendered string
    /// against the same schema yields an equal predicate.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.predicate {
            Predicate::Equal { value, .. } => write!(f, "{}:{}", self.column, value),
            Predicate::Like { pattern, .. } => write!(f, "{}:{}", self.column, pattern),
            Predicate::InSet { values, .. } => {
                let joined: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                write!(f, "{}:{}", self.column, joined.join(","))
            }
            Predicate::RangeBoth { min, max, .. } => {
                write!(f, "{}:{}-{}", self.column, min, max)
            }
            Predicate::RangeMin { min, .. } => write!(f, "{}:{}-", self.column, min),
            Predicate::RangeMax { max, .. } => write!(f, "{}:-{}", self.column, max),
            Predicate::Within {
                center_lat,
                center_lon,
                max_km,
                ..
            } => write!(
                f,
                "{}:{},{},{}",
                self.column, center_lat, center_lon, max_km
            ),
        }
    }
}

/// Joins compiled clauses back into a single DSL string.
pub fn filters_to_dsl(filters: &[CompiledFilter]) -> String {
    filters
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join(";")
}
