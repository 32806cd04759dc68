//! Geospatial support for distance filters.
//!
//! Distance predicates compare great-circle kilometers against a radius.
//! The computation is exposed to SQL as a `haversine_km` scalar function
//! registered on every connection, so the same code path serves both the
//! relational pre-filter and any in-process checks.

use geo::{HaversineDistance, Point};
use rusqlite::functions::FunctionFlags;
use rusqlite::Connection;

/// Great-circle distance in kilometers between two (lat, lon) points.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let a = Point::new(lon1, lat1);
    let b = Point::new(lon2, lat2);
    a.haversine_distance(&b) / 1000.0
}

/// Registers `haversine_km(lat1, lon1, lat2, lon2)` on `conn`.
/// NULL coordinates yield NULL, which excludes the row from any `<=`
/// comparison.
pub fn register_sql_functions(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "haversine_km",
        4,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let mut coords = [0f64; 4];
            for (i, slot) in coords.iter_mut().enumerate() {
                match ctx.get::<Option<f64>>(i)? {
                    Some(v) => *slot = v,
                    None => return Ok(None),
                }
            }
            Ok(Some(haversine_km(coords[0], coords[1], coords[2], coords[3])))
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_matches_known_distances() {
        // New York to Philadelphia, roughly 130 km.
        let dist = haversine_km(40.7128, -74.0060, 39.9526, -75.1652);
        assert!((dist - 130.0).abs() < 5.0, "got {dist}");

        let zero = haversine_km(40.0, -74.0, 40.0, -74.0);
        assert!(zero < 1e-9);
    }

    #[test]
    fn sql_function_is_usable_in_queries() {
        let conn = Connection::open_in_memory().unwrap();
        register_sql_functions(&conn).unwrap();

        let dist: f64 = conn
            .query_row(
                "SELECT haversine_km(40.0, -74.0, 40.1, -74.1)",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!((dist - 14.0).abs() < 1.0, "got {dist}");

        let null_dist: Option<f64> = conn
            .query_row("SELECT haversine_km(40.0, -74.0, NULL, -74.1)", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert!(null_dist.is_none());
    }
}
