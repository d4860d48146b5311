//! Database value parsing utilities
//!
//! Converts stored text columns back into typed values without panicking.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::Error as SqlError;
use serde::de::DeserializeOwned;
use uuid::Uuid;

fn conversion_error<E>(column: usize, err: E) -> SqlError
where
    E: std::error::Error + Send + Sync + 'static,
{
    SqlError::FromSqlConversionFailure(column, Type::Text, Box::new(err))
}

/// Parse a UUID from a database string column
pub fn parse_uuid(column: usize, s: &str) -> Result<Uuid, SqlError> {
    Uuid::parse_str(s).map_err(|e| conversion_error(column, e))
}

/// Parse a DateTime from an RFC3339 string
pub fn parse_datetime(column: usize, s: &str) -> Result<DateTime<Utc>, SqlError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(column, e))
}

/// Parse an optional DateTime from an RFC3339 string
pub fn parse_datetime_opt(column: usize, s: Option<String>) -> Result<Option<DateTime<Utc>>, SqlError> {
    s.map(|s| parse_datetime(column, &s)).transpose()
}

/// Fixed-width RFC3339 so stored timestamps compare correctly as text
pub fn sortable_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a JSON text column into a typed value
pub fn parse_json<T: DeserializeOwned>(column: usize, s: &str) -> Result<T, SqlError> {
    serde_json::from_str(s).map_err(|e| conversion_error(column, e))
}

/// Extension trait for converting rusqlite Results to Option
pub trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>, SqlError>;
}

impl<T> OptionalExt<T> for Result<T, SqlError> {
    fn optional(self) -> Result<Option<T>, SqlError> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(SqlError::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_bad_uuid_is_conversion_failure() {
        let err = parse_uuid(3, "not-a-uuid").unwrap_err();
        assert!(matches!(err, SqlError::FromSqlConversionFailure(3, Type::Text, _)));
    }

    #[test]
    fn test_sortable_datetime_orders_as_text() {
        let early = DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let late = early + chrono::Duration::milliseconds(1500);
        assert!(sortable_datetime(&early) < sortable_datetime(&late));
        assert_eq!(parse_datetime(0, &sortable_datetime(&late)).unwrap(), late);
    }

    #[test]
    fn test_parse_json_map() {
        let parsed: BTreeMap<String, i64> = parse_json(0, r#"{"a": 1, "b": 2}"#).unwrap();
        assert_eq!(parsed.get("b"), Some(&2));
        assert!(parse_json::<BTreeMap<String, i64>>(0, "[").is_err());
    }

    #[test]
    fn test_optional_maps_no_rows() {
        let none: Result<i32, SqlError> = Err(SqlError::QueryReturnedNoRows);
        assert_eq!(none.optional().unwrap(), None);
    }
}
