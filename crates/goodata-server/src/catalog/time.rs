//! Permissive timestamp parsing for catalog responses.
//!
//! The catalog is inconsistent about timestamp formats: most fields carry
//! `YYYY-MM-DDTHH:MM:SS.ffffff` without a timezone, some carry proper
//! RFC 3339, and optional fields may be `null` or the empty string.
//! Timestamps without a timezone are taken as UTC.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};

pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }

    if let Ok(parsed) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(parsed.and_utc());
    }

    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S").map(|naive| naive.and_utc())
}

/// Deserializer for optional catalog timestamps; `null` and `""` map to
/// `None`.
pub(crate) fn deserialize_optional<'de, D>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    match value.as_deref() {
        None | Some("") => Ok(None),
        Some(raw) => parse_timestamp(raw)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_parse_rfc3339() {
        let parsed = parse_timestamp("2024-03-01T10:15:30+02:00").unwrap();
        assert_eq!(parsed.hour(), 8);
    }

    #[test]
    fn test_parse_without_timezone_assumes_utc() {
        let parsed = parse_timestamp("2023-11-07T08:30:00.123456").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2023-11-07T08:30:00.123456+00:00");
    }

    #[test]
    fn test_parse_without_microseconds() {
        let parsed = parse_timestamp("2023-11-07T08:30:00").unwrap();
        assert_eq!(parsed.hour(), 8);
        assert_eq!(parsed.minute(), 30);
    }

    #[test]
    fn test_parse_garbage_fails() {
        assert!(parse_timestamp("last tuesday").is_err());
        assert!(parse_timestamp("2023-13-45T99:00:00").is_err());
    }
}
