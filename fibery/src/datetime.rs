//! Normalization of caller supplied dates into absolute instants.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};

use crate::{Error, ErrorKind, Result};

const NAIVE_DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Convert `value` into a UTC instant formatted like `2024-03-01T09:30:00.000Z`.
///
/// Values carrying their own offset keep it. Local date times and plain dates
/// are interpreted in `offset`; a plain date means its midnight.
pub fn normalize_instant(value: &str, offset: FixedOffset) -> Result<String> {
    let value = value.trim();

    if let Ok(instant) = DateTime::parse_from_rfc3339(value) {
        return Ok(format_instant(instant.with_timezone(&Utc)));
    }

    let naive = match NAIVE_DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
    {
        Some(naive) => naive,
        None => NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .map_err(|e| Error::from(e).with_context("value", value))?
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| {
                Error::new(ErrorKind::InvalidInput, "date has no midnight")
                    .with_context("value", value)
            })?,
    };

    let local = offset.from_local_datetime(&naive).single().ok_or_else(|| {
        Error::new(ErrorKind::InvalidInput, "local time is ambiguous")
            .with_context("value", value)
    })?;

    Ok(format_instant(local.with_timezone(&Utc)))
}

fn format_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}
