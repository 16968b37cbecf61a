//! The one place that decides how expiration instants are stored and shown.
//!
//! Rows hold `expire_at` as epoch milliseconds (UTC). Every read and write of
//! that column goes through [`to_epoch_millis`] / [`from_epoch_millis`], and
//! instants handed to the store are truncated with [`normalize`] first so a
//! value read back compares equal to the value written.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SubsecRound, Utc};

use crate::error::{StoreError, StoreResult};

/// Format used for human-facing output.
pub const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// Naive formats accepted by [`parse_user_input`], interpreted as UTC.
const INPUT_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S"];

/// Encode an instant for the `expire_at` column.
pub fn to_epoch_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

/// Decode an `expire_at` column value.
pub fn from_epoch_millis(millis: i64) -> StoreResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| StoreError::Parse {
        value: millis.to_string(),
        reason: "epoch milliseconds out of range".into(),
    })
}

/// Drop sub-millisecond precision so the instant survives a round trip.
pub fn normalize(at: DateTime<Utc>) -> DateTime<Utc> {
    at.trunc_subsecs(3)
}

/// Render an instant for display.
pub fn display(at: DateTime<Utc>) -> String {
    at.format(DISPLAY_FORMAT).to_string()
}

/// Parse a user-supplied instant: RFC 3339, `YYYY-MM-DD HH:MM[:SS]` or a
/// bare `YYYY-MM-DD` (midnight). Naive forms are taken as UTC.
pub fn parse_user_input(input: &str) -> StoreResult<DateTime<Utc>> {
    let input = input.trim();

    if let Ok(at) = DateTime::parse_from_rfc3339(input) {
        return Ok(at.with_timezone(&Utc));
    }

    for format in INPUT_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            return Ok(naive.and_utc());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d")
        && let Some(naive) = date.and_hms_opt(0, 0, 0)
    {
        return Ok(naive.and_utc());
    }

    Err(StoreError::Parse {
        value: input.to_string(),
        reason: "expected RFC 3339 or `YYYY-MM-DD HH:MM[:SS]`".into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn epoch_millis_round_trip_after_normalize() {
        let at = Utc.with_ymd_and_hms(2026, 10, 18, 9, 30, 15).unwrap()
            + chrono::TimeDelta::nanoseconds(123_456_789);
        let normalized = normalize(at);

        let decoded = from_epoch_millis(to_epoch_millis(normalized)).unwrap();
        assert_eq!(decoded, normalized);
        assert_eq!(to_epoch_millis(normalized) % 1000, 123);
    }

    #[test]
    fn out_of_range_millis_is_a_parse_error() {
        let err = from_epoch_millis(i64::MAX).unwrap_err();
        assert!(matches!(err, StoreError::Parse { .. }));
    }

    #[test]
    fn parses_accepted_input_forms() {
        let expected = Utc.with_ymd_and_hms(2026, 12, 1, 8, 5, 0).unwrap();
        assert_eq!(parse_user_input("2026-12-01T08:05:00Z").unwrap(), expected);
        assert_eq!(parse_user_input("2026-12-01 08:05").unwrap(), expected);
        assert_eq!(parse_user_input(" 2026-12-01 08:05:00 ").unwrap(), expected);
        assert_eq!(
            parse_user_input("2026-12-01").unwrap(),
            Utc.with_ymd_and_hms(2026, 12, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn rejects_locale_style_dates() {
        assert!(parse_user_input("12/01/2026 8:05 AM").is_err());
    }

    #[test]
    fn display_is_utc() {
        let at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(display(at), "2026-01-02 03:04:05 UTC");
    }
}
