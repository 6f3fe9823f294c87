//! Date cell parsing for staging rows.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y/%m/%d"];

const OFFSET_DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%:z", "%Y-%m-%d %H:%M:%S%.f%:z"];

const NAIVE_DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// Parse a staging date cell into a calendar date.
///
/// Timestamps keep the date as written: `2024-10-03 00:00:00-04:00` is
/// 2024-10-03, not the UTC date.
pub fn parse_calendar_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    for fmt in OFFSET_DATETIME_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.date_naive());
        }
    }
    for fmt in NAIVE_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn plain_dates() {
        assert_eq!(parse_calendar_date("2024-10-03"), Some(d(2024, 10, 3)));
        assert_eq!(parse_calendar_date(" 2024-10-03 "), Some(d(2024, 10, 3)));
        assert_eq!(parse_calendar_date("2024/10/03"), Some(d(2024, 10, 3)));
    }

    #[test]
    fn timestamps_keep_their_written_date() {
        assert_eq!(parse_calendar_date("2024-10-03 00:00:00"), Some(d(2024, 10, 3)));
        assert_eq!(
            parse_calendar_date("2024-10-03 00:00:00-04:00"),
            Some(d(2024, 10, 3))
        );
        assert_eq!(
            parse_calendar_date("2024-10-03 00:00:00+00:00"),
            Some(d(2024, 10, 3))
        );
        assert_eq!(
            parse_calendar_date("2024-10-03T23:30:00+09:00"),
            Some(d(2024, 10, 3))
        );
        assert_eq!(parse_calendar_date("2024-10-03T09:30:00"), Some(d(2024, 10, 3)));
    }

    #[test]
    fn rejects_non_dates() {
        assert_eq!(parse_calendar_date(""), None);
        assert_eq!(parse_calendar_date("Date"), None);
        assert_eq!(parse_calendar_date("2024-02-30"), None);
        assert_eq!(parse_calendar_date("2024-13-01"), None);
        assert_eq!(parse_calendar_date("yesterday"), None);
        assert_eq!(parse_calendar_date("20241003"), None);
    }
}
