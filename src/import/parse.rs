//! Field parsing with explicit format fallbacks.
//!
//! The exports disagree on everything: European vs ISO dates, `.` vs `:` in
//! times, comma vs dot decimals, durations as hours or `hh:mm`. Every parser
//! here walks a fixed fallback list and returns `None` rather than erroring;
//! the pipeline turns `None` into a skipped-row warning.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

const DATETIME_FORMATS: &[&str] = &[
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d/%m/%Y %H.%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%d/%m/%Y", "%Y-%m-%d"];

const TIME_FORMATS: &[&str] = &["%H:%M:%S", "%H:%M", "%H.%M"];

/// Parse a datetime cell. Date-only values get a midnight time.
pub fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(dt);
        }
    }
    parse_date(trimmed).and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Parse a date-only cell.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(trimmed, fmt) {
            return Some(d);
        }
    }
    None
}

/// Parse a time-of-day cell (clock-in exports keep date and time separate).
pub fn parse_time(raw: &str) -> Option<NaiveTime> {
    let trimmed = raw.trim();
    for fmt in TIME_FORMATS {
        if let Ok(t) = NaiveTime::parse_from_str(trimmed, fmt) {
            return Some(t);
        }
    }
    None
}

/// Combine separate date and time cells into one datetime.
pub fn parse_date_time_pair(date_raw: &str, time_raw: &str) -> Option<NaiveDateTime> {
    let date = parse_date(date_raw)?;
    let time = parse_time(time_raw)?;
    Some(date.and_time(time))
}

/// Parse a duration cell into hours.
///
/// Accepts decimal hours with dot or comma ("2.5", "2,5"), `hh:mm` ("2:30"),
/// and a bare integer. Negative and absurd values (> 24h) are rejected.
pub fn parse_duration_hours(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let hours = if let Some((h, m)) = trimmed.split_once(':') {
        let h: f64 = h.trim().parse().ok()?;
        let m: f64 = m.trim().parse().ok()?;
        if m >= 60.0 {
            return None;
        }
        h + m / 60.0
    } else {
        trimmed.replace(',', ".").parse().ok()?
    };

    (hours > 0.0 && hours <= 24.0).then_some(hours)
}

/// Parse a duration cell into whole minutes (session exports).
pub fn parse_duration_minutes(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if let Some((h, m)) = trimmed.split_once(':') {
        let h: i64 = h.trim().parse().ok()?;
        let m: i64 = m.trim().parse().ok()?;
        if m >= 60 {
            return None;
        }
        return Some(h * 60 + m);
    }
    let minutes: i64 = trimmed.parse().ok()?;
    (minutes >= 0).then_some(minutes)
}

/// Interpret a billable-flag cell. Exports use "1"/"0", "si"/"no", "x"/"".
/// Empty means billable — that is the overwhelming default in the data.
pub fn parse_billable(raw: &str) -> bool {
    match raw.trim().to_lowercase().as_str() {
        "" | "1" | "si" | "sì" | "yes" | "x" | "true" => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn test_datetime_fallbacks() {
        let cases = [
            ("05/01/2026 09:30", "2026-01-05 09:30:00"),
            ("05/01/2026 09.30", "2026-01-05 09:30:00"),
            ("2026-01-05 09:30:00", "2026-01-05 09:30:00"),
            ("2026-01-05T09:30:00", "2026-01-05 09:30:00"),
            ("05/01/2026", "2026-01-05 00:00:00"),
        ];
        for (raw, expected) in cases {
            assert_eq!(parse_datetime(raw), Some(dt(expected)), "{raw}");
        }
        assert_eq!(parse_datetime("not a date"), None);
        assert_eq!(parse_datetime(""), None);
    }

    #[test]
    fn test_date_time_pair() {
        assert_eq!(
            parse_date_time_pair("05/01/2026", "08:30"),
            Some(dt("2026-01-05 08:30:00"))
        );
        assert_eq!(parse_date_time_pair("05/01/2026", "late"), None);
    }

    #[test]
    fn test_duration_hours_variants() {
        assert_eq!(parse_duration_hours("2.5"), Some(2.5));
        assert_eq!(parse_duration_hours("2,5"), Some(2.5));
        assert_eq!(parse_duration_hours("2:30"), Some(2.5));
        assert_eq!(parse_duration_hours("3"), Some(3.0));
        assert_eq!(parse_duration_hours("0"), None);
        assert_eq!(parse_duration_hours("-1"), None);
        assert_eq!(parse_duration_hours("25"), None);
        assert_eq!(parse_duration_hours("2:75"), None);
        assert_eq!(parse_duration_hours("abc"), None);
    }

    #[test]
    fn test_duration_minutes() {
        assert_eq!(parse_duration_minutes("42"), Some(42));
        assert_eq!(parse_duration_minutes("1:30"), Some(90));
        assert_eq!(parse_duration_minutes("-5"), None);
    }

    #[test]
    fn test_billable_flag() {
        for raw in ["", "1", "SI", "x", "true"] {
            assert!(parse_billable(raw), "{raw:?}");
        }
        for raw in ["0", "no", "n"] {
            assert!(!parse_billable(raw), "{raw:?}");
        }
    }
}
