use chrono::{DateTime, NaiveDate, NaiveDateTime, Timelike, Utc};

/// Current time as naive UTC, truncated to the microsecond precision the
/// database keeps.
pub fn now() -> NaiveDateTime {
    truncate_to_micros(Utc::now().naive_utc())
}

pub fn truncate_to_micros(value: NaiveDateTime) -> NaiveDateTime {
    let micros = value.nanosecond() / 1_000;
    value.with_nanosecond(micros * 1_000).unwrap_or(value)
}

/// Fractional seconds are only emitted when non-zero, always with six digits.
fn format_micros(value: &NaiveDateTime, pattern: &str) -> String {
    if value.nanosecond() / 1_000 == 0 {
        value.format(pattern).to_string()
    } else {
        format!("{}{}", value.format(pattern), value.format("%.6f"))
    }
}

/// Render an ISO-8601 timestamp without offset.
pub fn iso_format(value: &NaiveDateTime) -> String {
    format_micros(value, "%Y-%m-%dT%H:%M:%S")
}

/// Space-separated form used in messages, e.g. `2019-06-02 00:00:00.120000`.
pub fn display_format(value: &NaiveDateTime) -> String {
    format_micros(value, "%Y-%m-%d %H:%M:%S")
}

/// Parse a payload date. Accepts RFC 3339, a naive ISO date-time or a plain
/// calendar date (taken as midnight UTC).
pub fn parse_timestamp(text: &str) -> Result<NaiveDateTime, String> {
    let text = text.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Ok(truncate_to_micros(parsed.with_timezone(&Utc).naive_utc()));
    }

    for pattern in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(text, pattern) {
            return Ok(truncate_to_micros(parsed));
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight);
        }
    }

    Err(format!("Invalid date: '{}'", text))
}
