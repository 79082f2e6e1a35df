use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::models::referralmodel::DateInput;

/// Resolve any supported date representation into a comparable value.
/// Returns `None` for anything that cannot be read as a real calendar date.
pub fn normalize(input: &DateInput) -> Option<NaiveDateTime> {
    match input {
        DateInput::Parsed(at) => Some(*at),
        DateInput::Millis(ms) => DateTime::from_timestamp_millis(*ms).map(|at| at.naive_utc()),
        DateInput::Text(text) => normalize_text(text),
    }
}

pub fn normalize_text(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if text.contains('/') {
        return parse_day_month_year(text);
    }

    parse_generic(text)
}

// Locale-formatted dates are day first: 15/03/2024
fn parse_day_month_year(text: &str) -> Option<NaiveDateTime> {
    let parts: Vec<&str> = text.split('/').map(str::trim).collect();
    let [day, month, year] = parts.as_slice() else {
        return None;
    };

    let day: u32 = day.parse().ok()?;
    let month: u32 = month.parse().ok()?;
    let year: i32 = year.parse().ok()?;

    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(0, 0, 0)
}

fn parse_generic(text: &str) -> Option<NaiveDateTime> {
    if let Ok(at) = DateTime::parse_from_rfc3339(text) {
        return Some(at.naive_utc());
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(at) = NaiveDateTime::parse_from_str(text, format) {
            return Some(at);
        }
    }

    if let Ok(day) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return day.and_hms_opt(0, 0, 0);
    }

    DateTime::parse_from_rfc2822(text).ok().map(|at| at.naive_utc())
}

/// Last representable instant of the calendar day holding `at`.
pub fn end_of_day(at: NaiveDateTime) -> NaiveDateTime {
    at.date().and_hms_milli_opt(23, 59, 59, 999).unwrap_or(at)
}

pub fn format_display_date(at: NaiveDateTime) -> String {
    at.format("%d/%m/%Y").to_string()
}

pub fn format_display_timestamp(at: NaiveDateTime) -> String {
    at.format("%d/%m/%Y %H:%M:%S").to_string()
}
