//! Value parsers used for type detection.
//!
//! Each parser either recognizes the whole input or rejects it; the
//! profiler walks them in priority order (int, float, bool, date,
//! datetime) and falls back to string.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

const DATE_FORMATS: &[&str] = &["%m-%d-%Y", "%m-%d-%y", "%m/%d/%Y", "%m/%d/%y"];

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

// chrono's %Y happily reads two-digit years, which would shadow the
// month-first layouts; the ISO layouts only apply when the year is four
// digits wide.
fn iso_shaped(s: &str) -> bool {
    s.len() > 4 && s.as_bytes()[..4].iter().all(u8::is_ascii_digit) && s.as_bytes()[4] == b'-'
}

pub fn parse_int(s: &str) -> Option<i64> {
    s.parse().ok()
}

pub fn parse_float(s: &str) -> Option<f64> {
    s.parse().ok()
}

/// Accepts `1`, `0`, and the alphabetic forms `t`, `f`, `true`, `false` in
/// any casing.
pub fn parse_bool(s: &str) -> Option<bool> {
    match s.trim() {
        "1" => Some(true),
        "0" => Some(false),
        other => match other.to_ascii_lowercase().as_str() {
            "t" | "true" => Some(true),
            "f" | "false" => Some(false),
            _ => None,
        },
    }
}

/// Tries the supported date layouts in order, the ISO form first; first
/// match wins. Month and day may be unpadded, so `3/1/14` parses under the
/// `%m/%d/%y` layout.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if iso_shaped(s) {
        return NaiveDate::parse_from_str(s, "%Y-%m-%d").ok();
    }
    DATE_FORMATS
        .iter()
        .find_map(|layout| NaiveDate::parse_from_str(s, layout).ok())
}

/// Tries the naive datetime layouts, then RFC 3339 for the `Z` and offset
/// forms. Times without a zone are taken as UTC.
pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if !iso_shaped(s) {
        return None;
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(s, layout).ok())
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.naive_utc()))
}
