//! Cell value parsers.
//!
//! Every parser here is total: a cell either yields a typed value or `None`.
//! A cell that cannot be read is treated as an absent value and never fails the row.

use chrono::NaiveDate;
use regex::Regex;
use std::sync::OnceLock;

/// Placeholders spreadsheet exports use for "no value".
const NULL_MARKERS: &[&str] = &["-", "—"];

fn mmddyy_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^([0-9]{1,2})-([0-9]{1,2})-([0-9]{2})$").expect("MM-DD-YY pattern is valid")
    })
}

fn mdyyyy_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^([0-9]{1,2})/([0-9]{1,2})/([0-9]{4})$").expect("M/D/YYYY pattern is valid")
    })
}

/// Returns the trimmed cell, or `None` for blanks and dash placeholders.
fn non_null(raw: &str) -> Option<&str> {
    let s = raw.trim();
    if s.is_empty() || NULL_MARKERS.contains(&s) {
        None
    } else {
        Some(s)
    }
}

fn finite(cleaned: &str) -> Option<f64> {
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Parse a money cell like `$1,234.50`.
///
/// Strips the currency symbol, thousands separators and any whitespace.
pub fn parse_money(raw: &str) -> Option<f64> {
    let s = non_null(raw)?;
    let cleaned: String = s
        .chars()
        .filter(|c| *c != '$' && *c != ',' && !c.is_whitespace())
        .collect();
    finite(&cleaned)
}

/// Parse a plain numeric cell like `12,500`. No currency symbol is accepted.
pub fn parse_number(raw: &str) -> Option<f64> {
    let s = non_null(raw)?;
    let cleaned = s.replace(',', "");
    finite(&cleaned)
}

/// Parse `MM-DD-YY`, pivoting two-digit years at 70 (`70..=99` is 19xx, the rest 20xx).
pub fn parse_date_mmddyy(raw: &str) -> Option<NaiveDate> {
    let caps = mmddyy_pattern().captures(raw.trim())?;
    let month: u32 = caps[1].parse().ok()?;
    let day: u32 = caps[2].parse().ok()?;
    let yy: i32 = caps[3].parse().ok()?;
    let year = if yy >= 70 { 1900 + yy } else { 2000 + yy };
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Parse `M/D/YYYY` (e.g. `1/1/2025`, `10/17/2025`).
pub fn parse_date_mdyyyy(raw: &str) -> Option<NaiveDate> {
    let caps = mdyyyy_pattern().captures(raw.trim())?;
    let month: u32 = caps[1].parse().ok()?;
    let day: u32 = caps[2].parse().ok()?;
    let year: i32 = caps[3].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Trimmed text, `None` when blank.
pub fn clean_text(raw: &str) -> Option<String> {
    let s = raw.trim();
    (!s.is_empty()).then(|| s.to_string())
}
