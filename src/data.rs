use std::{cmp::Ordering, fmt};

use anyhow::{Result, anyhow};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

/// Loosely-typed scalar as produced by a decoder.
///
/// Delimited-text fields are dynamically typed (numbers, booleans and ISO
/// dates are recognised); spreadsheet cells keep their native cell type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RawValue {
    Null,
    Boolean(bool),
    Number(f64),
    Date(NaiveDateTime),
    String(String),
}

impl RawValue {
    /// Empty strings count as missing in every sampling and normalization path.
    pub fn is_missing(&self) -> bool {
        match self {
            RawValue::Null => true,
            RawValue::String(s) => s.is_empty(),
            _ => false,
        }
    }

    pub fn as_display(&self) -> String {
        match self {
            RawValue::Null => String::new(),
            RawValue::Boolean(b) => b.to_string(),
            RawValue::Number(n) => format_number(*n),
            RawValue::Date(dt) => format_datetime(dt),
            RawValue::String(s) => s.clone(),
        }
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

/// Canonical scalar stored in a normalized row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Boolean(bool),
    Number(f64),
    Date(NaiveDateTime),
    String(String),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// Numeric view used by ordered filter operators. Dates coerce to epoch
    /// milliseconds, strings are parsed, everything else has no numeric form.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            CellValue::Date(dt) => Some(dt.and_utc().timestamp_millis() as f64),
            CellValue::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            CellValue::Boolean(_) | CellValue::Null => None,
        }
    }

    pub fn as_display(&self) -> String {
        match self {
            CellValue::Null => String::new(),
            CellValue::Boolean(b) => b.to_string(),
            CellValue::Number(n) => format_number(*n),
            CellValue::Date(dt) => format_datetime(dt),
            CellValue::String(s) => s.clone(),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

/// Orders two non-null cells: numbers and dates by magnitude, everything else
/// through [`locale_compare`] on the display form.
pub fn compare_cells(left: &CellValue, right: &CellValue) -> Ordering {
    match (left, right) {
        (CellValue::Number(a), CellValue::Number(b)) => a.total_cmp(b),
        (CellValue::Date(a), CellValue::Date(b)) => a.cmp(b),
        _ => locale_compare(&left.as_display(), &right.as_display()),
    }
}

/// Case-insensitive collation with a case-sensitive tiebreak, so `apple`
/// sorts before `Banana` and `a` before `A`.
pub fn locale_compare(left: &str, right: &str) -> Ordering {
    let folded = left.to_lowercase().cmp(&right.to_lowercase());
    folded.then_with(|| right.cmp(left))
}

pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

pub fn format_datetime(value: &NaiveDateTime) -> String {
    if value.time() == NaiveTime::MIN {
        value.format("%Y-%m-%d").to_string()
    } else {
        value.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

pub fn parse_naive_date(value: &str) -> Result<NaiveDate> {
    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y", "%Y/%m/%d", "%d-%m-%Y"];
    for fmt in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(value, fmt) {
            return Ok(parsed);
        }
    }
    Err(anyhow!("Failed to parse '{value}' as date"))
}

pub fn parse_naive_datetime(value: &str) -> Result<NaiveDateTime> {
    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%d/%m/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M:%S",
        "%d/%m/%Y %H:%M",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    for fmt in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, fmt) {
            return Ok(parsed);
        }
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.naive_utc());
    }
    Err(anyhow!("Failed to parse '{value}' as datetime"))
}

/// Best-effort parse of a date or date-time string into an instant.
/// Plain dates resolve to midnight.
pub fn parse_instant(value: &str) -> Option<NaiveDateTime> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    parse_naive_datetime(trimmed)
        .ok()
        .or_else(|| parse_naive_date(trimmed).ok().map(|d| d.and_time(NaiveTime::MIN)))
}
