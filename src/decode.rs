//! Turns raw upload bytes into headers plus loosely-typed row maps.
//!
//! Decoding never fails hard: unknown kinds, unreadable workbooks, empty
//! sheets and ragged rows all come back as an (often empty)
//! [`RawParseResult`] whose `errors` list explains what went wrong.

use std::{
    collections::BTreeMap,
    fmt,
    io::Cursor,
    sync::LazyLock,
};

use calamine::{Data, DataType, Reader, open_workbook_auto_from_rs};
use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    config::DecodeOptions,
    data::{RawValue, parse_instant},
    io_utils,
};

/// Largest magnitude kept as a number; longer digit runs (ids, account
/// numbers) stay strings so they survive the round trip intact.
const MAX_EXACT_FLOAT: f64 = 9_007_199_254_740_992.0;

static FLOAT_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*-?(\d+\.?|\.\d+|\d+\.\d+)([eE][-+]?\d+)?\s*$").expect("float pattern")
});

static ISO_INSTANT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-[01]\d-[0-3]\d([T ][0-2]\d:[0-5]\d(:[0-5]\d(\.\d+)?)?(Z|[+-][0-2]\d:[0-5]\d)?)?$")
        .expect("iso instant pattern")
});

pub type RawRow = BTreeMap<String, RawValue>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileKind {
    SpreadsheetXlsx,
    SpreadsheetLegacy,
    DelimitedText,
}

impl FileKind {
    /// Picks a decode branch from the file extension, falling back to the
    /// declared MIME type.
    pub fn detect(file_name: &str, mime: Option<&str>) -> Option<Self> {
        let by_extension = io_utils::file_extension(file_name).and_then(|ext| match ext.as_str() {
            "xlsx" | "xlsm" | "xlsb" => Some(FileKind::SpreadsheetXlsx),
            "xls" | "ods" => Some(FileKind::SpreadsheetLegacy),
            "csv" | "tsv" | "txt" => Some(FileKind::DelimitedText),
            _ => None,
        });
        by_extension.or_else(|| match mime?.trim().to_ascii_lowercase().as_str() {
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => {
                Some(FileKind::SpreadsheetXlsx)
            }
            "application/vnd.ms-excel" | "application/vnd.oasis.opendocument.spreadsheet" => {
                Some(FileKind::SpreadsheetLegacy)
            }
            "text/csv" | "text/tab-separated-values" | "text/plain" => Some(FileKind::DelimitedText),
            _ => None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::SpreadsheetXlsx => "spreadsheet-xlsx",
            FileKind::SpreadsheetLegacy => "spreadsheet-legacy",
            FileKind::DelimitedText => "delimited-text",
        }
    }

    pub fn is_spreadsheet(&self) -> bool {
        !matches!(self, FileKind::DelimitedText)
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RawParseResult {
    pub headers: Vec<String>,
    /// Rows keyed by header. Duplicate headers collapse: the right-most
    /// column wins.
    pub rows: Vec<RawRow>,
    /// Positional string form of every data row, untouched by header keys.
    pub raw_rows: Vec<Vec<String>>,
    pub errors: Vec<String>,
}

impl RawParseResult {
    fn failed(message: impl Into<String>) -> Self {
        Self {
            errors: vec![message.into()],
            ..Self::default()
        }
    }

    /// All values stored under `key`, one per row, in row order.
    pub fn column_values(&self, key: &str) -> Vec<&RawValue> {
        self.rows
            .iter()
            .map(|row| row.get(key).unwrap_or(&RawValue::Null))
            .collect()
    }
}

pub fn decode(
    bytes: &[u8],
    file_name: &str,
    mime: Option<&str>,
    options: &DecodeOptions,
) -> RawParseResult {
    match FileKind::detect(file_name, mime) {
        Some(kind) => decode_as(kind, bytes, file_name, options),
        None => RawParseResult::failed(format!(
            "Unsupported file type for '{file_name}'; expected .xlsx, .xls, .csv or .tsv"
        )),
    }
}

pub fn decode_as(
    kind: FileKind,
    bytes: &[u8],
    file_name: &str,
    options: &DecodeOptions,
) -> RawParseResult {
    debug!("Decoding '{file_name}' ({} byte(s)) as {kind}", bytes.len());
    if kind.is_spreadsheet() {
        decode_spreadsheet(bytes)
    } else {
        decode_delimited(bytes, file_name, options)
    }
}

fn decode_delimited(bytes: &[u8], file_name: &str, options: &DecodeOptions) -> RawParseResult {
    let mut result = RawParseResult::default();
    let encoding = match io_utils::resolve_encoding(options.encoding.as_deref()) {
        Ok(encoding) => encoding,
        Err(err) => {
            result.errors.push(format!("{err}; falling back to utf-8"));
            encoding_rs::UTF_8
        }
    };
    let (text, had_errors) = io_utils::decode_text(bytes, encoding);
    if had_errors {
        result.errors.push(format!(
            "Input contained sequences invalid for {}; they were replaced",
            encoding.name()
        ));
    }

    let provided = options.delimiter.filter(char::is_ascii).map(|c| c as u8);
    let delimiter = io_utils::resolve_input_delimiter(file_name, &text, provided);
    debug!(
        "Using delimiter '{}' for '{file_name}'",
        io_utils::printable_delimiter(delimiter)
    );

    let mut reader = io_utils::open_csv_reader(text.as_bytes(), delimiter);
    let headers = match reader.headers() {
        Ok(record) => fill_blank_headers(record.iter().map(str::to_string)),
        Err(err) => {
            result.errors.push(format!("Failed to read header row: {err}"));
            return result;
        }
    };
    if headers.is_empty() {
        result.errors.push("Empty file: no header row found".to_string());
        return result;
    }

    for (idx, record) in reader.records().enumerate() {
        let line = idx + 2;
        let record = match record {
            Ok(record) => record,
            Err(err) => {
                result.errors.push(format!("Row {line}: {err}"));
                continue;
            }
        };
        if record.len() != headers.len() {
            result.errors.push(format!(
                "Row {line}: expected {} field(s) but found {}",
                headers.len(),
                record.len()
            ));
        }
        let row = headers
            .iter()
            .enumerate()
            .map(|(col, header)| {
                let value = record.get(col).map(dynamic_type).unwrap_or(RawValue::Null);
                (header.clone(), value)
            })
            .collect();
        result.rows.push(row);
        result.raw_rows.push(record.iter().map(str::to_string).collect());
    }

    result.headers = headers;
    if result.rows.is_empty() {
        result.errors.push("No data rows found after the header".to_string());
    }
    result
}

/// Scalar typing for delimited fields: booleans, float literals and ISO
/// instants become native values, empty fields become null.
pub fn dynamic_type(field: &str) -> RawValue {
    match field {
        "" => return RawValue::Null,
        "true" | "TRUE" => return RawValue::Boolean(true),
        "false" | "FALSE" => return RawValue::Boolean(false),
        _ => {}
    }
    if FLOAT_LITERAL.is_match(field)
        && let Ok(number) = field.trim().parse::<f64>()
        && number.is_finite()
        && number.abs() <= MAX_EXACT_FLOAT
    {
        return RawValue::Number(number);
    }
    if ISO_INSTANT.is_match(field)
        && let Some(instant) = parse_instant(field)
    {
        return RawValue::Date(instant);
    }
    RawValue::String(field.to_string())
}

fn decode_spreadsheet(bytes: &[u8]) -> RawParseResult {
    let mut workbook = match open_workbook_auto_from_rs(Cursor::new(bytes.to_vec())) {
        Ok(workbook) => workbook,
        Err(err) => return RawParseResult::failed(format!("Failed to open workbook: {err}")),
    };
    let range = match workbook.worksheet_range_at(0) {
        Some(Ok(range)) => range,
        Some(Err(err)) => {
            return RawParseResult::failed(format!("Failed to read first worksheet: {err}"));
        }
        None => return RawParseResult::failed("Workbook does not contain any worksheet"),
    };

    let mut rows = range.rows();
    let Some(header_cells) = rows.next() else {
        return RawParseResult::failed("Empty sheet: the first worksheet has no rows");
    };
    let headers = fill_blank_headers(header_cells.iter().map(|cell| cell.to_string()));

    let mut result = RawParseResult {
        headers,
        ..RawParseResult::default()
    };
    for cells in rows {
        if cells.iter().all(|cell| matches!(cell, Data::Empty)) {
            continue;
        }
        let row = result
            .headers
            .iter()
            .enumerate()
            .map(|(col, header)| {
                let value = cells.get(col).map(spreadsheet_cell).unwrap_or(RawValue::Null);
                (header.clone(), value)
            })
            .collect();
        result.rows.push(row);
        result
            .raw_rows
            .push(cells.iter().map(|cell| cell.to_string()).collect());
    }

    if result.rows.is_empty() {
        result
            .errors
            .push("Empty sheet: no data rows below the header".to_string());
    }
    result
}

fn spreadsheet_cell(cell: &Data) -> RawValue {
    match cell {
        Data::Empty | Data::Error(_) => RawValue::Null,
        Data::String(text) if text.is_empty() => RawValue::Null,
        Data::String(text) => RawValue::String(text.clone()),
        Data::Float(number) if number.is_finite() => RawValue::Number(*number),
        Data::Float(_) => RawValue::Null,
        Data::Int(number) => RawValue::Number(*number as f64),
        Data::Bool(flag) => RawValue::Boolean(*flag),
        Data::DateTime(_) | Data::DateTimeIso(_) => cell
            .as_datetime()
            .map(RawValue::Date)
            .unwrap_or_else(|| RawValue::String(cell.to_string())),
        other => RawValue::String(other.to_string()),
    }
}

/// Replaces blank header cells with `column_<index>`. Uniqueness is not
/// enforced beyond that.
fn fill_blank_headers<I>(headers: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let headers = headers.into_iter().collect::<Vec<_>>();
    if headers.iter().all(|h| h.trim().is_empty()) {
        return Vec::new();
    }
    headers
        .into_iter()
        .enumerate()
        .map(|(idx, header)| {
            if header.trim().is_empty() {
                format!("column_{idx}")
            } else {
                header
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_csv(text: &str) -> RawParseResult {
        decode(text.as_bytes(), "upload.csv", None, &DecodeOptions::default())
    }

    #[test]
    fn detect_prefers_extension_then_mime() {
        assert_eq!(FileKind::detect("a.XLSX", None), Some(FileKind::SpreadsheetXlsx));
        assert_eq!(FileKind::detect("a.xls", None), Some(FileKind::SpreadsheetLegacy));
        assert_eq!(FileKind::detect("a.tsv", Some("application/vnd.ms-excel")), Some(FileKind::DelimitedText));
        assert_eq!(FileKind::detect("upload", Some("text/csv")), Some(FileKind::DelimitedText));
        assert_eq!(FileKind::detect("notes.pdf", Some("application/pdf")), None);
        assert!(FileKind::SpreadsheetLegacy.is_spreadsheet());
        assert!(!FileKind::DelimitedText.is_spreadsheet());
    }

    #[test]
    fn unknown_extension_yields_error_instead_of_panicking() {
        let result = decode(b"whatever", "notes.pdf", None, &DecodeOptions::default());
        assert!(result.headers.is_empty());
        assert!(result.rows.is_empty());
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("Unsupported file type"));
    }

    #[test]
    fn delimited_fields_are_dynamically_typed() {
        let result = decode_csv("name,qty,active,when,note\nA,3,true,2024-01-05,\n");
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        let row = &result.rows[0];
        assert_eq!(row["name"], RawValue::String("A".into()));
        assert_eq!(row["qty"], RawValue::Number(3.0));
        assert_eq!(row["active"], RawValue::Boolean(true));
        assert!(matches!(row["when"], RawValue::Date(_)));
        assert_eq!(row["note"], RawValue::Null);
    }

    #[test]
    fn comma_decimal_and_currency_stay_strings() {
        assert_eq!(dynamic_type("R$ 10,50"), RawValue::String("R$ 10,50".into()));
        assert_eq!(dynamic_type("10,5"), RawValue::String("10,5".into()));
        assert_eq!(dynamic_type("-0.25"), RawValue::Number(-0.25));
        assert_eq!(dynamic_type("1e3"), RawValue::Number(1000.0));
        assert_eq!(dynamic_type("True"), RawValue::String("True".into()));
    }

    #[test]
    fn very_long_digit_runs_stay_strings() {
        let id = "12345678901234567890";
        assert_eq!(dynamic_type(id), RawValue::String(id.into()));
    }

    #[test]
    fn ragged_rows_are_padded_and_reported() {
        let result = decode_csv("a,b,c\n1,2\n4,5,6,7\n");
        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.rows[0]["c"], RawValue::Null);
        assert_eq!(result.raw_rows[1].len(), 4);
        assert_eq!(result.errors.len(), 2);
        assert!(result.errors[0].starts_with("Row 2:"));
    }

    #[test]
    fn duplicate_headers_overwrite_earlier_columns() {
        let result = decode_csv("id,id\n1,2\n");
        assert_eq!(result.headers, vec!["id", "id"]);
        assert_eq!(result.rows[0].len(), 1);
        assert_eq!(result.rows[0]["id"], RawValue::Number(2.0));
        assert_eq!(result.raw_rows[0], vec!["1", "2"]);
    }

    #[test]
    fn blank_headers_receive_positional_names() {
        let result = decode_csv("name,,age\nA,x,3\n");
        assert_eq!(result.headers, vec!["name", "column_1", "age"]);
        assert_eq!(result.rows[0]["column_1"], RawValue::String("x".into()));
    }

    #[test]
    fn header_only_file_reports_missing_rows() {
        let result = decode_csv("a,b\n");
        assert_eq!(result.headers, vec!["a", "b"]);
        assert!(result.rows.is_empty());
        assert_eq!(result.errors, vec!["No data rows found after the header".to_string()]);
    }

    #[test]
    fn empty_input_reports_missing_header() {
        let result = decode_csv("");
        assert!(result.headers.is_empty());
        assert_eq!(result.errors, vec!["Empty file: no header row found".to_string()]);
    }

    #[test]
    fn unreadable_workbook_degrades_to_error_list() {
        let result = decode(b"not a zip archive", "book.xlsx", None, &DecodeOptions::default());
        assert!(result.rows.is_empty());
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].starts_with("Failed to open workbook"));
    }
}
