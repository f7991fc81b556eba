//! Raw cell → canonical [`CellValue`] conversion and dataset assembly.
//!
//! Provides [`normalize_value()`] which rewrites one loosely-typed cell into
//! the representation implied by its column type, and [`normalize_rows()`]
//! which applies it across a decode result to build [`DataRow`]s. Values that
//! cannot be coerced become `Null`; nothing here returns an error.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::{
    data::{CellValue, RawValue, parse_instant},
    decode::{FileKind, RawParseResult},
    schema::{ColumnType, DataSchema},
};

const CURRENCY_MARKERS: &[&str] = &["R$", "US$", "$", "€", "£", "¥"];
const TRUTHY_TOKENS: &[&str] = &["true", "sim", "yes", "1", "s"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataRow {
    pub id: String,
    /// Position of the row in the decoded file, zero-based.
    pub index: usize,
    pub values: BTreeMap<String, CellValue>,
}

impl DataRow {
    pub fn get(&self, key: &str) -> &CellValue {
        self.values.get(key).unwrap_or(&CellValue::Null)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetMetadata {
    pub row_count: usize,
    pub source_name: String,
    pub file_kind: FileKind,
    /// Hex SHA-256 of the uploaded bytes.
    pub fingerprint: String,
    pub schema_generated: bool,
    pub warnings: Vec<String>,
}

/// Schema plus normalized rows. Replaced wholesale on re-upload, never
/// patched in place.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedDataset {
    pub schema: DataSchema,
    pub rows: Vec<DataRow>,
    pub metadata: DatasetMetadata,
}

impl ProcessedDataset {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

pub fn normalize_value(raw: &RawValue, ty: ColumnType) -> CellValue {
    match ty {
        _ if ty.is_numeric() => normalize_numeric(raw),
        ColumnType::Boolean => CellValue::Boolean(is_truthy(raw)),
        _ if ty.is_temporal() => match raw {
            RawValue::Date(instant) => CellValue::Date(*instant),
            RawValue::String(text) => parse_instant(text).map_or(CellValue::Null, CellValue::Date),
            _ => CellValue::Null,
        },
        _ if raw.is_missing() => CellValue::Null,
        _ => CellValue::String(raw.as_display()),
    }
}

fn normalize_numeric(raw: &RawValue) -> CellValue {
    match raw {
        RawValue::Number(n) if n.is_finite() => CellValue::Number(*n),
        RawValue::String(text) => parse_numeric(text).map_or(CellValue::Null, CellValue::Number),
        _ => CellValue::Null,
    }
}

/// Strips currency markers, `%` and whitespace, then resolves the decimal
/// separator: with both `.` and `,` present the right-most one is decimal,
/// a lone `,` is decimal.
pub fn parse_numeric(text: &str) -> Option<f64> {
    let mut cleaned = text.to_string();
    for marker in CURRENCY_MARKERS {
        cleaned = cleaned.replace(marker, "");
    }
    cleaned.retain(|c| c != '%' && !c.is_whitespace());

    let canonical = match (cleaned.rfind('.'), cleaned.rfind(',')) {
        (Some(dot), Some(comma)) if comma > dot => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (None, Some(_)) => cleaned.replace(',', "."),
        _ => cleaned,
    };
    canonical.parse::<f64>().ok().filter(|n| n.is_finite())
}

fn is_truthy(raw: &RawValue) -> bool {
    match raw {
        RawValue::Boolean(flag) => *flag,
        other => TRUTHY_TOKENS.contains(&other.as_display().trim().to_lowercase().as_str()),
    }
}

/// Builds one [`DataRow`] per decoded row, keyed by the schema's columns.
/// Row ids are `<id_prefix>-<index>` and therefore unique within a dataset.
pub fn normalize_rows(raw: &RawParseResult, schema: &DataSchema, id_prefix: &str) -> Vec<DataRow> {
    raw.rows
        .iter()
        .enumerate()
        .map(|(index, source)| {
            let values = schema
                .columns
                .iter()
                .map(|column| {
                    let cell = source.get(&column.key).unwrap_or(&RawValue::Null);
                    (column.key.clone(), normalize_value(cell, column.column_type()))
                })
                .collect();
            DataRow {
                id: format!("{id_prefix}-{index}"),
                index,
                values,
            }
        })
        .collect()
}
