//! Byte-buffer helpers for delimited text.
//!
//! Uploads arrive as in-memory buffers, so everything here works on slices
//! rather than paths:
//!
//! - **Encoding**: label resolution and lossy decoding via `encoding_rs`,
//!   defaulting to UTF-8 (a BOM is honoured and stripped).
//! - **Delimiter resolution**: explicit override, then extension (`.tsv` →
//!   tab), then a frequency vote over the first few lines.
//! - **Reader construction**: a flexible `csv::Reader` so ragged rows reach
//!   the decoder instead of aborting the parse.

use std::{io::Read, path::Path};

use anyhow::{Result, anyhow};
use encoding_rs::{Encoding, UTF_8};

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';
const DELIMITER_SNIFF_LINES: usize = 5;

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

/// Decodes `bytes` with `encoding`, replacing malformed sequences.
/// The flag reports whether any replacement happened.
pub fn decode_text(bytes: &[u8], encoding: &'static Encoding) -> (String, bool) {
    let (text, _, had_errors) = encoding.decode(bytes);
    (text.into_owned(), had_errors)
}

pub fn file_extension(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

pub fn resolve_input_delimiter(file_name: &str, text: &str, provided: Option<u8>) -> u8 {
    if let Some(delimiter) = provided {
        return delimiter;
    }
    if file_extension(file_name).as_deref() == Some("tsv") {
        return DEFAULT_TSV_DELIMITER;
    }
    sniff_delimiter(text)
}

fn sniff_delimiter(text: &str) -> u8 {
    let head = text.lines().take(DELIMITER_SNIFF_LINES).collect::<Vec<_>>().join("\n");
    let comma = head.matches(',').count();
    let semicolon = head.matches(';').count();
    let tab = head.matches('\t').count();
    if tab > comma && tab > semicolon {
        DEFAULT_TSV_DELIMITER
    } else if semicolon > comma {
        b';'
    } else {
        DEFAULT_CSV_DELIMITER
    }
}

pub fn open_csv_reader<R>(reader: R, delimiter: u8) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(true)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true);
    builder.from_reader(reader)
}

pub fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        b'\n' => "\\n".to_string(),
        other => (other as char).to_string(),
    }
}
