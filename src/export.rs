//! Serializes a dataset for download, keyed by column label.

use std::{fmt, io::Write};

use clap::ValueEnum;
use serde_json::{Map, Value};

use crate::{
    error::{PipelineError, PipelineResult},
    normalize::{DataRow, ProcessedDataset},
    schema::{ColumnDefinition, DataSchema},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "kebab-case")]
pub enum ExportFormat {
    /// Comma-separated text.
    #[value(alias = "csv")]
    DelimitedText,
    /// JSON array of objects.
    #[value(alias = "json")]
    StructuredText,
    Spreadsheet,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::DelimitedText => "delimited-text",
            ExportFormat::StructuredText => "structured-text",
            ExportFormat::Spreadsheet => "spreadsheet",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::DelimitedText => "csv",
            ExportFormat::StructuredText => "json",
            ExportFormat::Spreadsheet => "xlsx",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn export(dataset: &ProcessedDataset, format: ExportFormat) -> PipelineResult<Vec<u8>> {
    let rows = dataset.rows.iter().collect::<Vec<_>>();
    export_rows(&dataset.schema, &rows, format)
}

/// Exports a subset of rows, such as the output of a query. Hidden columns
/// are left out.
pub fn export_rows(schema: &DataSchema, rows: &[&DataRow], format: ExportFormat) -> PipelineResult<Vec<u8>> {
    let columns = schema.columns.iter().filter(|c| c.visible).collect::<Vec<_>>();
    match format {
        ExportFormat::DelimitedText => write_delimited(&columns, rows),
        ExportFormat::StructuredText => write_structured(&columns, rows),
        ExportFormat::Spreadsheet => Err(PipelineError::UnsupportedExport(format.to_string())),
    }
}

fn write_delimited(columns: &[&ColumnDefinition], rows: &[&DataRow]) -> PipelineResult<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
    writer.write_record(columns.iter().map(|c| c.label.as_str()))?;
    for row in rows {
        writer.write_record(columns.iter().map(|c| row.get(&c.key).as_display()))?;
    }
    writer.flush()?;
    writer
        .into_inner()
        .map_err(|err| PipelineError::Io(err.into_error()))
}

fn write_structured(columns: &[&ColumnDefinition], rows: &[&DataRow]) -> PipelineResult<Vec<u8>> {
    let records = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|c| -> PipelineResult<(String, Value)> {
                    Ok((c.label.clone(), serde_json::to_value(row.get(&c.key))?))
                })
                .collect::<PipelineResult<Map<String, Value>>>()
                .map(Value::Object)
        })
        .collect::<PipelineResult<Vec<_>>>()?;
    let mut buffer = serde_json::to_vec_pretty(&records)?;
    buffer.write_all(b"\n")?;
    Ok(buffer)
}
