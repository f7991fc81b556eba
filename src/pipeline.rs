//! Decode → infer → generate → normalize, with staged progress.
//!
//! [`ingest()`] is the single code path behind both the worker thread and the
//! inline fallback in [`crate::offload`], so the two cannot drift apart. It
//! reports [`Progress`] events through a callback and only fails for input
//! whose kind cannot be determined.

use std::{fmt, path::Path};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    config::PipelineConfig,
    decode::{self, FileKind, RawParseResult},
    error::{PipelineError, PipelineResult},
    infer::TypeInferenceEngine,
    normalize::{DatasetMetadata, ProcessedDataset, normalize_rows},
    schema::{ColumnType, DataSchema, SchemaGenerator},
};

const FINGERPRINT_PREFIX_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Reading,
    Parsing,
    Processing,
    Complete,
}

impl Stage {
    /// Every stage, in the order a successful parse reports them.
    pub const ALL: [Stage; 4] = [Stage::Reading, Stage::Parsing, Stage::Processing, Stage::Complete];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Reading => "reading",
            Stage::Parsing => "parsing",
            Stage::Processing => "processing",
            Stage::Complete => "complete",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub stage: Stage,
    /// 0-100.
    pub percent: u8,
    pub message: String,
}

impl Progress {
    pub fn new(stage: Stage, percent: u8, message: impl Into<String>) -> Self {
        Self {
            stage,
            percent: percent.min(100),
            message: message.into(),
        }
    }
}

/// Everything a successful ingest hands back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ingested {
    pub headers: Vec<String>,
    pub dataset: ProcessedDataset,
    pub raw_rows: Vec<Vec<String>>,
    pub errors: Vec<String>,
}

pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Runs the whole pipeline on the calling thread. A supplied `schema` is used
/// unchanged; otherwise one is inferred and generated from the data.
pub fn ingest<F>(
    bytes: &[u8],
    file_name: &str,
    mime: Option<&str>,
    schema: Option<&DataSchema>,
    config: &PipelineConfig,
    progress: F,
) -> PipelineResult<Ingested>
where
    F: FnMut(Progress),
{
    let kind = FileKind::detect(file_name, mime).ok_or_else(|| PipelineError::UnsupportedInput {
        file_name: file_name.to_string(),
    })?;
    ingest_as(kind, bytes, file_name, schema, config, progress)
}

pub fn ingest_as<F>(
    kind: FileKind,
    bytes: &[u8],
    file_name: &str,
    schema: Option<&DataSchema>,
    config: &PipelineConfig,
    mut progress: F,
) -> PipelineResult<Ingested>
where
    F: FnMut(Progress),
{
    progress(Progress::new(Stage::Reading, 5, format!("Reading {file_name}")));
    let digest = fingerprint(bytes);
    let prefix = &digest[..FINGERPRINT_PREFIX_LEN];

    progress(Progress::new(Stage::Parsing, 20, format!("Parsing {kind} input")));
    let raw = decode::decode_as(kind, bytes, file_name, &config.decode);
    progress(Progress::new(
        Stage::Parsing,
        45,
        format!("Decoded {} row(s) across {} column(s)", raw.rows.len(), raw.headers.len()),
    ));

    let (schema, schema_generated) = match schema {
        Some(supplied) => (supplied.clone(), false),
        None => {
            progress(Progress::new(Stage::Processing, 60, "Inferring column types"));
            (generate_schema(&raw, file_name, prefix, config), true)
        }
    };

    progress(Progress::new(
        Stage::Processing,
        80,
        format!("Normalizing {} row(s)", raw.rows.len()),
    ));
    let rows = normalize_rows(&raw, &schema, prefix);
    let warnings = collect_warnings(&raw, &schema);

    let dataset = ProcessedDataset {
        metadata: DatasetMetadata {
            row_count: rows.len(),
            source_name: file_name.to_string(),
            file_kind: kind,
            fingerprint: digest.clone(),
            schema_generated,
            warnings,
        },
        schema,
        rows,
    };
    info!(
        "Ingested '{}' as {}: {} row(s), {} column(s), {} warning(s)",
        file_name,
        kind,
        dataset.metadata.row_count,
        dataset.schema.columns.len(),
        dataset.metadata.warnings.len()
    );
    progress(Progress::new(
        Stage::Complete,
        100,
        format!("Loaded {} row(s)", dataset.metadata.row_count),
    ));

    Ok(Ingested {
        headers: raw.headers,
        raw_rows: raw.raw_rows,
        errors: raw.errors,
        dataset,
    })
}

fn generate_schema(
    raw: &RawParseResult,
    file_name: &str,
    prefix: &str,
    config: &PipelineConfig,
) -> DataSchema {
    let inferred = TypeInferenceEngine::new(&config.inference).infer_all(raw);
    let name = Path::new(file_name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(file_name);
    SchemaGenerator::new(&config.schema).generate(&format!("schema-{prefix}"), name, raw, &inferred)
}

fn collect_warnings(raw: &RawParseResult, schema: &DataSchema) -> Vec<String> {
    let mut warnings = raw.errors.clone();
    for column in &schema.columns {
        if !raw.headers.is_empty() && !raw.headers.contains(&column.key) {
            warnings.push(format!(
                "Column '{}' is not present in the file; its cells are empty",
                column.key
            ));
        }
        if column.column_type() == ColumnType::Progress {
            warnings.push(format!(
                "Column '{}' was inferred as progress because every value lies in 0-100; \
                 it may be an ordinary number",
                column.key
            ));
        }
    }
    debug!("Collected {} dataset warning(s)", warnings.len());
    warnings
}
