//! Hard failures surfaced by the ingest pipeline.
//!
//! Decode- and normalization-level problems never show up here: they are
//! recovered locally as `Null` cells and advisory strings on the dataset.
//! Only unsupported input, a crashed worker, and I/O-style failures from the
//! surrounding plumbing become a [`PipelineError`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Unsupported input '{file_name}': expected a spreadsheet (.xlsx, .xls) or delimited text (.csv, .tsv)")]
    UnsupportedInput { file_name: String },

    #[error("Parse worker failed: {message}")]
    WorkerCrashed {
        message: String,
        stack: Option<String>,
    },

    #[error("Parse worker disconnected before posting a result")]
    WorkerDisconnected,

    #[error("Export format '{0}' is not supported by this build")]
    UnsupportedExport(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type PipelineResult<T> = Result<T, PipelineError>;
