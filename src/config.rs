//! Tunable pipeline settings.
//!
//! Every field has a default so an empty YAML document (or no file at all)
//! yields the stock behaviour. The inference constants are heuristics rather
//! than laws and live here so they can be adjusted without code changes.

use std::{fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

pub const DEFAULT_INFERENCE_THRESHOLD: f64 = 0.7;
pub const DEFAULT_BADGE_MAX_DISTINCT: usize = 10;
pub const DEFAULT_OFFLOAD_THRESHOLD_BYTES: usize = 1024 * 1024;
pub const DEFAULT_PAGE_SIZE: usize = 25;

pub const DEFAULT_BADGE_PALETTE: &[&str] = &[
    "blue", "green", "amber", "red", "purple", "teal", "pink", "indigo", "orange", "gray",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub inference: InferenceConfig,
    pub schema: SchemaDefaults,
    pub decode: DecodeOptions,
    pub offload: OffloadConfig,
    pub query: QueryDefaults,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Fraction of sampled values a type must reach to win the vote.
    pub threshold: f64,
    /// Columns failing every threshold become `badge` at or below this many
    /// distinct values, `string` above it.
    pub badge_max_distinct: usize,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_INFERENCE_THRESHOLD,
            badge_max_distinct: DEFAULT_BADGE_MAX_DISTINCT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaDefaults {
    pub locale: String,
    pub currency_code: String,
    pub decimals: u32,
    pub date_pattern: String,
    pub datetime_pattern: String,
    pub palette: Vec<String>,
}

impl Default for SchemaDefaults {
    fn default() -> Self {
        Self {
            locale: "pt-BR".to_string(),
            currency_code: "BRL".to_string(),
            decimals: 2,
            date_pattern: "dd/MM/yyyy".to_string(),
            datetime_pattern: "dd/MM/yyyy HH:mm".to_string(),
            palette: DEFAULT_BADGE_PALETTE.iter().map(|c| c.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeOptions {
    /// Encoding label for delimited text (utf-8 when absent).
    pub encoding: Option<String>,
    /// Explicit delimiter; detected from the extension and content otherwise.
    pub delimiter: Option<char>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OffloadConfig {
    /// Inputs at or above this size are parsed on a worker thread.
    pub threshold_bytes: usize,
    /// Never spawn a worker; always parse on the calling thread.
    pub inline_only: bool,
}

impl Default for OffloadConfig {
    fn default() -> Self {
        Self {
            threshold_bytes: DEFAULT_OFFLOAD_THRESHOLD_BYTES,
            inline_only: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryDefaults {
    pub page_size: usize,
}

impl Default for QueryDefaults {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
        let reader = BufReader::new(file);
        let config: PipelineConfig =
            serde_yaml::from_reader(reader).context("Parsing pipeline config YAML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.inference.threshold > 0.0 && self.inference.threshold <= 1.0,
            "Inference threshold must be within (0, 1], got {}",
            self.inference.threshold
        );
        ensure!(
            !self.schema.palette.is_empty(),
            "Badge palette must contain at least one color"
        );
        ensure!(self.query.page_size > 0, "Page size must be positive");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn partial_yaml_keeps_remaining_defaults() {
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(file, "inference:\n  threshold: 0.8\nquery:\n  page_size: 50").unwrap();

        let config = PipelineConfig::load(file.path()).expect("load config");
        assert_eq!(config.inference.threshold, 0.8);
        assert_eq!(config.inference.badge_max_distinct, DEFAULT_BADGE_MAX_DISTINCT);
        assert_eq!(config.query.page_size, 50);
        assert_eq!(config.schema.currency_code, "BRL");
        assert_eq!(config.offload.threshold_bytes, DEFAULT_OFFLOAD_THRESHOLD_BYTES);
    }

    #[test]
    fn out_of_range_threshold_is_rejected() {
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(file, "inference:\n  threshold: 1.5").unwrap();
        assert!(PipelineConfig::load(file.path()).is_err());
    }
}
