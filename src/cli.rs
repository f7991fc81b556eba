use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::export::ExportFormat;

#[derive(Debug, Parser)]
#[command(author, version, about = "Inspect, query and export spreadsheets and delimited files", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Infer a schema for a file and print it, optionally saving it as YAML
    Inspect(InspectArgs),
    /// Search, filter, sort and page through a file
    Query(QueryArgs),
    /// Write a file's normalized rows as CSV or JSON
    Export(ExportArgs),
}

/// Where the data comes from and how to read it.
#[derive(Debug, Args)]
pub struct SourceArgs {
    /// Spreadsheet (.xlsx, .xls, .ods) or delimited (.csv, .tsv, .txt) input
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Declared MIME type, used when the extension is not recognised
    #[arg(long)]
    pub mime: Option<String>,
    /// Schema YAML to use instead of inferring one
    #[arg(short, long)]
    pub schema: Option<PathBuf>,
    /// Pipeline configuration YAML
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Delimiter for text input (detected when omitted)
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<char>,
    /// Character encoding of text input (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Parse on the calling thread even for large inputs
    #[arg(long)]
    pub inline: bool,
}

#[derive(Debug, Args)]
pub struct InspectArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    /// Save the schema as YAML to this path
    #[arg(long = "schema-out")]
    pub schema_out: Option<PathBuf>,
    /// Print the first N normalized rows under the schema
    #[arg(long, default_value_t = 0)]
    pub preview: usize,
}

/// Query options shared by `query` and `export`.
#[derive(Debug, Args)]
pub struct ViewArgs {
    /// Case-insensitive text matched against searchable columns
    #[arg(long)]
    pub search: Option<String>,
    /// Filter expression (e.g. `price>=10`, `name contains ana`, `status in a,b`)
    #[arg(long = "filter", action = clap::ArgAction::Append)]
    pub filters: Vec<String>,
    /// Sort directive `column[:asc|desc]`
    #[arg(long)]
    pub sort: Option<String>,
}

#[derive(Debug, Args)]
pub struct QueryArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    #[command(flatten)]
    pub view: ViewArgs,
    /// 1-indexed page to show
    #[arg(long, default_value_t = 1)]
    pub page: usize,
    /// Rows per page (defaults to the configured page size)
    #[arg(long = "page-size")]
    pub page_size: Option<usize>,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    #[command(flatten)]
    pub view: ViewArgs,
    /// Output format
    #[arg(short, long, value_enum, default_value = "delimited-text")]
    pub format: ExportFormat,
    /// Output file (stdout when omitted)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub fn parse_delimiter(value: &str) -> Result<char, String> {
    match value {
        "tab" | "\t" => Ok('\t'),
        "comma" | "," => Ok(','),
        "|" | "pipe" => Ok('|'),
        ";" | "semicolon" => Ok(';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first)
        }
    }
}
