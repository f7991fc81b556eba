pub mod browse;
pub mod cli;
pub mod config;
pub mod data;
pub mod decode;
pub mod error;
pub mod export;
pub mod infer;
pub mod inspect;
pub mod io_utils;
pub mod normalize;
pub mod offload;
pub mod pipeline;
pub mod query;
pub mod schema;
pub mod table;

use std::{env, fs, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, debug, warn};

use crate::{
    cli::{Cli, Commands, SourceArgs},
    config::PipelineConfig,
    offload::{ParseOffloader, ParseRequest},
    pipeline::Ingested,
    schema::DataSchema,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("tablescope", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Inspect(args) => inspect::execute(&args),
        Commands::Query(args) => browse::execute(&args),
        Commands::Export(args) => browse::execute_export(&args),
    }
}

/// Reads the input named by `args` and runs it through the offloader.
/// Returns the ingest outcome with the effective configuration.
pub(crate) fn load_source(args: &SourceArgs) -> Result<(Ingested, PipelineConfig)> {
    let mut config = PipelineConfig::load_or_default(args.config.as_deref())
        .with_context(|| format!("Loading configuration for {:?}", args.input))?;
    if args.delimiter.is_some() {
        config.decode.delimiter = args.delimiter;
    }
    if args.input_encoding.is_some() {
        config.decode.encoding = args.input_encoding.clone();
    }
    config.offload.inline_only |= args.inline;

    let schema = match &args.schema {
        Some(path) => Some(
            DataSchema::load(path).with_context(|| format!("Loading schema from {path:?}"))?,
        ),
        None => None,
    };
    let bytes = fs::read(&args.input).with_context(|| format!("Reading {:?}", args.input))?;
    let file_name = args
        .input
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default()
        .to_string();

    let request = ParseRequest::from_upload(bytes, &file_name, args.mime.as_deref())?.with_schema(schema);
    let offloader = ParseOffloader::new(config.clone());
    let ingested = offloader
        .dispatch(request)
        .wait(|progress| debug!("[{}] {}% {}", progress.stage, progress.percent, progress.message))
        .with_context(|| format!("Parsing {:?}", args.input))?;
    for warning in &ingested.dataset.metadata.warnings {
        warn!("{warning}");
    }
    Ok((ingested, config))
}
