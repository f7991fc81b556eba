use anyhow::{Context, Result};
use log::info;

use crate::{
    cli::InspectArgs,
    load_source,
    normalize::ProcessedDataset,
    schema::{ColumnDefinition, DataSchema},
    table,
};

pub fn execute(args: &InspectArgs) -> Result<()> {
    let (ingested, _) = load_source(&args.source)?;
    let dataset = &ingested.dataset;
    info!(
        "'{}' ({}) has {} row(s) and {} column(s)",
        dataset.metadata.source_name,
        dataset.metadata.file_kind,
        dataset.metadata.row_count,
        dataset.schema.columns.len()
    );

    let (headers, rows) = schema_table(&dataset.schema);
    table::print_table(&headers, &rows, &[]);

    if args.preview > 0 {
        println!();
        print_preview(dataset, args.preview);
    }

    if let Some(path) = &args.schema_out {
        dataset
            .schema
            .save(path)
            .with_context(|| format!("Writing schema to {path:?}"))?;
        info!("Schema '{}' written to {:?}", dataset.schema.id, path);
    }
    Ok(())
}

fn schema_table(schema: &DataSchema) -> (Vec<String>, Vec<Vec<String>>) {
    let headers = ["#", "key", "label", "type", "align", "searchable", "format"]
        .iter()
        .map(|h| h.to_string())
        .collect();
    let rows = schema
        .columns
        .iter()
        .enumerate()
        .map(|(idx, column)| {
            vec![
                (idx + 1).to_string(),
                column.key.clone(),
                column.label.clone(),
                column.column_type().to_string(),
                format!("{:?}", column.align).to_lowercase(),
                column.searchable.to_string(),
                format_details(column),
            ]
        })
        .collect();
    (headers, rows)
}

fn format_details(column: &ColumnDefinition) -> String {
    let format = &column.format;
    let mut parts = Vec::new();
    if let Some(currency) = &format.currency {
        parts.push(currency.clone());
    }
    if let Some(locale) = &format.locale {
        parts.push(locale.clone());
    }
    if let Some(decimals) = format.decimals {
        parts.push(format!("{decimals} decimal(s)"));
    }
    if let Some(pattern) = &format.date_format {
        parts.push(pattern.clone());
    }
    if let Some(colors) = &format.badge_colors {
        parts.push(format!("{} badge color(s)", colors.len()));
    }
    parts.join(", ")
}

fn print_preview(dataset: &ProcessedDataset, limit: usize) {
    let headers = dataset
        .schema
        .columns
        .iter()
        .map(|c| c.label.clone())
        .collect::<Vec<_>>();
    let alignments = dataset.schema.columns.iter().map(|c| c.align).collect::<Vec<_>>();
    let rows = dataset
        .rows
        .iter()
        .take(limit)
        .map(|row| {
            dataset
                .schema
                .columns
                .iter()
                .map(|c| row.get(&c.key).as_display())
                .collect()
        })
        .collect::<Vec<_>>();
    table::print_table(&headers, &rows, &alignments);
}
