use std::{
    fs,
    io::{self, Write},
};

use anyhow::{Context, Result, anyhow, ensure};
use log::{debug, info};

use crate::{
    cli::{ExportArgs, QueryArgs, ViewArgs},
    export::export_rows,
    load_source,
    query::{QueryState, parse_filter, parse_sort, run_query},
    schema::DataSchema,
    table,
};

pub fn execute(args: &QueryArgs) -> Result<()> {
    let (ingested, config) = load_source(&args.source)?;
    let dataset = &ingested.dataset;
    let page_size = args.page_size.unwrap_or(config.query.page_size);
    ensure!(page_size > 0, "Page size must be positive");

    let mut state = build_state(&args.view, &dataset.schema, page_size)?;
    state.set_page(args.page);
    let result = run_query(dataset, &state);
    if result.page != args.page {
        debug!("Requested page {} clamped to {}", args.page, result.page);
    }

    let columns = dataset.schema.columns.iter().filter(|c| c.visible).collect::<Vec<_>>();
    let headers = columns.iter().map(|c| c.label.clone()).collect::<Vec<_>>();
    let alignments = columns.iter().map(|c| c.align).collect::<Vec<_>>();
    let rows = result
        .rows
        .iter()
        .map(|row| columns.iter().map(|c| row.get(&c.key).as_display()).collect())
        .collect::<Vec<Vec<String>>>();
    table::print_table(&headers, &rows, &alignments);
    println!(
        "Page {} of {} ({} matching row(s) of {})",
        result.page,
        result.total_pages.max(1),
        result.total_filtered,
        dataset.metadata.row_count
    );
    Ok(())
}

pub fn execute_export(args: &ExportArgs) -> Result<()> {
    let (ingested, _) = load_source(&args.source)?;
    let dataset = &ingested.dataset;
    let state = build_state(&args.view, &dataset.schema, dataset.rows.len().max(1))?;
    let result = run_query(dataset, &state);
    let bytes = export_rows(&dataset.schema, &result.rows, args.format)
        .with_context(|| format!("Exporting as {}", args.format))?;

    match &args.output {
        Some(path) => {
            fs::write(path, &bytes).with_context(|| format!("Writing export to {path:?}"))?;
            info!(
                "Exported {} row(s) as {} to {:?}",
                result.rows.len(),
                args.format,
                path
            );
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(&bytes).context("Writing export to stdout")?;
            stdout.flush().context("Flushing stdout")?;
        }
    }
    Ok(())
}

/// Turns CLI view options into a [`QueryState`], rejecting columns the schema
/// does not know or does not allow filtering/sorting on.
fn build_state(view: &ViewArgs, schema: &DataSchema, page_size: usize) -> Result<QueryState> {
    let mut state = QueryState::for_schema(schema, page_size);
    if let Some(search) = &view.search {
        state.set_search(search.clone());
    }
    for expression in &view.filters {
        let filter = parse_filter(expression)?;
        let column = schema
            .column(&filter.column)
            .ok_or_else(|| anyhow!("Column '{}' not found for filter", filter.column))?;
        ensure!(column.filterable, "Column '{}' is not filterable", column.key);
        state.set_filter(filter);
    }
    if let Some(directive) = &view.sort {
        let sort = parse_sort(directive)?;
        let column = schema
            .column(&sort.column)
            .ok_or_else(|| anyhow!("Sort column '{}' not found", sort.column))?;
        ensure!(column.sortable, "Column '{}' is not sortable", column.key);
        state.set_sort(Some(sort));
    }
    Ok(state)
}
