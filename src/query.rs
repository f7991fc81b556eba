//! Search, filter, sort and paginate over a [`ProcessedDataset`].
//!
//! [`run_query()`] is a pure function of the dataset and a caller-owned
//! [`QueryState`]. It always recomputes from the full row set in a fixed
//! order: search, filters (AND), sort, then the page slice. The state is
//! never mutated and no result is cached between calls.

use std::{fmt, str::FromStr};

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::{
    config::DEFAULT_PAGE_SIZE,
    data::{CellValue, compare_cells},
    normalize::{DataRow, ProcessedDataset},
    schema::DataSchema,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    #[serde(alias = "asc")]
    Ascending,
    #[serde(alias = "desc")]
    Descending,
}

impl SortDirection {
    pub fn is_ascending(&self) -> bool {
        matches!(self, SortDirection::Ascending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Ascending => "asc",
            SortDirection::Descending => "desc",
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortDirection {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortDirection::Ascending),
            "desc" | "descending" => Ok(SortDirection::Descending),
            other => Err(anyhow!("Unknown sort direction '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub column: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn new(column: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            column: column.into(),
            direction,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOperator {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterOrEqual,
    LessThan,
    LessOrEqual,
    Contains,
    StartsWith,
    EndsWith,
    In,
    /// Operator name this engine does not understand. Keeps every row.
    Unknown(String),
}

impl FilterOperator {
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "=" | "eq" | "equals" => FilterOperator::Equals,
            "!=" | "ne" | "not_equals" => FilterOperator::NotEquals,
            ">" | "gt" => FilterOperator::GreaterThan,
            ">=" | "ge" | "gte" => FilterOperator::GreaterOrEqual,
            "<" | "lt" => FilterOperator::LessThan,
            "<=" | "le" | "lte" => FilterOperator::LessOrEqual,
            "contains" => FilterOperator::Contains,
            "startswith" | "starts_with" => FilterOperator::StartsWith,
            "endswith" | "ends_with" => FilterOperator::EndsWith,
            "in" => FilterOperator::In,
            _ => FilterOperator::Unknown(name.to_string()),
        }
    }
}

/// Comparison operand: a single value, or a list for [`FilterOperator::In`].
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Scalar(CellValue),
    List(Vec<CellValue>),
}

impl FilterValue {
    pub fn text(value: impl Into<String>) -> Self {
        FilterValue::Scalar(CellValue::String(value.into()))
    }

    pub fn list<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FilterValue::List(
            values
                .into_iter()
                .map(|v| CellValue::String(v.into()))
                .collect(),
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterSpec {
    pub column: String,
    pub operator: FilterOperator,
    pub value: FilterValue,
}

impl FilterSpec {
    pub fn new(column: impl Into<String>, operator: FilterOperator, value: FilterValue) -> Self {
        Self {
            column: column.into(),
            operator,
            value,
        }
    }

    pub fn matches(&self, row: &DataRow) -> bool {
        let cell = row.get(&self.column);
        use FilterOperator::*;
        match (&self.operator, &self.value) {
            (Equals, FilterValue::Scalar(target)) => cells_equal(cell, target),
            (NotEquals, FilterValue::Scalar(target)) => !cells_equal(cell, target),
            (GreaterThan | GreaterOrEqual | LessThan | LessOrEqual, FilterValue::Scalar(target)) => {
                let (Some(left), Some(right)) = (cell.as_number(), target.as_number()) else {
                    return false;
                };
                match self.operator {
                    GreaterThan => left > right,
                    GreaterOrEqual => left >= right,
                    LessThan => left < right,
                    _ => left <= right,
                }
            }
            (Contains | StartsWith | EndsWith, FilterValue::Scalar(target)) => {
                if cell.is_null() {
                    return false;
                }
                let haystack = cell.as_display().to_lowercase();
                let needle = target.as_display().to_lowercase();
                match self.operator {
                    Contains => haystack.contains(&needle),
                    StartsWith => haystack.starts_with(&needle),
                    _ => haystack.ends_with(&needle),
                }
            }
            (In, FilterValue::List(candidates)) => {
                candidates.iter().any(|candidate| cells_equal(cell, candidate))
            }
            (Unknown(_), _) => true,
            // Shape mismatch, e.g. `in` with a scalar operand.
            _ => false,
        }
    }
}

fn cells_equal(cell: &CellValue, target: &CellValue) -> bool {
    match (cell, target) {
        (CellValue::Null, CellValue::Null) => true,
        (CellValue::Null, _) | (_, CellValue::Null) => false,
        _ => match (cell.as_number(), target.as_number()) {
            (Some(left), Some(right)) => left == right,
            _ => cell.as_display() == target.as_display(),
        },
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryState {
    pub search: String,
    pub filters: Vec<FilterSpec>,
    pub sort: Option<SortSpec>,
    /// 1-indexed.
    pub page: usize,
    pub page_size: usize,
}

impl Default for QueryState {
    fn default() -> Self {
        Self {
            search: String::new(),
            filters: Vec::new(),
            sort: None,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl QueryState {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            ..Self::default()
        }
    }

    /// Starts from the schema's default sort, if it declares one.
    pub fn for_schema(schema: &DataSchema, page_size: usize) -> Self {
        Self {
            sort: schema.default_sort.clone(),
            ..Self::new(page_size)
        }
    }

    /// Adds `filter`, replacing any filter already active on the same column.
    pub fn set_filter(&mut self, filter: FilterSpec) {
        match self.filters.iter_mut().find(|f| f.column == filter.column) {
            Some(existing) => *existing = filter,
            None => self.filters.push(filter),
        }
    }

    pub fn remove_filter(&mut self, column: &str) -> bool {
        let before = self.filters.len();
        self.filters.retain(|f| f.column != column);
        self.filters.len() != before
    }

    pub fn set_sort(&mut self, sort: Option<SortSpec>) {
        self.sort = sort;
    }

    pub fn set_search(&mut self, search: impl Into<String>) {
        self.search = search.into();
    }

    pub fn set_page(&mut self, page: usize) {
        self.page = page;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult<'a> {
    pub rows: Vec<&'a DataRow>,
    /// Matching rows before pagination.
    pub total_filtered: usize,
    /// Effective page after clamping.
    pub page: usize,
    pub total_pages: usize,
}

pub fn run_query<'a>(dataset: &'a ProcessedDataset, state: &QueryState) -> QueryResult<'a> {
    let mut matched = search_rows(dataset, &state.search);
    matched.retain(|row| state.filters.iter().all(|filter| filter.matches(row)));

    if let Some(sort) = &state.sort {
        sort_rows(&mut matched, sort);
    }

    let total_filtered = matched.len();
    let page_size = state.page_size.max(1);
    let total_pages = total_filtered.div_ceil(page_size);
    let page = state.page.clamp(1, total_pages.max(1));
    let rows = matched
        .into_iter()
        .skip((page - 1) * page_size)
        .take(page_size)
        .collect();

    QueryResult {
        rows,
        total_filtered,
        page,
        total_pages,
    }
}

fn search_rows<'a>(dataset: &'a ProcessedDataset, search: &str) -> Vec<&'a DataRow> {
    if search.is_empty() {
        return dataset.rows.iter().collect();
    }
    let needle = search.to_lowercase();
    let searchable = dataset
        .schema
        .searchable_columns()
        .map(|column| column.key.as_str())
        .collect::<Vec<_>>();
    dataset
        .rows
        .iter()
        .filter(|row| {
            searchable.iter().any(|key| {
                let cell = row.get(key);
                !cell.is_null() && cell.as_display().to_lowercase().contains(&needle)
            })
        })
        .collect()
}

/// Stable single-column sort; `Null` cells trail in either direction.
fn sort_rows(rows: &mut [&DataRow], sort: &SortSpec) {
    rows.sort_by(|left, right| {
        let (a, b) = (left.get(&sort.column), right.get(&sort.column));
        match (a.is_null(), b.is_null()) {
            (true, true) => std::cmp::Ordering::Equal,
            (true, false) => std::cmp::Ordering::Greater,
            (false, true) => std::cmp::Ordering::Less,
            (false, false) => {
                let ordering = compare_cells(a, b);
                if sort.direction.is_ascending() {
                    ordering
                } else {
                    ordering.reverse()
                }
            }
        }
    });
}

/// Parses `column[:asc|desc]`.
pub fn parse_sort(spec: &str) -> Result<SortSpec> {
    let mut parts = spec.split(':');
    let column = parts
        .next()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow!("Sort directive is missing a column"))?;
    let direction = match parts.next() {
        Some(direction) => direction.parse()?,
        None => SortDirection::Ascending,
    };
    Ok(SortSpec::new(column, direction))
}

/// Parses filter expressions such as `price>=10`, `name contains ali` or
/// `status in open,closed`.
pub fn parse_filter(filter: &str) -> Result<FilterSpec> {
    let trimmed = filter.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("Empty filter expression"));
    }

    let lowered = trimmed.to_ascii_lowercase();
    let mut found: Option<(usize, usize, &str)> = None;
    for word in ["contains", "startswith", "endswith", "in"] {
        let needle = format!(" {word} ");
        if let Some(idx) = lowered.find(&needle)
            && found.is_none_or(|(best, _, _)| idx < best)
        {
            found = Some((idx, needle.len(), word));
        }
    }
    // Longer symbols are listed first so `>=` wins over `>` at the same spot.
    for symbol in ["!=", ">=", "<=", "=", ">", "<"] {
        if let Some(idx) = trimmed.find(symbol)
            && found.is_none_or(|(best, _, _)| idx < best)
        {
            found = Some((idx, symbol.len(), symbol));
        }
    }

    if let Some((idx, len, name)) = found {
        let column = trimmed[..idx].trim();
        let right = trimmed[idx + len..].trim();
        let operator = FilterOperator::from_name(name);
        let value = if operator == FilterOperator::In {
            let list = right.trim_start_matches('[').trim_end_matches(']');
            FilterValue::list(
                list.split(',')
                    .map(|item| unquote(item.trim()))
                    .filter(|item| !item.is_empty()),
            )
        } else {
            FilterValue::text(unquote(right))
        };
        return build_filter(column, operator, value);
    }

    Err(anyhow!("Failed to parse filter expression '{trimmed}'"))
}

fn build_filter(column: &str, operator: FilterOperator, value: FilterValue) -> Result<FilterSpec> {
    if column.is_empty() {
        return Err(anyhow!("Filter expression is missing a column"));
    }
    Ok(FilterSpec::new(column, operator, value))
}

fn unquote(value: &str) -> &str {
    if value.len() >= 2 {
        let bytes = value.as_bytes();
        if (bytes[0] == b'"' && bytes[value.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[value.len() - 1] == b'\'')
        {
            return &value[1..value.len() - 1];
        }
    }
    value
}
