//! Column schema model, schema generation, and YAML persistence.
//!
//! This module owns [`ColumnType`] (the closed set of semantic tags),
//! the per-column display/parse contract [`ColumnFormat`], the
//! [`ColumnDefinition`] and whole-table [`DataSchema`], and the
//! [`SchemaGenerator`] that turns inferred types into a schema.
//!
//! ## Responsibilities
//!
//! - Human labels derived from column keys (underscores and camel case)
//! - Per-type alignment and format defaults
//! - Badge color maps drawn from a cycling palette
//! - YAML loading and saving of externally supplied schemas
//!
//! A schema is immutable once built. The generator only runs when the caller
//! did not supply a schema; a supplied schema is used exactly as loaded.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    fmt,
    fs::{self, File},
    io::BufReader,
    path::Path,
    str::FromStr,
};

use anyhow::{Context, Result, anyhow, ensure};
use heck::ToTitleCase;
use serde::{Deserialize, Serialize};

use crate::{config::SchemaDefaults, data::RawValue, decode::RawParseResult, query::SortSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    String,
    Number,
    Currency,
    Percentage,
    Date,
    DateTime,
    Boolean,
    Email,
    Url,
    Phone,
    Image,
    Badge,
    Progress,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::String => "string",
            ColumnType::Number => "number",
            ColumnType::Currency => "currency",
            ColumnType::Percentage => "percentage",
            ColumnType::Date => "date",
            ColumnType::DateTime => "datetime",
            ColumnType::Boolean => "boolean",
            ColumnType::Email => "email",
            ColumnType::Url => "url",
            ColumnType::Phone => "phone",
            ColumnType::Image => "image",
            ColumnType::Badge => "badge",
            ColumnType::Progress => "progress",
        }
    }

    pub fn variants() -> &'static [&'static str] {
        &[
            "string",
            "number",
            "currency",
            "percentage",
            "date",
            "datetime",
            "boolean",
            "email",
            "url",
            "phone",
            "image",
            "badge",
            "progress",
        ]
    }

    /// Types whose cells normalize to numbers.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ColumnType::Number | ColumnType::Currency | ColumnType::Percentage | ColumnType::Progress
        )
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, ColumnType::Date | ColumnType::DateTime)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnType {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "string" | "text" => Ok(ColumnType::String),
            "number" | "float" | "integer" => Ok(ColumnType::Number),
            "currency" | "money" => Ok(ColumnType::Currency),
            "percentage" | "percent" => Ok(ColumnType::Percentage),
            "date" => Ok(ColumnType::Date),
            "datetime" | "date-time" | "timestamp" => Ok(ColumnType::DateTime),
            "boolean" | "bool" => Ok(ColumnType::Boolean),
            "email" => Ok(ColumnType::Email),
            "url" | "link" => Ok(ColumnType::Url),
            "phone" => Ok(ColumnType::Phone),
            "image" => Ok(ColumnType::Image),
            "badge" | "enum" => Ok(ColumnType::Badge),
            "progress" => Ok(ColumnType::Progress),
            _ => Err(anyhow!(
                "Unknown column type '{value}'. Supported types: {}",
                ColumnType::variants().join(", ")
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    #[default]
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnFormat {
    #[serde(rename = "type")]
    pub ty: ColumnType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decimals: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub badge_colors: Option<BTreeMap<String, String>>,
}

impl ColumnFormat {
    pub fn plain(ty: ColumnType) -> Self {
        Self {
            ty,
            locale: None,
            currency: None,
            decimals: None,
            date_format: None,
            badge_colors: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub key: String,
    pub label: String,
    pub format: ColumnFormat,
    #[serde(default = "default_true")]
    pub sortable: bool,
    #[serde(default = "default_true")]
    pub filterable: bool,
    #[serde(default)]
    pub searchable: bool,
    #[serde(default)]
    pub align: Alignment,
    #[serde(default = "default_true")]
    pub visible: bool,
}

impl ColumnDefinition {
    pub fn column_type(&self) -> ColumnType {
        self.format.ty
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaFeatures {
    pub search: bool,
    pub filters: bool,
    pub sort: bool,
    pub pagination: bool,
    pub export: bool,
}

impl Default for SchemaFeatures {
    fn default() -> Self {
        Self {
            search: true,
            filters: true,
            sort: true,
            pagination: true,
            export: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSchema {
    pub id: String,
    pub name: String,
    pub columns: Vec<ColumnDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_sort: Option<SortSpec>,
    #[serde(default)]
    pub features: SchemaFeatures,
}

const fn default_true() -> bool {
    true
}

impl DataSchema {
    pub fn column(&self, key: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|column| column.key == key)
    }

    pub fn searchable_columns(&self) -> impl Iterator<Item = &ColumnDefinition> {
        self.columns.iter().filter(|column| column.searchable)
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for column in &self.columns {
            ensure!(!column.key.is_empty(), "Schema contains a column with an empty key");
            ensure!(
                seen.insert(column.key.as_str()),
                "Schema defines column '{}' more than once",
                column.key
            );
        }
        if let Some(sort) = &self.default_sort {
            ensure!(
                self.column(&sort.column).is_some(),
                "Default sort references unknown column '{}'",
                sort.column
            );
        }
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening schema file {path:?}"))?;
        let reader = BufReader::new(file);
        let schema: DataSchema = serde_yaml::from_reader(reader).context("Parsing schema YAML")?;
        schema.validate()?;
        Ok(schema)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        let yaml = self.to_yaml_string()?;
        fs::write(path, yaml).with_context(|| format!("Writing schema file {path:?}"))
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Serializing schema to YAML string")
    }
}

/// Title-cased label from a column key: `first_name` and `firstName` both
/// become `First Name`.
pub fn derive_label(key: &str) -> String {
    let label = key.to_title_case();
    if label.is_empty() { key.to_string() } else { label }
}

pub fn alignment_for(ty: ColumnType) -> Alignment {
    match ty {
        ColumnType::Currency | ColumnType::Number | ColumnType::Percentage | ColumnType::Progress => {
            Alignment::Right
        }
        ColumnType::Date | ColumnType::DateTime | ColumnType::Badge | ColumnType::Boolean => {
            Alignment::Center
        }
        _ => Alignment::Left,
    }
}

#[derive(Debug, Clone, Default)]
pub struct SchemaGenerator {
    defaults: SchemaDefaults,
}

impl SchemaGenerator {
    pub fn new(defaults: &SchemaDefaults) -> Self {
        Self {
            defaults: defaults.clone(),
        }
    }

    pub fn generate(
        &self,
        id: &str,
        name: &str,
        raw: &RawParseResult,
        inferred: &[(String, ColumnType)],
    ) -> DataSchema {
        let columns = inferred
            .iter()
            .map(|(key, ty)| self.column(key, *ty, &raw.column_values(key)))
            .collect();
        DataSchema {
            id: id.to_string(),
            name: name.to_string(),
            columns,
            default_sort: None,
            features: SchemaFeatures::default(),
        }
    }

    pub fn column(&self, key: &str, ty: ColumnType, values: &[&RawValue]) -> ColumnDefinition {
        ColumnDefinition {
            key: key.to_string(),
            label: derive_label(key),
            format: self.format_for(ty, values),
            sortable: true,
            filterable: true,
            searchable: matches!(ty, ColumnType::String | ColumnType::Email),
            align: alignment_for(ty),
            visible: true,
        }
    }

    fn format_for(&self, ty: ColumnType, values: &[&RawValue]) -> ColumnFormat {
        let mut format = ColumnFormat::plain(ty);
        match ty {
            ColumnType::Currency => {
                let code = values
                    .iter()
                    .find_map(|value| currency_code_for(&value.as_display()))
                    .map(str::to_string)
                    .unwrap_or_else(|| self.defaults.currency_code.clone());
                format.currency = Some(code);
                format.locale = Some(self.defaults.locale.clone());
            }
            ColumnType::Number | ColumnType::Percentage | ColumnType::Progress => {
                format.decimals = Some(self.defaults.decimals);
            }
            ColumnType::Date => format.date_format = Some(self.defaults.date_pattern.clone()),
            ColumnType::DateTime => format.date_format = Some(self.defaults.datetime_pattern.clone()),
            ColumnType::Badge => format.badge_colors = Some(self.badge_colors(values)),
            _ => {}
        }
        format
    }

    /// Assigns palette colors to distinct values in first-seen order,
    /// cycling once the palette runs out. Values differing only in case
    /// share one slot, matching how inference counts distinct values.
    fn badge_colors(&self, values: &[&RawValue]) -> BTreeMap<String, String> {
        let mut slots: HashMap<String, String> = HashMap::new();
        let mut colors = BTreeMap::new();
        let palette = &self.defaults.palette;
        if palette.is_empty() {
            return colors;
        }
        for value in values.iter().filter(|value| !value.is_missing()) {
            let label = value.as_display();
            let next = slots.len();
            let color = slots
                .entry(label.to_lowercase())
                .or_insert_with(|| palette[next % palette.len()].clone())
                .clone();
            colors.entry(label).or_insert(color);
        }
        colors
    }
}

fn currency_code_for(text: &str) -> Option<&'static str> {
    let trimmed = text.trim();
    [("R$", "BRL"), ("US$", "USD"), ("$", "USD"), ("€", "EUR"), ("£", "GBP"), ("¥", "JPY")]
        .into_iter()
        .find(|(symbol, _)| trimmed.starts_with(symbol) || trimmed.ends_with(symbol))
        .map(|(_, code)| code)
}
