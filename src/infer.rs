//! Column type inference.
//!
//! Each sampled value is classified by the first matching predicate in
//! [`CLASSIFIERS`]; the per-type tallies are then walked in
//! [`PRIORITY`] order and the first type reaching the configured threshold
//! wins. Columns that never reach it fall back to `badge` (few distinct
//! values) or `string`.
//!
//! Known bias: numbers in `[0, 100]` are tallied toward both `number` and
//! `progress`, and `progress` is checked first, so small-valued count
//! columns come out as `progress`.

use std::{
    collections::{HashMap, HashSet},
    sync::LazyLock,
};

use itertools::Itertools;
use log::debug;
use regex::Regex;

use crate::{config::InferenceConfig, data::RawValue, decode::RawParseResult, schema::ColumnType};

const BOOLEAN_TOKENS: &[&str] = &["true", "false", "sim", "não", "yes", "no", "0", "1"];
const PROGRESS_RANGE: std::ops::RangeInclusive<f64> = 0.0..=100.0;

/// Order in which tallies are checked against the threshold.
pub const PRIORITY: &[ColumnType] = &[
    ColumnType::Email,
    ColumnType::Url,
    ColumnType::Image,
    ColumnType::Phone,
    ColumnType::Currency,
    ColumnType::Percentage,
    ColumnType::Date,
    ColumnType::DateTime,
    ColumnType::Boolean,
    ColumnType::Progress,
    ColumnType::Number,
    ColumnType::Badge,
    ColumnType::String,
];

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern"));
static LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^https?://\S+$").expect("link pattern"));
static IMAGE_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\.(jpe?g|png|gif|webp|svg|bmp|ico|avif|tiff?)$").expect("image pattern")
});
static PHONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\d\s()+\-]{8,}$").expect("phone pattern"));
static CURRENCY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:R\$|US\$|[$€£¥])\s?-?\d[\d.,]*$|^-?\d[\d.,]*\s?(?:R\$|US\$|[$€£¥])$")
        .expect("currency pattern")
});
static PERCENTAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?\d+(?:[.,]\d+)?%$").expect("percentage pattern"));
static LOOSE_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,4}[-/]\d{1,2}[-/]\d{1,4}").expect("date pattern"));
static TIME_OF_DAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[T\s]\d{1,2}:\d{2}").expect("time pattern"));

/// A classifier sees the raw value and its string form and either claims
/// it or passes.
type Classifier = fn(&RawValue, &str) -> Option<ColumnType>;

/// Fixed precedence; the first classifier that claims a value decides its
/// bucket.
pub const CLASSIFIERS: &[Classifier] = &[
    classify_boolean,
    classify_native_date,
    classify_email,
    classify_link,
    classify_phone,
    classify_currency,
    classify_percentage,
    classify_date_text,
    classify_number,
];

fn classify_boolean(value: &RawValue, text: &str) -> Option<ColumnType> {
    let is_token = || BOOLEAN_TOKENS.contains(&text.to_lowercase().as_str());
    (matches!(value, RawValue::Boolean(_)) || is_token()).then_some(ColumnType::Boolean)
}

fn classify_native_date(value: &RawValue, _text: &str) -> Option<ColumnType> {
    matches!(value, RawValue::Date(_)).then_some(ColumnType::Date)
}

fn classify_email(_value: &RawValue, text: &str) -> Option<ColumnType> {
    EMAIL.is_match(text).then_some(ColumnType::Email)
}

fn classify_link(_value: &RawValue, text: &str) -> Option<ColumnType> {
    if !LINK.is_match(text) {
        return None;
    }
    let path = text.split(['?', '#']).next().unwrap_or(text);
    if IMAGE_PATH.is_match(path) {
        Some(ColumnType::Image)
    } else {
        Some(ColumnType::Url)
    }
}

fn classify_phone(_value: &RawValue, text: &str) -> Option<ColumnType> {
    let no_letters = !text.chars().any(char::is_alphabetic);
    (PHONE.is_match(text) && no_letters).then_some(ColumnType::Phone)
}

fn classify_currency(_value: &RawValue, text: &str) -> Option<ColumnType> {
    CURRENCY.is_match(text.trim()).then_some(ColumnType::Currency)
}

fn classify_percentage(_value: &RawValue, text: &str) -> Option<ColumnType> {
    PERCENTAGE.is_match(text.trim()).then_some(ColumnType::Percentage)
}

fn classify_date_text(_value: &RawValue, text: &str) -> Option<ColumnType> {
    if !LOOSE_DATE.is_match(text) {
        return None;
    }
    if TIME_OF_DAY.is_match(text) {
        Some(ColumnType::DateTime)
    } else {
        Some(ColumnType::Date)
    }
}

fn classify_number(value: &RawValue, _text: &str) -> Option<ColumnType> {
    matches!(value, RawValue::Number(_)).then_some(ColumnType::Number)
}

/// Bucket for a single value; `string` when no classifier claims it.
pub fn classify(value: &RawValue) -> ColumnType {
    let text = value.as_display();
    CLASSIFIERS
        .iter()
        .find_map(|classifier| classifier(value, &text))
        .unwrap_or(ColumnType::String)
}

#[derive(Debug, Clone, Default)]
pub struct TypeTally {
    samples: usize,
    counts: HashMap<ColumnType, usize>,
    distinct: HashSet<String>,
}

impl TypeTally {
    pub fn record(&mut self, value: &RawValue) {
        if value.is_missing() {
            return;
        }
        self.samples += 1;
        self.distinct.insert(value.as_display().to_lowercase());

        let bucket = classify(value);
        *self.counts.entry(bucket).or_insert(0) += 1;
        if let (ColumnType::Number, RawValue::Number(n)) = (bucket, value)
            && PROGRESS_RANGE.contains(n)
        {
            *self.counts.entry(ColumnType::Progress).or_insert(0) += 1;
        }
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn count(&self, ty: ColumnType) -> usize {
        self.counts.get(&ty).copied().unwrap_or(0)
    }

    pub fn fraction(&self, ty: ColumnType) -> f64 {
        if self.samples == 0 {
            return 0.0;
        }
        self.count(ty) as f64 / self.samples as f64
    }

    pub fn distinct_values(&self) -> usize {
        self.distinct.len()
    }

    pub fn decide(&self, config: &InferenceConfig) -> ColumnType {
        if self.samples == 0 {
            return ColumnType::String;
        }
        if let Some(winner) = PRIORITY
            .iter()
            .copied()
            .find(|ty| self.fraction(*ty) >= config.threshold)
        {
            return winner;
        }
        if self.distinct_values() <= config.badge_max_distinct {
            ColumnType::Badge
        } else {
            ColumnType::String
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TypeInferenceEngine {
    config: InferenceConfig,
}

impl TypeInferenceEngine {
    pub fn new(config: &InferenceConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub fn infer_column<'a, I>(&self, values: I) -> ColumnType
    where
        I: IntoIterator<Item = &'a RawValue>,
    {
        self.tally(values).decide(&self.config)
    }

    pub fn tally<'a, I>(&self, values: I) -> TypeTally
    where
        I: IntoIterator<Item = &'a RawValue>,
    {
        let mut tally = TypeTally::default();
        for value in values {
            tally.record(value);
        }
        tally
    }

    /// Infers every distinct header of a decode result, in first-seen order.
    pub fn infer_all(&self, raw: &RawParseResult) -> Vec<(String, ColumnType)> {
        raw.headers
            .iter()
            .unique()
            .map(|key| {
                let tally = self.tally(raw.column_values(key));
                let inferred = tally.decide(&self.config);
                debug!(
                    "Column '{key}' inferred as {inferred} ({} sample(s), {} distinct)",
                    tally.samples(),
                    tally.distinct_values()
                );
                (key.clone(), inferred)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<RawValue> {
        values.iter().map(|v| RawValue::String(v.to_string())).collect()
    }

    fn infer(values: &[RawValue]) -> ColumnType {
        TypeInferenceEngine::default().infer_column(values)
    }

    #[test]
    fn classify_follows_fixed_precedence() {
        assert_eq!(classify(&RawValue::Boolean(true)), ColumnType::Boolean);
        assert_eq!(classify(&RawValue::Number(1.0)), ColumnType::Boolean);
        assert_eq!(classify(&RawValue::String("Não".into())), ColumnType::Boolean);
        assert_eq!(classify(&RawValue::String("a@b.io".into())), ColumnType::Email);
        assert_eq!(classify(&RawValue::String("https://x.io/a".into())), ColumnType::Url);
        assert_eq!(
            classify(&RawValue::String("https://x.io/a.PNG?w=2".into())),
            ColumnType::Image
        );
        assert_eq!(classify(&RawValue::String("(11) 98765-4321".into())), ColumnType::Phone);
        assert_eq!(classify(&RawValue::String("R$ 10,50".into())), ColumnType::Currency);
        assert_eq!(classify(&RawValue::String("10.5 €".into())), ColumnType::Currency);
        assert_eq!(classify(&RawValue::String("12,5%".into())), ColumnType::Percentage);
        assert_eq!(classify(&RawValue::String("05/01/2024".into())), ColumnType::Date);
        assert_eq!(classify(&RawValue::String("05/01/2024 10:30".into())), ColumnType::DateTime);
        assert_eq!(classify(&RawValue::Number(42.0)), ColumnType::Number);
        assert_eq!(classify(&RawValue::String("hello".into())), ColumnType::String);
    }

    #[test]
    fn phone_requires_no_letters() {
        assert_eq!(classify(&RawValue::String("+55 11 9999-0000".into())), ColumnType::Phone);
        assert_eq!(classify(&RawValue::String("ext 12345678".into())), ColumnType::String);
        assert_eq!(classify(&RawValue::String("123-456".into())), ColumnType::String);
    }

    #[test]
    fn empty_column_defaults_to_string() {
        assert_eq!(infer(&[RawValue::Null, RawValue::String(String::new())]), ColumnType::String);
    }

    #[test]
    fn threshold_is_inclusive() {
        let mut values = strings(&["a@x.com", "b@x.com", "c@x.com", "d@x.com", "e@x.com", "f@x.com", "g@x.com"]);
        values.extend(strings(&["one", "two", "three"]));
        assert_eq!(infer(&values), ColumnType::Email);

        values.pop();
        values.remove(0);
        values.push(RawValue::String("four".into()));
        values.push(RawValue::String("five".into()));
        // 6 of 10 emails: below threshold, few distinct values
        assert_eq!(infer(&values), ColumnType::Badge);
    }

    #[test]
    fn small_numbers_register_as_progress() {
        let values = [3.0, 7.0, 12.0, 99.0].map(RawValue::Number);
        assert_eq!(infer(&values), ColumnType::Progress);

        let large = [300.0, 700.0, 1200.0, 9900.0].map(RawValue::Number);
        assert_eq!(infer(&large), ColumnType::Number);
    }

    #[test]
    fn progress_counts_alongside_number() {
        let engine = TypeInferenceEngine::default();
        let values = [5.0, 500.0].map(RawValue::Number);
        let tally = engine.tally(&values);
        assert_eq!(tally.count(ColumnType::Number), 2);
        assert_eq!(tally.count(ColumnType::Progress), 1);
    }

    #[test]
    fn mixed_columns_fall_back_on_distinct_count() {
        let few = strings(&["1", "a@x.com", "https://x.io", "low", "low", "high"]);
        assert_eq!(infer(&few), ColumnType::Badge);

        let mut many: Vec<RawValue> = (0..12)
            .map(|i| RawValue::String(format!("user{i}@x.com")))
            .collect();
        many.extend((0..12).map(|i| RawValue::Number(1000.0 + i as f64)));
        assert_eq!(infer(&many), ColumnType::String);
    }

    #[test]
    fn distinct_count_ignores_case() {
        let engine = TypeInferenceEngine::default();
        let tally = engine.tally(&strings(&["Open", "open", "OPEN", "closed"]));
        assert_eq!(tally.distinct_values(), 2);
    }

    #[test]
    fn custom_threshold_changes_the_vote() {
        let config = InferenceConfig {
            threshold: 0.5,
            ..InferenceConfig::default()
        };
        let engine = TypeInferenceEngine::new(&config);
        let values = strings(&["a@x.com", "b@x.com", "plain", "text"]);
        assert_eq!(engine.infer_column(&values), ColumnType::Email);
    }

    #[test]
    fn infer_all_visits_duplicate_headers_once() {
        let raw = crate::decode::decode(
            b"id,id,name\n1,200,a\n2,300,b\n",
            "dup.csv",
            None,
            &Default::default(),
        );
        let inferred = TypeInferenceEngine::default().infer_all(&raw);
        assert_eq!(
            inferred,
            vec![
                ("id".to_string(), ColumnType::Number),
                ("name".to_string(), ColumnType::String)
            ]
        );
    }
}
