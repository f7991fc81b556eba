use proptest::prelude::*;
use tablescope::{
    config::InferenceConfig,
    data::RawValue,
    infer::{TypeInferenceEngine, classify},
    schema::ColumnType,
};

fn engine() -> TypeInferenceEngine {
    TypeInferenceEngine::new(&InferenceConfig::default())
}

fn text(value: impl Into<String>) -> RawValue {
    RawValue::String(value.into())
}

#[test]
fn classification_follows_fixed_precedence() {
    let cases = [
        (text("SIM"), ColumnType::Boolean),
        (RawValue::Number(1.0), ColumnType::Boolean),
        (text("ana@example.org"), ColumnType::Email),
        (text("https://cdn.example.org/logo.PNG?v=2"), ColumnType::Image),
        (text("http://example.org/page"), ColumnType::Url),
        (text("+55 (11) 4002-8922"), ColumnType::Phone),
        (text("€12,30"), ColumnType::Currency),
        (text("12.30 US$"), ColumnType::Currency),
        (text("45,5%"), ColumnType::Percentage),
        (text("2024/1/5"), ColumnType::Date),
        (text("05/01/2024 14:30"), ColumnType::DateTime),
        (RawValue::Number(250.0), ColumnType::Number),
        (text("ramp 12345678"), ColumnType::String),
    ];
    for (value, expected) in cases {
        assert_eq!(classify(&value), expected, "value {value:?}");
    }
}

#[test]
fn empty_columns_are_strings() {
    let values = [RawValue::Null, text(""), RawValue::Null];
    assert_eq!(engine().infer_column(values.iter()), ColumnType::String);
}

#[test]
fn small_integers_lean_toward_progress() {
    let values = [3.0, 15.0, 99.0, 42.0].map(RawValue::Number);
    assert_eq!(engine().infer_column(values.iter()), ColumnType::Progress);

    let values = [3.0, 150.0, 990.0, 4200.0].map(RawValue::Number);
    assert_eq!(engine().infer_column(values.iter()), ColumnType::Number);
}

#[test]
fn threshold_is_tunable() {
    let values = [text("a@b.co"), text("c@d.co"), text("plain"), text("words")];
    assert_ne!(engine().infer_column(values.iter()), ColumnType::Email);

    let lenient = TypeInferenceEngine::new(&InferenceConfig {
        threshold: 0.5,
        ..InferenceConfig::default()
    });
    assert_eq!(lenient.infer_column(values.iter()), ColumnType::Email);
}

proptest! {
    #[test]
    fn majority_type_wins_at_threshold(emails in 7usize..30, noise in 0usize..4) {
        // `noise` never exceeds 30% of the column.
        let noise = noise.min(emails * 3 / 7);
        let mut values = (0..emails).map(|i| text(format!("user{i}@example.com"))).collect::<Vec<_>>();
        values.extend((0..noise).map(|i| text(format!("note {i}"))));
        prop_assert_eq!(engine().infer_column(values.iter()), ColumnType::Email);
    }

    #[test]
    fn undecided_columns_fall_back_on_distinct_count(distinct in 1usize..16, repeats in 1usize..4) {
        // Half booleans, half words: neither bucket reaches 70%.
        let mut values = Vec::new();
        for i in 0..distinct * repeats {
            values.push(RawValue::Boolean(true));
            values.push(text(format!("w{}", i % distinct)));
        }
        let expected = if distinct + 1 <= 10 { ColumnType::Badge } else { ColumnType::String };
        prop_assert_eq!(engine().infer_column(values.iter()), expected);
    }
}
