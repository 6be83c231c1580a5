// src/transform/mod.rs
pub mod batch;
pub mod binding;
pub mod path;
pub mod point;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

pub use batch::{aggregate, aggregate_records, MeasurementBatch, Sample, TagExtractor, TspBinding};
pub use binding::{bind, bind_records, BindingDefinition, FieldBinding, FieldType, TagBinding};
pub use path::{Path, Resolved};
pub use point::{FieldValue, Point};

/// Numeric view of a JSON value: numbers and numeric strings. NaN/inf are not numbers.
pub(crate) fn number_of(v: &Value) -> Option<f64> {
    let x = match v {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let t = s.trim();
            if t.is_empty() {
                return None;
            }
            t.parse::<f64>().ok()?
        }
        _ => return None,
    };
    x.is_finite().then_some(x)
}

/// Text view of a JSON value. `null` has none.
pub(crate) fn text_of(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => serde_json::to_string(other).ok(),
    }
}

/// ISO-8601 UTC with milliseconds, e.g. `2024-05-01T12:00:00.000Z`.
pub fn iso_millis(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}
