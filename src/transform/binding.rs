// src/transform/binding.rs
//! Declarative bindings: fetched JSON document in, one [`Point`] out.
//!
//! Nothing in here fails. A tag or field that cannot be resolved or coerced
//! is left off the point; a partial record beats a dropped one.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use super::path::Path;
use super::point::{FieldValue, Point};
use super::{number_of, text_of};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Int,
    Float,
    String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimestampKind {
    /// A parseable date string.
    String,
    /// Epoch milliseconds.
    Number,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimestampRule {
    pub path: Path,
    pub kind: TimestampKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TagSource {
    Static(String),
    Path(Path),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TagBinding {
    pub name: String,
    pub source: TagSource,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldBinding {
    pub name: String,
    pub path: Path,
    pub kind: FieldType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BindingDefinition {
    /// Source this binding belongs to; `None` applies it to every source.
    pub source_id: Option<String>,
    pub measurement: String,
    pub timestamp: Option<TimestampRule>,
    pub tags: Vec<TagBinding>,
    pub fields: Vec<FieldBinding>,
}

impl BindingDefinition {
    pub fn applies_to(&self, source_id: &str) -> bool {
        self.source_id.as_deref().map_or(true, |id| id == source_id)
    }
}

/// Bind one document. `fetched_at` is the arrival time of the response; when
/// neither the timestamp rule nor `fetched_at` yields a time, now is used.
pub fn bind(doc: &Value, def: &BindingDefinition, fetched_at: Option<DateTime<Utc>>) -> Point {
    let ts = def
        .timestamp
        .as_ref()
        .and_then(|rule| rule_timestamp(doc, rule))
        .or(fetched_at)
        .unwrap_or_else(Utc::now);

    let mut point = Point::new(def.measurement.clone(), ts);

    for tag in &def.tags {
        let value = match &tag.source {
            TagSource::Static(v) => Some(v.clone()),
            TagSource::Path(p) => p.resolve(doc).first().and_then(text_of),
        };
        if let Some(v) = value.filter(|v| !v.is_empty()) {
            point.set_tag(&tag.name, v);
        }
    }

    for field in &def.fields {
        if let Some(v) = field.path.resolve(doc).first().and_then(|v| coerce(v, field.kind)) {
            point.set_field(&field.name, v);
        }
    }

    point
}

/// Bind every record of a payload with the same definition.
pub fn bind_records(
    records: &[Value],
    def: &BindingDefinition,
    fetched_at: Option<DateTime<Utc>>,
) -> Vec<Point> {
    records.iter().map(|r| bind(r, def, fetched_at)).collect()
}

/// Coerce a resolved JSON value to the declared field type.
pub fn coerce(v: &Value, kind: FieldType) -> Option<FieldValue> {
    match kind {
        FieldType::Int => int_of(v).map(FieldValue::Int),
        FieldType::Float => number_of(v).map(FieldValue::Float),
        FieldType::String => text_of(v).map(FieldValue::String),
    }
}

fn int_of(v: &Value) -> Option<i64> {
    if let Some(i) = v.as_i64() {
        return Some(i);
    }
    if let Value::String(s) = v {
        if let Ok(i) = s.trim().parse::<i64>() {
            return Some(i);
        }
    }
    let x = number_of(v)?.trunc();
    // i64::MAX as f64 rounds up to 2^63, hence the strict upper bound
    (x >= i64::MIN as f64 && x < i64::MAX as f64).then_some(x as i64)
}

fn rule_timestamp(doc: &Value, rule: &TimestampRule) -> Option<DateTime<Utc>> {
    let raw = rule.path.resolve(doc).first()?;
    match rule.kind {
        TimestampKind::Number => {
            let ms = number_of(raw)?;
            DateTime::from_timestamp_millis(ms.trunc() as i64)
        }
        TimestampKind::String => parse_date(raw.as_str()?),
    }
}

/// Parse the date formats APIs commonly return. Zone-less forms are UTC.
pub fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn path(s: &str) -> Path {
        s.parse().unwrap()
    }

    fn field(name: &str, p: &str, kind: FieldType) -> FieldBinding {
        FieldBinding {
            name: name.into(),
            path: path(p),
            kind,
        }
    }

    fn def(fields: Vec<FieldBinding>) -> BindingDefinition {
        BindingDefinition {
            source_id: None,
            measurement: "m".into(),
            timestamp: None,
            tags: vec![],
            fields,
        }
    }

    #[test]
    fn fetch_timestamp_propagates_without_rule() {
        let t = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();
        for doc in [json!({}), json!({"time": "2001-01-01"}), json!([1, 2]), json!(null)] {
            assert_eq!(bind(&doc, &def(vec![]), Some(t)).timestamp, t);
        }
    }

    #[test]
    fn timestamp_rule_overrides_fetch_time() {
        let t = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();
        let mut d = def(vec![]);
        d.timestamp = Some(TimestampRule {
            path: path("meta.ts"),
            kind: TimestampKind::String,
        });
        let p = bind(&json!({"meta": {"ts": "2024-06-01T12:30:00Z"}}), &d, Some(t));
        assert_eq!(p.timestamp, Utc.with_ymd_and_hms(2024, 6, 1, 12, 30, 0).unwrap());

        d.timestamp = Some(TimestampRule {
            path: path("ms"),
            kind: TimestampKind::Number,
        });
        let p = bind(&json!({"ms": 1_717_245_000_000i64}), &d, Some(t));
        assert_eq!(p.timestamp.timestamp_millis(), 1_717_245_000_000);

        // unparseable falls back to the fetch time
        let p = bind(&json!({"ms": "soon"}), &d, Some(t));
        assert_eq!(p.timestamp, t);
    }

    #[test]
    fn non_numeric_source_omits_numeric_fields() {
        let d = def(vec![
            field("i", "v", FieldType::Int),
            field("f", "v", FieldType::Float),
            field("s", "v", FieldType::String),
        ]);
        let p = bind(&json!({"v": "abc"}), &d, None);
        assert!(p.field("i").is_none());
        assert!(p.field("f").is_none());
        assert_eq!(p.field("s"), Some(&FieldValue::String("abc".into())));
    }

    #[test]
    fn int_truncates_and_parses() {
        let d = def(vec![
            field("a", "a", FieldType::Int),
            field("b", "b", FieldType::Int),
            field("c", "c", FieldType::Int),
        ]);
        let p = bind(&json!({"a": 21.9, "b": " 42 ", "c": "-3.7"}), &d, None);
        assert_eq!(p.field("a"), Some(&FieldValue::Int(21)));
        assert_eq!(p.field("b"), Some(&FieldValue::Int(42)));
        assert_eq!(p.field("c"), Some(&FieldValue::Int(-3)));
    }

    #[test]
    fn missing_and_null_values_are_omitted() {
        let d = def(vec![
            field("gone", "nope", FieldType::Float),
            field("null", "n", FieldType::String),
            field("zero", "z", FieldType::Float),
            field("flag", "b", FieldType::String),
        ]);
        let p = bind(&json!({"n": null, "z": 0, "b": false}), &d, None);
        assert!(p.field("gone").is_none());
        assert!(p.field("null").is_none());
        assert_eq!(p.field("zero"), Some(&FieldValue::Float(0.0)));
        assert_eq!(p.field("flag"), Some(&FieldValue::String("false".into())));
    }

    #[test]
    fn tags_static_wins_and_missing_is_omitted() {
        let mut d = def(vec![]);
        d.tags = vec![
            TagBinding {
                name: "site".into(),
                source: TagSource::Static("lab".into()),
            },
            TagBinding {
                name: "room".into(),
                source: TagSource::Path(path("room.id")),
            },
            TagBinding {
                name: "floor".into(),
                source: TagSource::Path(path("floor")),
            },
        ];
        let p = bind(&json!({"room": {"id": 7}}), &d, None);
        assert_eq!(p.tag("site"), Some("lab"));
        assert_eq!(p.tag("room"), Some("7"));
        assert!(p.tag("floor").is_none());
        assert_eq!(p.tags.len(), 2);
        assert_eq!(p.tags[0].0, "site");
    }

    #[test]
    fn empty_point_is_still_returned() {
        let p = bind(&json!({}), &def(vec![field("x", "x", FieldType::Int)]), None);
        assert!(!p.has_fields());
        assert!(p.tags.is_empty());
    }

    #[test]
    fn parses_common_date_shapes() {
        let want = Utc.with_ymd_and_hms(2024, 6, 1, 12, 30, 0).unwrap();
        assert_eq!(parse_date("2024-06-01T14:30:00+02:00"), Some(want));
        assert_eq!(parse_date("Sat, 01 Jun 2024 12:30:00 GMT"), Some(want));
        assert_eq!(parse_date("2024-06-01 12:30:00"), Some(want));
        assert_eq!(
            parse_date("2024-06-01"),
            Some(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_date("yesterday"), None);
    }
}
