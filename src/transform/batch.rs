// src/transform/batch.rs
//! Groups repeated sub-records of a fetched payload into measurement batches
//! for the time-series platform.
//!
//! A sample survives only with a valid number and a non-empty timestamp;
//! anything else is dropped without touching its siblings.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use super::path::Path;
use super::{iso_millis, number_of, text_of};

#[derive(Debug, Clone, PartialEq)]
pub struct TagExtractor {
    pub slug: String,
    pub value: Path,
    pub timestamp: Option<Path>,
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TspBinding {
    pub source_id: String,
    /// Sub-document (or array of repeated elements) to read from.
    pub root: Option<Path>,
    pub tags: Vec<TagExtractor>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    pub value: f64,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementBatch {
    pub tag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub data: Vec<Sample>,
    pub version_timestamp: String,
}

/// Slug-keyed batches in first-seen order.
#[derive(Debug, Default)]
struct Accumulator {
    batches: Vec<MeasurementBatch>,
}

impl Accumulator {
    fn push(&mut self, ex: &TagExtractor, sample: Sample, version_ts: &str) {
        match self.batches.iter_mut().find(|b| b.tag == ex.slug) {
            Some(batch) => batch.data.push(sample),
            None => self.batches.push(MeasurementBatch {
                tag: ex.slug.clone(),
                location: ex.location.clone(),
                data: vec![sample],
                version_timestamp: version_ts.to_string(),
            }),
        }
    }
}

/// Aggregate a single document.
pub fn aggregate(
    doc: &Value,
    binding: &TspBinding,
    fetched_at: Option<DateTime<Utc>>,
) -> Vec<MeasurementBatch> {
    aggregate_records(std::slice::from_ref(doc), binding, fetched_at)
}

/// Aggregate every record of one fetch. Samples of a slug accumulate across
/// records; extractors never merge with each other.
pub fn aggregate_records(
    records: &[Value],
    binding: &TspBinding,
    fetched_at: Option<DateTime<Utc>>,
) -> Vec<MeasurementBatch> {
    let fetch_ts = iso_millis(fetched_at.unwrap_or_else(Utc::now));

    binding
        .tags
        .iter()
        .flat_map(|ex| {
            let mut acc = Accumulator::default();
            for record in records {
                for element in elements(record, binding.root.as_ref()) {
                    if let Some(sample) = sample_of(element, ex, &fetch_ts) {
                        acc.push(ex, sample, &fetch_ts);
                    }
                }
            }
            acc.batches
        })
        .collect()
}

fn elements<'a>(record: &'a Value, root: Option<&Path>) -> Vec<&'a Value> {
    let Some(root) = root else {
        return vec![record];
    };
    root.resolve(record)
        .into_vec()
        .into_iter()
        .flat_map(|m| match m {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        })
        .collect()
}

fn sample_of(element: &Value, ex: &TagExtractor, fetch_ts: &str) -> Option<Sample> {
    let value = ex.value.resolve(element).first().and_then(number_of)?;
    let timestamp = ex
        .timestamp
        .as_ref()
        .and_then(|p| p.resolve(element).first())
        .filter(|v| !matches!(v, Value::Bool(false)) && v.as_f64() != Some(0.0))
        .and_then(text_of)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| fetch_ts.to_string());
    if timestamp.is_empty() {
        return None;
    }
    Some(Sample { value, timestamp })
}
