// src/config/model.rs
//! On-disk configuration shape (camelCase keys, JSON or TOML).

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::scrape::Method;
use crate::transform::binding::{FieldType, TimestampKind};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileConfig {
    pub scrapers: Vec<ScraperConfig>,
    #[serde(default)]
    pub outputs: OutputsFileConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScraperConfig {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub method: Method,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub query: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<Value>,
    pub request_interval_ms: Option<u64>,
    pub request_cron_schedule: Option<String>,
    #[serde(default)]
    pub request_on_startup: bool,
    #[serde(default)]
    pub filter_duplicate_values: bool,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputsFileConfig {
    pub influx: Option<InfluxFileConfig>,
    pub tsp: Option<TspFileConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfluxFileConfig {
    pub api: InfluxApiFileConfig,
    pub bindings: OneOrMany<BindingFileConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfluxApiFileConfig {
    pub url: String,
    pub token: String,
    pub bucket: String,
    pub org: String,
    pub batch_size: Option<usize>,
    pub flush_interval_ms: Option<u64>,
    pub gzip_threshold: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(t) => vec![t],
            OneOrMany::Many(v) => v,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingFileConfig {
    pub id: Option<String>,
    pub measurement: String,
    pub timestamp: Option<TimestampFileConfig>,
    #[serde(default)]
    pub tags: Vec<TagFileConfig>,
    #[serde(default)]
    pub fields: Vec<FieldFileConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimestampFileConfig {
    pub key: String,
    #[serde(rename = "type")]
    pub kind: TimestampKind,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TagFileConfig {
    #[serde(rename = "in")]
    pub input: Option<String>,
    pub out: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldFileConfig {
    #[serde(rename = "in")]
    pub input: String,
    pub out: String,
    #[serde(rename = "type")]
    pub kind: FieldType,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TspFileConfig {
    pub url: String,
    pub api_key: String,
    pub api_key_header: Option<String>,
    #[serde(default)]
    pub bindings: Vec<TspBindingFileConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TspBindingFileConfig {
    pub id: String,
    pub root: Option<String>,
    #[serde(default)]
    pub tags: Vec<TspTagFileConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TspTagFileConfig {
    pub slug: String,
    pub value: String,
    pub timestamp: Option<String>,
    pub location: Option<String>,
}
