// src/scrape/mod.rs
pub mod dedup;
pub mod http;
pub mod scheduler;

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::FetchError;
use scheduler::CronSchedule;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    Get,
    Post,
}

/// How to call a source API. Only the HTTP fetcher looks inside.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    pub url: String,
    pub method: Method,
    pub headers: BTreeMap<String, String>,
    pub query: BTreeMap<String, String>,
    pub body: Option<Value>,
    pub timeout: Duration,
}

impl RequestSpec {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::Get,
            headers: BTreeMap::new(),
            query: BTreeMap::new(),
            body: None,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Any subset may be set; every trigger that is set fires independently.
#[derive(Debug, Clone, Default)]
pub struct ScheduleSpec {
    pub interval: Option<Duration>,
    pub cron: Option<CronSchedule>,
    pub on_startup: bool,
}

impl ScheduleSpec {
    pub fn has_trigger(&self) -> bool {
        self.on_startup || self.interval.is_some() || self.cron.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct SourceDefinition {
    pub id: String,
    pub request: RequestSpec,
    pub schedule: ScheduleSpec,
    pub filter_duplicates: bool,
}

/// Retrieves the current payload of a source.
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, source: &SourceDefinition) -> Result<Value, FetchError>;
}

/// A payload as the list of records handed to outputs.
pub fn records_of(payload: Value) -> Vec<Value> {
    match payload {
        Value::Array(items) => items,
        other => vec![other],
    }
}

/// `null`, `false`, `0` and `""` carry nothing worth forwarding.
pub fn is_empty_payload(payload: &Value) -> bool {
    match payload {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}
