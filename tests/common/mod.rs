// tests/common/mod.rs
#![allow(dead_code)]

use api_scraper::scrape::{RequestSpec, ScheduleSpec};
use api_scraper::{FetchError, Fetcher, Output, OutputError, SourceDefinition};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub fn source(id: &str, schedule: ScheduleSpec, filter_duplicates: bool) -> SourceDefinition {
    SourceDefinition {
        id: id.to_string(),
        request: RequestSpec::get(format!("http://source.test/{id}")),
        schedule,
        filter_duplicates,
    }
}

pub fn startup_only() -> ScheduleSpec {
    ScheduleSpec {
        on_startup: true,
        ..Default::default()
    }
}

pub fn every(period: Duration) -> ScheduleSpec {
    ScheduleSpec {
        interval: Some(period),
        ..Default::default()
    }
}

pub fn on_cron(expr: &str) -> ScheduleSpec {
    ScheduleSpec {
        cron: Some(expr.parse().expect("valid cron expression")),
        ..Default::default()
    }
}

pub fn unavailable() -> FetchError {
    FetchError::Status {
        url: "http://source.test".into(),
        status: reqwest::StatusCode::BAD_GATEWAY,
    }
}

/// Replays scripted responses; the last one repeats once the script runs out.
pub struct ScriptedFetcher {
    script: Mutex<VecDeque<Result<Value, ()>>>,
    last: Mutex<Option<Value>>,
    pub calls: AtomicUsize,
    pub delay: Duration,
}

impl ScriptedFetcher {
    pub fn new(script: Vec<Result<Value, ()>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, _source: &SourceDefinition) -> Result<Value, FetchError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(v)) => {
                *self.last.lock().unwrap() = Some(v.clone());
                Ok(v)
            }
            Some(Err(())) => Err(unavailable()),
            None => Ok(self
                .last
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| Value::from(n as u64))),
        }
    }
}

/// Records every `save` call.
#[derive(Default)]
pub struct RecordingOutput {
    pub calls: Mutex<Vec<(String, Vec<Value>, DateTime<Utc>)>>,
}

impl RecordingOutput {
    pub fn count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Output for RecordingOutput {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn save(
        &self,
        source_id: &str,
        records: &[Value],
        fetched_at: DateTime<Utc>,
    ) -> Result<(), OutputError> {
        self.calls
            .lock()
            .unwrap()
            .push((source_id.to_string(), records.to_vec(), fetched_at));
        Ok(())
    }
}

/// Always rejects.
pub struct FailingOutput;

#[async_trait]
impl Output for FailingOutput {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn save(&self, _: &str, _: &[Value], _: DateTime<Utc>) -> Result<(), OutputError> {
        Err(OutputError::Rejected {
            endpoint: "http://sink.test".into(),
            status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            body: "boom".into(),
        })
    }
}

/// Never finishes a `save`.
pub struct StuckOutput;

#[async_trait]
impl Output for StuckOutput {
    fn name(&self) -> &'static str {
        "stuck"
    }

    async fn save(&self, _: &str, _: &[Value], _: DateTime<Utc>) -> Result<(), OutputError> {
        std::future::pending().await
    }
}
