// src/scrape/scheduler.rs
//! Per-source orchestration.
//!
//! Every source gets one orchestrator task plus one task per configured
//! trigger (startup, interval, cron). Triggers only send [`Trigger`] events;
//! the orchestrator spawns the fetch, runs the dedup filter when the fetch
//! completes and fans the payload out to every output.
//!
//! Fetches of one source may overlap: a tick does not wait for the previous
//! one. The dedup cell is only touched by the orchestrator task, so
//! overlapping fetches are compared in completion order.

use chrono::{DateTime, Utc};
use metrics::counter;
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::dedup::DedupFilter;
use super::{is_empty_payload, records_of, Fetcher, SourceDefinition};
use crate::output::Output;

const TRIGGER_QUEUE: usize = 64;

/// Calendar trigger. Accepts 5-field crontab expressions (minute precision,
/// 0 or 7 = Sunday) as well as the 6/7-field form with seconds, which uses
/// the `cron` crate's own numbering (1 = Sunday). Evaluated in UTC.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expr: String,
    schedule: cron::Schedule,
}

impl CronSchedule {
    pub fn as_str(&self) -> &str {
        &self.expr
    }

    /// First firing strictly after `t`.
    pub fn next_after(&self, t: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&t).next()
    }
}

impl FromStr for CronSchedule {
    type Err = cron::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let expr = s.trim().to_string();
        let fields: Vec<&str> = expr.split_whitespace().collect();
        let normalized = if let [minute, hour, dom, month, dow] = fields[..] {
            format!("0 {minute} {hour} {dom} {month} {}", crontab_weekdays(dow))
        } else {
            expr.clone()
        };
        let schedule = cron::Schedule::from_str(&normalized)?;
        Ok(Self { expr, schedule })
    }
}

/// Rewrites a crontab day-of-week field (0-7, Sunday = 0 or 7) into the
/// `cron` crate's 1-7 numbering. Names and `*` pass through untouched;
/// malformed items are left for the parser to reject.
fn crontab_weekdays(field: &str) -> String {
    field
        .split(',')
        .map(|item| crontab_weekday_item(item).unwrap_or_else(|| item.to_string()))
        .collect::<Vec<_>>()
        .join(",")
}

fn crontab_weekday_item(item: &str) -> Option<String> {
    let (range, step) = match item.split_once('/') {
        Some((range, step)) => (range, step.parse::<usize>().ok()?),
        None => (item, 1),
    };
    if range == "*" || step == 0 {
        return None;
    }
    let (lo, hi) = match range.split_once('-') {
        Some((lo, hi)) => (lo.parse::<u32>().ok()?, hi.parse::<u32>().ok()?),
        None => {
            let day = range.parse::<u32>().ok()?;
            (day, if item.contains('/') { 7 } else { day })
        }
    };
    if lo > hi || hi > 7 {
        return None;
    }
    let mut days: Vec<u32> = (lo..=hi).step_by(step).map(|d| d % 7 + 1).collect();
    days.sort_unstable();
    days.dedup();
    Some(
        days.iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(","),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Startup,
    Interval,
    Cron,
}

impl Trigger {
    fn as_str(self) -> &'static str {
        match self {
            Trigger::Startup => "startup",
            Trigger::Interval => "interval",
            Trigger::Cron => "cron",
        }
    }
}

struct Fetched {
    payload: Value,
    fetched_at: DateTime<Utc>,
}

/// Drives every configured source against a shared fetcher and output set.
#[derive(Clone)]
pub struct Scheduler {
    fetcher: Arc<dyn Fetcher>,
    outputs: Arc<[Arc<dyn Output>]>,
}

impl Scheduler {
    pub fn new(fetcher: Arc<dyn Fetcher>, outputs: Vec<Arc<dyn Output>>) -> Self {
        Self {
            fetcher,
            outputs: outputs.into(),
        }
    }

    pub fn spawn_all(&self, sources: Vec<SourceDefinition>) -> Vec<JoinHandle<()>> {
        sources.into_iter().map(|s| self.spawn(s)).collect()
    }

    /// Arm the triggers of `source` and start its orchestrator. The returned
    /// task ends once every trigger is exhausted and in-flight work is done;
    /// with an interval or cron trigger that is never.
    pub fn spawn(&self, source: SourceDefinition) -> JoinHandle<()> {
        let source = Arc::new(source);
        let (tx, rx) = mpsc::channel(TRIGGER_QUEUE);

        if source.schedule.on_startup {
            let tx = tx.clone();
            tokio::spawn(async move {
                let _ = tx.send(Trigger::Startup).await;
            });
        }

        if let Some(period) = source.schedule.interval {
            tokio::spawn(interval_trigger(period, tx.clone()));
            info!(source = %source.id, interval_ms = period.as_millis() as u64, "initialized interval trigger");
        }

        if let Some(cron) = source.schedule.cron.clone() {
            info!(source = %source.id, cron = cron.as_str(), "initialized cron trigger");
            tokio::spawn(cron_trigger(cron, tx.clone()));
        }

        if !source.schedule.has_trigger() {
            warn!(source = %source.id, "source has no trigger; it will never be fetched");
        }
        drop(tx);

        let this = self.clone();
        tokio::spawn(async move { this.orchestrate(source, rx).await })
    }

    async fn orchestrate(self, source: Arc<SourceDefinition>, mut ticks: mpsc::Receiver<Trigger>) {
        let mut dedup = DedupFilter::new(source.filter_duplicates);
        let mut fetches: JoinSet<Option<Fetched>> = JoinSet::new();
        let mut deliveries: JoinSet<()> = JoinSet::new();
        let mut ticks_open = true;

        loop {
            tokio::select! {
                tick = ticks.recv(), if ticks_open => match tick {
                    Some(trigger) => {
                        counter!("scrape_ticks_total", "source" => source.id.clone()).increment(1);
                        debug!(source = %source.id, trigger = trigger.as_str(), "tick");
                        fetches.spawn(fetch_once(self.fetcher.clone(), source.clone()));
                    }
                    None => ticks_open = false,
                },
                Some(joined) = fetches.join_next(), if !fetches.is_empty() => match joined {
                    Ok(Some(fetched)) => {
                        if let Some(task) = self.admit(&source, &mut dedup, fetched) {
                            deliveries.spawn(task);
                        }
                    }
                    Ok(None) => {}
                    Err(e) => error!(source = %source.id, error = %e, "fetch task failed"),
                },
                Some(joined) = deliveries.join_next(), if !deliveries.is_empty() => {
                    if let Err(e) = joined {
                        error!(source = %source.id, error = %e, "delivery task failed");
                    }
                }
                else => break,
            }
        }
        debug!(source = %source.id, "orchestrator finished");
    }

    /// Dedup check; on success returns the fan-out future for this payload.
    fn admit(
        &self,
        source: &SourceDefinition,
        dedup: &mut DedupFilter,
        fetched: Fetched,
    ) -> Option<impl std::future::Future<Output = ()> + Send + 'static> {
        if is_empty_payload(&fetched.payload) {
            debug!(source = %source.id, "empty response, skipping");
            return None;
        }
        if !dedup.admit(&fetched.payload) {
            info!(source = %source.id, "received the same response as the previous one, skipping");
            counter!("scrape_duplicates_total", "source" => source.id.clone()).increment(1);
            return None;
        }

        counter!("scrape_forwarded_total", "source" => source.id.clone()).increment(1);
        let outputs = self.outputs.clone();
        let source_id: Arc<str> = Arc::from(source.id.as_str());
        let records = Arc::new(records_of(fetched.payload));
        Some(deliver(outputs, source_id, records, fetched.fetched_at))
    }
}

async fn fetch_once(fetcher: Arc<dyn Fetcher>, source: Arc<SourceDefinition>) -> Option<Fetched> {
    match fetcher.fetch(&source).await {
        Ok(payload) => Some(Fetched {
            payload,
            fetched_at: Utc::now(),
        }),
        Err(e) => {
            warn!(source = %source.id, error = %e, "fetch failed");
            counter!("scrape_fetch_errors_total", "source" => source.id.clone()).increment(1);
            None
        }
    }
}

/// Hand one payload to every output concurrently. A failing output is
/// logged and does not affect the others.
async fn deliver(
    outputs: Arc<[Arc<dyn Output>]>,
    source_id: Arc<str>,
    records: Arc<Vec<Value>>,
    fetched_at: DateTime<Utc>,
) {
    let mut set = JoinSet::new();
    for output in outputs.iter().cloned() {
        let source_id = source_id.clone();
        let records = records.clone();
        set.spawn(async move {
            let res = output.save(&source_id, &records, fetched_at).await;
            (output.name(), res)
        });
    }

    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((_, Ok(()))) => {}
            Ok((name, Err(e))) => {
                warn!(source = %source_id, output = name, error = %e, "output failed");
                counter!("output_errors_total", "output" => name).increment(1);
            }
            Err(e) => error!(source = %source_id, error = %e, "output task failed"),
        }
    }
}

async fn interval_trigger(period: Duration, tx: mpsc::Sender<Trigger>) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if tx.send(Trigger::Interval).await.is_err() {
            break;
        }
    }
}

async fn cron_trigger(cron: CronSchedule, tx: mpsc::Sender<Trigger>) {
    let mut cursor = Utc::now();
    loop {
        let Some(next) = cron.next_after(cursor.max(Utc::now())) else {
            warn!(cron = cron.as_str(), "cron schedule has no upcoming firing");
            break;
        };
        let wait = (next - Utc::now()).to_std().unwrap_or_default();
        time::sleep(wait).await;
        cursor = next;
        if tx.send(Trigger::Cron).await.is_err() {
            break;
        }
    }
}
