// src/output/influx.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flate2::{write::GzEncoder, Compression};
use metrics::counter;
use reqwest::{header, Client};
use serde_json::Value;
use std::io::Write;
use std::sync::{Arc, Mutex};
use tokio::time::{self, MissedTickBehavior};

use super::line_protocol;
use super::Output;
use crate::config::InfluxConfig;
use crate::error::OutputError;
use crate::transform::binding::{bind_records, BindingDefinition};
use crate::transform::Point;

/// Buffered line-protocol writer for the InfluxDB v2 write API.
/// Flushes when the buffer reaches `batch_size` lines, or on its own timer.
#[derive(Clone)]
pub struct InfluxWriter {
    inner: Arc<WriterInner>,
}

struct WriterInner {
    client: Client,
    endpoint: String,
    org: String,
    bucket: String,
    token: String,
    batch_size: usize,
    gzip_threshold: usize,
    buffer: Mutex<Vec<String>>,
}

impl InfluxWriter {
    pub fn new(cfg: &InfluxConfig) -> Self {
        Self {
            inner: Arc::new(WriterInner {
                client: Client::new(),
                endpoint: format!("{}/api/v2/write", cfg.url),
                org: cfg.org.clone(),
                bucket: cfg.bucket.clone(),
                token: cfg.token.clone(),
                batch_size: cfg.batch_size.max(1),
                gzip_threshold: cfg.gzip_threshold,
                buffer: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Background flush every `period`. Failed flushes are logged and dropped.
    pub fn spawn_flusher(&self, period: std::time::Duration) -> tokio::task::JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut ticker = time::interval_at(time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = this.flush().await {
                    tracing::warn!(error = %e, "influx flush failed");
                    counter!("output_errors_total", "output" => "influx").increment(1);
                }
            }
        })
    }

    /// Buffer the points; flush right away once the batch is full.
    pub async fn write(&self, points: &[Point]) -> Result<(), OutputError> {
        let full = {
            let mut buf = self.lock_buffer();
            for p in points {
                match line_protocol::encode(p) {
                    Some(line) => buf.push(line),
                    None => tracing::debug!(measurement = %p.measurement, "point has no fields, skipping"),
                }
            }
            buf.len() >= self.inner.batch_size
        };
        if full {
            self.flush().await?;
        }
        Ok(())
    }

    pub fn buffered(&self) -> usize {
        self.lock_buffer().len()
    }

    /// Send everything buffered. Returns the number of lines sent.
    pub async fn flush(&self) -> Result<usize, OutputError> {
        let lines = std::mem::take(&mut *self.lock_buffer());
        if lines.is_empty() {
            return Ok(0);
        }

        let body = lines.join("\n").into_bytes();
        let mut req = self
            .inner
            .client
            .post(&self.inner.endpoint)
            .query(&[
                ("org", self.inner.org.as_str()),
                ("bucket", self.inner.bucket.as_str()),
                ("precision", "ms"),
            ])
            .header(header::AUTHORIZATION, format!("Token {}", self.inner.token))
            .header(header::CONTENT_TYPE, "text/plain; charset=utf-8");

        req = if body.len() >= self.inner.gzip_threshold {
            req.header(header::CONTENT_ENCODING, "gzip").body(gzip(&body)?)
        } else {
            req.body(body)
        };

        let resp = req.send().await.map_err(|source| OutputError::Transport {
            endpoint: self.inner.endpoint.clone(),
            source,
        })?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(OutputError::Rejected {
                endpoint: self.inner.endpoint.clone(),
                status,
                body,
            });
        }

        counter!("influx_points_written_total").increment(lines.len() as u64);
        tracing::debug!(lines = lines.len(), "influx batch written");
        Ok(lines.len())
    }

    fn lock_buffer(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        // a poisoned buffer still holds valid lines
        self.inner
            .buffer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn gzip(body: &[u8]) -> Result<Vec<u8>, OutputError> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(body)?;
    Ok(enc.finish()?)
}

/// Binds records to points with every binding that applies to the source.
pub struct InfluxOutput {
    bindings: Vec<BindingDefinition>,
    writer: InfluxWriter,
}

impl InfluxOutput {
    /// Build the output and start its flush timer.
    pub fn start(cfg: InfluxConfig) -> Self {
        let writer = InfluxWriter::new(&cfg);
        writer.spawn_flusher(cfg.flush_interval);
        Self {
            bindings: cfg.bindings,
            writer,
        }
    }

    /// Without the flush timer; flushing happens on batch size or `close`.
    pub fn without_timer(cfg: InfluxConfig) -> Self {
        Self {
            writer: InfluxWriter::new(&cfg),
            bindings: cfg.bindings,
        }
    }

    pub fn writer(&self) -> &InfluxWriter {
        &self.writer
    }

    pub fn points(
        &self,
        source_id: &str,
        records: &[Value],
        fetched_at: DateTime<Utc>,
    ) -> Vec<Point> {
        self.bindings
            .iter()
            .filter(|b| b.applies_to(source_id))
            .flat_map(|b| bind_records(records, b, Some(fetched_at)))
            .collect()
    }
}

#[async_trait]
impl Output for InfluxOutput {
    fn name(&self) -> &'static str {
        "influx"
    }

    async fn save(
        &self,
        source_id: &str,
        records: &[Value],
        fetched_at: DateTime<Utc>,
    ) -> Result<(), OutputError> {
        let points = self.points(source_id, records, fetched_at);
        tracing::debug!(source = source_id, points = points.len(), "writing InfluxDB point(s)");
        self.writer.write(&points).await
    }

    async fn close(&self) -> Result<(), OutputError> {
        let n = self.writer.flush().await?;
        tracing::info!(lines = n, "influx buffer flushed");
        Ok(())
    }
}
