// src/output/tsp.rs
//! Time Series Platform output: measurement batches posted as JSON.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Instant;

use super::Output;
use crate::config::TspConfig;
use crate::error::OutputError;
use crate::transform::batch::{aggregate_records, MeasurementBatch, TspBinding};

pub struct TspOutput {
    client: Client,
    endpoint: String,
    api_key_header: String,
    api_key: String,
    bindings: HashMap<String, TspBinding>,
}

impl TspOutput {
    pub fn new(cfg: TspConfig) -> Self {
        if cfg.bindings.is_empty() {
            tracing::info!("time series platform: no bindings, output disabled");
        }
        Self {
            client: Client::new(),
            endpoint: format!("{}/measurement", cfg.url),
            api_key_header: cfg.api_key_header,
            api_key: cfg.api_key,
            bindings: cfg
                .bindings
                .into_iter()
                .map(|b| (b.source_id.clone(), b))
                .collect(),
        }
    }

    /// Batches for one fetch of `source_id`, or `None` when the source has no binding.
    pub fn batches(
        &self,
        source_id: &str,
        records: &[Value],
        fetched_at: DateTime<Utc>,
    ) -> Option<Vec<MeasurementBatch>> {
        let binding = self.bindings.get(source_id)?;
        Some(aggregate_records(records, binding, Some(fetched_at)))
    }
}

#[async_trait]
impl Output for TspOutput {
    fn name(&self) -> &'static str {
        "tsp"
    }

    async fn save(
        &self,
        source_id: &str,
        records: &[Value],
        fetched_at: DateTime<Utc>,
    ) -> Result<(), OutputError> {
        let start = Instant::now();
        let Some(batches) = self.batches(source_id, records, fetched_at) else {
            return Ok(());
        };
        if batches.is_empty() {
            tracing::debug!(source = source_id, "no valid samples, nothing to send");
            return Ok(());
        }

        let resp = self
            .client
            .post(&self.endpoint)
            .header(self.api_key_header.as_str(), self.api_key.as_str())
            .json(&batches)
            .send()
            .await
            .map_err(|source| OutputError::Transport {
                endpoint: self.endpoint.clone(),
                source,
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(OutputError::Rejected {
                endpoint: self.endpoint.clone(),
                status,
                body,
            });
        }

        let rows: usize = batches.iter().map(|b| b.data.len()).sum();
        counter!("tsp_batches_sent_total").increment(batches.len() as u64);
        tracing::info!(
            source = source_id,
            batches = batches.len(),
            rows,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "sent measurement batch(es)"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::batch::TagExtractor;
    use chrono::TimeZone;
    use httpmock::prelude::*;
    use serde_json::json;

    fn cfg(url: String, header: &str) -> TspConfig {
        TspConfig {
            url,
            api_key: "k3y".into(),
            api_key_header: header.into(),
            bindings: vec![TspBinding {
                source_id: "prices".into(),
                root: Some("items".parse().unwrap()),
                tags: vec![TagExtractor {
                    slug: "price".into(),
                    value: "v".parse().unwrap(),
                    timestamp: None,
                    location: Some("EU".into()),
                }],
            }],
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn posts_batches_with_api_key_header() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/measurement")
                    .header("x-api-key", "k3y")
                    .json_body(json!([{
                        "tag": "price",
                        "location": "EU",
                        "data": [
                            {"value": 1.0, "timestamp": "2024-05-01T12:00:00.000Z"},
                            {"value": 3.0, "timestamp": "2024-05-01T12:00:00.000Z"}
                        ],
                        "versionTimestamp": "2024-05-01T12:00:00.000Z"
                    }]));
                then.status(201);
            })
            .await;

        let out = TspOutput::new(cfg(server.base_url(), "x-api-key"));
        let doc = json!({"items": [{"v": 1}, {"v": "x"}, {"v": 3}]});
        out.save("prices", &[doc], t0()).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn unbound_source_is_a_silent_no_op() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.any_request();
                then.status(500);
            })
            .await;

        let out = TspOutput::new(cfg(server.base_url(), "x-api-key"));
        out.save("weather", &[json!({"v": 1})], t0()).await.unwrap();
        out.save("prices", &[], t0()).await.unwrap();
        mock.assert_hits_async(0).await;
    }

    #[tokio::test]
    async fn rejected_post_is_an_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/measurement").header("x-token", "k3y");
                then.status(403).body("nope");
            })
            .await;

        let out = TspOutput::new(cfg(server.base_url(), "x-token"));
        let err = out
            .save("prices", &[json!({"items": [{"v": 2}]})], t0())
            .await
            .unwrap_err();
        assert!(matches!(err, OutputError::Rejected { status, .. } if status.as_u16() == 403));
    }
}
