// src/output/mod.rs
pub mod influx;
pub mod line_protocol;
pub mod tsp;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;

use crate::config::OutputsConfig;
use crate::error::OutputError;

/// A sink for fetched records. Every configured output receives every
/// forwarded payload; outputs decide themselves what applies to a source.
#[async_trait]
pub trait Output: Send + Sync {
    fn name(&self) -> &'static str;

    /// Deliver the records of one fetch. Zero records is not an error.
    async fn save(
        &self,
        source_id: &str,
        records: &[Value],
        fetched_at: DateTime<Utc>,
    ) -> Result<(), OutputError>;

    /// Push out anything still buffered. Called once at shutdown.
    async fn close(&self) -> Result<(), OutputError> {
        Ok(())
    }
}

/// Build the outputs present in the configuration. Must run inside a Tokio
/// runtime: buffered outputs start their flush task here.
pub fn build_outputs(cfg: &OutputsConfig) -> Vec<Arc<dyn Output>> {
    let mut outputs: Vec<Arc<dyn Output>> = Vec::new();

    if let Some(tsp) = &cfg.tsp {
        outputs.push(Arc::new(tsp::TspOutput::new(tsp.clone())));
    }
    if let Some(influx) = &cfg.influx {
        outputs.push(Arc::new(influx::InfluxOutput::start(influx.clone())));
    }

    if outputs.is_empty() {
        tracing::warn!("no outputs configured; fetched data will be discarded");
    }
    outputs
}
