// src/metrics.rs
use anyhow::{Context, Result};
use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;
use std::net::SocketAddr;

pub const ENV_METRICS_ADDR: &str = "METRICS_ADDR";

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("scrape_ticks_total", "Fetch cycles started, per source.");
        describe_counter!(
            "scrape_fetch_errors_total",
            "Fetch cycles abandoned because the source could not be fetched."
        );
        describe_counter!(
            "scrape_duplicates_total",
            "Payloads dropped because they equal the previous one."
        );
        describe_counter!(
            "scrape_forwarded_total",
            "Payloads handed to the outputs."
        );
        describe_counter!("output_errors_total", "Failed output deliveries, per output.");
        describe_counter!(
            "influx_points_written_total",
            "Line-protocol points accepted by InfluxDB."
        );
        describe_counter!(
            "tsp_batches_sent_total",
            "Measurement batches accepted by the time series platform."
        );
        describe_histogram!("scrape_fetch_ms", "Source fetch time in milliseconds.");
    });
}

/// Install the Prometheus exporter when `$METRICS_ADDR` is set (e.g. `0.0.0.0:9000`).
/// Returns the address it listens on.
pub fn install_from_env() -> Result<Option<SocketAddr>> {
    let Ok(raw) = std::env::var(ENV_METRICS_ADDR) else {
        return Ok(None);
    };
    let addr: SocketAddr = raw
        .parse()
        .with_context(|| format!("{ENV_METRICS_ADDR} is not a socket address: {raw}"))?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("prometheus: install exporter")?;
    ensure_metrics_described();
    Ok(Some(addr))
}
