//! api-scraper — binary entrypoint.
//! Loads the scraper configuration, builds the outputs and runs one scheduler
//! task per configured source until Ctrl-C.

use anyhow::Context;
use std::sync::Arc;
use tracing::{info, warn};

use api_scraper::scrape::http::HttpFetcher;
use api_scraper::{build_outputs, config, init_tracing, Scheduler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when the file is missing.
    let _ = dotenvy::dotenv();
    init_tracing();

    if let Some(addr) = api_scraper::metrics::install_from_env()? {
        info!(%addr, "prometheus exporter listening");
    }

    let cfg = config::load_default().context("failed to load configuration")?;
    info!("Initializing {} API scraper(s)...", cfg.sources.len());

    let outputs = build_outputs(&cfg.outputs);
    let scheduler = Scheduler::new(Arc::new(HttpFetcher::new()), outputs.clone());
    let handles = scheduler.spawn_all(cfg.sources);
    info!("{} API scraper(s) initialized, starting...", handles.len());

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("shutdown requested, stopping scrapers");
    for h in &handles {
        h.abort();
    }

    for output in &outputs {
        if let Err(e) = output.close().await {
            warn!(output = output.name(), error = %e, "output close failed");
        }
    }
    Ok(())
}
