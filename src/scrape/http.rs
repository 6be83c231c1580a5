// src/scrape/http.rs
use async_trait::async_trait;
use metrics::histogram;
use reqwest::Client;
use serde_json::Value;

use super::{Fetcher, Method, SourceDefinition};
use crate::error::FetchError;

/// Plain HTTP fetcher. One shared client; no retries.
#[derive(Clone, Default)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, source: &SourceDefinition) -> Result<Value, FetchError> {
        let req = &source.request;
        let url = req.url.clone();
        let t0 = std::time::Instant::now();

        let mut builder = match req.method {
            Method::Get => self.client.get(&url),
            Method::Post => self
                .client
                .post(&url)
                .json(req.body.as_ref().unwrap_or(&Value::Object(Default::default()))),
        };
        if !req.query.is_empty() {
            builder = builder.query(&req.query);
        }
        for (k, v) in &req.headers {
            builder = builder.header(k.as_str(), v.as_str());
        }

        let resp = builder
            .timeout(req.timeout)
            .send()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.clone(),
                source,
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status { url, status });
        }

        let body = resp
            .json::<Value>()
            .await
            .map_err(|source| FetchError::Decode { url, source })?;

        histogram!("scrape_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        Ok(body)
    }
}
