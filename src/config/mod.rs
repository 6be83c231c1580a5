// src/config/mod.rs
//! Configuration loading and validation.
//!
//! Everything is checked here so the runtime never sees a malformed binding:
//! paths and cron expressions are parsed once, output names are unique.

pub mod model;

use anyhow::{anyhow, bail, Context, Result};
use std::collections::HashSet;
use std::fs;
use std::path::{Path as FsPath, PathBuf};
use std::time::Duration;

use crate::scrape::scheduler::CronSchedule;
use crate::scrape::{RequestSpec, ScheduleSpec, SourceDefinition, DEFAULT_REQUEST_TIMEOUT};
use crate::transform::binding::{
    BindingDefinition, FieldBinding, TagBinding, TagSource, TimestampRule,
};
use crate::transform::batch::{TagExtractor, TspBinding};
use crate::transform::path::Path;
use model::{BindingFileConfig, FileConfig, InfluxFileConfig, ScraperConfig, TspFileConfig};

pub const ENV_CONFIG_PATH: &str = "CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config.json";
pub const ENV_INFLUX_TOKEN: &str = "INFLUX_TOKEN";
pub const ENV_TSP_API_KEY: &str = "TSP_API_KEY";
pub const DEFAULT_API_KEY_HEADER: &str = "x-api-key";

const DEFAULT_BATCH_SIZE: usize = 1000;
const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(60_000);
const DEFAULT_GZIP_THRESHOLD: usize = 1000;

#[derive(Debug, Clone)]
pub struct Config {
    pub sources: Vec<SourceDefinition>,
    pub outputs: OutputsConfig,
}

#[derive(Debug, Clone, Default)]
pub struct OutputsConfig {
    pub influx: Option<InfluxConfig>,
    pub tsp: Option<TspConfig>,
}

#[derive(Debug, Clone)]
pub struct InfluxConfig {
    pub url: String,
    pub token: String,
    pub org: String,
    pub bucket: String,
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub gzip_threshold: usize,
    pub bindings: Vec<BindingDefinition>,
}

#[derive(Debug, Clone)]
pub struct TspConfig {
    pub url: String,
    pub api_key: String,
    pub api_key_header: String,
    pub bindings: Vec<TspBinding>,
}

/// Load from an explicit path. `.toml` is read as TOML, anything else as JSON.
pub fn load_from(path: &FsPath) -> Result<Config> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading config from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse(&content, &ext).with_context(|| format!("loading config {}", path.display()))
}

/// Load from `$CONFIG_PATH`, falling back to `config.json` in the working dir.
pub fn load_default() -> Result<Config> {
    let path = std::env::var(ENV_CONFIG_PATH)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
    load_from(&path)
}

pub fn parse(content: &str, ext: &str) -> Result<Config> {
    let file: FileConfig = if ext == "toml" {
        toml::from_str(content).context("parsing TOML config")?
    } else {
        serde_json::from_str(content).context("parsing JSON config")?
    };
    validate(file)
}

pub fn validate(file: FileConfig) -> Result<Config> {
    let mut ids = HashSet::new();
    let mut sources = Vec::with_capacity(file.scrapers.len());
    for s in file.scrapers {
        if !ids.insert(s.id.clone()) {
            bail!("duplicate scraper id `{}`", s.id);
        }
        let id = s.id.clone();
        sources.push(source(s).with_context(|| format!("scraper `{id}`"))?);
    }

    let influx = file
        .outputs
        .influx
        .map(|c| influx(c).context("outputs.influx"))
        .transpose()?;
    let tsp = file
        .outputs
        .tsp
        .map(|c| tsp(c).context("outputs.tsp"))
        .transpose()?;

    if let Some(tsp) = &tsp {
        for b in &tsp.bindings {
            if !ids.contains(&b.source_id) {
                tracing::warn!(source = %b.source_id, "tsp binding refers to an unknown scraper");
            }
        }
    }

    Ok(Config {
        sources,
        outputs: OutputsConfig { influx, tsp },
    })
}

fn source(s: ScraperConfig) -> Result<SourceDefinition> {
    if s.url.trim().is_empty() {
        bail!("url is empty");
    }
    let interval = match s.request_interval_ms {
        Some(0) => bail!("requestIntervalMs must be greater than zero"),
        Some(ms) => Some(Duration::from_millis(ms)),
        None => None,
    };
    for (name, value) in &s.headers {
        reqwest::header::HeaderName::from_bytes(name.as_bytes())
            .with_context(|| format!("invalid header name `{name}`"))?;
        reqwest::header::HeaderValue::from_str(value)
            .with_context(|| format!("invalid value for header `{name}`"))?;
    }
    if s.timeout_ms == Some(0) {
        bail!("timeoutMs must be greater than zero");
    }
    let cron = s
        .request_cron_schedule
        .as_deref()
        .map(|expr| {
            expr.parse::<CronSchedule>()
                .map_err(|e| anyhow!("invalid requestCronSchedule `{expr}`: {e}"))
        })
        .transpose()?;

    let schedule = ScheduleSpec {
        interval,
        cron,
        on_startup: s.request_on_startup,
    };

    Ok(SourceDefinition {
        id: s.id,
        request: RequestSpec {
            url: s.url,
            method: s.method,
            headers: s.headers,
            query: s.query,
            body: s.body,
            timeout: s
                .timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT),
        },
        schedule,
        filter_duplicates: s.filter_duplicate_values,
    })
}

fn influx(c: InfluxFileConfig) -> Result<InfluxConfig> {
    let bindings = c
        .bindings
        .into_vec()
        .into_iter()
        .enumerate()
        .map(|(i, b)| binding(b).with_context(|| format!("bindings[{i}]")))
        .collect::<Result<Vec<_>>>()?;

    Ok(InfluxConfig {
        url: c.api.url.trim_end_matches('/').to_string(),
        token: resolve_secret(c.api.token, ENV_INFLUX_TOKEN)?,
        org: c.api.org,
        bucket: c.api.bucket,
        batch_size: c.api.batch_size.filter(|n| *n > 0).unwrap_or(DEFAULT_BATCH_SIZE),
        flush_interval: c
            .api
            .flush_interval_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_FLUSH_INTERVAL),
        gzip_threshold: c.api.gzip_threshold.unwrap_or(DEFAULT_GZIP_THRESHOLD),
        bindings,
    })
}

/// Rejects duplicate tag or field names instead of letting the last one win.
pub fn binding(b: BindingFileConfig) -> Result<BindingDefinition> {
    if b.measurement.trim().is_empty() {
        bail!("measurement is empty");
    }

    let mut tag_names = HashSet::new();
    let mut tags = Vec::with_capacity(b.tags.len());
    for t in b.tags {
        if !tag_names.insert(t.out.clone()) {
            bail!("duplicate tag `{}`", t.out);
        }
        let source = match (t.value, t.input) {
            (Some(v), _) => TagSource::Static(v),
            (None, Some(p)) => TagSource::Path(parse_path(&p)?),
            (None, None) => bail!("tag `{}` needs either `in` or `value`", t.out),
        };
        tags.push(TagBinding {
            name: t.out,
            source,
        });
    }

    let mut field_names = HashSet::new();
    let mut fields = Vec::with_capacity(b.fields.len());
    for f in b.fields {
        if !field_names.insert(f.out.clone()) {
            bail!("duplicate field `{}`", f.out);
        }
        fields.push(FieldBinding {
            path: parse_path(&f.input)?,
            name: f.out,
            kind: f.kind,
        });
    }

    let timestamp = b
        .timestamp
        .map(|t| {
            Ok::<_, anyhow::Error>(TimestampRule {
                path: parse_path(&t.key)?,
                kind: t.kind,
            })
        })
        .transpose()?;

    Ok(BindingDefinition {
        source_id: b.id,
        measurement: b.measurement,
        timestamp,
        tags,
        fields,
    })
}

fn tsp(c: TspFileConfig) -> Result<TspConfig> {
    let api_key_header = c
        .api_key_header
        .unwrap_or_else(|| DEFAULT_API_KEY_HEADER.to_string());
    reqwest::header::HeaderName::from_bytes(api_key_header.as_bytes())
        .with_context(|| format!("invalid apiKeyHeader `{api_key_header}`"))?;

    let mut seen = HashSet::new();
    let mut bindings = Vec::with_capacity(c.bindings.len());
    for b in c.bindings {
        if !seen.insert(b.id.clone()) {
            bail!("duplicate binding for `{}`", b.id);
        }
        let root = b
            .root
            .as_deref()
            .filter(|r| !r.trim().is_empty())
            .map(parse_path)
            .transpose()
            .with_context(|| format!("binding `{}`", b.id))?;
        let tags = b
            .tags
            .into_iter()
            .map(|t| {
                Ok(TagExtractor {
                    value: parse_path(&t.value)?,
                    timestamp: t.timestamp.as_deref().map(parse_path).transpose()?,
                    slug: t.slug,
                    location: t.location,
                })
            })
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("binding `{}`", b.id))?;
        bindings.push(TspBinding {
            source_id: b.id,
            root,
            tags,
        });
    }

    Ok(TspConfig {
        url: c.url.trim_end_matches('/').to_string(),
        api_key: resolve_secret(c.api_key, ENV_TSP_API_KEY)?,
        api_key_header,
        bindings,
    })
}

fn parse_path(s: &str) -> Result<Path> {
    s.parse::<Path>().map_err(|e| anyhow!(e))
}

/// `"ENV"` means: read the secret from `var`.
fn resolve_secret(value: String, var: &str) -> Result<String> {
    if value.trim().eq_ignore_ascii_case("env") {
        std::env::var(var).map_err(|_| anyhow!("Missing {var} env var"))
    } else {
        Ok(value)
    }
}
