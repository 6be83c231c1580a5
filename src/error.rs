// src/error.rs
use thiserror::Error;

/// Failure reaching a source API. Logged; the tick is abandoned.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered with status {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("{url} returned a body that is not JSON: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Failure delivering records to a sink. Logged per output; never escalated.
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("could not reach {endpoint}: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{endpoint} rejected the write with status {status}: {body}")]
    Rejected {
        endpoint: String,
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("could not encode the request body: {0}")]
    Encode(#[from] std::io::Error),
}
