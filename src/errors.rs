// Error types shared across the exporter
// Configuration errors are fatal at startup, registry errors abort a single
// collection cycle, dial and resolve errors stay local to one host
//
// net-exporter contributors 2026 Oct

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error("histogram setup: {0}")]
    Histogram(#[from] HistogramError),
    #[error("metric setup: {0}")]
    Metric(#[from] prometheus::Error),
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("registry returned http {status} for {path}")]
    Status { status: u16, path: String },
    #[error("registry response for {path} could not be decoded")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("service {namespace}/{name} has no cluster address")]
    NoClusterAddress { namespace: String, name: String },
    #[error("registry lookup failed: {0}")]
    Lookup(String),
}

#[derive(Debug, Error)]
pub enum DialError {
    #[error("dial timed out after {0:?}")]
    Timeout(Duration),
    #[error("no addresses resolved for {0}")]
    NoAddress(String),
    #[error("dial failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum HistogramError {
    #[error("histogram needs at least one bucket")]
    NoBuckets,
    #[error("bucket bounds must be strictly increasing, got {prev} then {next}")]
    UnsortedBuckets { prev: f64, next: f64 },
    #[error("bucket layout: {0}")]
    Layout(#[from] prometheus::Error),
}

#[derive(Debug, Error)]
pub enum ExporterError {
    #[error("metric {0} is already described by another collector")]
    DuplicateMetric(String),
    #[error("register metrics: {0}")]
    Register(#[from] prometheus::Error),
    #[error("encode metrics")]
    Encode(#[source] prometheus::Error),
    #[error("encoded metrics are not valid utf-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}
