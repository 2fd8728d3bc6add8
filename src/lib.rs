// Library root module for net-exporter
// Measures TCP connect latency to a service's endpoints and DNS resolution
// latency, exposed for a Prometheus scraper
//
// net-exporter contributors 2026 Oct

pub mod config;
pub mod dns;
pub mod errors;
pub mod exporter;
pub mod histogram;
pub mod network;
pub mod registry;
