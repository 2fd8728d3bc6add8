// Network latency collection
// Resolver, dial prober and the collector that drives them once per scrape
//
// net-exporter contributors 2026 Oct

pub mod collector;
pub mod dialer;
pub mod resolver;

pub use collector::{CycleOutcome, NetworkCollector, NetworkConfig};
pub use dialer::{Dialer, ProbeSummary, Prober};
pub use resolver::EndpointResolver;
