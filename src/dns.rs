// DNS resolution collector
// Resolves a fixed list of names on every scrape and records lookup latency
// and failures per name. Unlike the network collector it keeps no store of
// its own; the prometheus histogram and counters carry the state.
//
// net-exporter contributors 2026 Oct

use crate::errors::ConfigError;
use crate::exporter::Collector;
use futures::future::{join_all, BoxFuture};
use prometheus::core::{Collector as _, Desc};
use prometheus::proto::{Metric, MetricFamily};
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::net::lookup_host;
use tracing::{error, info, warn};

const METRIC_NAMESPACE: &str = "dns";
const HOST_LABEL: &str = "host";

#[derive(Debug, Clone)]
pub struct DnsConfig {
    pub hosts: Vec<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome {
    Resolved { addresses: usize, seconds: f64 },
    Failed(String),
}

pub struct DnsCollector {
    hosts: Vec<String>,
    timeout: Duration,

    scrape_id: AtomicU64,

    latency: HistogramVec,
    resolve_error_count: IntCounterVec,
}

impl DnsCollector {
    pub fn new(config: DnsConfig) -> Result<Self, ConfigError> {
        let hosts: Vec<String> = config
            .hosts
            .into_iter()
            .map(|host| host.trim().to_string())
            .filter(|host| !host.is_empty())
            .collect();
        if hosts.is_empty() {
            return Err(ConfigError::Invalid(
                "DnsConfig.hosts must not be empty".into(),
            ));
        }
        if config.timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "DnsConfig.timeout must not be zero".into(),
            ));
        }

        let latency = HistogramVec::new(
            HistogramOpts::new("latency_seconds", "Histogram of latency of DNS resolutions.")
                .namespace(METRIC_NAMESPACE)
                .buckets(crate::histogram::latency_buckets()?),
            &[HOST_LABEL],
        )?;
        let resolve_error_count = IntCounterVec::new(
            Opts::new("resolve_error_total", "Total number of errors resolving hosts.")
                .namespace(METRIC_NAMESPACE),
            &[HOST_LABEL],
        )?;

        Ok(Self {
            hosts,
            timeout: config.timeout,
            scrape_id: AtomicU64::new(0),
            latency,
            resolve_error_count,
        })
    }

    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    /// Lookup errors recorded for `host`. Reading never creates a series.
    pub fn resolve_error_total(&self, host: &str) -> u64 {
        host_metric(&self.resolve_error_count.collect(), host)
            .map(|metric| metric.get_counter().get_value() as u64)
            .unwrap_or(0)
    }

    /// Successful lookups recorded for `host`. Reading never creates a series.
    pub fn sample_count(&self, host: &str) -> u64 {
        host_metric(&self.latency.collect(), host)
            .map(|metric| metric.get_histogram().get_sample_count())
            .unwrap_or(0)
    }

    /// Resolve every configured name concurrently, recording the results.
    pub async fn run_cycle(&self) -> Vec<(String, LookupOutcome)> {
        let scrape_id = self.scrape_id.fetch_add(1, Ordering::Relaxed) + 1;
        let start = Instant::now();
        info!(scrape_id, hosts = self.hosts.len(), "resolving hosts");

        let outcomes = join_all(
            self.hosts
                .iter()
                .map(|host| self.resolve_one(scrape_id, host)),
        )
        .await;

        info!(
            scrape_id,
            scrape_time = start.elapsed().as_secs_f64(),
            "resolved hosts"
        );
        self.hosts.iter().cloned().zip(outcomes).collect()
    }

    async fn resolve_one(&self, scrape_id: u64, host: &str) -> LookupOutcome {
        let start = Instant::now();
        let res = tokio::time::timeout(self.timeout, lookup_host((host, 0u16))).await;
        let elapsed = start.elapsed();

        let reason = match res {
            Ok(Ok(addrs)) => {
                let addresses = addrs.count();
                if addresses > 0 {
                    let seconds = elapsed.as_secs_f64();
                    self.latency.with_label_values(&[host]).observe(seconds);
                    info!(
                        host = %host,
                        addresses,
                        scrape_time = seconds,
                        scrape_id,
                        "resolved host"
                    );
                    return LookupOutcome::Resolved { addresses, seconds };
                }
                "no addresses returned".to_string()
            }
            Ok(Err(err)) => err.to_string(),
            Err(_) => format!("lookup timed out after {:?}", self.timeout),
        };

        error!(host = %host, scrape_id, error = %reason, "could not resolve host");
        self.resolve_error_count.with_label_values(&[host]).inc();
        LookupOutcome::Failed(reason)
    }
}

fn host_metric<'a>(families: &'a [MetricFamily], host: &str) -> Option<&'a Metric> {
    families
        .iter()
        .flat_map(|family| family.get_metric())
        .find(|metric| {
            metric
                .get_label()
                .iter()
                .any(|label| label.get_name() == HOST_LABEL && label.get_value() == host)
        })
}

impl Collector for DnsCollector {
    fn describe(&self) -> Vec<Desc> {
        self.latency
            .desc()
            .into_iter()
            .chain(self.resolve_error_count.desc())
            .cloned()
            .collect()
    }

    fn owned_metrics(&self) -> Vec<Box<dyn prometheus::core::Collector>> {
        vec![
            Box::new(self.latency.clone()),
            Box::new(self.resolve_error_count.clone()),
        ]
    }

    fn collect(&self) -> BoxFuture<'_, Vec<MetricFamily>> {
        Box::pin(async move {
            let outcomes = self.run_cycle().await;
            let failed = outcomes
                .iter()
                .filter(|(_, outcome)| matches!(outcome, LookupOutcome::Failed(_)))
                .count();
            if failed == outcomes.len() {
                warn!(failed, "every DNS lookup failed this cycle");
            }
            // Metrics live in the registry and are gathered from there.
            Vec::new()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exporter::Exporter;
    use std::sync::Arc;

    fn collector(hosts: &[&str]) -> DnsCollector {
        DnsCollector::new(DnsConfig {
            hosts: hosts.iter().map(|h| h.to_string()).collect(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[test]
    fn blank_hosts_are_dropped() {
        let c = collector(&["localhost", " ", ""]);
        assert_eq!(c.hosts(), &["localhost".to_string()]);

        let err = DnsCollector::new(DnsConfig {
            hosts: vec![" ".into()],
            timeout: Duration::from_secs(1),
        });
        assert!(matches!(err, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn describes_histogram_and_counters() {
        let c = collector(&["localhost"]);
        let names: Vec<String> = c.describe().into_iter().map(|d| d.fq_name).collect();
        assert_eq!(
            names,
            vec!["dns_latency_seconds", "dns_resolve_error_total"]
        );
    }

    #[tokio::test]
    async fn localhost_resolves() {
        let c = collector(&["localhost"]);
        let outcomes = c.run_cycle().await;
        assert!(matches!(outcomes[0].1, LookupOutcome::Resolved { .. }));
        assert_eq!(c.sample_count("localhost"), 1);

        c.run_cycle().await;
        assert_eq!(c.sample_count("localhost"), 2);
    }

    #[tokio::test]
    async fn reading_values_creates_no_series() {
        let c = Arc::new(collector(&["localhost"]));
        let mut exporter = Exporter::default();
        exporter.register(c.clone()).unwrap();

        assert_eq!(c.sample_count("never-resolved"), 0);
        assert_eq!(c.resolve_error_total("never-resolved"), 0);

        let text = exporter.render().await.unwrap();
        assert!(!text.contains("never-resolved"));
        assert!(text.contains(r#"dns_latency_seconds_count{host="localhost"} 1"#));
    }

    #[tokio::test]
    async fn invalid_name_counts_an_error() {
        let host = "bad name with spaces.invalid";
        let c = collector(&[host]);
        let outcomes = c.run_cycle().await;
        assert!(matches!(outcomes[0].1, LookupOutcome::Failed(_)));
        assert_eq!(c.resolve_error_total(host), 1);
        assert_eq!(c.sample_count(host), 0);
    }
}
