// Network latency collector
// Runs one collection cycle per scrape: resolve targets, dial them all, make
// sure every known host has a histogram, then export the whole store.
//
// net-exporter contributors 2026 Oct

use crate::errors::ConfigError;
use crate::exporter::Collector;
use crate::histogram::{HistogramSnapshot, HistogramStore};
use crate::network::dialer::{Dialer, Prober};
use crate::network::resolver::EndpointResolver;
use crate::registry::ServiceRegistry;
use futures::future::BoxFuture;
use prometheus::core::{Collector as _, Desc};
use prometheus::proto::{Bucket, Histogram, LabelPair, Metric, MetricFamily, MetricType};
use prometheus::{IntCounter, IntCounterVec, Opts};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

const METRIC_NAMESPACE: &str = "network";
pub const LATENCY_METRIC: &str = "network_latency_seconds";
const HOST_LABEL: &str = "host";

/// Everything needed to build a [`NetworkCollector`].
pub struct NetworkConfig {
    pub dialer: Dialer,
    pub registry: Arc<dyn ServiceRegistry>,

    pub namespace: String,
    pub port: String,
    pub service: String,
}

impl NetworkConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.dialer.timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "NetworkConfig.dialer timeout must not be zero".into(),
            ));
        }
        if self.namespace.is_empty() {
            return Err(ConfigError::Invalid(
                "NetworkConfig.namespace must not be empty".into(),
            ));
        }
        if self.port.is_empty() {
            return Err(ConfigError::Invalid(
                "NetworkConfig.port must not be empty".into(),
            ));
        }
        if self.service.is_empty() {
            return Err(ConfigError::Invalid(
                "NetworkConfig.service must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Where a cycle stopped.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Registry lookup failed; nothing was dialed or exported.
    ResolveFailed,
    Completed {
        targets: usize,
        dial_failures: usize,
        exported: usize,
    },
}

/// Measures TCP connect latency to a service's cluster address and endpoints.
///
/// The histogram store is the only state carried between cycles. The error
/// counters belong to this instance and are added to an exporter registry
/// through [`Collector::owned_metrics`].
pub struct NetworkCollector {
    resolver: EndpointResolver,
    prober: Prober,
    store: Arc<HistogramStore>,

    scrape_id: AtomicU64,

    latency_desc: Desc,
    error_count: IntCounter,
    dial_error_count: IntCounterVec,
}

impl NetworkCollector {
    pub fn new(config: NetworkConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let store = Arc::new(HistogramStore::with_latency_buckets()?);

        let error_count = IntCounter::with_opts(
            Opts::new("error_total", "Total number of internal errors.")
                .namespace(METRIC_NAMESPACE),
        )?;
        let dial_error_count = IntCounterVec::new(
            Opts::new("dial_error_total", "Total number of errors dialing hosts.")
                .namespace(METRIC_NAMESPACE),
            &[HOST_LABEL],
        )?;
        let latency_desc = Desc::new(
            LATENCY_METRIC.to_string(),
            "Histogram of latency of network dials.".to_string(),
            vec![HOST_LABEL.to_string()],
            HashMap::new(),
        )?;

        let resolver = EndpointResolver::new(
            config.registry,
            config.namespace,
            config.service,
            config.port,
        );
        let prober = Prober::new(
            config.dialer,
            Arc::clone(&store),
            dial_error_count.clone(),
        );

        Ok(Self {
            resolver,
            prober,
            store,
            scrape_id: AtomicU64::new(0),
            latency_desc,
            error_count,
            dial_error_count,
        })
    }

    pub fn store(&self) -> &HistogramStore {
        &self.store
    }

    /// Identifier of the most recently started cycle.
    pub fn scrape_id(&self) -> u64 {
        self.scrape_id.load(Ordering::Relaxed)
    }

    pub fn error_total(&self) -> u64 {
        self.error_count.get()
    }

    /// Dial errors recorded for `host`, without creating a series for it.
    pub fn dial_error_total(&self, host: &str) -> u64 {
        self.dial_error_count
            .collect()
            .iter()
            .flat_map(|family| family.get_metric())
            .find(|metric| {
                metric
                    .get_label()
                    .iter()
                    .any(|label| label.get_name() == HOST_LABEL && label.get_value() == host)
            })
            .map(|metric| metric.get_counter().get_value() as u64)
            .unwrap_or(0)
    }

    /// Run one full cycle and return the exported latency family (empty when
    /// the cycle was aborted).
    pub async fn run_cycle(&self) -> (CycleOutcome, Vec<MetricFamily>) {
        let scrape_id = self.scrape_id.fetch_add(1, Ordering::Relaxed) + 1;
        let scraping_start = Instant::now();
        info!(scrape_id, "collecting metrics");

        let hosts = match self.resolver.resolve(scrape_id).await {
            Ok(hosts) => hosts,
            Err(err) => {
                error!(
                    scrape_id,
                    service = %self.resolver.service(),
                    error = ?err,
                    "could not resolve targets from registry"
                );
                self.error_count.inc();
                return (CycleOutcome::ResolveFailed, Vec::new());
            }
        };

        let summary = self.prober.probe_all(scrape_id, &hosts).await;
        if summary.aborted > 0 {
            self.error_count.inc_by(summary.aborted as u64);
        }

        self.store.ensure(&hosts).await;
        let snapshot = self.store.snapshot().await;
        let exported = snapshot.len();
        let families = self.latency_family(&snapshot).into_iter().collect();

        info!(
            scrape_id,
            targets = hosts.len(),
            dial_failures = summary.failed,
            scrape_time = scraping_start.elapsed().as_secs_f64(),
            "collected metrics"
        );

        (
            CycleOutcome::Completed {
                targets: hosts.len(),
                dial_failures: summary.failed,
                exported,
            },
            families,
        )
    }

    fn latency_family(
        &self,
        snapshot: &BTreeMap<String, HistogramSnapshot>,
    ) -> Option<MetricFamily> {
        if snapshot.is_empty() {
            return None;
        }

        let mut family = MetricFamily::default();
        family.set_name(self.latency_desc.fq_name.clone());
        family.set_help(self.latency_desc.help.clone());
        family.set_field_type(MetricType::HISTOGRAM);
        for (host, histogram) in snapshot {
            family.mut_metric().push(histogram_metric(host, histogram));
        }
        Some(family)
    }
}

fn histogram_metric(host: &str, snapshot: &HistogramSnapshot) -> Metric {
    let mut label = LabelPair::default();
    label.set_name(HOST_LABEL.to_string());
    label.set_value(host.to_string());

    let buckets: Vec<Bucket> = snapshot
        .buckets
        .iter()
        .map(|(upper_bound, count)| {
            let mut bucket = Bucket::default();
            bucket.set_upper_bound(*upper_bound);
            bucket.set_cumulative_count(*count);
            bucket
        })
        .collect();

    let mut histogram = Histogram::default();
    histogram.set_sample_count(snapshot.count);
    histogram.set_sample_sum(snapshot.sum);
    histogram.set_bucket(buckets.into());

    let mut metric = Metric::default();
    metric.set_label(vec![label].into());
    metric.set_histogram(histogram);
    metric
}

impl Collector for NetworkCollector {
    fn describe(&self) -> Vec<Desc> {
        vec![self.latency_desc.clone()]
    }

    fn owned_metrics(&self) -> Vec<Box<dyn prometheus::core::Collector>> {
        vec![
            Box::new(self.error_count.clone()),
            Box::new(self.dial_error_count.clone()),
        ]
    }

    fn collect(&self) -> BoxFuture<'_, Vec<MetricFamily>> {
        Box::pin(async move { self.run_cycle().await.1 })
    }
}
