// Metrics exposition
// Pull-based exporter: collectors describe their metric shape once at
// registration and run a full collection cycle on every scrape of /metrics.
//
// net-exporter contributors 2026 Oct

use crate::errors::ExporterError;
use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures::future::{join_all, BoxFuture};
use prometheus::core::Desc;
use prometheus::proto::MetricFamily;
use prometheus::{Encoder, Registry, TextEncoder};
use std::collections::HashSet;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

/// A source of metrics scraped on demand.
pub trait Collector: Send + Sync {
    /// Static shape of the metrics produced by [`Collector::collect`].
    fn describe(&self) -> Vec<Desc>;

    /// Long-lived metrics (counters and the like) owned by the collector,
    /// added to the exporter's registry on registration. Every call must
    /// return handles to the same underlying metrics.
    fn owned_metrics(&self) -> Vec<Box<dyn prometheus::core::Collector>> {
        Vec::new()
    }

    /// Run one collection cycle and return the metrics it produced.
    fn collect(&self) -> BoxFuture<'_, Vec<MetricFamily>>;
}

pub struct Exporter {
    registry: Registry,
    collectors: Vec<Arc<dyn Collector>>,
    described: HashSet<String>,
}

impl Default for Exporter {
    fn default() -> Self {
        Self::new(Registry::new())
    }
}

impl Exporter {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            collectors: Vec::new(),
            described: HashSet::new(),
        }
    }

    /// Register a collector. Its descriptions are checked once here; a metric
    /// name already described by another collector is rejected.
    pub fn register(&mut self, collector: Arc<dyn Collector>) -> Result<(), ExporterError> {
        let names: Vec<String> = collector
            .describe()
            .into_iter()
            .map(|desc| desc.fq_name)
            .collect();
        if let Some(dup) = names.iter().find(|name| self.described.contains(*name)) {
            return Err(ExporterError::DuplicateMetric(dup.clone()));
        }

        self.register_owned(collector.as_ref())?;
        for name in names {
            debug!(metric = %name, "registered metric");
            self.described.insert(name);
        }
        self.collectors.push(collector);
        Ok(())
    }

    /// Add the collector's owned metrics to the registry, all or nothing.
    fn register_owned(&self, collector: &dyn Collector) -> Result<(), ExporterError> {
        let mut registered = 0;
        for metric in collector.owned_metrics() {
            if let Err(err) = self.registry.register(metric) {
                for metric in collector.owned_metrics().into_iter().take(registered) {
                    if let Err(err) = self.registry.unregister(metric) {
                        warn!(error = %err, "could not roll back metric registration");
                    }
                }
                return Err(err.into());
            }
            registered += 1;
        }
        Ok(())
    }

    /// Run every collector concurrently and merge the results with the
    /// registry's own metrics, ordered by name.
    pub async fn gather(&self) -> Vec<MetricFamily> {
        let collected = join_all(self.collectors.iter().map(|c| c.collect())).await;
        let mut families: Vec<MetricFamily> = collected.into_iter().flatten().collect();
        families.extend(self.registry.gather());
        families.sort_by(|a, b| a.get_name().cmp(b.get_name()));
        families
    }

    /// Gather and encode in the Prometheus text format.
    pub async fn render(&self) -> Result<String, ExporterError> {
        let families = self.gather().await;
        let mut buffer = Vec::with_capacity(16 * 1024);
        TextEncoder::new()
            .encode(&families, &mut buffer)
            .map_err(ExporterError::Encode)?;
        Ok(String::from_utf8(buffer)?)
    }

    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/healthz", get(health_check))
            .with_state(self)
            .layer(TraceLayer::new_for_http())
    }

    /// Serve the scrape endpoint until `shutdown` resolves.
    pub async fn serve<F>(self: Arc<Self>, addr: SocketAddr, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("bind metrics listener {addr}"))?;
        info!(address = %addr, collectors = self.collectors.len(), "exporter listening");
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .context("metrics server")
    }
}

impl IntoResponse for ExporterError {
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
    }
}

async fn metrics_handler(
    State(exporter): State<Arc<Exporter>>,
) -> Result<impl IntoResponse, ExporterError> {
    let start = Instant::now();
    let body = exporter.render().await.inspect_err(|err| {
        error!(error = ?err, "failed to render metrics");
    })?;
    debug!(
        bytes = body.len(),
        elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
        "served scrape"
    );
    Ok(([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body))
}

async fn health_check() -> StatusCode {
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use prometheus::proto::{Gauge, Metric, MetricType};
    use prometheus::{IntCounter, Opts};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    struct StaticCollector {
        name: &'static str,
        calls: AtomicUsize,
        counters: Vec<IntCounter>,
        empty: bool,
    }

    impl StaticCollector {
        fn new(name: &'static str) -> Self {
            Self {
                name,
                calls: AtomicUsize::new(0),
                counters: Vec::new(),
                empty: false,
            }
        }
    }

    impl Collector for StaticCollector {
        fn describe(&self) -> Vec<Desc> {
            vec![Desc::new(self.name.into(), "static".into(), vec![], HashMap::new()).unwrap()]
        }

        fn owned_metrics(&self) -> Vec<Box<dyn prometheus::core::Collector>> {
            self.counters
                .iter()
                .map(|c| Box::new(c.clone()) as Box<dyn prometheus::core::Collector>)
                .collect()
        }

        fn collect(&self) -> BoxFuture<'_, Vec<MetricFamily>> {
            Box::pin(async move {
                let calls = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
                let mut gauge = Gauge::default();
                gauge.set_value(calls as f64);
                let mut metric = Metric::default();
                metric.set_gauge(gauge);
                let mut family = MetricFamily::default();
                family.set_name(self.name.to_string());
                family.set_help("static".to_string());
                family.set_field_type(MetricType::GAUGE);
                if !self.empty {
                    family.mut_metric().push(metric);
                }
                vec![family]
            })
        }
    }

    #[test]
    fn duplicate_descriptions_are_rejected() {
        let mut exporter = Exporter::default();
        exporter
            .register(Arc::new(StaticCollector::new("probe_value")))
            .unwrap();
        let err = exporter
            .register(Arc::new(StaticCollector::new("probe_value")))
            .unwrap_err();
        assert!(matches!(err, ExporterError::DuplicateMetric(name) if name == "probe_value"));
    }

    #[tokio::test]
    async fn collect_runs_on_every_scrape() {
        let collector = Arc::new(StaticCollector::new("probe_value"));
        let mut exporter = Exporter::default();
        exporter.register(collector.clone()).unwrap();

        exporter.render().await.unwrap();
        let text = exporter.render().await.unwrap();

        assert_eq!(collector.calls.load(Ordering::SeqCst), 2);
        assert!(text.contains("probe_value 2"));
    }

    #[tokio::test]
    async fn registered_counters_are_exported() {
        let counter = IntCounter::with_opts(Opts::new("probe_errors_total", "errors")).unwrap();
        counter.inc_by(3);
        let collector = StaticCollector {
            counters: vec![counter],
            ..StaticCollector::new("probe_value")
        };
        let mut exporter = Exporter::default();
        exporter.register(Arc::new(collector)).unwrap();

        let families = exporter.gather().await;
        let names: Vec<&str> = families.iter().map(|f| f.get_name()).collect();
        assert_eq!(names, vec!["probe_errors_total", "probe_value"]);
        assert!(exporter.render().await.unwrap().contains("probe_errors_total 3"));
    }

    #[test]
    fn failed_registration_leaves_registry_untouched() {
        let registry = Registry::new();
        let taken = IntCounter::with_opts(Opts::new("taken_total", "taken")).unwrap();
        registry.register(Box::new(taken)).unwrap();

        let first = IntCounter::with_opts(Opts::new("first_total", "first")).unwrap();
        let clash = IntCounter::with_opts(Opts::new("taken_total", "taken")).unwrap();
        let collector = StaticCollector {
            counters: vec![first.clone(), clash],
            ..StaticCollector::new("probe_value")
        };
        let mut exporter = Exporter::new(registry.clone());
        let err = exporter.register(Arc::new(collector)).unwrap_err();
        assert!(matches!(err, ExporterError::Register(_)));

        let names: Vec<String> = registry
            .gather()
            .iter()
            .map(|f| f.get_name().to_string())
            .collect();
        assert_eq!(names, vec!["taken_total"]);

        // Nothing of the rejected collector is left behind.
        let retry = StaticCollector {
            counters: vec![first],
            ..StaticCollector::new("probe_value")
        };
        exporter.register(Arc::new(retry)).unwrap();
    }

    #[tokio::test]
    async fn encode_failure_keeps_its_cause() {
        let collector = StaticCollector {
            empty: true,
            ..StaticCollector::new("probe_value")
        };
        let mut exporter = Exporter::default();
        exporter.register(Arc::new(collector)).unwrap();

        let err = exporter.render().await.unwrap_err();
        assert!(matches!(err, ExporterError::Encode(_)));
        assert!(std::error::Error::source(&err).is_some());

        let resp = Arc::new(exporter)
            .router()
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn http_endpoints() {
        let mut exporter = Exporter::default();
        exporter
            .register(Arc::new(StaticCollector::new("probe_value")))
            .unwrap();
        let app = Arc::new(exporter).router();

        let resp = app
            .clone()
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()[header::CONTENT_TYPE],
            prometheus::TEXT_FORMAT
        );
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("# TYPE probe_value gauge"));
    }
}
