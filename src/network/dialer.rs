// TCP dialer and concurrent dial prober
// Opens and immediately closes one connection per target, timing the connect.
// All targets of a cycle are dialed in parallel and joined before returning.
//
// net-exporter contributors 2026 Oct

use crate::errors::DialError;
use crate::histogram::HistogramStore;
use prometheus::IntCounterVec;
use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{lookup_host, TcpSocket, TcpStream};
use tokio::task::{Id, JoinSet};
use tracing::{error, info};

/// Connection settings for latency probes.
#[derive(Debug, Clone)]
pub struct Dialer {
    pub timeout: Duration,
    /// Probe connections are closed right away, so keep-alive stays off.
    pub keep_alive: bool,
}

impl Dialer {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            keep_alive: false,
        }
    }

    /// Connect to `host` (a `host:port` string). The timeout covers address
    /// resolution and the connect itself.
    pub async fn dial(&self, host: &str) -> Result<TcpStream, DialError> {
        match tokio::time::timeout(self.timeout, self.connect(host)).await {
            Ok(res) => res,
            Err(_) => Err(DialError::Timeout(self.timeout)),
        }
    }

    async fn connect(&self, host: &str) -> Result<TcpStream, DialError> {
        let mut last_err: Option<io::Error> = None;
        for addr in lookup_host(host).await? {
            let socket = if addr.is_ipv4() {
                TcpSocket::new_v4()?
            } else {
                TcpSocket::new_v6()?
            };
            socket.set_keepalive(self.keep_alive)?;
            match socket.connect(addr).await {
                Ok(stream) => return Ok(stream),
                Err(err) => last_err = Some(err),
            }
        }
        match last_err {
            Some(err) => Err(err.into()),
            None => Err(DialError::NoAddress(host.to_string())),
        }
    }
}

/// Per-cycle outcome counts.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProbeSummary {
    pub succeeded: usize,
    pub failed: usize,
    /// Probe tasks that panicked or were cancelled.
    pub aborted: usize,
}

/// Fans out one dial per target and folds the results into the histogram
/// store and the dial error counter.
#[derive(Clone)]
pub struct Prober {
    dialer: Dialer,
    store: Arc<HistogramStore>,
    dial_errors: IntCounterVec,
}

impl Prober {
    pub fn new(dialer: Dialer, store: Arc<HistogramStore>, dial_errors: IntCounterVec) -> Self {
        Self {
            dialer,
            store,
            dial_errors,
        }
    }

    /// Dial every host concurrently and wait for all of them. A failing host
    /// never delays or cancels the others beyond the dial timeout.
    pub async fn probe_all(&self, scrape_id: u64, hosts: &[String]) -> ProbeSummary {
        let mut tasks = JoinSet::new();
        let mut targets = HashMap::with_capacity(hosts.len());
        for host in hosts {
            let prober = self.clone();
            let target = host.clone();
            let handle = tasks.spawn(async move { prober.probe_one(scrape_id, &target).await });
            targets.insert(handle.id(), host.clone());
        }
        self.join_probes(scrape_id, tasks, targets).await
    }

    /// Collect finished probes. A task that panicked or was cancelled still
    /// counts as a dial error for its host.
    async fn join_probes(
        &self,
        scrape_id: u64,
        mut tasks: JoinSet<bool>,
        mut targets: HashMap<Id, String>,
    ) -> ProbeSummary {
        let mut summary = ProbeSummary::default();
        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((_, true)) => summary.succeeded += 1,
                Ok((_, false)) => summary.failed += 1,
                Err(err) => {
                    summary.aborted += 1;
                    match targets.remove(&err.id()) {
                        Some(host) => {
                            error!(
                                host = %host,
                                scrape_id,
                                error = %err,
                                "probe task did not complete"
                            );
                            self.dial_errors.with_label_values(&[host.as_str()]).inc();
                        }
                        None => error!(scrape_id, error = %err, "probe task did not complete"),
                    }
                }
            }
        }
        summary
    }

    async fn probe_one(&self, scrape_id: u64, host: &str) -> bool {
        let start = Instant::now();
        let stream = match self.dialer.dial(host).await {
            Ok(stream) => stream,
            Err(err) => {
                error!(host = %host, scrape_id, error = ?err, "could not dial host");
                self.dial_errors.with_label_values(&[host]).inc();
                return false;
            }
        };
        let elapsed = start.elapsed();
        drop(stream);

        info!(
            host = %host,
            scrape_time = elapsed.as_secs_f64(),
            scrape_id,
            "dialed host"
        );
        self.store.add(host, elapsed.as_secs_f64()).await;
        true
    }
}
