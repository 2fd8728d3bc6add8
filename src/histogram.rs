// Per-host latency histogram store
// Keeps one cumulative histogram per host for the lifetime of the process.
// Histograms are created lazily and never reset or pruned.
//
// net-exporter contributors 2026 Oct

use crate::errors::HistogramError;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

pub const BUCKET_START: f64 = 0.001;
pub const BUCKET_FACTOR: f64 = 2.0;
pub const NUM_BUCKETS: usize = 15;

/// Exponential latency buckets, 0.001s up to ~16s.
pub fn latency_buckets() -> Result<Vec<f64>, HistogramError> {
    Ok(prometheus::exponential_buckets(
        BUCKET_START,
        BUCKET_FACTOR,
        NUM_BUCKETS,
    )?)
}

/// Immutable view of one host's histogram.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSnapshot {
    pub count: u64,
    pub sum: f64,
    /// (upper bound, cumulative count) pairs in ascending bound order.
    /// The +Inf bucket is implicit and equals `count`.
    pub buckets: Vec<(f64, u64)>,
}

impl HistogramSnapshot {
    pub fn bucket(&self, upper_bound: f64) -> Option<u64> {
        self.buckets
            .iter()
            .find(|(bound, _)| *bound == upper_bound)
            .map(|(_, count)| *count)
    }
}

#[derive(Debug)]
struct HistogramState {
    count: u64,
    sum: f64,
    cumulative: Vec<u64>,
}

impl HistogramState {
    fn empty(buckets: usize) -> Self {
        Self {
            count: 0,
            sum: 0.0,
            cumulative: vec![0; buckets],
        }
    }

    fn observe(&mut self, bounds: &[f64], value: f64) {
        self.count += 1;
        self.sum += value;
        for (bound, bucket) in bounds.iter().zip(self.cumulative.iter_mut()) {
            if value <= *bound {
                *bucket += 1;
            }
        }
    }

    fn snapshot(&self, bounds: &[f64]) -> HistogramSnapshot {
        HistogramSnapshot {
            count: self.count,
            sum: self.sum,
            buckets: bounds
                .iter()
                .copied()
                .zip(self.cumulative.iter().copied())
                .collect(),
        }
    }
}

type SharedHistogram = Arc<Mutex<HistogramState>>;

/// Thread-safe mapping from host to cumulative histogram.
///
/// A single `add` updates count, sum and buckets under the host's own lock, so
/// readers never observe a half-applied sample. Different hosts do not contend
/// beyond the brief map lookup.
#[derive(Debug)]
pub struct HistogramStore {
    bounds: Arc<[f64]>,
    histograms: RwLock<HashMap<String, SharedHistogram>>,
}

impl HistogramStore {
    pub fn new(bounds: Vec<f64>) -> Result<Self, HistogramError> {
        if bounds.is_empty() {
            return Err(HistogramError::NoBuckets);
        }
        for pair in bounds.windows(2) {
            if pair[0] >= pair[1] {
                return Err(HistogramError::UnsortedBuckets {
                    prev: pair[0],
                    next: pair[1],
                });
            }
        }
        Ok(Self {
            bounds: bounds.into(),
            histograms: RwLock::new(HashMap::new()),
        })
    }

    pub fn with_latency_buckets() -> Result<Self, HistogramError> {
        Self::new(latency_buckets()?)
    }

    pub fn bounds(&self) -> &[f64] {
        &self.bounds
    }

    /// Record one sample for `host`, creating its histogram if needed.
    pub async fn add(&self, host: &str, value: f64) {
        let histogram = self.get_or_create(host).await;
        histogram.lock().await.observe(&self.bounds, value);
    }

    /// Make sure every host has an entry. Existing entries are left untouched.
    pub async fn ensure<I, S>(&self, hosts: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut histograms = self.histograms.write().await;
        for host in hosts {
            let host = host.as_ref();
            if !histograms.contains_key(host) {
                histograms.insert(
                    host.to_string(),
                    Arc::new(Mutex::new(HistogramState::empty(self.bounds.len()))),
                );
            }
        }
    }

    /// Point-in-time view of every known host, ordered by host.
    pub async fn snapshot(&self) -> BTreeMap<String, HistogramSnapshot> {
        let entries: Vec<(String, SharedHistogram)> = {
            let histograms = self.histograms.read().await;
            histograms
                .iter()
                .map(|(host, histogram)| (host.clone(), Arc::clone(histogram)))
                .collect()
        };

        let mut out = BTreeMap::new();
        for (host, histogram) in entries {
            let snapshot = histogram.lock().await.snapshot(&self.bounds);
            out.insert(host, snapshot);
        }
        out
    }

    pub async fn get(&self, host: &str) -> Option<HistogramSnapshot> {
        let histogram = self.histograms.read().await.get(host).cloned()?;
        let snapshot = histogram.lock().await.snapshot(&self.bounds);
        Some(snapshot)
    }

    pub async fn len(&self) -> usize {
        self.histograms.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.histograms.read().await.is_empty()
    }

    async fn get_or_create(&self, host: &str) -> SharedHistogram {
        if let Some(histogram) = self.histograms.read().await.get(host) {
            return Arc::clone(histogram);
        }
        let mut histograms = self.histograms.write().await;
        Arc::clone(
            histograms
                .entry(host.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(HistogramState::empty(self.bounds.len())))),
        )
    }
}
