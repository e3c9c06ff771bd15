use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use tracing::info;

pub const DEFAULT_SAMPLE_CAPACITY: usize = 300;
pub const DEFAULT_LOG_EVERY: u64 = 20;

#[derive(Debug, Clone, Copy)]
struct Sample {
    latency_ms: f64,
    status: u16,
}

#[derive(Debug, Default)]
struct RouteSamples {
    samples: VecDeque<Sample>,
    total_requests: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSnapshot {
    pub route: String,
    pub total_requests: u64,
    /// Samples currently held in the window.
    pub count: usize,
    /// Samples in the window answered with a 4xx or 5xx status.
    pub errors: usize,
    pub p50_ms: f64,
    pub p95_ms: f64,
}

/// Per-route rolling latency samples. Each route keeps at most `capacity`
/// samples; the oldest is evicted first.
#[derive(Debug)]
pub struct MetricsCollector {
    capacity: usize,
    log_every: u64,
    routes: Mutex<BTreeMap<String, RouteSamples>>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_CAPACITY, DEFAULT_LOG_EVERY)
    }
}

impl MetricsCollector {
    pub fn new(capacity: usize, log_every: u64) -> Self {
        Self {
            capacity: capacity.max(1),
            log_every: log_every.max(1),
            routes: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn record(&self, route: &str, status: u16, latency: Duration) -> RouteSnapshot {
        let mut routes = self.routes.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let entry = routes.entry(route.to_string()).or_default();
        if entry.samples.len() == self.capacity {
            entry.samples.pop_front();
        }
        entry.samples.push_back(Sample {
            latency_ms: latency.as_micros() as f64 / 1000.0,
            status,
        });
        entry.total_requests += 1;
        let snapshot = summarize(route, entry);
        drop(routes);

        if status >= 500 || snapshot.total_requests % self.log_every == 0 {
            info!(
                route,
                count = snapshot.count,
                errors = snapshot.errors,
                p50_ms = snapshot.p50_ms,
                p95_ms = snapshot.p95_ms,
                "route latency summary"
            );
        }
        snapshot
    }

    pub fn snapshot(&self) -> Vec<RouteSnapshot> {
        let routes = self.routes.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        routes
            .iter()
            .map(|(route, samples)| summarize(route, samples))
            .collect()
    }
}

fn summarize(route: &str, entry: &RouteSamples) -> RouteSnapshot {
    let mut latencies: Vec<f64> = entry.samples.iter().map(|s| s.latency_ms).collect();
    latencies.sort_by(f64::total_cmp);
    RouteSnapshot {
        route: route.to_string(),
        total_requests: entry.total_requests,
        count: latencies.len(),
        errors: entry.samples.iter().filter(|s| s.status >= 400).count(),
        p50_ms: percentile(&latencies, 0.50),
        p95_ms: percentile(&latencies, 0.95),
    }
}

/// Nearest-rank percentile over sorted values.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (p * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_is_bounded_and_evicts_oldest() {
        let metrics = MetricsCollector::new(3, 20);
        for ms in [500, 1, 2, 3] {
            metrics.record("/api/search", 200, Duration::from_millis(ms));
        }
        let snap = &metrics.snapshot()[0];
        assert_eq!(snap.count, 3);
        assert_eq!(snap.total_requests, 4);
        assert_eq!(snap.p95_ms, 3.0);
    }

    #[test]
    fn percentiles_and_errors() {
        let metrics = MetricsCollector::default();
        for ms in 1..=100 {
            metrics.record("/api/map/complexes", 200, Duration::from_millis(ms));
        }
        let snap = metrics.record("/api/map/complexes", 503, Duration::from_millis(1));
        assert_eq!(snap.errors, 1);
        assert_eq!(snap.count, 101);
        assert_eq!(snap.p50_ms, 50.0);
        assert_eq!(snap.p95_ms, 95.0);
    }

    #[test]
    fn routes_are_tracked_separately() {
        let metrics = MetricsCollector::default();
        metrics.record("/a", 200, Duration::from_millis(1));
        let b = metrics.record("/b", 400, Duration::from_millis(1));
        assert_eq!(b.errors, 1);
        let routes: Vec<String> = metrics.snapshot().into_iter().map(|s| s.route).collect();
        assert_eq!(routes, vec!["/a", "/b"]);
        assert_eq!(percentile(&[], 0.5), 0.0);
    }

    #[test]
    fn client_and_server_errors_both_count() {
        let metrics = MetricsCollector::default();
        for status in [200, 204, 304, 399, 400, 404, 422, 500, 503] {
            metrics.record("/api/search", status, Duration::from_millis(1));
        }
        let snap = &metrics.snapshot()[0];
        assert_eq!(snap.count, 9);
        assert_eq!(snap.errors, 5);
    }
}
