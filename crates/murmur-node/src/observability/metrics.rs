//! Prometheus metrics collection.
//!
//! Covers HTTP request latency and counts, live WebSocket connections and
//! the counters kept by the connection hub.

use murmur_realtime::HubStats;
use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;
use std::sync::Arc;

/// HTTP request labels.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct HttpLabels {
    /// HTTP method (GET, POST, etc.)
    pub method: String,
    /// Request path pattern
    pub path: String,
    /// Response status code
    pub status: u16,
}

/// Global metrics state.
pub static METRICS: Lazy<MetricsState> = Lazy::new(MetricsState::new);

/// Metrics state container.
#[derive(Clone)]
pub struct MetricsState {
    /// Prometheus registry.
    pub registry: Arc<RwLock<Registry>>,
    /// HTTP request counter.
    pub http_requests_total: Family<HttpLabels, Counter>,
    /// HTTP request duration histogram (seconds).
    pub http_request_duration_seconds: Family<HttpLabels, Histogram>,
    /// In-flight HTTP requests.
    pub http_active_connections: Gauge,
    /// Upgraded WebSocket connections currently being served.
    pub websocket_connections: Gauge,
    /// Connections registered with the hub.
    pub hub_connections: Gauge,
    /// Connections registered with the hub since start.
    pub hub_registrations: Counter,
    /// Messages persisted and fanned out by the hub.
    pub hub_messages: Counter,
    /// Connections evicted for a full outbound queue.
    pub hub_evictions: Counter,
    /// Serializes hub snapshots so concurrent scrapes apply each delta once.
    hub_sync: Arc<Mutex<()>>,
}

impl Default for MetricsState {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsState {
    /// Create a new metrics state with all metrics registered.
    pub fn new() -> Self {
        let mut registry = Registry::default();

        // HTTP metrics
        let http_requests_total = Family::<HttpLabels, Counter>::default();
        registry.register(
            "murmur_http_requests",
            "Total HTTP requests",
            http_requests_total.clone(),
        );

        let http_request_duration_seconds =
            Family::<HttpLabels, Histogram>::new_with_constructor(|| {
                Histogram::new(exponential_buckets(0.001, 2.0, 16))
            });
        registry.register(
            "murmur_http_request_duration_seconds",
            "HTTP request duration in seconds",
            http_request_duration_seconds.clone(),
        );

        let http_active_connections = Gauge::default();
        registry.register(
            "murmur_http_active_connections",
            "Number of in-flight HTTP requests",
            http_active_connections.clone(),
        );

        // Live connection metrics
        let websocket_connections = Gauge::default();
        registry.register(
            "murmur_websocket_connections",
            "Active WebSocket connections",
            websocket_connections.clone(),
        );

        let hub_connections = Gauge::default();
        registry.register(
            "murmur_hub_connections",
            "Connections registered with the hub",
            hub_connections.clone(),
        );

        let hub_registrations = Counter::default();
        registry.register(
            "murmur_hub_registrations",
            "Connections registered with the hub since start",
            hub_registrations.clone(),
        );

        let hub_messages = Counter::default();
        registry.register(
            "murmur_hub_messages",
            "Messages persisted and broadcast since start",
            hub_messages.clone(),
        );

        let hub_evictions = Counter::default();
        registry.register(
            "murmur_hub_evictions",
            "Connections evicted for a full outbound queue",
            hub_evictions.clone(),
        );

        Self {
            registry: Arc::new(RwLock::new(registry)),
            http_requests_total,
            http_request_duration_seconds,
            http_active_connections,
            websocket_connections,
            hub_connections,
            hub_registrations,
            hub_messages,
            hub_evictions,
            hub_sync: Arc::new(Mutex::new(())),
        }
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let labels = HttpLabels {
            method: method.to_string(),
            path: normalize_path(path),
            status,
        };

        self.http_requests_total.get_or_create(&labels).inc();
        self.http_request_duration_seconds
            .get_or_create(&labels)
            .observe(duration_secs);
    }

    /// Bring the hub metrics up to date with a snapshot of the hub counters.
    ///
    /// Counters only move forward; a snapshot behind what was already
    /// recorded leaves them unchanged.
    pub fn record_hub_stats(&self, stats: &HubStats) {
        let _guard = self.hub_sync.lock();

        self.hub_connections
            .set(i64::try_from(stats.current_connections).unwrap_or(i64::MAX));
        advance(&self.hub_registrations, stats.total_connections);
        advance(&self.hub_messages, stats.total_messages);
        advance(&self.hub_evictions, stats.total_evictions);
    }

    /// Encode metrics for Prometheus scraping.
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buffer = String::new();
        let registry = self.registry.read();
        prometheus_client::encoding::text::encode(&mut buffer, &registry)?;
        Ok(buffer)
    }
}

fn advance(counter: &Counter, total: u64) {
    let delta = total.saturating_sub(counter.get());
    if delta > 0 {
        counter.inc_by(delta);
    }
}

/// Normalize path for metrics (replace message ids).
fn normalize_path(path: &str) -> String {
    let parts: Vec<&str> = path.split('/').collect();
    parts
        .iter()
        .enumerate()
        .map(|(i, part)| {
            if i > 0 && parts[i - 1] == "messages" && !part.is_empty() {
                ":id"
            } else {
                *part
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}
