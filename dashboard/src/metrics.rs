use lazy_static::lazy_static;
use prometheus::{Counter, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder};
use std::sync::Once;
use tracing::warn;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref NOTIFICATIONS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "dashboard_notifications_total",
        "Total notifications received from the broker"
    ))
    .unwrap();
    pub static ref UNRECOGNIZED_NOTIFICATIONS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "dashboard_unrecognized_notifications_total",
        "Notifications acknowledged without any registry change"
    ))
    .unwrap();
    pub static ref DROPPED_UPDATES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "dashboard_dropped_updates_total",
        "Metric updates dropped for unknown or ambiguous devices"
    ))
    .unwrap();
    pub static ref REMOTE_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "dashboard_remote_failures_total",
        "Broker calls that failed and fell back to an empty result"
    ))
    .unwrap();
    pub static ref REMOTE_LATENCY_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "dashboard_remote_latency_seconds",
            "Time taken by broker requests"
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0
        ])
    )
    .unwrap();
    pub static ref PENDING_SUBSCRIPTIONS: Gauge = Gauge::with_opts(Opts::new(
        "dashboard_pending_subscriptions",
        "Devices waiting for their grace interval before synchronization"
    ))
    .unwrap();
    pub static ref DEVICES: Gauge = Gauge::with_opts(Opts::new(
        "dashboard_devices",
        "Devices currently mirrored in the registry"
    ))
    .unwrap();
}

static INIT: Once = Once::new();

/// Registers every collector once; later calls are ignored.
pub fn init_metrics() {
    INIT.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(NOTIFICATIONS_TOTAL.clone()),
            Box::new(UNRECOGNIZED_NOTIFICATIONS_TOTAL.clone()),
            Box::new(DROPPED_UPDATES_TOTAL.clone()),
            Box::new(REMOTE_FAILURES_TOTAL.clone()),
            Box::new(REMOTE_LATENCY_SECONDS.clone()),
            Box::new(PENDING_SUBSCRIPTIONS.clone()),
            Box::new(DEVICES.clone()),
        ];
        for collector in collectors {
            if let Err(e) = REGISTRY.register(collector) {
                warn!("Failed to register metric: {}", e);
            }
        }
    });
}

pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8(buffer).unwrap_or_default()
}
