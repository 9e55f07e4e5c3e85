use crate::directory::{Directory, DiscoveryFilter, ResourceType, NET_CREATE_CHILD};
use crate::metrics::DEVICES;
use crate::model::{shape_of, short_name, Device, DeviceKind, MetricShape};
use crate::parse::Series;
use crate::registry::SharedRegistry;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

enum Fetched {
    Series(String, Series),
    Latest(String, String, String),
}

/// Outcome of a discovery sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub synced: usize,
    /// Devices with at least one refused subscription; they need another sync.
    pub unsubscribed: Vec<(String, DeviceKind)>,
}

/// Pulls a device's containers from the broker into the registry.
#[derive(Clone)]
pub struct DeviceSync {
    registry: SharedRegistry,
    directory: Arc<dyn Directory>,
    cse_name: String,
    subscription_name: String,
}

impl DeviceSync {
    pub fn new(
        registry: SharedRegistry,
        directory: Arc<dyn Directory>,
        cse_name: impl Into<String>,
        subscription_name: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            directory,
            cse_name: cse_name.into(),
            subscription_name: subscription_name.into(),
        }
    }

    /// Subscribes to every metric container of the device at `url`, reads
    /// their current content and mirrors the result. Running it again for the
    /// same device converges on the same registry state.
    ///
    /// Returns false when the broker refused any subscription. The device is
    /// mirrored either way.
    pub async fn sync_device(&self, url: &str, kind: DeviceKind) -> bool {
        let filter = DiscoveryFilter::at(url)
            .of_type(ResourceType::Container)
            .level(1);
        let containers = self.directory.discover(&filter).await;

        let mut fetched = Vec::new();
        let mut refused = 0;
        for container in &containers {
            let metric = short_name(container);
            if !kind.metrics().iter().any(|m| *m == metric) {
                debug!("Ignoring container {} of {}", container, url);
                continue;
            }
            if !self
                .directory
                .subscribe(container, &self.subscription_name, &[NET_CREATE_CHILD])
                .await
            {
                refused += 1;
            }
            match shape_of(metric) {
                MetricShape::Windowed => {
                    let series = self.directory.read_series(container).await;
                    fetched.push(Fetched::Series(metric.to_string(), series));
                }
                MetricShape::Latest => {
                    let latest = format!("{}/la", container);
                    let (value, timestamp) = self.directory.read_latest(&latest).await;
                    if !value.is_empty() {
                        fetched.push(Fetched::Latest(metric.to_string(), value, timestamp));
                    }
                }
            }
        }

        let mut registry = self.registry.write().await;
        let created = registry.upsert_device(Device::new(url, kind));
        for item in fetched {
            match item {
                Fetched::Series(metric, series) => {
                    registry.load_series(url, &metric, series.into_pairs());
                }
                Fetched::Latest(metric, value, timestamp) => {
                    registry.set_latest(url, &metric, &value, &timestamp);
                }
            }
        }
        DEVICES.set(registry.len() as f64);
        info!(
            "Synchronized {} {} ({} containers, new: {})",
            kind.label(),
            url,
            containers.len(),
            created
        );
        if refused > 0 {
            warn!("{} of {} subscriptions refused for {}", refused, containers.len(), url);
        }
        refused == 0
    }

    /// Discovers every sensor and actuator AE and synchronizes each one.
    pub async fn sweep(&self) -> SweepReport {
        let mut seen = HashSet::new();
        let mut report = SweepReport::default();
        for kind in [DeviceKind::Sensor, DeviceKind::Actuator] {
            let filter = DiscoveryFilter::at(self.cse_name.as_str())
                .of_type(ResourceType::ApplicationEntity)
                .label(kind.label());
            for url in self.directory.discover(&filter).await {
                // an AE labelled with both roles is mirrored as a sensor
                if seen.insert(url.clone()) && !self.sync_device(&url, kind).await {
                    report.unsubscribed.push((url, kind));
                }
            }
        }
        report.synced = seen.len();
        info!(
            "Discovery sweep mirrored {} devices, {} with refused subscriptions",
            report.synced,
            report.unsubscribed.len()
        );
        report
    }
}
