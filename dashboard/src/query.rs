use crate::model::{DeviceSummary, History};
use crate::registry::{Registry, SharedRegistry};

/// Most recent value of a scalar metric, or an empty string.
pub fn latest_of(registry: &Registry, url: &str, metric: &str) -> String {
    match registry
        .find_device(url)
        .and_then(|d| d.metric(metric))
        .map(|m| &m.history)
    {
        Some(History::Latest(latest)) => latest.value.clone(),
        _ => String::new(),
    }
}

/// Values and timestamps of a windowed metric, oldest first.
pub fn series_of(registry: &Registry, url: &str, metric: &str) -> (Vec<f64>, Vec<String>) {
    match registry
        .find_device(url)
        .and_then(|d| d.metric(metric))
        .map(|m| &m.history)
    {
        Some(History::Series(samples)) => samples
            .iter()
            .map(|s| (s.value, s.timestamp.clone()))
            .unzip(),
        _ => (Vec::new(), Vec::new()),
    }
}

pub fn summaries(registry: &Registry) -> Vec<DeviceSummary> {
    registry
        .devices()
        .into_iter()
        .map(|d| DeviceSummary {
            url: d.url.clone(),
            name: d.name.clone(),
            kind: d.kind,
            metrics: d.metrics.iter().map(|m| m.name.clone()).collect(),
        })
        .collect()
}

/// Read-only view of the registry for presentation.
#[derive(Clone)]
pub struct Projection {
    registry: SharedRegistry,
}

impl Projection {
    pub fn new(registry: SharedRegistry) -> Self {
        Self { registry }
    }

    pub async fn latest_of(&self, url: &str, metric: &str) -> String {
        latest_of(&*self.registry.read().await, url, metric)
    }

    pub async fn series_of(&self, url: &str, metric: &str) -> (Vec<f64>, Vec<String>) {
        series_of(&*self.registry.read().await, url, metric)
    }

    pub async fn devices(&self) -> Vec<DeviceSummary> {
        summaries(&*self.registry.read().await)
    }
}
