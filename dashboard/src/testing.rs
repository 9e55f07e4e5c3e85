//! In-memory broker double shared by the unit tests.

use crate::directory::{Directory, DiscoveryFilter};
use crate::model::DeviceKind;
use crate::parse::Series;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Default)]
pub struct FakeDirectory {
    discoveries: Mutex<HashMap<String, Vec<String>>>,
    labels: Mutex<HashMap<String, Vec<String>>>,
    series: Mutex<HashMap<String, Series>>,
    latest: Mutex<HashMap<String, (String, String)>>,
    pub writes: Mutex<Vec<(String, String)>>,
    pub subscriptions: Mutex<Vec<String>>,
    pub label_reads: Mutex<Vec<String>>,
    label_delay: Mutex<Option<Duration>>,
    subscribe_failures: Mutex<usize>,
}

fn discovery_key(location: &str, label: Option<&str>) -> String {
    format!("{}|{}", location, label.unwrap_or_default())
}

impl FakeDirectory {
    /// Publishes an AE of `kind` under `cse-in` with one container per metric.
    pub fn add_device(&self, name: &str, kind: DeviceKind) -> String {
        let url = format!("cse-in/{}", name);
        self.discoveries
            .lock()
            .unwrap()
            .entry(discovery_key("cse-in", Some(kind.label())))
            .or_default()
            .push(url.clone());
        let containers = kind
            .metrics()
            .iter()
            .map(|m| format!("{}/{}", url, m))
            .collect();
        self.discoveries
            .lock()
            .unwrap()
            .insert(discovery_key(&url, None), containers);
        self.set_labels(&url, &[kind.label()]);
        url
    }

    pub fn set_labels(&self, url: &str, labels: &[&str]) {
        self.labels.lock().unwrap().insert(
            url.to_string(),
            labels.iter().map(|l| l.to_string()).collect(),
        );
    }

    pub fn set_series(&self, container: &str, values: &[f64], timestamps: &[&str]) {
        self.series.lock().unwrap().insert(
            container.to_string(),
            Series {
                values: values.to_vec(),
                timestamps: timestamps.iter().map(|t| t.to_string()).collect(),
            },
        );
    }

    /// Only the next label read waits for `delay`.
    pub fn delay_next_label_read(&self, delay: Duration) {
        *self.label_delay.lock().unwrap() = Some(delay);
    }

    /// The next `count` subscription attempts are refused.
    pub fn fail_subscriptions(&self, count: usize) {
        *self.subscribe_failures.lock().unwrap() = count;
    }

    pub fn set_latest(&self, address: &str, value: &str, timestamp: &str) {
        self.latest.lock().unwrap().insert(
            address.to_string(),
            (value.to_string(), timestamp.to_string()),
        );
    }
}

#[async_trait]
impl Directory for FakeDirectory {
    async fn discover(&self, filter: &DiscoveryFilter) -> Vec<String> {
        self.discoveries
            .lock()
            .unwrap()
            .get(&discovery_key(&filter.location, filter.label.as_deref()))
            .cloned()
            .unwrap_or_default()
    }

    async fn read_latest(&self, address: &str) -> (String, String) {
        self.latest
            .lock()
            .unwrap()
            .get(address)
            .cloned()
            .unwrap_or_default()
    }

    async fn read_series(&self, address: &str) -> Series {
        self.series
            .lock()
            .unwrap()
            .get(address)
            .cloned()
            .unwrap_or_default()
    }

    async fn read_labels(&self, address: &str) -> Vec<String> {
        self.label_reads.lock().unwrap().push(address.to_string());
        let delay = self.label_delay.lock().unwrap().take();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.labels
            .lock()
            .unwrap()
            .get(address)
            .cloned()
            .unwrap_or_default()
    }

    async fn write_value(&self, address: &str, content: &str) {
        self.writes
            .lock()
            .unwrap()
            .push((address.to_string(), content.to_string()));
    }

    /// Only accepted subscriptions are recorded.
    async fn subscribe(&self, address: &str, _name: &str, _events: &[u8]) -> bool {
        {
            let mut failures = self.subscribe_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return false;
            }
        }
        self.subscriptions.lock().unwrap().push(address.to_string());
        true
    }
}
