use crate::model::{
    celsius_to_fahrenheit, Device, DeviceKind, History, Latest, Metric, Sample, TEMPERATURE,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// Registry behind the single lock shared by the reconciler, the pending
/// drain loop and the query layer.
pub type SharedRegistry = Arc<RwLock<Registry>>;

/// In-memory mirror of the sensor and actuator AEs known to the broker.
///
/// Every mutation is a no-op when the referenced device or metric is absent;
/// mutators report whether anything was applied.
#[derive(Debug)]
pub struct Registry {
    devices: HashMap<String, Device>,
    capacity: usize,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl Registry {
    pub fn new(capacity: usize) -> Self {
        Self {
            devices: HashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn shared(capacity: usize) -> SharedRegistry {
        Arc::new(RwLock::new(Self::new(capacity)))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Inserts `device` or refreshes the entry already stored under its URL.
    ///
    /// An existing entry of the same kind keeps its histories. Returns true
    /// when a new entry was created.
    pub fn upsert_device(&mut self, mut device: Device) -> bool {
        match self.devices.get_mut(&device.url) {
            Some(existing) if existing.kind == device.kind => {
                existing.name = device.name;
                existing.ensure_slots();
                false
            }
            _ => {
                device.ensure_slots();
                self.devices.insert(device.url.clone(), device).is_none()
            }
        }
    }

    pub fn remove_device(&mut self, url: &str) -> Option<Device> {
        self.devices.remove(url)
    }

    /// Removes the device of `kind` whose short name is `name`.
    pub fn remove_by_name(&mut self, name: &str, kind: DeviceKind) -> Option<Device> {
        let url = self.find_by_name(name, kind)?.url.clone();
        self.devices.remove(&url)
    }

    pub fn find_device(&self, url: &str) -> Option<&Device> {
        self.devices.get(url)
    }

    pub fn find_by_name(&self, name: &str, kind: DeviceKind) -> Option<&Device> {
        self.devices
            .values()
            .find(|d| d.name == name && d.kind == kind)
    }

    /// Devices ordered by URL.
    pub fn devices(&self) -> Vec<&Device> {
        let mut devices: Vec<&Device> = self.devices.values().collect();
        devices.sort_by(|a, b| a.url.cmp(&b.url));
        devices
    }

    /// Appends a raw reading to a windowed metric, evicting the oldest
    /// samples beyond capacity.
    pub fn append_sample(&mut self, url: &str, metric: &str, raw: f64, timestamp: &str) -> bool {
        let capacity = self.capacity;
        let Some(series) = self.series_mut(url, metric) else {
            return false;
        };
        series.push_back(Sample {
            value: ingest(metric, raw),
            timestamp: timestamp.to_string(),
        });
        while series.len() > capacity {
            series.pop_front();
        }
        true
    }

    /// Replaces a windowed history with raw readings fetched from the broker.
    ///
    /// Goes through the same conversion as [`Registry::append_sample`], so
    /// reloading the same readings leaves the history unchanged.
    pub fn load_series<I>(&mut self, url: &str, metric: &str, raw: I) -> bool
    where
        I: IntoIterator<Item = (f64, String)>,
    {
        let capacity = self.capacity;
        let Some(series) = self.series_mut(url, metric) else {
            return false;
        };
        series.clear();
        for (value, timestamp) in raw {
            series.push_back(Sample {
                value: ingest(metric, value),
                timestamp,
            });
            if series.len() > capacity {
                series.pop_front();
            }
        }
        true
    }

    /// Last write wins; delivery order is trusted.
    pub fn set_latest(&mut self, url: &str, metric: &str, value: &str, timestamp: &str) -> bool {
        let slot = self
            .devices
            .get_mut(url)
            .and_then(|d| d.metric_mut(metric))
            .map(|m| &mut m.history);
        match slot {
            Some(History::Latest(latest)) => {
                *latest = Latest {
                    value: value.to_string(),
                    timestamp: timestamp.to_string(),
                };
                true
            }
            _ => false,
        }
    }

    fn series_mut(&mut self, url: &str, metric: &str) -> Option<&mut VecDeque<Sample>> {
        match self.devices.get_mut(url)?.metric_mut(metric)? {
            Metric {
                history: History::Series(series),
                ..
            } => Some(series),
            _ => None,
        }
    }
}

/// Unit conversion applied once, on the way into the registry.
fn ingest(metric: &str, raw: f64) -> f64 {
    if metric == TEMPERATURE {
        celsius_to_fahrenheit(raw)
    } else {
        raw
    }
}
