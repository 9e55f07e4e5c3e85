use crate::directory::Directory;
use crate::event::{Event, MetricUpdate};
use crate::metrics::{DEVICES, DROPPED_UPDATES_TOTAL, UNRECOGNIZED_NOTIFICATIONS_TOTAL};
use crate::model::{shape_of, DeviceKind, MetricShape, ACTUATOR_STATE, BATTERY};
use crate::pending::PendingQueue;
use crate::registry::SharedRegistry;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Applies classified broker notifications to the registry.
pub struct Reconciler {
    registry: SharedRegistry,
    directory: Arc<dyn Directory>,
    pending: PendingQueue,
    cse_name: String,
}

impl Reconciler {
    pub fn new(
        registry: SharedRegistry,
        directory: Arc<dyn Directory>,
        pending: PendingQueue,
        cse_name: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            directory,
            pending,
            cse_name: cse_name.into(),
        }
    }

    fn address_of(&self, name: &str) -> String {
        format!("{}/{}", self.cse_name, name)
    }

    pub async fn handle(&self, event: Event) {
        match event {
            Event::DeviceAdded { name, kind } => {
                let url = self.address_of(&name);
                if self.pending.enqueue(url.clone(), kind) {
                    info!("New {} {} queued for subscription", kind.label(), url);
                } else {
                    warn!("Pending queue closed, {} will not be mirrored", url);
                }
            }
            Event::DeviceRemoved { name, kind } => {
                let mut registry = self.registry.write().await;
                match registry.remove_by_name(&name, kind) {
                    Some(device) => {
                        DEVICES.set(registry.len() as f64);
                        info!("Removed {} {}", kind.label(), device.url);
                    }
                    None => debug!("Removal of unknown {} {}", kind.label(), name),
                }
            }
            Event::MetricUpdated(update) => self.apply_update(update).await,
            Event::Unrecognized => {
                UNRECOGNIZED_NOTIFICATIONS_TOTAL.inc();
                debug!("Acknowledged notification without state change");
            }
        }
    }

    /// Battery containers exist on both roles, so their owner is looked up
    /// from the AE's labels; any other metric has a fixed owner.
    async fn owner_of(&self, update: &MetricUpdate) -> Option<DeviceKind> {
        match update.metric.as_str() {
            BATTERY => {
                let labels = self
                    .directory
                    .read_labels(&self.address_of(&update.device))
                    .await;
                DeviceKind::from_labels(&labels)
            }
            ACTUATOR_STATE => Some(DeviceKind::Actuator),
            _ => Some(DeviceKind::Sensor),
        }
    }

    async fn apply_update(&self, update: MetricUpdate) {
        let url = self.address_of(&update.device);
        let Some(kind) = self.owner_of(&update).await else {
            DROPPED_UPDATES_TOTAL.inc();
            debug!("No owner for {}/{}, dropping update", update.device, update.metric);
            return;
        };

        let mut registry = self.registry.write().await;
        let owned = registry.find_device(&url).map(|d| d.kind) == Some(kind);
        let applied = owned
            && match shape_of(&update.metric) {
                MetricShape::Windowed => match update.value.trim().parse::<f64>() {
                    Ok(raw) => registry.append_sample(&url, &update.metric, raw, &update.timestamp),
                    Err(_) => {
                        warn!(
                            "Non-numeric {} reading {:?} from {}",
                            update.metric, update.value, url
                        );
                        false
                    }
                },
                MetricShape::Latest => {
                    registry.set_latest(&url, &update.metric, &update.value, &update.timestamp)
                }
            };

        if applied {
            debug!("{} {} = {}", url, update.metric, update.value);
        } else {
            DROPPED_UPDATES_TOTAL.inc();
            debug!("Dropped update for unknown {} {}", url, update.metric);
        }
    }
}
