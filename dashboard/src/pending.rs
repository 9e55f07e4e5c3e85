use crate::metrics::PENDING_SUBSCRIPTIONS;
use crate::model::DeviceKind;
use crate::sync::DeviceSync;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_util::time::{delay_queue, DelayQueue};
use tracing::{debug, error, info, warn};

/// Syncs of one device whose subscriptions keep being refused, before it is
/// left to the next announcement or restart.
const MAX_SYNC_ATTEMPTS: u32 = 5;

/// Device announced by the broker whose containers may not exist yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSubscription {
    pub url: String,
    pub kind: DeviceKind,
}

/// Sending half of the pending-subscription queue.
#[derive(Debug, Clone)]
pub struct PendingQueue {
    tx: mpsc::UnboundedSender<PendingSubscription>,
}

impl PendingQueue {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PendingSubscription>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Returns false once the drain loop has stopped.
    pub fn enqueue(&self, url: impl Into<String>, kind: DeviceKind) -> bool {
        self.tx
            .send(PendingSubscription {
                url: url.into(),
                kind,
            })
            .is_ok()
    }
}

/// Drains the pending queue: each device is synchronized once `grace` has
/// elapsed since it was last announced, one device at a time.
///
/// Entries are keyed by URL, so a device announced twice inside its grace
/// window is synchronized once, after the later announcement. A sync with a
/// refused subscription is queued again for another `grace`, up to
/// `MAX_SYNC_ATTEMPTS` syncs. Returns when every sender is dropped and the
/// queue is empty.
pub async fn run_pending(
    mut rx: mpsc::UnboundedReceiver<PendingSubscription>,
    grace: Duration,
    sync: DeviceSync,
) {
    info!("Starting pending subscription loop with grace={:?}", grace);

    let mut queue: DelayQueue<PendingSubscription> = DelayQueue::new();
    let mut keys: HashMap<String, delay_queue::Key> = HashMap::new();
    let mut attempts: HashMap<String, u32> = HashMap::new();
    let mut closed = false;

    loop {
        if closed && queue.is_empty() {
            break;
        }

        tokio::select! {
            received = rx.recv(), if !closed => {
                match received {
                    Some(pending) => {
                        if let Some(key) = keys.remove(&pending.url) {
                            queue.remove(&key);
                            debug!("Rescheduling {}", pending.url);
                        }
                        attempts.remove(&pending.url);
                        let url = pending.url.clone();
                        let key = queue.insert(pending, grace);
                        keys.insert(url, key);
                        PENDING_SUBSCRIPTIONS.set(keys.len() as f64);
                    }
                    None => {
                        info!("Pending queue closed, draining {} entries", keys.len());
                        closed = true;
                    }
                }
            }

            Some(expired) = queue.next(), if !queue.is_empty() => {
                let pending = expired.into_inner();
                keys.remove(&pending.url);
                if sync.sync_device(&pending.url, pending.kind).await {
                    attempts.remove(&pending.url);
                } else {
                    let attempt = attempts.entry(pending.url.clone()).or_insert(0);
                    *attempt += 1;
                    if *attempt < MAX_SYNC_ATTEMPTS {
                        warn!(
                            "Retrying {} in {:?} (attempt {} of {})",
                            pending.url, grace, *attempt + 1, MAX_SYNC_ATTEMPTS
                        );
                        let url = pending.url.clone();
                        let key = queue.insert(pending, grace);
                        keys.insert(url, key);
                    } else {
                        attempts.remove(&pending.url);
                        error!(
                            "Giving up on subscriptions for {} after {} attempts",
                            pending.url, MAX_SYNC_ATTEMPTS
                        );
                    }
                }
                PENDING_SUBSCRIPTIONS.set(keys.len() as f64);
            }
        }
    }

    info!("Pending subscription loop stopped");
}
