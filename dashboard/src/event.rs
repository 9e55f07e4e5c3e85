use crate::directory::{NET_CREATE_CHILD, NET_DELETE_CHILD};
use crate::model::DeviceKind;
use crate::parse::{self, AE, CIN, SGN};
use chrono::FixedOffset;
use serde_json::Value;

/// New reading for `device/metric` as carried by a content instance.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricUpdate {
    pub device: String,
    pub metric: String,
    pub value: String,
    pub timestamp: String,
}

/// Broker notification classified by the shape of its representation.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    DeviceAdded { name: String, kind: DeviceKind },
    DeviceRemoved { name: String, kind: DeviceKind },
    MetricUpdated(MetricUpdate),
    /// Subscription verification, ACP traffic and anything malformed.
    Unrecognized,
}

impl Event {
    /// Decodes a raw notification body. Bodies using single quoted strings
    /// are retried with double quotes before giving up.
    pub fn decode(body: &[u8], offset: &FixedOffset) -> Event {
        let value = match serde_json::from_slice::<Value>(body) {
            Ok(value) => value,
            Err(_) => {
                let normalized = String::from_utf8_lossy(body).replace('\'', "\"");
                match serde_json::from_str::<Value>(&normalized) {
                    Ok(value) => value,
                    Err(_) => return Event::Unrecognized,
                }
            }
        };
        Event::classify(&value, offset)
    }

    pub fn classify(notification: &Value, offset: &FixedOffset) -> Event {
        let Some(event) = notification.get(SGN).and_then(|s| s.get("nev")) else {
            return Event::Unrecognized;
        };
        let Some(representation) = event.get("rep") else {
            return Event::Unrecognized;
        };

        if let Some(ae) = representation.get(AE) {
            let net = event.get("net").and_then(Value::as_u64);
            return classify_device(ae, net);
        }
        if let Some(cin) = representation.get(CIN) {
            return classify_content(cin, offset);
        }
        Event::Unrecognized
    }
}

fn classify_device(ae: &Value, net: Option<u64>) -> Event {
    let name = match ae.get("rn").and_then(Value::as_str) {
        Some(rn) if !rn.is_empty() => rn.to_string(),
        _ => return Event::Unrecognized,
    };
    let labels: Vec<&str> = ae
        .get("lbl")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    let Some(kind) = DeviceKind::from_labels(&labels) else {
        return Event::Unrecognized;
    };

    match net {
        Some(n) if n == u64::from(NET_CREATE_CHILD) => Event::DeviceAdded { name, kind },
        Some(n) if n == u64::from(NET_DELETE_CHILD) => Event::DeviceRemoved { name, kind },
        _ => Event::Unrecognized,
    }
}

fn classify_content(cin: &Value, offset: &FixedOffset) -> Event {
    let value = match parse::content(cin) {
        Some(con) if !con.is_empty() => con,
        _ => return Event::Unrecognized,
    };
    let Some(label) = cin
        .get("lbl")
        .and_then(Value::as_array)
        .and_then(|items| items.first())
        .and_then(Value::as_str)
    else {
        return Event::Unrecognized;
    };
    let Some(timestamp) = parse::creation_time(cin, offset) else {
        return Event::Unrecognized;
    };

    let mut parts = label.split('/');
    let device = parts.next().unwrap_or_default();
    let metric = parts.last().unwrap_or(device);
    if device.is_empty() || metric.is_empty() {
        return Event::Unrecognized;
    }

    Event::MetricUpdated(MetricUpdate {
        device: device.to_string(),
        metric: metric.to_string(),
        value,
        timestamp,
    })
}
