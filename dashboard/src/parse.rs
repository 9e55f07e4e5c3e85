//! Tolerant readers for oneM2M response bodies.
//!
//! The broker is known to answer with partial or oddly typed documents when
//! something upstream fails, so every reader here falls back to an empty
//! result instead of reporting an error.

use chrono::{FixedOffset, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

pub const AE: &str = "m2m:ae";
pub const ACP: &str = "m2m:acp";
pub const CNT: &str = "m2m:cnt";
pub const CIN: &str = "m2m:cin";
pub const SUB: &str = "m2m:sub";
pub const SGN: &str = "m2m:sgn";
pub const URIL: &str = "m2m:uril";

const CT_FORMAT: &str = "%Y%m%dT%H%M%S";
const DISPLAY_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Parallel value/timestamp columns of a container's content instances.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    pub values: Vec<f64>,
    pub timestamps: Vec<String>,
}

impl Series {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_pairs(self) -> impl Iterator<Item = (f64, String)> {
        self.values.into_iter().zip(self.timestamps)
    }
}

/// Addresses listed under `m2m:uril`.
pub fn addresses(body: &Value) -> Vec<String> {
    match body.get(URIL) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        // some brokers answer a single match as a space separated string
        Some(Value::String(s)) => s.split_whitespace().map(str::to_string).collect(),
        _ => Vec::new(),
    }
}

pub fn resource_id(body: &Value, tag: &str) -> String {
    body.get(tag)
        .and_then(|r| r.get("ri"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

pub fn labels(body: &Value, tag: &str) -> Vec<String> {
    body.get(tag)
        .and_then(|r| r.get("lbl"))
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// `con` of a resource as text; numbers and booleans are rendered.
pub fn content(resource: &Value) -> Option<String> {
    match resource.get("con")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// `con` of a resource as a number, accepting numeric strings.
pub fn numeric_content(resource: &Value) -> Option<f64> {
    match resource.get("con")? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Creation time of a resource, formatted for display.
pub fn creation_time(resource: &Value, offset: &FixedOffset) -> Option<String> {
    resource
        .get("ct")
        .and_then(Value::as_str)
        .and_then(|ct| format_timestamp(ct, offset))
}

/// Value and display timestamp of a single content instance, or a pair of
/// empty strings when either is missing.
pub fn latest_reading(body: &Value, offset: &FixedOffset) -> (String, String) {
    let Some(cin) = body.get(CIN) else {
        return (String::new(), String::new());
    };
    match (content(cin), creation_time(cin, offset)) {
        (Some(value), Some(timestamp)) => (value, timestamp),
        _ => (String::new(), String::new()),
    }
}

/// Numeric readings of a container fetched with its child instances.
/// Instances without a numeric `con` or a valid `ct` are skipped.
pub fn series(body: &Value, offset: &FixedOffset) -> Series {
    let mut series = Series::default();
    let Some(instances) = body
        .get(CNT)
        .and_then(|c| c.get(CIN))
        .and_then(Value::as_array)
    else {
        return series;
    };

    for cin in instances {
        if let (Some(value), Some(timestamp)) =
            (numeric_content(cin), creation_time(cin, offset))
        {
            series.values.push(value);
            series.timestamps.push(timestamp);
        }
    }
    series
}

/// Converts a broker timestamp (`YYYYMMDDTHHMMSS`, UTC, optionally with a
/// `,ffffff` fraction) into ISO-8601 local time at `offset`.
pub fn format_timestamp(ct: &str, offset: &FixedOffset) -> Option<String> {
    let whole = ct.split([',', '.']).next()?;
    let naive = NaiveDateTime::parse_from_str(whole, CT_FORMAT).ok()?;
    let local = Utc.from_utc_datetime(&naive).with_timezone(offset);
    Some(local.format(DISPLAY_FORMAT).to_string())
}
