use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

pub const TEMPERATURE: &str = "Temperature";
pub const HUMIDITY: &str = "Humidity";
pub const SOIL_MOISTURE: &str = "SoilMoisture";
pub const BATTERY: &str = "Battery";
pub const RAINFALL_TRIGGER: &str = "RainfallTrigger";
pub const GPS: &str = "GPS";
pub const ACTUATOR_STATE: &str = "actuatorState";

const SENSOR_METRICS: &[&str] = &[
    TEMPERATURE,
    HUMIDITY,
    SOIL_MOISTURE,
    BATTERY,
    RAINFALL_TRIGGER,
    GPS,
];
const ACTUATOR_METRICS: &[&str] = &[ACTUATOR_STATE, BATTERY];

/// Role of an AE on the broker, carried in its label set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Sensor,
    Actuator,
}

impl DeviceKind {
    pub fn label(self) -> &'static str {
        match self {
            DeviceKind::Sensor => "sensor",
            DeviceKind::Actuator => "actuator",
        }
    }

    /// Sensor wins when an AE carries both labels.
    pub fn from_labels<S: AsRef<str>>(labels: &[S]) -> Option<Self> {
        if labels.iter().any(|l| l.as_ref() == "sensor") {
            Some(DeviceKind::Sensor)
        } else if labels.iter().any(|l| l.as_ref() == "actuator") {
            Some(DeviceKind::Actuator)
        } else {
            None
        }
    }

    /// Metric containers a device of this kind exposes.
    pub fn metrics(self) -> &'static [&'static str] {
        match self {
            DeviceKind::Sensor => SENSOR_METRICS,
            DeviceKind::Actuator => ACTUATOR_METRICS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricShape {
    /// Bounded, timestamp-ordered history kept for charting.
    Windowed,
    /// Only the most recent value is kept.
    Latest,
}

pub fn shape_of(metric: &str) -> MetricShape {
    match metric {
        TEMPERATURE | HUMIDITY | SOIL_MOISTURE => MetricShape::Windowed,
        _ => MetricShape::Latest,
    }
}

/// Celsius readings are stored as Fahrenheit.
pub fn celsius_to_fahrenheit(celsius: f64) -> f64 {
    celsius * 9.0 / 5.0 + 32.0
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    pub value: f64,
    pub timestamp: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Latest {
    pub value: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum History {
    Series(VecDeque<Sample>),
    Latest(Latest),
}

impl History {
    fn empty(metric: &str) -> Self {
        match shape_of(metric) {
            MetricShape::Windowed => History::Series(VecDeque::new()),
            MetricShape::Latest => History::Latest(Latest::default()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub name: String,
    pub history: History,
}

impl Metric {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            history: History::empty(name),
        }
    }
}

/// Mirror of one AE on the broker
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    pub url: String,
    pub name: String,
    pub kind: DeviceKind,
    pub metrics: Vec<Metric>,
}

impl Device {
    /// A device without metric slots; the registry adds them on insertion.
    pub fn new(url: &str, kind: DeviceKind) -> Self {
        Self {
            url: url.to_string(),
            name: short_name(url).to_string(),
            kind,
            metrics: Vec::new(),
        }
    }

    pub fn metric(&self, name: &str) -> Option<&Metric> {
        self.metrics.iter().find(|m| m.name == name)
    }

    pub fn metric_mut(&mut self, name: &str) -> Option<&mut Metric> {
        self.metrics.iter_mut().find(|m| m.name == name)
    }

    pub(crate) fn ensure_slots(&mut self) {
        for name in self.kind.metrics() {
            if self.metric(name).is_none() {
                self.metrics.push(Metric::new(name));
            }
        }
    }
}

/// Last segment of a resource address (`cse-in/sensorA` -> `sensorA`).
pub fn short_name(address: &str) -> &str {
    address
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(address)
}

/// Device listing served to the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceSummary {
    pub url: String,
    pub name: String,
    pub kind: DeviceKind,
    pub metrics: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SeriesResponse {
    pub values: Vec<f64>,
    pub timestamps: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LatestResponse {
    pub value: String,
}
