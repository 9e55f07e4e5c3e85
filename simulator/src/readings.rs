use dashboard::model::{
    DeviceKind, ACTUATOR_STATE, BATTERY, GPS, HUMIDITY, RAINFALL_TRIGGER, SOIL_MOISTURE,
    TEMPERATURE,
};
use rand::Rng;

/// Where the simulated field station sits.
const HOME: (f64, f64) = (40.7982, -77.8599);

#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub metric: &'static str,
    pub content: String,
}

impl Reading {
    fn new(metric: &'static str, content: impl Into<String>) -> Self {
        Self {
            metric,
            content: content.into(),
        }
    }
}

/// Produces one reading per metric of a device role on every tick.
pub struct Generator {
    kind: DeviceKind,
    battery: f64,
    switched_on: bool,
}

impl Generator {
    pub fn new(kind: DeviceKind) -> Self {
        Self {
            kind,
            battery: 100.0,
            switched_on: false,
        }
    }

    pub fn tick(&mut self, rng: &mut impl Rng) -> Vec<Reading> {
        // slow drain, recharged once nearly empty
        self.battery -= rng.gen_range(0.0..0.5);
        if self.battery < 5.0 {
            self.battery = 100.0;
        }
        let battery = Reading::new(BATTERY, format!("{:.0}", self.battery));

        match self.kind {
            DeviceKind::Sensor => {
                // temperature is reported in Celsius
                let temperature = if rng.gen_bool(0.05) {
                    rng.gen_range(-10.0..45.0)
                } else {
                    rng.gen_range(15.0..35.0)
                };
                let (lat, lon) = HOME;
                vec![
                    Reading::new(TEMPERATURE, format!("{:.1}", temperature)),
                    Reading::new(HUMIDITY, format!("{:.1}", rng.gen_range(30.0..80.0))),
                    Reading::new(SOIL_MOISTURE, format!("{:.1}", rng.gen_range(10.0..60.0))),
                    battery,
                    Reading::new(
                        RAINFALL_TRIGGER,
                        if rng.gen_bool(0.1) { "1" } else { "0" },
                    ),
                    Reading::new(
                        GPS,
                        format!(
                            "{:.5},{:.5}",
                            lat + rng.gen_range(-0.001..0.001),
                            lon + rng.gen_range(-0.001..0.001)
                        ),
                    ),
                ]
            }
            DeviceKind::Actuator => {
                self.switched_on = !self.switched_on;
                let state = if self.switched_on { "ON" } else { "OFF" };
                vec![Reading::new(ACTUATOR_STATE, state), battery]
            }
        }
    }
}
