use chrono::NaiveDateTime;

/// Timestamp reported while the wall clock has not been synchronised yet.
pub const SENTINEL_TIMESTAMP: &str = "1970-01-01T00:00:00";

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// One sampled snapshot. Built fresh every cycle and consumed by the reporter.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    /// Degrees Celsius. NaN when the sensor could not be read.
    pub temperature_c: f32,
    pub presence: bool,
    pub timestamp: String,
}

impl Reading {
    pub fn new(temperature_c: f32, presence: bool, now: Option<NaiveDateTime>) -> Self {
        Self {
            temperature_c,
            presence,
            timestamp: format_timestamp(now),
        }
    }

    pub fn sensor_fault(&self) -> bool {
        !self.temperature_c.is_finite()
    }
}

/// Fan and light commands returned by the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Decision {
    pub fan_on: bool,
    pub light_on: bool,
}

/// Last commanded actuator outputs. Write-only: never read back from the pins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActuatorState {
    pub fan_on: bool,
    pub light_on: bool,
}

impl From<Decision> for ActuatorState {
    fn from(decision: Decision) -> Self {
        Self {
            fan_on: decision.fan_on,
            light_on: decision.light_on,
        }
    }
}

pub fn format_timestamp(now: Option<NaiveDateTime>) -> String {
    match now {
        Some(now) => now.format(TIMESTAMP_FORMAT).to_string(),
        None => SENTINEL_TIMESTAMP.to_string(),
    }
}
