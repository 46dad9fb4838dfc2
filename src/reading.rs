use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Temperature,
    Humidity,
    Pressure,
    Gas,
}

impl Metric {
    pub const ALL: [Metric; 4] = [
        Metric::Temperature,
        Metric::Humidity,
        Metric::Pressure,
        Metric::Gas,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Metric::Temperature => "temperature",
            Metric::Humidity => "humidity",
            Metric::Pressure => "pressure",
            Metric::Gas => "gas",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Metric::Temperature => "°C",
            Metric::Humidity => "%",
            Metric::Pressure => "hPa",
            Metric::Gas => "Ω",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "temperature" | "temp" => Ok(Metric::Temperature),
            "humidity" => Ok(Metric::Humidity),
            "pressure" => Ok(Metric::Pressure),
            "gas" | "gas_resistance" => Ok(Metric::Gas),
            other => Err(other.to_string()),
        }
    }
}

/// One timestamped sample from the environmental sensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub timestamp: DateTime<Utc>,
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
    pub gas_resistance: f64,
}

impl Reading {
    pub fn value(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Temperature => self.temperature,
            Metric::Humidity => self.humidity,
            Metric::Pressure => self.pressure,
            Metric::Gas => self.gas_resistance,
        }
    }

    /// The value for `metric`, or `None` when the sensor produced a non-finite number.
    pub fn metric(&self, metric: Metric) -> Option<f64> {
        let value = self.value(metric);
        value.is_finite().then_some(value)
    }

    pub fn vector(&self) -> [f64; 4] {
        Metric::ALL.map(|metric| self.value(metric))
    }
}

/// Chronologically ordered readings covering a lookback span.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReadingWindow {
    readings: Vec<Reading>,
}

impl ReadingWindow {
    /// Builds a window, sorting by timestamp so callers may pass rows in any order.
    pub fn new(mut readings: Vec<Reading>) -> Self {
        readings.sort_by_key(|reading| reading.timestamp);
        Self { readings }
    }

    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn first(&self) -> Option<&Reading> {
        self.readings.first()
    }

    pub fn last(&self) -> Option<&Reading> {
        self.readings.last()
    }

    pub fn values(&self, metric: Metric) -> Vec<f64> {
        self.readings
            .iter()
            .map(|reading| reading.value(metric))
            .collect()
    }
}

impl From<Vec<Reading>> for ReadingWindow {
    fn from(readings: Vec<Reading>) -> Self {
        Self::new(readings)
    }
}
