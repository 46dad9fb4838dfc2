use crate::error::ConfigError;
use crate::reading::{Metric, Reading};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Violation {
    Below,
    Above,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::Below => f.write_str("below"),
            Violation::Above => f.write_str("above"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertEvent {
    pub metric: Metric,
    pub value: f64,
    pub bound: Bounds,
    pub violated: Violation,
    pub timestamp: DateTime<Utc>,
}

impl fmt::Display for AlertEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let limit = match self.violated {
            Violation::Below => self.bound.min,
            Violation::Above => self.bound.max,
        };
        write!(
            f,
            "{} {}{} is {} limit {}{}",
            self.metric,
            self.value,
            self.metric.unit(),
            self.violated,
            limit,
            self.metric.unit()
        )
    }
}

/// Per-metric alert bounds. Only constructible with `min < max` for every entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdTable {
    bounds: BTreeMap<Metric, Bounds>,
}

impl ThresholdTable {
    pub fn new(bounds: BTreeMap<Metric, Bounds>) -> Result<Self, ConfigError> {
        for (metric, bound) in &bounds {
            let valid = bound.min.is_finite() && bound.max.is_finite() && bound.min < bound.max;
            if !valid {
                return Err(ConfigError::InvalidBounds {
                    metric: *metric,
                    min: bound.min,
                    max: bound.max,
                });
            }
        }
        Ok(Self { bounds })
    }

    /// Parses a `{"temperature": {"min": .., "max": ..}, ..}` style table keyed by metric name.
    pub fn from_named(named: BTreeMap<String, Bounds>) -> Result<Self, ConfigError> {
        let mut bounds = BTreeMap::new();
        for (name, bound) in named {
            let metric = name
                .parse::<Metric>()
                .map_err(ConfigError::UnknownMetric)?;
            bounds.insert(metric, bound);
        }
        Self::new(bounds)
    }

    pub fn get(&self, metric: Metric) -> Option<&Bounds> {
        self.bounds.get(&metric)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Metric, &Bounds)> {
        self.bounds.iter().map(|(metric, bound)| (*metric, bound))
    }
}

impl Default for ThresholdTable {
    fn default() -> Self {
        let bounds = BTreeMap::from([
            (Metric::Temperature, Bounds { min: 18.0, max: 30.0 }),
            (Metric::Humidity, Bounds { min: 30.0, max: 70.0 }),
            (Metric::Gas, Bounds { min: 5_000.0, max: 50_000.0 }),
        ]);
        Self { bounds }
    }
}

/// Compares every configured metric of `reading` against its bounds.
///
/// Metrics without a configured bound, or whose value is not finite, are ignored.
pub fn check(reading: &Reading, thresholds: &ThresholdTable) -> Vec<AlertEvent> {
    thresholds
        .iter()
        .filter_map(|(metric, bound)| {
            let value = reading.metric(metric)?;
            let violated = if value < bound.min {
                Violation::Below
            } else if value > bound.max {
                Violation::Above
            } else {
                return None;
            };
            Some(AlertEvent {
                metric,
                value,
                bound: *bound,
                violated,
                timestamp: reading.timestamp,
            })
        })
        .collect()
}
