pub mod isolation;
pub mod patterns;
pub mod stats;
pub mod trend;

use crate::error::AnalysisError;
use crate::reading::{Metric, Reading, ReadingWindow};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

pub use isolation::ForestConfig;
pub use patterns::{Correlation, Patterns};
pub use stats::MetricStats;
pub use trend::{Direction, TrendLabel};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Anomaly {
    pub timestamp: DateTime<Utc>,
    pub reading: Reading,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub statistics: BTreeMap<Metric, MetricStats>,
    pub patterns: Patterns,
    pub anomalies: Vec<Anomaly>,
    pub trends: BTreeMap<Metric, TrendLabel>,
}

/// Batch analysis of a reading window: statistics, patterns, anomalies and trends.
#[derive(Debug, Clone, Default)]
pub struct StatisticalAnalyzer {
    forest: ForestConfig,
}

impl StatisticalAnalyzer {
    pub fn new(forest: ForestConfig) -> Self {
        Self { forest }
    }

    pub fn analyze(&self, window: &ReadingWindow) -> Result<AnalysisResult, AnalysisError> {
        validate(window)?;

        let statistics = Metric::ALL
            .iter()
            .filter_map(|metric| {
                let values = window.values(*metric);
                stats::describe(&values).map(|described| (*metric, described))
            })
            .collect();

        let trends = Metric::ALL
            .iter()
            .map(|metric| (*metric, TrendLabel::classify(&window.values(*metric))))
            .collect();

        Ok(AnalysisResult {
            statistics,
            patterns: patterns::detect_patterns(window),
            anomalies: self.detect_anomalies(window),
            trends,
        })
    }

    fn detect_anomalies(&self, window: &ReadingWindow) -> Vec<Anomaly> {
        let rows: Vec<[f64; 4]> = window.readings().iter().map(Reading::vector).collect();
        let scaled = isolation::standardize(&rows);
        isolation::detect(&scaled, &self.forest)
            .into_iter()
            .filter_map(|idx| window.readings().get(idx))
            .map(|reading| Anomaly {
                timestamp: reading.timestamp,
                reading: *reading,
            })
            .collect()
    }
}

fn validate(window: &ReadingWindow) -> Result<(), AnalysisError> {
    if window.is_empty() {
        return Err(AnalysisError::EmptyWindow);
    }
    for reading in window.readings() {
        if let Some(metric) = Metric::ALL
            .iter()
            .copied()
            .find(|metric| reading.metric(*metric).is_none())
        {
            return Err(AnalysisError::MissingMetric {
                metric,
                timestamp: reading.timestamp,
            });
        }
    }
    Ok(())
}
