//! The three units of work the scheduler runs each tick.
//!
//! Every stage reports through [`StageOutcome`] and logs its own failures; nothing
//! a collaborator does can escape a stage as an `Err`.

use crate::analysis::{AnalysisResult, StatisticalAnalyzer, TrendLabel};
use crate::collaborators::{Collaborators, RealtimeAnalysis, TrendSummary};
use crate::config::Config;
use crate::error::{CollaboratorError, MonitorError};
use crate::reading::{Metric, Reading};
use crate::semantic::PromptContext;
use crate::store::window_start;
use crate::thresholds::{self, ThresholdTable};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug)]
pub enum StageOutcome<T> {
    Completed(T),
    /// Nothing to do this tick (e.g. no reading to analyze).
    Skipped,
    Failed(MonitorError),
}

impl<T> StageOutcome<T> {
    pub fn completed(&self) -> Option<&T> {
        match self {
            StageOutcome::Completed(value) => Some(value),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StageOutcome::Completed(_) => "completed",
            StageOutcome::Skipped => "skipped",
            StageOutcome::Failed(_) => "failed",
        }
    }
}

/// Result of the acquisition stage plus whether the notifier was called.
#[derive(Debug)]
pub struct Acquisition {
    pub outcome: StageOutcome<Reading>,
    pub alerts: usize,
    pub notified: bool,
}

pub struct Pipeline {
    collaborators: Collaborators,
    thresholds: ThresholdTable,
    analyzer: StatisticalAnalyzer,
    lookback: Duration,
    timeout: Duration,
}

impl Pipeline {
    pub fn new(collaborators: Collaborators, config: &Config) -> Self {
        Self {
            collaborators,
            thresholds: config.thresholds.clone(),
            analyzer: StatisticalAnalyzer::new(config.forest),
            lookback: config.trend_lookback,
            timeout: config.collaborator_timeout,
        }
    }

    async fn bounded<T, E, F>(&self, call: &'static str, fut: F) -> Result<T, MonitorError>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<MonitorError>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(Into::into),
            Err(_) => Err(CollaboratorError::Timeout {
                call,
                elapsed: self.timeout,
            }
            .into()),
        }
    }

    /// Reads the sensor, evaluates thresholds, notifies when `notify_due`, and persists.
    pub async fn acquire_reading(&self, notify_due: bool) -> Acquisition {
        let reading = match self
            .bounded("sensor read", self.collaborators.sensor.read())
            .await
        {
            Ok(reading) => reading,
            Err(err) => {
                tracing::error!(stage = "reading", kind = err.kind(), error = %err, "sensor read failed");
                return Acquisition {
                    outcome: StageOutcome::Failed(err),
                    alerts: 0,
                    notified: false,
                };
            }
        };

        let alerts = thresholds::check(&reading, &self.thresholds);
        for alert in &alerts {
            tracing::warn!(
                metric = %alert.metric,
                value = alert.value,
                violated = %alert.violated,
                "threshold exceeded"
            );
        }

        let notified = notify_due && !alerts.is_empty();
        if notified {
            if let Err(err) = self
                .bounded("alert notify", self.collaborators.notifier.notify(&alerts))
                .await
            {
                tracing::warn!(stage = "reading", error = %err, alerts = alerts.len(), "alert notification failed");
            }
        } else if !alerts.is_empty() {
            tracing::debug!(alerts = alerts.len(), "alert notification suppressed until next check");
        }

        let outcome = match self
            .bounded("store reading", self.collaborators.store.store_reading(&reading))
            .await
        {
            Ok(()) => StageOutcome::Completed(reading),
            Err(err) => {
                tracing::error!(stage = "reading", kind = err.kind(), error = %err, "failed to persist reading");
                StageOutcome::Failed(err)
            }
        };
        Acquisition {
            outcome,
            alerts: alerts.len(),
            notified,
        }
    }

    /// Commentary on the latest reading; a no-op when acquisition produced nothing.
    pub async fn realtime_analysis(
        &self,
        now: DateTime<Utc>,
        reading: Option<&Reading>,
    ) -> StageOutcome<RealtimeAnalysis> {
        let Some(reading) = reading else {
            tracing::debug!(stage = "analysis", "no reading this tick; skipping");
            return StageOutcome::Skipped;
        };
        match self.run_realtime(now, reading).await {
            Ok(analysis) => StageOutcome::Completed(analysis),
            Err(err) => {
                tracing::error!(stage = "analysis", kind = err.kind(), error = %err, "real-time analysis failed");
                StageOutcome::Failed(err)
            }
        }
    }

    async fn run_realtime(
        &self,
        now: DateTime<Utc>,
        reading: &Reading,
    ) -> Result<RealtimeAnalysis, MonitorError> {
        let context = PromptContext::Current(*reading);
        let report = self
            .bounded("summarize reading", self.collaborators.semantic.summarize(&context))
            .await?;
        let analysis = RealtimeAnalysis {
            id: Uuid::new_v4(),
            generated_at: now,
            reading: *reading,
            report,
        };
        self.bounded(
            "store analysis",
            self.collaborators.store.store_analysis(&analysis),
        )
        .await?;
        if let Err(err) = self.collaborators.dashboard.publish_current(&analysis) {
            tracing::warn!(stage = "analysis", error = %err, "dashboard publish failed");
        }
        Ok(analysis)
    }

    /// Batch analysis of the lookback window ending at `now`.
    pub async fn trend_analysis(&self, now: DateTime<Utc>) -> StageOutcome<TrendSummary> {
        match self.run_trend(now).await {
            Ok(summary) => StageOutcome::Completed(summary),
            Err(err) => {
                tracing::error!(stage = "trend", kind = err.kind(), error = %err, "trend analysis failed");
                StageOutcome::Failed(err)
            }
        }
    }

    async fn run_trend(&self, now: DateTime<Utc>) -> Result<TrendSummary, MonitorError> {
        let window = self
            .bounded(
                "load window",
                self.collaborators.store.get_window(now, self.lookback),
            )
            .await?;
        let result = self.analyzer.analyze(&window)?;
        log_anomalies(&result);

        let context = PromptContext::Trend {
            readings: window.len(),
            temperature: trend_of(&result, Metric::Temperature),
            humidity: trend_of(&result, Metric::Humidity),
        };
        let report = match self
            .bounded("summarize trend", self.collaborators.semantic.summarize(&context))
            .await
        {
            Ok(report) => Some(report),
            Err(err) => {
                tracing::warn!(stage = "trend", error = %err, "trend summary unavailable");
                None
            }
        };

        let summary = TrendSummary {
            id: Uuid::new_v4(),
            generated_at: now,
            window_start: window_start(now, self.lookback),
            window_end: now,
            readings: window.len(),
            report,
        };
        self.bounded(
            "store trend",
            self.collaborators.store.store_trend(&summary, &result),
        )
        .await?;
        if let Err(err) = self.collaborators.dashboard.publish_trend(&summary, &result) {
            tracing::warn!(stage = "trend", error = %err, "dashboard publish failed");
        }
        tracing::info!(
            readings = summary.readings,
            anomalies = result.anomalies.len(),
            "trend analysis stored"
        );
        Ok(summary)
    }

    /// Releases collaborator resources: drains the dashboard queue and closes the store.
    pub async fn shutdown(&self) {
        self.collaborators.dashboard.close().await;
        self.collaborators.store.close().await;
    }
}

fn trend_of(result: &AnalysisResult, metric: Metric) -> TrendLabel {
    result
        .trends
        .get(&metric)
        .copied()
        .unwrap_or(TrendLabel::InsufficientData)
}

fn log_anomalies(result: &AnalysisResult) {
    for anomaly in &result.anomalies {
        tracing::info!(
            ts = %anomaly.timestamp,
            temperature = anomaly.reading.temperature,
            humidity = anomaly.reading.humidity,
            pressure = anomaly.reading.pressure,
            gas = anomaly.reading.gas_resistance,
            "anomalous reading"
        );
    }
}
