//! Narrow interfaces for the I/O the monitor depends on.

use crate::analysis::AnalysisResult;
use crate::error::{CollaboratorError, PersistenceError, SensorError};
use crate::reading::{Reading, ReadingWindow};
use crate::semantic::PromptContext;
use crate::thresholds::AlertEvent;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Output of the real-time analysis stage for one reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RealtimeAnalysis {
    pub id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub reading: Reading,
    pub report: String,
}

/// Metadata and narrative that accompany a trend run's `AnalysisResult`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendSummary {
    pub id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub readings: usize,
    pub report: Option<String>,
}

#[async_trait]
pub trait SensorSource: Send + Sync {
    async fn read(&self) -> Result<Reading, SensorError>;
}

#[async_trait]
pub trait ReadingStore: Send + Sync {
    async fn store_reading(&self, reading: &Reading) -> Result<(), PersistenceError>;

    async fn store_analysis(&self, analysis: &RealtimeAnalysis) -> Result<(), PersistenceError>;

    async fn store_trend(
        &self,
        summary: &TrendSummary,
        result: &AnalysisResult,
    ) -> Result<(), PersistenceError>;

    /// Readings from the last `lookback` ending at `now`, oldest first.
    async fn get_window(
        &self,
        now: DateTime<Utc>,
        lookback: Duration,
    ) -> Result<ReadingWindow, PersistenceError>;

    async fn close(&self) {}
}

/// Dashboard publishing must not block the caller; implementations queue and return.
#[async_trait]
pub trait DashboardSink: Send + Sync {
    fn publish_current(&self, analysis: &RealtimeAnalysis) -> Result<(), CollaboratorError>;

    fn publish_trend(
        &self,
        summary: &TrendSummary,
        result: &AnalysisResult,
    ) -> Result<(), CollaboratorError>;

    /// Flushes anything still queued.
    async fn close(&self) {}
}

#[async_trait]
pub trait AlertNotifier: Send + Sync {
    async fn notify(&self, alerts: &[AlertEvent]) -> Result<(), CollaboratorError>;
}

/// Turns a structured context into an opaque text report.
#[async_trait]
pub trait SemanticAnalyzer: Send + Sync {
    async fn summarize(&self, context: &PromptContext) -> Result<String, CollaboratorError>;
}

#[derive(Clone)]
pub struct Collaborators {
    pub sensor: Arc<dyn SensorSource>,
    pub store: Arc<dyn ReadingStore>,
    pub dashboard: Arc<dyn DashboardSink>,
    pub notifier: Arc<dyn AlertNotifier>,
    pub semantic: Arc<dyn SemanticAnalyzer>,
}
