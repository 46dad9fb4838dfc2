use super::window_start;
use crate::analysis::AnalysisResult;
use crate::collaborators::{ReadingStore, RealtimeAnalysis, TrendSummary};
use crate::error::PersistenceError;
use crate::reading::{Reading, ReadingWindow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Default)]
struct MemoryState {
    readings: Vec<Reading>,
    analyses: Vec<RealtimeAnalysis>,
    trends: Vec<(TrendSummary, AnalysisResult)>,
}

/// Process-local store used when no database is configured.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, PersistenceError> {
        self.state
            .lock()
            .map_err(|_| PersistenceError::Unavailable("memory store lock poisoned".to_string()))
    }

    pub fn readings(&self) -> Vec<Reading> {
        self.lock().map(|s| s.readings.clone()).unwrap_or_default()
    }

    pub fn analyses(&self) -> Vec<RealtimeAnalysis> {
        self.lock().map(|s| s.analyses.clone()).unwrap_or_default()
    }

    pub fn trends(&self) -> Vec<(TrendSummary, AnalysisResult)> {
        self.lock().map(|s| s.trends.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ReadingStore for MemoryStore {
    async fn store_reading(&self, reading: &Reading) -> Result<(), PersistenceError> {
        self.lock()?.readings.push(*reading);
        Ok(())
    }

    async fn store_analysis(&self, analysis: &RealtimeAnalysis) -> Result<(), PersistenceError> {
        self.lock()?.analyses.push(analysis.clone());
        Ok(())
    }

    async fn store_trend(
        &self,
        summary: &TrendSummary,
        result: &AnalysisResult,
    ) -> Result<(), PersistenceError> {
        self.lock()?.trends.push((summary.clone(), result.clone()));
        Ok(())
    }

    async fn get_window(
        &self,
        now: DateTime<Utc>,
        lookback: Duration,
    ) -> Result<ReadingWindow, PersistenceError> {
        let start = window_start(now, lookback);
        let selected = self
            .lock()?
            .readings
            .iter()
            .filter(|r| r.timestamp >= start && r.timestamp <= now)
            .copied()
            .collect();
        Ok(ReadingWindow::new(selected))
    }
}
