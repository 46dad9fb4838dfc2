use crate::analysis::AnalysisResult;
use crate::collaborators::{
    AlertNotifier, Collaborators, DashboardSink, RealtimeAnalysis, ReadingStore, SemanticAnalyzer,
    SensorSource, TrendSummary,
};
use crate::error::{CollaboratorError, PersistenceError, SensorError};
use crate::reading::{Reading, ReadingWindow};
use crate::scheduler::Clock;
use crate::semantic::PromptContext;
use crate::store::MemoryStore;
use crate::thresholds::AlertEvent;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
}

pub fn reading_at(timestamp: DateTime<Utc>, temperature: f64) -> Reading {
    Reading {
        timestamp,
        temperature,
        humidity: 45.0,
        pressure: 1010.0,
        gas_resistance: 20_000.0,
    }
}

/// Virtual clock: `sleep` advances time instantly and is recorded.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    sleeps: Mutex<Vec<Duration>>,
    cancel_after: Mutex<Option<(usize, CancellationToken)>>,
    hold_sleeps: AtomicBool,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::starting_at(epoch())
    }
}

impl ManualClock {
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
            sleeps: Mutex::new(Vec::new()),
            cancel_after: Mutex::new(None),
            hold_sleeps: AtomicBool::new(false),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::from_std(by).unwrap();
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }

    /// Makes every later `sleep` record itself and then never complete.
    pub fn hold_sleeps(&self) {
        self.hold_sleeps.store(true, Ordering::SeqCst);
    }

    /// Cancels `token` once `sleeps` sleeps have completed.
    pub fn cancel_after(&self, sleeps: usize, token: CancellationToken) {
        *self.cancel_after.lock().unwrap() = Some((sleeps, token));
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        if self.hold_sleeps.load(Ordering::SeqCst) {
            self.sleeps.lock().unwrap().push(duration);
            std::future::pending::<()>().await;
        }
        self.advance(duration);
        let count = {
            let mut sleeps = self.sleeps.lock().unwrap();
            sleeps.push(duration);
            sleeps.len()
        };
        if let Some((limit, token)) = self.cancel_after.lock().unwrap().as_ref() {
            if count >= *limit {
                token.cancel();
            }
        }
        tokio::task::yield_now().await;
    }
}

#[derive(Debug, Clone, Copy)]
pub enum SensorStep {
    Temperature(f64),
    Fail,
    Panic,
    /// The read never completes.
    Hang,
}

/// Plays back a script of sensor steps; the last step repeats forever.
pub struct ScriptedSensor {
    clock: Arc<ManualClock>,
    steps: Mutex<VecDeque<SensorStep>>,
    reads: AtomicUsize,
}

impl ScriptedSensor {
    pub fn new(clock: Arc<ManualClock>, steps: Vec<SensorStep>) -> Self {
        Self {
            clock,
            steps: Mutex::new(steps.into()),
            reads: AtomicUsize::new(0),
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SensorSource for ScriptedSensor {
    async fn read(&self) -> Result<Reading, SensorError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let step = {
            let mut steps = self.steps.lock().unwrap();
            if steps.len() > 1 {
                steps.pop_front()
            } else {
                steps.front().copied()
            }
        };
        match step.unwrap_or(SensorStep::Fail) {
            SensorStep::Temperature(value) => Ok(reading_at(self.clock.now(), value)),
            SensorStep::Fail => Err(SensorError::Io("i2c bus timeout".to_string())),
            SensorStep::Panic => panic!("scripted sensor panic"),
            SensorStep::Hang => std::future::pending().await,
        }
    }
}

/// Store whose every call fails.
pub struct UnavailableStore;

#[async_trait]
impl ReadingStore for UnavailableStore {
    async fn store_reading(&self, _reading: &Reading) -> Result<(), PersistenceError> {
        Err(PersistenceError::Unavailable("database down".to_string()))
    }

    async fn store_analysis(&self, _analysis: &RealtimeAnalysis) -> Result<(), PersistenceError> {
        Err(PersistenceError::Unavailable("database down".to_string()))
    }

    async fn store_trend(
        &self,
        _summary: &TrendSummary,
        _result: &AnalysisResult,
    ) -> Result<(), PersistenceError> {
        Err(PersistenceError::Unavailable("database down".to_string()))
    }

    async fn get_window(
        &self,
        _now: DateTime<Utc>,
        _lookback: Duration,
    ) -> Result<ReadingWindow, PersistenceError> {
        Err(PersistenceError::Unavailable("database down".to_string()))
    }
}

#[derive(Default)]
pub struct RecordingDashboard {
    pub current: Mutex<Vec<RealtimeAnalysis>>,
    pub trends: Mutex<Vec<TrendSummary>>,
    pub reject: AtomicBool,
    pub closed: AtomicBool,
}

#[async_trait]
impl DashboardSink for RecordingDashboard {
    fn publish_current(&self, analysis: &RealtimeAnalysis) -> Result<(), CollaboratorError> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(CollaboratorError::QueueFull("dashboard"));
        }
        self.current.lock().unwrap().push(analysis.clone());
        Ok(())
    }

    fn publish_trend(
        &self,
        summary: &TrendSummary,
        _result: &AnalysisResult,
    ) -> Result<(), CollaboratorError> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(CollaboratorError::QueueFull("dashboard"));
        }
        self.trends.lock().unwrap().push(summary.clone());
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub batches: Mutex<Vec<Vec<AlertEvent>>>,
}

impl RecordingNotifier {
    pub fn batch_count(&self) -> usize {
        self.batches.lock().unwrap().len()
    }
}

#[async_trait]
impl AlertNotifier for RecordingNotifier {
    async fn notify(&self, alerts: &[AlertEvent]) -> Result<(), CollaboratorError> {
        self.batches.lock().unwrap().push(alerts.to_vec());
        Ok(())
    }
}

/// Replies with a fixed text, fails when `reply` is `None`, optionally after a real delay.
pub struct FixedSemantic {
    pub reply: Option<String>,
    pub delay: Option<Duration>,
    pub contexts: Mutex<Vec<PromptContext>>,
}

impl FixedSemantic {
    pub fn replying(text: &str) -> Self {
        Self {
            reply: Some(text.to_string()),
            delay: None,
            contexts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            delay: None,
            contexts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl SemanticAnalyzer for FixedSemantic {
    async fn summarize(&self, context: &PromptContext) -> Result<String, CollaboratorError> {
        self.contexts.lock().unwrap().push(context.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.reply
            .clone()
            .ok_or_else(|| CollaboratorError::Other("generator offline".to_string()))
    }
}

/// Concrete handles to every fake so tests can inspect them after a run.
pub struct Fakes {
    pub clock: Arc<ManualClock>,
    pub sensor: Arc<ScriptedSensor>,
    pub store: Arc<MemoryStore>,
    pub dashboard: Arc<RecordingDashboard>,
    pub notifier: Arc<RecordingNotifier>,
    pub semantic: Arc<FixedSemantic>,
}

impl Fakes {
    pub fn new(steps: Vec<SensorStep>) -> Self {
        let clock = Arc::new(ManualClock::default());
        Self {
            sensor: Arc::new(ScriptedSensor::new(clock.clone(), steps)),
            clock,
            store: Arc::new(MemoryStore::new()),
            dashboard: Arc::new(RecordingDashboard::default()),
            notifier: Arc::new(RecordingNotifier::default()),
            semantic: Arc::new(FixedSemantic::replying("all good")),
        }
    }

    pub fn with_semantic(mut self, semantic: FixedSemantic) -> Self {
        self.semantic = Arc::new(semantic);
        self
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            sensor: self.sensor.clone(),
            store: self.store.clone(),
            dashboard: self.dashboard.clone(),
            notifier: self.notifier.clone(),
            semantic: self.semantic.clone(),
        }
    }
}
