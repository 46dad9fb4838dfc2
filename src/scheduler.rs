use crate::collaborators::{RealtimeAnalysis, TrendSummary};
use crate::config::MonitorIntervals;
use crate::reading::Reading;
use crate::stages::{Pipeline, StageOutcome};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Source of "now" and of the pause between ticks.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    async fn sleep(&self, duration: Duration);
}

pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Last-run timestamps. Only the scheduling loop touches these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleState {
    pub last_reading_run: DateTime<Utc>,
    pub last_analysis_run: DateTime<Utc>,
    pub last_trend_run: DateTime<Utc>,
    pub last_alert_notification: Option<DateTime<Utc>>,
}

impl ScheduleState {
    pub fn starting_at(now: DateTime<Utc>) -> Self {
        Self {
            last_reading_run: now,
            last_analysis_run: now,
            last_trend_run: now,
            last_alert_notification: None,
        }
    }

    fn alert_notification_due(&self, now: DateTime<Utc>, interval: Duration) -> bool {
        self.last_alert_notification
            .map_or(true, |last| is_due(now, last, interval))
    }
}

fn is_due(now: DateTime<Utc>, last: DateTime<Utc>, interval: Duration) -> bool {
    now.signed_duration_since(last)
        .to_std()
        .map_or(false, |elapsed| elapsed >= interval)
}

/// What one tick did; `None` means the stage was not due.
#[derive(Debug)]
pub struct TickReport {
    pub at: DateTime<Utc>,
    pub reading: StageOutcome<Reading>,
    pub alerts: usize,
    pub notified: bool,
    pub analysis: Option<StageOutcome<RealtimeAnalysis>>,
    pub trend: Option<StageOutcome<TrendSummary>>,
}

impl TickReport {
    fn log(&self) {
        tracing::debug!(
            at = %self.at,
            reading = self.reading.label(),
            alerts = self.alerts,
            notified = self.notified,
            analysis = self.analysis.as_ref().map_or("not due", StageOutcome::label),
            trend = self.trend.as_ref().map_or("not due", StageOutcome::label),
            "monitor tick finished"
        );
    }
}

pub struct Scheduler {
    intervals: MonitorIntervals,
    retry_backoff: Duration,
    pipeline: Pipeline,
    clock: Arc<dyn Clock>,
    state: ScheduleState,
}

impl Scheduler {
    pub fn new(
        intervals: MonitorIntervals,
        retry_backoff: Duration,
        pipeline: Pipeline,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let state = ScheduleState::starting_at(clock.now());
        Self {
            intervals,
            retry_backoff,
            pipeline,
            clock,
            state,
        }
    }

    pub fn state(&self) -> &ScheduleState {
        &self.state
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Acquisition always runs; analysis and trend run once their interval has elapsed.
    ///
    /// A stage's last-run timestamp moves to the tick time after it runs, whether or not it
    /// succeeded, so a failing stage waits a full interval before its next attempt.
    pub async fn tick(&mut self) -> TickReport {
        let now = self.clock.now();

        let notify_due = self
            .state
            .alert_notification_due(now, self.intervals.alert_check);
        let acquisition = self.pipeline.acquire_reading(notify_due).await;
        self.state.last_reading_run = now;
        if acquisition.notified {
            self.state.last_alert_notification = Some(now);
        }

        let analysis = if is_due(now, self.state.last_analysis_run, self.intervals.analysis) {
            let outcome = self
                .pipeline
                .realtime_analysis(now, acquisition.outcome.completed())
                .await;
            self.state.last_analysis_run = now;
            Some(outcome)
        } else {
            None
        };

        let trend = if is_due(now, self.state.last_trend_run, self.intervals.trend) {
            let outcome = self.pipeline.trend_analysis(now).await;
            self.state.last_trend_run = now;
            Some(outcome)
        } else {
            None
        };

        TickReport {
            at: now,
            reading: acquisition.outcome,
            alerts: acquisition.alerts,
            notified: acquisition.notified,
            analysis,
            trend,
        }
    }

    /// Ticks until `cancel` fires. A panicking tick is logged and retried after the backoff.
    pub async fn run(&mut self, cancel: CancellationToken) {
        let clock = self.clock.clone();
        let tick_interval = self.intervals.reading;
        let retry_backoff = self.retry_backoff;
        tracing::info!(
            reading_secs = self.intervals.reading.as_secs(),
            analysis_secs = self.intervals.analysis.as_secs(),
            trend_secs = self.intervals.trend.as_secs(),
            "monitor loop started"
        );

        while !cancel.is_cancelled() {
            let pause = tokio::select! {
                _ = cancel.cancelled() => break,
                outcome = AssertUnwindSafe(self.tick()).catch_unwind() => match outcome {
                    Ok(report) => {
                        report.log();
                        tick_interval
                    }
                    Err(panic) => {
                        tracing::error!(
                            panic = %panic_message(panic.as_ref()),
                            backoff_secs = retry_backoff.as_secs(),
                            "monitor tick panicked; backing off"
                        );
                        retry_backoff
                    }
                },
            };
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = clock.sleep(pause) => {}
            }
        }
        tracing::info!("monitor loop stopped");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        return (*message).to_string();
    }
    if let Some(message) = panic.downcast_ref::<String>() {
        return message.clone();
    }
    "unknown panic".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::test_support::{Fakes, SensorStep};

    const MINUTE: Duration = Duration::from_secs(60);

    fn scheduler(fakes: &Fakes, intervals: MonitorIntervals) -> Scheduler {
        let config = Config::default();
        let pipeline = Pipeline::new(fakes.collaborators(), &config);
        Scheduler::new(intervals, config.retry_backoff, pipeline, fakes.clock.clone())
    }

    fn intervals(analysis_secs: u64, trend_secs: u64, alert_check_secs: u64) -> MonitorIntervals {
        MonitorIntervals {
            reading: MINUTE,
            analysis: Duration::from_secs(analysis_secs),
            trend: Duration::from_secs(trend_secs),
            alert_check: Duration::from_secs(alert_check_secs),
        }
    }

    #[tokio::test]
    async fn analysis_fires_on_fifth_minute_tick_and_resets() {
        let fakes = Fakes::new(vec![SensorStep::Temperature(22.0)]);
        let mut scheduler = scheduler(&fakes, intervals(300, 3600, 60));

        let mut fired_on = Vec::new();
        for tick in 1..=10 {
            fakes.clock.advance(MINUTE);
            let report = scheduler.tick().await;
            if let Some(outcome) = report.analysis {
                assert!(outcome.completed().is_some());
                fired_on.push(tick);
            }
        }
        assert_eq!(fired_on, vec![5, 10]);
        assert_eq!(fakes.store.analyses().len(), 2);
        assert_eq!(fakes.store.readings().len(), 10);
    }

    #[tokio::test]
    async fn trend_runs_on_its_own_interval() {
        let fakes = Fakes::new(vec![SensorStep::Temperature(22.0)]);
        let mut scheduler = scheduler(&fakes, intervals(3600, 180, 60));

        let mut fired_on = Vec::new();
        for tick in 1..=6 {
            fakes.clock.advance(MINUTE);
            if scheduler.tick().await.trend.is_some() {
                fired_on.push(tick);
            }
        }
        assert_eq!(fired_on, vec![3, 6]);
        let trends = fakes.store.trends();
        assert_eq!(trends.len(), 2);
        assert_eq!(trends[0].0.readings, 3);
        assert_eq!(trends[1].0.readings, 6);
    }

    #[tokio::test]
    async fn failed_stage_still_advances_its_timer() {
        let fakes = Fakes::new(vec![SensorStep::Fail]);
        let mut scheduler = scheduler(&fakes, intervals(3600, 120, 60));

        fakes.clock.advance(MINUTE);
        assert!(scheduler.tick().await.trend.is_none());
        fakes.clock.advance(MINUTE);
        let report = scheduler.tick().await;
        assert!(matches!(report.trend, Some(StageOutcome::Failed(_))));
        assert_eq!(scheduler.state().last_trend_run, fakes.clock.now());
        fakes.clock.advance(MINUTE);
        assert!(scheduler.tick().await.trend.is_none());
    }

    #[tokio::test]
    async fn alerts_are_rate_limited_by_check_interval() {
        let fakes = Fakes::new(vec![SensorStep::Temperature(35.0)]);
        let mut scheduler = scheduler(&fakes, intervals(3600, 3600, 180));

        let mut notified_on = Vec::new();
        for tick in 1..=7 {
            fakes.clock.advance(MINUTE);
            let report = scheduler.tick().await;
            assert_eq!(report.alerts, 1);
            if report.notified {
                notified_on.push(tick);
            }
        }
        assert_eq!(notified_on, vec![1, 4, 7]);
        assert_eq!(fakes.notifier.batch_count(), 3);
    }

    #[tokio::test]
    async fn failing_sensor_keeps_looping_until_cancelled() {
        let fakes = Fakes::new(vec![SensorStep::Fail]);
        let mut scheduler = scheduler(&fakes, MonitorIntervals::default());
        let cancel = CancellationToken::new();
        fakes.clock.cancel_after(25, cancel.clone());

        scheduler.run(cancel).await;

        assert_eq!(fakes.sensor.reads(), 25);
        assert!(fakes.clock.sleeps().iter().all(|pause| *pause == MINUTE));
        assert!(fakes.store.readings().is_empty());
    }

    #[tokio::test]
    async fn panicking_tick_backs_off_then_resumes() {
        let fakes = Fakes::new(vec![SensorStep::Panic, SensorStep::Temperature(22.0)]);
        let mut scheduler = scheduler(&fakes, MonitorIntervals::default());
        let cancel = CancellationToken::new();
        fakes.clock.cancel_after(3, cancel.clone());

        scheduler.run(cancel).await;

        assert_eq!(
            fakes.clock.sleeps(),
            vec![Duration::from_secs(5), MINUTE, MINUTE]
        );
        assert_eq!(fakes.store.readings().len(), 2);
    }

    /// Cancels `cancel` once `ready` holds, polling alongside the scheduler.
    async fn cancel_when(cancel: CancellationToken, ready: impl Fn() -> bool) {
        while !ready() {
            tokio::task::yield_now().await;
        }
        cancel.cancel();
    }

    #[tokio::test]
    async fn cancel_drops_tick_blocked_on_sensor() {
        let fakes = Fakes::new(vec![SensorStep::Hang]);
        let mut scheduler = scheduler(&fakes, MonitorIntervals::default());
        let cancel = CancellationToken::new();

        let sensor = fakes.sensor.clone();
        tokio::join!(
            scheduler.run(cancel.clone()),
            cancel_when(cancel, move || sensor.reads() == 1),
        );

        assert_eq!(fakes.sensor.reads(), 1);
        assert!(fakes.store.readings().is_empty());
        assert!(fakes.clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn cancel_interrupts_pending_sleep() {
        let fakes = Fakes::new(vec![SensorStep::Temperature(22.0)]);
        fakes.clock.hold_sleeps();
        let mut scheduler = scheduler(&fakes, MonitorIntervals::default());
        let cancel = CancellationToken::new();

        let clock = fakes.clock.clone();
        tokio::join!(
            scheduler.run(cancel.clone()),
            cancel_when(cancel, move || clock.sleeps().len() == 1),
        );

        assert_eq!(fakes.sensor.reads(), 1);
        assert_eq!(fakes.store.readings().len(), 1);
        assert_eq!(fakes.clock.sleeps(), vec![MINUTE]);
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_any_work() {
        let fakes = Fakes::new(vec![SensorStep::Temperature(22.0)]);
        let mut scheduler = scheduler(&fakes, MonitorIntervals::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        scheduler.run(cancel).await;

        assert_eq!(fakes.sensor.reads(), 0);
        assert!(fakes.clock.sleeps().is_empty());
    }
}
