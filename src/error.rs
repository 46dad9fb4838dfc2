use crate::reading::Metric;
use chrono::{DateTime, Utc};
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum SensorError {
    #[error("sensor I/O failure: {0}")]
    Io(String),

    #[error("sensor returned an invalid sample: {0}")]
    InvalidSample(String),
}

#[derive(thiserror::Error, Debug)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("cannot analyze an empty reading window")]
    EmptyWindow,

    #[error("reading at {timestamp} has no usable {metric} value")]
    MissingMetric {
        metric: Metric,
        timestamp: DateTime<Utc>,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum CollaboratorError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{service} returned HTTP {status}")]
    Status { service: &'static str, status: u16 },

    #[error("{0} queue is full")]
    QueueFull(&'static str),

    #[error("{0} is closed")]
    Closed(&'static str),

    #[error("{call} timed out after {elapsed:?}")]
    Timeout {
        call: &'static str,
        elapsed: Duration,
    },

    #[error("{0}")]
    Other(String),
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be a positive number of seconds")]
    NonPositiveInterval { name: &'static str },

    #[error("threshold for {metric} must satisfy min < max (got min={min}, max={max})")]
    InvalidBounds { metric: Metric, min: f64, max: f64 },

    #[error("unknown threshold metric '{0}'")]
    UnknownMetric(String),

    #[error("anomaly contamination must be in (0, 0.5], got {0}")]
    InvalidContamination(f64),

    #[error("anomaly forest needs at least one tree")]
    NoTrees,
}

/// Anything a pipeline stage can fail with. Stages never let this escape; it is
/// carried in `StageOutcome::Failed` for the scheduler to report.
#[derive(thiserror::Error, Debug)]
pub enum MonitorError {
    #[error(transparent)]
    Sensor(#[from] SensorError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
}

impl MonitorError {
    pub fn kind(&self) -> &'static str {
        match self {
            MonitorError::Sensor(_) => "sensor",
            MonitorError::Persistence(_) => "persistence",
            MonitorError::Analysis(_) => "analysis",
            MonitorError::Collaborator(_) => "collaborator",
        }
    }
}
