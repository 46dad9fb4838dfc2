use crate::analysis::ForestConfig;
use crate::error::ConfigError;
use crate::thresholds::{Bounds, ThresholdTable};
use anyhow::{anyhow, Context, Result};
use dotenvy::dotenv;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_SETUP_CONFIG_PATH: &str = "/etc/env-monitor/config.json";

fn setup_config_path() -> PathBuf {
    env_optional("MONITOR_SETUP_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SETUP_CONFIG_PATH))
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SetupConfigOverrides {
    #[serde(default)]
    database_url: Option<String>,
    #[serde(default)]
    dashboard_url: Option<String>,
    #[serde(default)]
    llm_url: Option<String>,
    #[serde(default)]
    alert_webhook_url: Option<String>,
    #[serde(default)]
    reading_interval_secs: Option<u64>,
    #[serde(default)]
    analysis_interval_secs: Option<u64>,
    #[serde(default)]
    trend_interval_secs: Option<u64>,
    #[serde(default)]
    alert_check_interval_secs: Option<u64>,
    #[serde(default)]
    trend_lookback_hours: Option<u64>,
    #[serde(default)]
    thresholds: Option<BTreeMap<String, Bounds>>,
}

/// A missing setup file means "no overrides"; one that exists but cannot be read or
/// parsed stops startup.
fn load_setup_config_overrides(path: &Path) -> Result<Option<SetupConfigOverrides>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read setup config {}", path.display()))?;
    let overrides = parse_setup_config(contents)
        .with_context(|| format!("invalid setup config {}", path.display()))?;
    Ok(Some(overrides))
}

fn parse_setup_config(contents: String) -> Result<SetupConfigOverrides> {
    let mut bytes = contents.into_bytes();
    Ok(simd_json::serde::from_slice(&mut bytes)?)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorIntervals {
    pub reading: Duration,
    pub analysis: Duration,
    pub trend: Duration,
    pub alert_check: Duration,
}

impl Default for MonitorIntervals {
    fn default() -> Self {
        Self {
            reading: Duration::from_secs(60),
            analysis: Duration::from_secs(300),
            trend: Duration::from_secs(3600),
            alert_check: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorConfig {
    pub temperature_offset: f64,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    pub database_url: Option<String>,
    pub pool_size: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardConfig {
    pub url: Option<String>,
    pub token: Option<String>,
    pub dashboard_uid: String,
    pub queue: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SemanticConfig {
    pub url: Option<String>,
    pub max_new_tokens: u32,
    pub temperature: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotifierConfig {
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub intervals: MonitorIntervals,
    pub retry_backoff: Duration,
    pub trend_lookback: Duration,
    pub collaborator_timeout: Duration,
    pub thresholds: ThresholdTable,
    pub forest: ForestConfig,
    pub sensor: SensorConfig,
    pub store: StoreConfig,
    pub dashboard: DashboardConfig,
    pub semantic: SemanticConfig,
    pub notifier: NotifierConfig,
    /// OTLP/HTTP traces URL, already ending in `/v1/traces`.
    pub otlp_endpoint: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            intervals: MonitorIntervals::default(),
            retry_backoff: Duration::from_secs(5),
            trend_lookback: Duration::from_secs(24 * 3600),
            collaborator_timeout: Duration::from_secs(30),
            thresholds: ThresholdTable::default(),
            forest: ForestConfig::default(),
            sensor: SensorConfig::default(),
            store: StoreConfig {
                database_url: None,
                pool_size: 5,
            },
            dashboard: DashboardConfig {
                url: None,
                token: None,
                dashboard_uid: "bme680_analysis".to_string(),
                queue: 64,
            },
            semantic: SemanticConfig {
                url: None,
                max_new_tokens: 128,
                temperature: 0.7,
            },
            notifier: NotifierConfig::default(),
            otlp_endpoint: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let overrides = load_setup_config_overrides(&setup_config_path())?.unwrap_or_default();
        let defaults = Self::default();

        let intervals = MonitorIntervals {
            reading: secs_setting(
                "MONITOR_READING_INTERVAL_SECS",
                overrides.reading_interval_secs,
                defaults.intervals.reading,
            )?,
            analysis: secs_setting(
                "MONITOR_ANALYSIS_INTERVAL_SECS",
                overrides.analysis_interval_secs,
                defaults.intervals.analysis,
            )?,
            trend: secs_setting(
                "MONITOR_TREND_INTERVAL_SECS",
                overrides.trend_interval_secs,
                defaults.intervals.trend,
            )?,
            alert_check: secs_setting(
                "MONITOR_ALERT_CHECK_INTERVAL_SECS",
                overrides.alert_check_interval_secs,
                defaults.intervals.alert_check,
            )?,
        };

        let retry_backoff = secs_setting("MONITOR_RETRY_BACKOFF_SECS", None, defaults.retry_backoff)?;
        let lookback_hours = env_u64(
            "MONITOR_TREND_LOOKBACK_HOURS",
            Some(overrides.trend_lookback_hours.unwrap_or(24)),
        )?;
        let collaborator_timeout = secs_setting(
            "MONITOR_COLLABORATOR_TIMEOUT_SECS",
            None,
            defaults.collaborator_timeout,
        )?;

        let thresholds = match overrides.thresholds.clone() {
            Some(named) => ThresholdTable::from_named(named)?,
            None => defaults.thresholds.clone(),
        };

        let forest = ForestConfig {
            trees: env_usize("MONITOR_ANOMALY_TREES", defaults.forest.trees)?,
            contamination: env_f64(
                "MONITOR_ANOMALY_CONTAMINATION",
                Some(defaults.forest.contamination),
            )?,
            seed: env_u64("MONITOR_ANOMALY_SEED", Some(defaults.forest.seed))?,
        };

        let sensor = SensorConfig {
            temperature_offset: env_f64("MONITOR_SENSOR_TEMPERATURE_OFFSET", Some(0.0))?,
            seed: match env_optional("MONITOR_SENSOR_SEED") {
                Some(raw) => Some(raw.parse::<u64>().context("invalid MONITOR_SENSOR_SEED")?),
                None => None,
            },
        };

        let store = StoreConfig {
            database_url: env_optional("MONITOR_DATABASE_URL")
                .or_else(|| env_optional("DATABASE_URL"))
                .or_else(|| non_blank(overrides.database_url.as_deref()))
                .map(normalize_database_url),
            pool_size: env_u32("MONITOR_DB_POOL_SIZE", defaults.store.pool_size)?,
        };

        let dashboard = DashboardConfig {
            url: env_optional("MONITOR_DASHBOARD_URL")
                .or_else(|| non_blank(overrides.dashboard_url.as_deref())),
            token: env_optional("MONITOR_DASHBOARD_TOKEN"),
            dashboard_uid: env_string(
                "MONITOR_DASHBOARD_UID",
                Some(defaults.dashboard.dashboard_uid.clone()),
            )?,
            queue: env_usize("MONITOR_DASHBOARD_QUEUE", defaults.dashboard.queue)?,
        };

        let semantic = SemanticConfig {
            url: env_optional("MONITOR_LLM_URL").or_else(|| non_blank(overrides.llm_url.as_deref())),
            max_new_tokens: env_u32("MONITOR_LLM_MAX_TOKENS", defaults.semantic.max_new_tokens)?,
            temperature: env_f64("MONITOR_LLM_TEMPERATURE", Some(defaults.semantic.temperature))?,
        };

        let notifier = NotifierConfig {
            webhook_url: env_optional("MONITOR_ALERT_WEBHOOK_URL")
                .or_else(|| non_blank(overrides.alert_webhook_url.as_deref())),
        };

        let config = Self {
            intervals,
            retry_backoff,
            trend_lookback: Duration::from_secs(lookback_hours.saturating_mul(3600)),
            collaborator_timeout,
            thresholds,
            forest,
            sensor,
            store,
            dashboard,
            semantic,
            notifier,
            otlp_endpoint: env_optional("OTEL_EXPORTER_OTLP_ENDPOINT")
                .map(|endpoint| otlp_traces_endpoint(&endpoint)),
        };
        config.validate()?;
        Ok(config)
    }

    /// Startup checks; anything rejected here stops the process before the loop runs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let named = [
            ("reading interval", self.intervals.reading),
            ("analysis interval", self.intervals.analysis),
            ("trend interval", self.intervals.trend),
            ("alert check interval", self.intervals.alert_check),
            ("retry backoff", self.retry_backoff),
            ("trend lookback", self.trend_lookback),
            ("collaborator timeout", self.collaborator_timeout),
        ];
        for (name, value) in named {
            if value.is_zero() {
                return Err(ConfigError::NonPositiveInterval { name });
            }
        }
        let contamination = self.forest.contamination;
        if !(contamination > 0.0 && contamination <= 0.5) {
            return Err(ConfigError::InvalidContamination(contamination));
        }
        if self.forest.trees == 0 {
            return Err(ConfigError::NoTrees);
        }
        Ok(())
    }
}

fn secs_setting(key: &str, file_value: Option<u64>, default: Duration) -> Result<Duration> {
    let secs = env_u64(key, Some(file_value.unwrap_or(default.as_secs())))?;
    Ok(Duration::from_secs(secs))
}

fn env_string(key: &str, default: Option<String>) -> Result<String> {
    match env::var(key) {
        Ok(value) => Ok(value.trim().to_string()),
        Err(_) => default.ok_or_else(|| anyhow!("missing env var {key}")),
    }
}

fn env_u64(key: &str, default: Option<u64>) -> Result<u64> {
    match env_optional(key) {
        Some(value) => value.parse::<u64>().with_context(|| format!("invalid {key}")),
        None => default.ok_or_else(|| anyhow!("missing env var {key}")),
    }
}

fn env_u32(key: &str, default: u32) -> Result<u32> {
    let value = env_u64(key, Some(u64::from(default)))?;
    u32::try_from(value).with_context(|| format!("{key} is out of range: {value}"))
}

fn env_usize(key: &str, default: usize) -> Result<usize> {
    let value = env_u64(key, Some(u64::try_from(default).unwrap_or(u64::MAX)))?;
    usize::try_from(value).with_context(|| format!("{key} is out of range: {value}"))
}

fn env_f64(key: &str, default: Option<f64>) -> Result<f64> {
    match env_optional(key) {
        Some(value) => value.parse::<f64>().with_context(|| format!("invalid {key}")),
        None => default.ok_or_else(|| anyhow!("missing env var {key}")),
    }
}

fn env_optional(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// The HTTP exporter wants the full traces path; collectors are usually configured by base URL.
fn otlp_traces_endpoint(endpoint: &str) -> String {
    if endpoint.contains("/v1/traces") {
        return endpoint.to_string();
    }
    format!("{}/v1/traces", endpoint.trim_end_matches('/'))
}

fn normalize_database_url(url: String) -> String {
    if let Some(stripped) = url.strip_prefix("postgresql+psycopg://") {
        return format!("postgresql://{stripped}");
    }
    if let Some(stripped) = url.strip_prefix("postgresql+asyncpg://") {
        return format!("postgresql://{stripped}");
    }
    url
}
