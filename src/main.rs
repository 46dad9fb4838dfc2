use anyhow::{Context, Result};
use env_monitor::collaborators::{
    AlertNotifier, Collaborators, DashboardSink, SemanticAnalyzer,
};
use env_monitor::config::Config;
use env_monitor::dashboard::{HttpDashboard, NoopDashboard};
use env_monitor::notifier::{LogNotifier, WebhookNotifier};
use env_monitor::scheduler::{Clock, Scheduler, SystemClock};
use env_monitor::semantic::{HttpTextGenerator, RuleBasedAnalyzer};
use env_monitor::sensor::SimulatedSensor;
use env_monitor::stages::Pipeline;
use env_monitor::store;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn init_tracing(config: &Config) -> Result<()> {
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::{runtime::Tokio, trace::Config as OTelTraceConfig, Resource};
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,env_monitor=info".into());
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);

    if let Some(endpoint) = &config.otlp_endpoint {
        let exporter = opentelemetry_otlp::new_exporter()
            .http()
            .with_endpoint(endpoint.as_str());
        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(exporter)
            .with_trace_config(OTelTraceConfig::default().with_resource(Resource::new(vec![
                KeyValue::new("service.name", "env-monitor"),
            ])))
            .install_batch(Tokio)?;

        let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .with(otel_layer)
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;
    }

    Ok(())
}

async fn build_collaborators(config: &Config, clock: Arc<dyn Clock>) -> Result<Collaborators> {
    let timeout = config.collaborator_timeout;

    let store = store::connect(&config.store)
        .await
        .context("failed to open reading store")?;

    let dashboard: Arc<dyn DashboardSink> = match config.dashboard.url.clone() {
        Some(url) => {
            tracing::info!(%url, uid = %config.dashboard.dashboard_uid, "publishing to dashboard");
            Arc::new(HttpDashboard::spawn(&config.dashboard, url, timeout)?)
        }
        None => Arc::new(NoopDashboard),
    };

    let notifier: Arc<dyn AlertNotifier> = match config.notifier.webhook_url.clone() {
        Some(url) => Arc::new(WebhookNotifier::new(url, timeout)?),
        None => Arc::new(LogNotifier),
    };

    let semantic: Arc<dyn SemanticAnalyzer> = match config.semantic.url.clone() {
        Some(url) => {
            tracing::info!(%url, "using text generator for reports");
            Arc::new(HttpTextGenerator::new(&config.semantic, url, timeout)?)
        }
        None => Arc::new(RuleBasedAnalyzer),
    };

    Ok(Collaborators {
        sensor: Arc::new(SimulatedSensor::new(&config.sensor, clock)),
        store,
        dashboard,
        notifier,
        semantic,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    init_tracing(&config)?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let collaborators = build_collaborators(&config, clock.clone()).await?;
    let pipeline = Pipeline::new(collaborators, &config);
    let mut scheduler = Scheduler::new(config.intervals, config.retry_backoff, pipeline, clock);

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for shutdown signal");
            return;
        }
        tracing::info!("shutdown signal received");
        signal_cancel.cancel();
    });

    scheduler.run(cancel).await;
    scheduler.pipeline().shutdown().await;
    tracing::info!("env-monitor stopped");
    Ok(())
}
