use crate::analysis::AnalysisResult;
use crate::collaborators::{DashboardSink, RealtimeAnalysis, TrendSummary};
use crate::config::DashboardConfig;
use crate::error::CollaboratorError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

const SERVICE: &str = "dashboard";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PanelKind {
    Current,
    Trend,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardUpdate {
    pub dashboard_uid: String,
    pub kind: PanelKind,
    pub data: JsonValue,
}

/// Pushes panel updates to an HTTP dashboard endpoint from a background task.
///
/// `publish_*` only enqueue; a full queue drops the update and reports `QueueFull`.
pub struct HttpDashboard {
    dashboard_uid: String,
    tx: Mutex<Option<mpsc::Sender<DashboardUpdate>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl HttpDashboard {
    pub fn spawn(config: &DashboardConfig, url: String, timeout: Duration) -> Result<Self, CollaboratorError> {
        let client = Client::builder().timeout(timeout).build()?;
        let (tx, rx) = mpsc::channel(config.queue.max(1));
        let token = config.token.clone();
        let worker = tokio::spawn(async move {
            run_publisher(rx, client, url, token).await;
        });
        Ok(Self {
            dashboard_uid: config.dashboard_uid.clone(),
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        })
    }

    fn enqueue(&self, kind: PanelKind, data: JsonValue) -> Result<(), CollaboratorError> {
        let guard = self
            .tx
            .lock()
            .map_err(|_| CollaboratorError::Other("dashboard queue lock poisoned".to_string()))?;
        let Some(tx) = guard.as_ref() else {
            return Err(CollaboratorError::Closed(SERVICE));
        };
        let update = DashboardUpdate {
            dashboard_uid: self.dashboard_uid.clone(),
            kind,
            data,
        };
        tx.try_send(update).map_err(|err| match err {
            TrySendError::Full(_) => CollaboratorError::QueueFull(SERVICE),
            TrySendError::Closed(_) => CollaboratorError::Closed(SERVICE),
        })
    }
}

#[async_trait]
impl DashboardSink for HttpDashboard {
    fn publish_current(&self, analysis: &RealtimeAnalysis) -> Result<(), CollaboratorError> {
        let data = serde_json::to_value(analysis).map_err(|err| CollaboratorError::Other(err.to_string()))?;
        self.enqueue(PanelKind::Current, data)
    }

    fn publish_trend(
        &self,
        summary: &TrendSummary,
        result: &AnalysisResult,
    ) -> Result<(), CollaboratorError> {
        let data = json!({ "summary": summary, "result": result });
        self.enqueue(PanelKind::Trend, data)
    }

    async fn close(&self) {
        if let Ok(mut guard) = self.tx.lock() {
            guard.take();
        }
        let worker = self.worker.lock().ok().and_then(|mut guard| guard.take());
        if let Some(worker) = worker {
            if let Err(err) = worker.await {
                tracing::warn!(error = %err, "dashboard publisher task failed");
            }
        }
    }
}

async fn run_publisher(
    mut rx: mpsc::Receiver<DashboardUpdate>,
    client: Client,
    url: String,
    token: Option<String>,
) {
    while let Some(update) = rx.recv().await {
        if let Err(err) = push_update(&client, &url, token.as_deref(), &update).await {
            tracing::warn!(error = %err, kind = ?update.kind, "dashboard update failed");
        }
    }
    tracing::debug!("dashboard publisher drained");
}

async fn push_update(
    client: &Client,
    url: &str,
    token: Option<&str>,
    update: &DashboardUpdate,
) -> Result<(), CollaboratorError> {
    let mut request = client.post(url).json(update);
    if let Some(token) = token {
        request = request.bearer_auth(token);
    }
    let response = request.send().await?;
    if !response.status().is_success() {
        return Err(CollaboratorError::Status {
            service: SERVICE,
            status: response.status().as_u16(),
        });
    }
    Ok(())
}

/// Used when no dashboard is configured.
pub struct NoopDashboard;

#[async_trait]
impl DashboardSink for NoopDashboard {
    fn publish_current(&self, analysis: &RealtimeAnalysis) -> Result<(), CollaboratorError> {
        tracing::debug!(id = %analysis.id, "no dashboard configured; skipping current panel");
        Ok(())
    }

    fn publish_trend(
        &self,
        summary: &TrendSummary,
        _result: &AnalysisResult,
    ) -> Result<(), CollaboratorError> {
        tracing::debug!(id = %summary.id, "no dashboard configured; skipping trend panel");
        Ok(())
    }
}
