use crate::collaborators::AlertNotifier;
use crate::error::CollaboratorError;
use crate::thresholds::AlertEvent;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

/// Writes each alert to the log at warn level.
pub struct LogNotifier;

#[async_trait]
impl AlertNotifier for LogNotifier {
    async fn notify(&self, alerts: &[AlertEvent]) -> Result<(), CollaboratorError> {
        for alert in alerts {
            tracing::warn!(
                metric = %alert.metric,
                value = alert.value,
                min = alert.bound.min,
                max = alert.bound.max,
                violated = %alert.violated,
                "threshold alert: {alert}"
            );
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    summary: String,
    alerts: &'a [AlertEvent],
}

/// Posts alert batches as JSON to a webhook (chat relay, mail gateway, pager).
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: String, timeout: Duration) -> Result<Self, CollaboratorError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl AlertNotifier for WebhookNotifier {
    async fn notify(&self, alerts: &[AlertEvent]) -> Result<(), CollaboratorError> {
        if alerts.is_empty() {
            return Ok(());
        }
        let payload = WebhookPayload {
            summary: summarize(alerts),
            alerts,
        };
        let response = self.client.post(&self.url).json(&payload).send().await?;
        if !response.status().is_success() {
            return Err(CollaboratorError::Status {
                service: "alert webhook",
                status: response.status().as_u16(),
            });
        }
        tracing::info!(count = alerts.len(), "alert webhook delivered");
        Ok(())
    }
}

/// One-line subject for a batch of alerts.
pub fn summarize(alerts: &[AlertEvent]) -> String {
    let parts: Vec<String> = alerts.iter().map(ToString::to_string).collect();
    format!("Environmental alert ({}): {}", alerts.len(), parts.join("; "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::Metric;
    use crate::thresholds::{Bounds, Violation};
    use chrono::Utc;

    #[test]
    fn summary_lists_every_alert() {
        let alerts = vec![
            AlertEvent {
                metric: Metric::Temperature,
                value: 35.0,
                bound: Bounds { min: 18.0, max: 30.0 },
                violated: Violation::Above,
                timestamp: Utc::now(),
            },
            AlertEvent {
                metric: Metric::Humidity,
                value: 20.0,
                bound: Bounds { min: 30.0, max: 70.0 },
                violated: Violation::Below,
                timestamp: Utc::now(),
            },
        ];
        assert_eq!(
            summarize(&alerts),
            "Environmental alert (2): temperature 35°C is above limit 30°C; humidity 20% is below limit 30%"
        );
    }
}
