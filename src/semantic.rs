//! Narrative reports for readings and trends.
//!
//! The pipeline hands a [`PromptContext`] to whichever [`SemanticAnalyzer`] is wired in:
//! a text-generation endpoint when one is configured, otherwise [`RuleBasedAnalyzer`].

use crate::analysis::TrendLabel;
use crate::collaborators::SemanticAnalyzer;
use crate::config::SemanticConfig;
use crate::error::CollaboratorError;
use crate::reading::Reading;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Structured input for one report.
#[derive(Debug, Clone, PartialEq)]
pub enum PromptContext {
    Current(Reading),
    Trend {
        readings: usize,
        temperature: TrendLabel,
        humidity: TrendLabel,
    },
}

impl PromptContext {
    pub fn prompt(&self) -> String {
        match self {
            PromptContext::Current(reading) => current_reading_prompt(reading),
            PromptContext::Trend {
                readings,
                temperature,
                humidity,
            } => trend_prompt(*readings, temperature, humidity),
        }
    }
}

pub fn current_reading_prompt(reading: &Reading) -> String {
    format!(
        "Analyze these environmental sensor readings:\n\
         Temperature: {}°C\n\
         Humidity: {}%\n\
         Pressure: {}hPa\n\
         Gas Resistance: {}Ω\n\
         \n\
         Provide:\n\
         1. Current conditions assessment\n\
         2. Health impact analysis\n\
         3. Recommended actions\n",
        reading.temperature, reading.humidity, reading.pressure, reading.gas_resistance
    )
}

pub fn trend_prompt(readings: usize, temperature: &TrendLabel, humidity: &TrendLabel) -> String {
    format!(
        "Analyze environmental trends over {readings} readings:\n\
         Temperature trend: {temperature}\n\
         Humidity trend: {humidity}\n\
         \n\
         Provide:\n\
         1. Pattern analysis\n\
         2. Potential issues\n\
         3. Long-term recommendations\n"
    )
}

/// Offline commentary built from fixed comfort bands.
#[derive(Debug, Clone, Default)]
pub struct RuleBasedAnalyzer;

const COMFORT_TEMPERATURE_C: (f64, f64) = (18.0, 26.0);
const COMFORT_HUMIDITY_PCT: (f64, f64) = (30.0, 60.0);
// Below this gas resistance the air likely carries elevated VOCs.
const POOR_AIR_GAS_OHMS: f64 = 10_000.0;

impl RuleBasedAnalyzer {
    fn assess_current(reading: &Reading) -> String {
        let mut findings = Vec::new();
        let mut actions = Vec::new();

        let (t_low, t_high) = COMFORT_TEMPERATURE_C;
        if reading.temperature < t_low {
            findings.push(format!("temperature {:.1}°C is cool", reading.temperature));
            actions.push("raise heating");
        } else if reading.temperature > t_high {
            findings.push(format!("temperature {:.1}°C is warm", reading.temperature));
            actions.push("increase cooling or ventilation");
        }

        let (h_low, h_high) = COMFORT_HUMIDITY_PCT;
        if reading.humidity < h_low {
            findings.push(format!("humidity {:.1}% is dry", reading.humidity));
            actions.push("add humidification");
        } else if reading.humidity > h_high {
            findings.push(format!("humidity {:.1}% is damp", reading.humidity));
            actions.push("run dehumidification");
        }

        if reading.gas_resistance < POOR_AIR_GAS_OHMS {
            findings.push(format!(
                "gas resistance {:.0}Ω suggests poor air quality",
                reading.gas_resistance
            ));
            actions.push("ventilate the space");
        }

        if findings.is_empty() {
            return format!(
                "Conditions are comfortable ({:.1}°C, {:.1}% RH, {:.1}hPa). No health concerns. No action needed.",
                reading.temperature, reading.humidity, reading.pressure
            );
        }
        format!(
            "Conditions need attention: {}. Prolonged exposure may affect comfort and health. Recommended: {}.",
            findings.join("; "),
            actions.join(", ")
        )
    }

    fn assess_trend(readings: usize, temperature: &TrendLabel, humidity: &TrendLabel) -> String {
        let mut report = format!(
            "Over {readings} readings temperature is {} and humidity is {}.",
            describe(temperature),
            describe(humidity)
        );
        let strong: Vec<&str> = [("temperature", temperature), ("humidity", humidity)]
            .into_iter()
            .filter(|(_, label)| matches!(label, TrendLabel::Strong(_)))
            .map(|(name, _)| name)
            .collect();
        if strong.is_empty() {
            report.push_str(" No sustained drift detected.");
        } else {
            report.push_str(&format!(
                " Sustained drift in {}; check HVAC settings and enclosure sealing.",
                strong.join(" and ")
            ));
        }
        report
    }
}

fn describe(label: &TrendLabel) -> String {
    match label {
        TrendLabel::InsufficientData => "undetermined (insufficient data)".to_string(),
        other => other.to_string().to_lowercase(),
    }
}

#[async_trait]
impl SemanticAnalyzer for RuleBasedAnalyzer {
    async fn summarize(&self, context: &PromptContext) -> Result<String, CollaboratorError> {
        Ok(match context {
            PromptContext::Current(reading) => Self::assess_current(reading),
            PromptContext::Trend {
                readings,
                temperature,
                humidity,
            } => Self::assess_trend(*readings, temperature, humidity),
        })
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a str,
    max_new_tokens: u32,
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    text: String,
}

/// Sends the rendered prompt to a text-generation HTTP endpoint.
pub struct HttpTextGenerator {
    client: Client,
    url: String,
    max_new_tokens: u32,
    temperature: f64,
}

impl HttpTextGenerator {
    pub fn new(config: &SemanticConfig, url: String, timeout: Duration) -> Result<Self, CollaboratorError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url,
            max_new_tokens: config.max_new_tokens,
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl SemanticAnalyzer for HttpTextGenerator {
    async fn summarize(&self, context: &PromptContext) -> Result<String, CollaboratorError> {
        let prompt = context.prompt();
        let request = GenerateRequest {
            prompt: &prompt,
            max_new_tokens: self.max_new_tokens,
            temperature: self.temperature,
        };
        let response = self.client.post(&self.url).json(&request).send().await?;
        if !response.status().is_success() {
            return Err(CollaboratorError::Status {
                service: "text generator",
                status: response.status().as_u16(),
            });
        }
        let body: GenerateResponse = response.json().await?;
        Ok(body.text.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Direction;
    use chrono::Utc;

    fn reading(temperature: f64, humidity: f64, gas_resistance: f64) -> Reading {
        Reading {
            timestamp: Utc::now(),
            temperature,
            humidity,
            pressure: 1001.5,
            gas_resistance,
        }
    }

    #[test]
    fn current_prompt_lists_every_metric_with_units() {
        let prompt = current_reading_prompt(&reading(22.5, 41.0, 15_000.0));
        assert!(prompt.contains("Temperature: 22.5°C"));
        assert!(prompt.contains("Humidity: 41%"));
        assert!(prompt.contains("Pressure: 1001.5hPa"));
        assert!(prompt.contains("Gas Resistance: 15000Ω"));
        assert!(prompt.contains("3. Recommended actions"));
    }

    #[test]
    fn trend_prompt_carries_labels() {
        let prompt = trend_prompt(
            48,
            &TrendLabel::Strong(Direction::Increasing),
            &TrendLabel::Stable,
        );
        assert!(prompt.starts_with("Analyze environmental trends over 48 readings:"));
        assert!(prompt.contains("Temperature trend: Strong Increasing"));
        assert!(prompt.contains("Humidity trend: Stable"));
    }

    #[tokio::test]
    async fn rule_based_report_for_comfortable_room() {
        let report = RuleBasedAnalyzer
            .summarize(&PromptContext::Current(reading(22.0, 45.0, 30_000.0)))
            .await
            .expect("report");
        assert!(report.starts_with("Conditions are comfortable"));
    }

    #[tokio::test]
    async fn rule_based_report_names_each_problem() {
        let report = RuleBasedAnalyzer
            .summarize(&PromptContext::Current(reading(29.0, 75.0, 4_000.0)))
            .await
            .expect("report");
        assert!(report.contains("temperature 29.0°C is warm"));
        assert!(report.contains("humidity 75.0% is damp"));
        assert!(report.contains("poor air quality"));
        assert!(report.contains("ventilate the space"));
    }

    #[tokio::test]
    async fn rule_based_trend_flags_strong_drift() {
        let context = PromptContext::Trend {
            readings: 24,
            temperature: TrendLabel::Strong(Direction::Decreasing),
            humidity: TrendLabel::InsufficientData,
        };
        let report = RuleBasedAnalyzer.summarize(&context).await.expect("report");
        assert!(report.contains("temperature is strong decreasing"));
        assert!(report.contains("humidity is undetermined"));
        assert!(report.contains("Sustained drift in temperature;"));
    }
}
