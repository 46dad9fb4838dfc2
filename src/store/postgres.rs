use super::window_start;
use crate::analysis::AnalysisResult;
use crate::collaborators::{ReadingStore, RealtimeAnalysis, TrendSummary};
use crate::error::PersistenceError;
use crate::reading::{Reading, ReadingWindow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json as SqlJson;
use sqlx::{FromRow, PgPool};
use std::time::Duration;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS readings (
        ts timestamptz not null primary key,
        temperature double precision not null,
        humidity double precision not null,
        pressure double precision not null,
        gas_resistance double precision not null
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS realtime_analyses (
        id uuid primary key,
        ts timestamptz not null,
        report text not null,
        reading jsonb not null
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS trend_analyses (
        id uuid primary key,
        ts timestamptz not null,
        window_start timestamptz not null,
        window_end timestamptz not null,
        readings bigint not null,
        report text null,
        result jsonb not null
    )
    "#,
];

#[derive(Debug, FromRow)]
struct ReadingRow {
    ts: DateTime<Utc>,
    temperature: f64,
    humidity: f64,
    pressure: f64,
    gas_resistance: f64,
}

impl From<ReadingRow> for Reading {
    fn from(row: ReadingRow) -> Self {
        Reading {
            timestamp: row.ts,
            temperature: row.temperature,
            humidity: row.humidity,
            pressure: row.pressure,
            gas_resistance: row.gas_resistance,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, PersistenceError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<(), PersistenceError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ReadingStore for PostgresStore {
    async fn store_reading(&self, reading: &Reading) -> Result<(), PersistenceError> {
        let result = sqlx::query(
            r#"
            INSERT INTO readings (ts, temperature, humidity, pressure, gas_resistance)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(reading.timestamp)
        .bind(reading.temperature)
        .bind(reading.humidity)
        .bind(reading.pressure)
        .bind(reading.gas_resistance)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            tracing::warn!(ts = %reading.timestamp, "skipped duplicate reading row");
        }
        Ok(())
    }

    async fn store_analysis(&self, analysis: &RealtimeAnalysis) -> Result<(), PersistenceError> {
        let reading = serde_json::to_value(analysis.reading)?;
        sqlx::query(
            r#"
            INSERT INTO realtime_analyses (id, ts, report, reading)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(analysis.id)
        .bind(analysis.generated_at)
        .bind(&analysis.report)
        .bind(SqlJson(reading))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn store_trend(
        &self,
        summary: &TrendSummary,
        result: &AnalysisResult,
    ) -> Result<(), PersistenceError> {
        let payload = serde_json::to_value(result)?;
        sqlx::query(
            r#"
            INSERT INTO trend_analyses (id, ts, window_start, window_end, readings, report, result)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(summary.id)
        .bind(summary.generated_at)
        .bind(summary.window_start)
        .bind(summary.window_end)
        .bind(summary.readings as i64)
        .bind(summary.report.as_deref())
        .bind(SqlJson(payload))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_window(
        &self,
        now: DateTime<Utc>,
        lookback: Duration,
    ) -> Result<ReadingWindow, PersistenceError> {
        let rows: Vec<ReadingRow> = sqlx::query_as(
            r#"
            SELECT ts, temperature, humidity, pressure, gas_resistance
            FROM readings
            WHERE ts >= $1 AND ts <= $2
            ORDER BY ts ASC
            "#,
        )
        .bind(window_start(now, lookback))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        tracing::debug!(rows = rows.len(), "loaded reading window");
        Ok(ReadingWindow::new(rows.into_iter().map(Reading::from).collect()))
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
