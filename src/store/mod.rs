mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use crate::collaborators::ReadingStore;
use crate::config::StoreConfig;
use crate::error::PersistenceError;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

const MEMORY_ONLY_WARNING: &str = "no database URL configured; readings, analyses and trend \
results are kept in memory only and grow without bound until restart";

/// Postgres when a database URL is configured, otherwise a process-local store.
pub async fn connect(config: &StoreConfig) -> Result<Arc<dyn ReadingStore>, PersistenceError> {
    match config.database_url.as_deref() {
        Some(url) => {
            let store = PostgresStore::connect(url, config.pool_size).await?;
            store.ensure_schema().await?;
            tracing::info!(pool_size = config.pool_size, "using postgres reading store");
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("{MEMORY_ONLY_WARNING}");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

pub(crate) fn window_start(now: DateTime<Utc>, lookback: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(lookback)
        .ok()
        .and_then(|span| now.checked_sub_signed(span))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{epoch, reading_at};

    #[test]
    fn memory_only_warning_mentions_unbounded_growth() {
        assert!(MEMORY_ONLY_WARNING.contains("grow without bound"));
    }

    #[tokio::test]
    async fn missing_database_url_falls_back_to_memory() {
        let config = StoreConfig {
            database_url: None,
            pool_size: 5,
        };
        let store = connect(&config).await.expect("memory store");
        store.store_reading(&reading_at(epoch(), 21.0)).await.expect("stored");
        let window = store
            .get_window(epoch(), Duration::from_secs(3600))
            .await
            .expect("window");
        assert_eq!(window.len(), 1);
    }
}
