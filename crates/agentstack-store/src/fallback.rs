//! SDK-side local fallback store.
//!
//! When the collector is unreachable, the batch exporter persists spans here
//! instead of dropping them, and replays them once connectivity returns.
//! Grounded on `original_source/.../local_store.py`'s `LocalStore`
//! (`PRAGMA journal_mode=WAL`, upsert-by-`span_id`, a partial index on
//! unsent rows), translated to `sqlx::SqlitePool` with an internal
//! [`tokio::sync::Mutex`] serializing writers in place of the original's
//! per-call `threading.Lock`.

use agentstack_core::SpanRecord;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::Result;

/// Local SQLite-backed fallback store for spans the collector has not yet
/// acknowledged.
pub struct FallbackStore {
    pool: SqlitePool,
    writers: Mutex<()>,
}

impl FallbackStore {
    /// Open (creating if necessary) the fallback database at `db_path` and
    /// ensure its schema exists.
    ///
    /// # Errors
    /// Returns [`crate::error::AnalyticalStoreError::Database`] if the
    /// database cannot be opened or the schema cannot be created.
    pub async fn open(db_path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;

        sqlx::query("PRAGMA journal_mode=WAL").execute(&pool).await?;
        sqlx::query("PRAGMA synchronous=NORMAL").execute(&pool).await?;

        let store = Self {
            pool,
            writers: Mutex::new(()),
        };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS spans (
                span_id TEXT PRIMARY KEY,
                trace_id TEXT NOT NULL,
                data TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                sent INTEGER NOT NULL DEFAULT 0
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_spans_unsent ON spans (sent) WHERE sent = 0",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_spans_trace ON spans (trace_id)")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Persist `records` in a single transaction, upserting by `span_id`.
    ///
    /// # Errors
    /// Returns [`crate::error::AnalyticalStoreError::Database`] on failure;
    /// no partial writes survive (the transaction rolls back).
    pub async fn save_spans(&self, records: &[SpanRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        let _guard = self.writers.lock().await;
        let mut tx = self.pool.begin().await?;
        for record in records {
            let data = serde_json::to_string(record)?;
            sqlx::query(
                "INSERT OR REPLACE INTO spans (span_id, trace_id, data, sent) VALUES (?, ?, ?, 0)",
            )
            .bind(&record.span_id)
            .bind(&record.trace_id)
            .bind(data)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(records.len())
    }

    /// Retrieve up to `limit` unsent spans, oldest first. Rows whose JSON
    /// payload fails to deserialize are skipped and logged, not treated as a
    /// fatal error.
    ///
    /// # Errors
    /// Returns [`crate::error::AnalyticalStoreError::Database`] on failure.
    pub async fn get_unsent(&self, limit: i64) -> Result<Vec<SpanRecord>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT span_id, data FROM spans WHERE sent = 0 ORDER BY created_at ASC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut spans = Vec::with_capacity(rows.len());
        for (span_id, data) in rows {
            match serde_json::from_str::<SpanRecord>(&data) {
                Ok(record) => spans.push(record),
                Err(error) => debug!(span_id, %error, "failed to deserialize fallback span row"),
            }
        }
        Ok(spans)
    }

    /// Mark the given span ids as sent. Returns the number of rows updated.
    ///
    /// # Errors
    /// Returns [`crate::error::AnalyticalStoreError::Database`] on failure.
    pub async fn mark_sent(&self, span_ids: &[String]) -> Result<u64> {
        if span_ids.is_empty() {
            return Ok(0);
        }
        let _guard = self.writers.lock().await;
        let mut builder = sqlx::QueryBuilder::new("UPDATE spans SET sent = 1 WHERE span_id IN (");
        let mut separated = builder.separated(", ");
        for id in span_ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(")");
        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Delete every row already marked sent. Returns the number deleted.
    ///
    /// # Errors
    /// Returns [`crate::error::AnalyticalStoreError::Database`] on failure.
    pub async fn delete_sent(&self) -> Result<u64> {
        let _guard = self.writers.lock().await;
        let result = sqlx::query("DELETE FROM spans WHERE sent = 1")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Number of unsent rows.
    ///
    /// # Errors
    /// Returns [`crate::error::AnalyticalStoreError::Database`] on failure.
    pub async fn unsent_count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM spans WHERE sent = 0")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Total number of rows, sent or not.
    ///
    /// # Errors
    /// Returns [`crate::error::AnalyticalStoreError::Database`] on failure.
    pub async fn total_count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM spans")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentstack_core::Span;

    async fn temp_store() -> (FallbackStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fallback.db");
        let store = FallbackStore::open(path.to_str().unwrap()).await.unwrap();
        (store, dir)
    }

    fn sample_record(name: &str) -> SpanRecord {
        let mut span = Span::start(name, "svc", None);
        span.end();
        span.to_record().unwrap()
    }

    #[tokio::test]
    async fn save_then_get_unsent_round_trips() {
        let (store, _dir) = temp_store().await;
        let record = sample_record("op");
        store.save_spans(std::slice::from_ref(&record)).await.unwrap();

        let unsent = store.get_unsent(10).await.unwrap();
        assert_eq!(unsent.len(), 1);
        assert_eq!(unsent[0].span_id, record.span_id);
        assert_eq!(store.unsent_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn mark_sent_then_delete_sent_removes_rows() {
        let (store, _dir) = temp_store().await;
        let record = sample_record("op");
        store.save_spans(std::slice::from_ref(&record)).await.unwrap();

        let marked = store.mark_sent(&[record.span_id.clone()]).await.unwrap();
        assert_eq!(marked, 1);
        assert_eq!(store.unsent_count().await.unwrap(), 0);
        assert_eq!(store.total_count().await.unwrap(), 1);

        let deleted = store.delete_sent().await.unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.total_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn upsert_by_span_id_replaces_not_duplicates() {
        let (store, _dir) = temp_store().await;
        let mut record = sample_record("op");
        store.save_spans(std::slice::from_ref(&record)).await.unwrap();
        record.duration_ms += 1;
        store.save_spans(std::slice::from_ref(&record)).await.unwrap();

        assert_eq!(store.total_count().await.unwrap(), 1);
    }
}
