//! The `AnalyticalStore` trait and its SQLite-backed reference adapter.
//!
//! The real columnar store is an external service per the scope boundary;
//! this crate ships a concrete adapter satisfying the three tables' schema
//! so the workers and tests have something to write to and read back from.

use agentstack_core::SpanRecord;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::error::Result;

/// One row of `cost_metrics`: the cost calculator's output per LLM call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostRow {
    /// Owning project.
    pub project_id: String,
    /// Model name as reported by the span (e.g. `gpt-4o`).
    pub model: String,
    /// The span's kind/operation name this cost was attributed to.
    pub span_kind: String,
    /// Epoch milliseconds the span completed.
    pub timestamp: i64,
    /// Prompt/input tokens.
    pub prompt_tokens: i64,
    /// Completion/output tokens.
    pub completion_tokens: i64,
    /// Sum of prompt and completion tokens.
    pub total_tokens: i64,
    /// Computed cost in US dollars.
    pub cost_usd: f64,
}

/// One row of `security_alerts`: a single rule firing on a single span.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityAlertRow {
    /// Alert id, unique per row.
    pub id: String,
    /// Owning project.
    pub project_id: String,
    /// Trace the flagged span belongs to.
    pub trace_id: String,
    /// The flagged span.
    pub span_id: String,
    /// Which rule fired (`prompt_injection`, `pii_exposure`, `anomaly`).
    pub rule_name: String,
    /// Severity label (`low`, `medium`, `high`, `critical`).
    pub severity: String,
    /// Numeric confidence/severity score, rule-specific scale.
    pub score: f64,
    /// Human-readable description of what was flagged.
    pub description: String,
    /// Supporting evidence — never the raw matched text; see the security
    /// worker's rule implementations for what is and isn't captured here.
    pub evidence: String,
    /// Epoch milliseconds the alert was generated.
    pub created_at: i64,
}

/// The columnar store's write surface, as seen by the consumer workers.
#[async_trait]
pub trait AnalyticalStore: Send + Sync {
    /// Bulk-insert span records, replacing any existing row with the same
    /// `span_id` (the writer's at-least-once delivery policy: a span
    /// written twice after a crash-before-ack is idempotent here).
    async fn insert_spans(&self, records: &[SpanRecord]) -> Result<()>;

    /// Bulk-insert cost rows.
    async fn insert_cost_rows(&self, rows: &[CostRow]) -> Result<()>;

    /// Bulk-insert security alert rows.
    async fn insert_alerts(&self, alerts: &[SecurityAlertRow]) -> Result<()>;
}

/// SQLite-backed reference [`AnalyticalStore`].
pub struct SqliteAnalyticalStore {
    pool: SqlitePool,
}

impl SqliteAnalyticalStore {
    /// Open (creating if necessary) the analytical store database at
    /// `db_path` and ensure its schema exists.
    ///
    /// # Errors
    /// Returns [`crate::error::AnalyticalStoreError::Database`] if the
    /// database cannot be opened or the schema cannot be created.
    pub async fn open(db_path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// The underlying connection pool, for callers (tests, migrations
    /// tooling) that need raw SQL access beyond the [`AnalyticalStore`]
    /// surface.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS spans (
                span_id TEXT PRIMARY KEY,
                trace_id TEXT NOT NULL,
                parent_span_id TEXT,
                project_id TEXT NOT NULL,
                name TEXT NOT NULL,
                service_name TEXT NOT NULL,
                status TEXT NOT NULL,
                start_time INTEGER NOT NULL,
                end_time INTEGER NOT NULL,
                duration_ms INTEGER NOT NULL,
                attributes TEXT NOT NULL,
                events TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS cost_metrics (
                project_id TEXT NOT NULL,
                model TEXT NOT NULL,
                span_kind TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                prompt_tokens INTEGER NOT NULL,
                completion_tokens INTEGER NOT NULL,
                total_tokens INTEGER NOT NULL,
                cost_usd REAL NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS security_alerts (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                trace_id TEXT NOT NULL,
                span_id TEXT NOT NULL,
                rule_name TEXT NOT NULL,
                severity TEXT NOT NULL,
                score REAL NOT NULL,
                description TEXT NOT NULL,
                evidence TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl AnalyticalStore for SqliteAnalyticalStore {
    async fn insert_spans(&self, records: &[SpanRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for record in records {
            let attributes = serde_json::to_string(&record.attributes)?;
            let events = serde_json::to_string(&record.events)?;
            sqlx::query(
                "INSERT OR REPLACE INTO spans
                 (span_id, trace_id, parent_span_id, project_id, name, service_name,
                  status, start_time, end_time, duration_ms, attributes, events)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&record.span_id)
            .bind(&record.trace_id)
            .bind(&record.parent_span_id)
            .bind(&record.project_id)
            .bind(&record.name)
            .bind(&record.service_name)
            .bind(format!("{:?}", record.status).to_uppercase())
            .bind(record.start_time as i64)
            .bind(record.end_time as i64)
            .bind(record.duration_ms as i64)
            .bind(attributes)
            .bind(events)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn insert_cost_rows(&self, rows: &[CostRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for row in rows {
            sqlx::query(
                "INSERT INTO cost_metrics
                 (project_id, model, span_kind, timestamp, prompt_tokens,
                  completion_tokens, total_tokens, cost_usd)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&row.project_id)
            .bind(&row.model)
            .bind(&row.span_kind)
            .bind(row.timestamp)
            .bind(row.prompt_tokens)
            .bind(row.completion_tokens)
            .bind(row.total_tokens)
            .bind(row.cost_usd)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn insert_alerts(&self, alerts: &[SecurityAlertRow]) -> Result<()> {
        if alerts.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for alert in alerts {
            sqlx::query(
                "INSERT OR REPLACE INTO security_alerts
                 (id, project_id, trace_id, span_id, rule_name, severity, score,
                  description, evidence, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&alert.id)
            .bind(&alert.project_id)
            .bind(&alert.trace_id)
            .bind(&alert.span_id)
            .bind(&alert.rule_name)
            .bind(&alert.severity)
            .bind(alert.score)
            .bind(&alert.description)
            .bind(&alert.evidence)
            .bind(alert.created_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentstack_core::Span;

    async fn temp_store() -> (SqliteAnalyticalStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analytical.db");
        let store = SqliteAnalyticalStore::open(path.to_str().unwrap())
            .await
            .unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn insert_spans_replaces_duplicate_span_id() {
        let (store, _dir) = temp_store().await;
        let mut span = Span::start("op", "svc", None);
        span.end();
        let record = span.to_record().unwrap();

        store.insert_spans(std::slice::from_ref(&record)).await.unwrap();
        store.insert_spans(std::slice::from_ref(&record)).await.unwrap();

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM spans")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn insert_cost_rows_persists_all_fields() {
        let (store, _dir) = temp_store().await;
        let row = CostRow {
            project_id: "p1".into(),
            model: "gpt-4o".into(),
            span_kind: "llm.completion".into(),
            timestamp: 1000,
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
            cost_usd: 0.002,
        };
        store.insert_cost_rows(std::slice::from_ref(&row)).await.unwrap();

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM cost_metrics")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn insert_alerts_persists_row() {
        let (store, _dir) = temp_store().await;
        let alert = SecurityAlertRow {
            id: "a1".into(),
            project_id: "p1".into(),
            trace_id: "t1".into(),
            span_id: "s1".into(),
            rule_name: "prompt_injection".into(),
            severity: "high".into(),
            score: 80.0,
            description: "matched 2 injection patterns".into(),
            evidence: "2 pattern(s) matched".into(),
            created_at: 1000,
        };
        store.insert_alerts(std::slice::from_ref(&alert)).await.unwrap();

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM security_alerts")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
