//! Durable scrape progress
//!
//! A standalone SQLite file holding series status, item status and the run
//! audit log. Every operation opens its own connection and drops it before
//! returning, so the file can be inspected or copied between operations.
//! Writes are single-statement upserts keyed by slug or external id.
//!
//! Status rules enforced in SQL:
//! - a completed series stays completed when marked started again
//! - a completed item is frozen; later writes are ignored
//! - every applied item write increments `retry_count`

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteRow};
use sqlx::{ConnectOptions, Connection, Row, SqliteConnection};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::catalog::{CatalogEntry, PriorityTier, filter_by_priority};
use crate::domain::item::ExternalId;
use crate::domain::progress::{
    ItemProgressRecord, ItemStatus, ProgressStats, ProgressSummary, ResumePoint, RunFilters, RunRecord,
    SeriesProgressRecord, SeriesStatus,
};

#[derive(Error, Debug)]
pub enum ProgressError {
    #[error("Progress database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Progress store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode run filters: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid timestamp in progress store: {0}")]
    InvalidTimestamp(String),
}

pub type ProgressResult<T> = Result<T, ProgressError>;

const SCHEMA: &[&str] = &[
    r"
    CREATE TABLE IF NOT EXISTS series_progress (
        slug TEXT PRIMARY KEY,
        status TEXT NOT NULL DEFAULT 'pending',
        started_at TEXT,
        completed_at TEXT,
        items_found INTEGER NOT NULL DEFAULT 0,
        items_completed INTEGER NOT NULL DEFAULT 0,
        items_failed INTEGER NOT NULL DEFAULT 0
    )",
    r"
    CREATE TABLE IF NOT EXISTS item_progress (
        external_id INTEGER PRIMARY KEY,
        series_slug TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        attempted_at TEXT,
        completed_at TEXT,
        retry_count INTEGER NOT NULL DEFAULT 0,
        last_error TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_item_progress_series ON item_progress (series_slug)",
    "CREATE INDEX IF NOT EXISTS idx_item_progress_status ON item_progress (status)",
    r"
    CREATE TABLE IF NOT EXISTS scrape_runs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        started_at TEXT NOT NULL,
        completed_at TEXT,
        filters TEXT NOT NULL,
        items_scraped INTEGER NOT NULL DEFAULT 0,
        items_failed INTEGER NOT NULL DEFAULT 0
    )",
];

const ITEM_UPSERT: &str = r"
    INSERT INTO item_progress
        (external_id, series_slug, status, attempted_at, completed_at, retry_count, last_error)
    VALUES (?, ?, ?, ?, ?, 1, ?)
    ON CONFLICT(external_id) DO UPDATE SET
        series_slug = excluded.series_slug,
        status = excluded.status,
        attempted_at = excluded.attempted_at,
        completed_at = excluded.completed_at,
        retry_count = item_progress.retry_count + 1,
        last_error = excluded.last_error
    WHERE item_progress.status <> 'completed'
";

#[derive(Debug, Clone)]
pub struct ProgressStore {
    path: PathBuf,
}

impl ProgressStore {
    /// Open (creating if needed) the progress file and its schema
    pub async fn open(path: impl AsRef<Path>) -> ProgressResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let store = Self { path };
        let mut conn = store.connect().await?;
        for statement in SCHEMA {
            sqlx::query(statement).execute(&mut conn).await?;
        }
        conn.close().await?;

        info!("📒 Progress store ready at {:?}", store.path);
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn connect(&self) -> ProgressResult<SqliteConnection> {
        let conn = SqliteConnectOptions::new()
            .filename(&self.path)
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5))
            .connect()
            .await?;
        Ok(conn)
    }

    // ===============================
    // SERIES
    // ===============================

    /// Mark a series in progress. Keeps the first start time, keeps the
    /// last known item count when `items_found` is 0 and never moves a
    /// completed series back.
    pub async fn mark_series_started(&self, slug: &str, items_found: i64) -> ProgressResult<()> {
        let mut conn = self.connect().await?;
        sqlx::query(
            r"
            INSERT INTO series_progress (slug, status, started_at, items_found)
            VALUES (?, 'in_progress', ?, ?)
            ON CONFLICT(slug) DO UPDATE SET
                started_at = COALESCE(series_progress.started_at, excluded.started_at),
                items_found = CASE WHEN series_progress.status = 'completed'
                    THEN series_progress.items_found
                    ELSE COALESCE(NULLIF(excluded.items_found, 0), series_progress.items_found) END,
                status = CASE WHEN series_progress.status = 'completed'
                    THEN 'completed' ELSE 'in_progress' END
            ",
        )
        .bind(slug)
        .bind(Utc::now())
        .bind(items_found)
        .execute(&mut conn)
        .await?;
        conn.close().await?;

        debug!("Series {} started ({} items found)", slug, items_found);
        Ok(())
    }

    /// Mark a series completed, counting its item rows
    pub async fn mark_series_complete(&self, slug: &str) -> ProgressResult<()> {
        let now = Utc::now();
        let mut conn = self.connect().await?;
        sqlx::query(
            r"
            INSERT INTO series_progress
                (slug, status, started_at, completed_at, items_completed, items_failed)
            VALUES (
                ?, 'completed', ?, ?,
                (SELECT COUNT(*) FROM item_progress WHERE series_slug = ? AND status = 'completed'),
                (SELECT COUNT(*) FROM item_progress WHERE series_slug = ? AND status = 'failed')
            )
            ON CONFLICT(slug) DO UPDATE SET
                status = 'completed',
                completed_at = excluded.completed_at,
                items_completed = excluded.items_completed,
                items_failed = excluded.items_failed
            ",
        )
        .bind(slug)
        .bind(now)
        .bind(now)
        .bind(slug)
        .bind(slug)
        .execute(&mut conn)
        .await?;
        conn.close().await?;

        info!("✅ Series {} completed", slug);
        Ok(())
    }

    pub async fn is_series_complete(&self, slug: &str) -> ProgressResult<bool> {
        Ok(self
            .get_series_status(slug)
            .await?
            .is_some_and(|record| record.status == SeriesStatus::Completed))
    }

    pub async fn get_series_status(&self, slug: &str) -> ProgressResult<Option<SeriesProgressRecord>> {
        let mut conn = self.connect().await?;
        let row = sqlx::query(
            r"
            SELECT slug, status, started_at, completed_at, items_found, items_completed, items_failed
            FROM series_progress WHERE slug = ?
            ",
        )
        .bind(slug)
        .fetch_optional(&mut conn)
        .await?;
        conn.close().await?;

        row.map(|row| series_from_row(&row)).transpose()
    }

    // ===============================
    // ITEMS
    // ===============================

    /// Returns false when the item was already completed and left untouched
    pub async fn mark_item_complete(&self, external_id: ExternalId, series_slug: &str) -> ProgressResult<bool> {
        let now = Utc::now();
        let mut conn = self.connect().await?;
        let result = sqlx::query(ITEM_UPSERT)
            .bind(external_id)
            .bind(series_slug)
            .bind(ItemStatus::Completed)
            .bind(now)
            .bind(Some(now))
            .bind(None::<String>)
            .execute(&mut conn)
            .await?;
        conn.close().await?;

        Ok(result.rows_affected() > 0)
    }

    /// Record a failure. Completed items are never overwritten; returns false
    /// in that case.
    pub async fn mark_item_failed(
        &self,
        external_id: ExternalId,
        series_slug: &str,
        error: &str,
    ) -> ProgressResult<bool> {
        let mut conn = self.connect().await?;
        let result = sqlx::query(ITEM_UPSERT)
            .bind(external_id)
            .bind(series_slug)
            .bind(ItemStatus::Failed)
            .bind(Utc::now())
            .bind(None::<DateTime<Utc>>)
            .bind(error)
            .execute(&mut conn)
            .await?;
        conn.close().await?;

        let applied = result.rows_affected() > 0;
        if !applied {
            warn!("Ignored failure for completed item {}: {}", external_id, error);
        }
        Ok(applied)
    }

    pub async fn is_item_complete(&self, external_id: ExternalId) -> ProgressResult<bool> {
        let mut conn = self.connect().await?;
        let status: Option<ItemStatus> =
            sqlx::query_scalar("SELECT status FROM item_progress WHERE external_id = ?")
                .bind(external_id)
                .fetch_optional(&mut conn)
                .await?;
        conn.close().await?;

        Ok(status == Some(ItemStatus::Completed))
    }

    pub async fn get_item(&self, external_id: ExternalId) -> ProgressResult<Option<ItemProgressRecord>> {
        let mut conn = self.connect().await?;
        let row = sqlx::query(
            r"
            SELECT external_id, series_slug, status, attempted_at, completed_at, retry_count, last_error
            FROM item_progress WHERE external_id = ?
            ",
        )
        .bind(external_id)
        .fetch_optional(&mut conn)
        .await?;
        conn.close().await?;

        row.map(|row| item_from_row(&row)).transpose()
    }

    /// Failed items still under the retry ceiling, oldest attempt first
    pub async fn get_failed_items(
        &self,
        series_slug: Option<&str>,
        max_retries: i64,
    ) -> ProgressResult<Vec<ItemProgressRecord>> {
        let mut conn = self.connect().await?;
        let rows = sqlx::query(
            r"
            SELECT external_id, series_slug, status, attempted_at, completed_at, retry_count, last_error
            FROM item_progress
            WHERE status = 'failed'
              AND retry_count < ?
              AND (? IS NULL OR series_slug = ?)
            ORDER BY attempted_at ASC, external_id ASC
            ",
        )
        .bind(max_retries)
        .bind(series_slug)
        .bind(series_slug)
        .fetch_all(&mut conn)
        .await?;
        conn.close().await?;

        rows.iter().map(item_from_row).collect()
    }

    // ===============================
    // RESUME & REPORTING
    // ===============================

    /// Most recently started in-progress series with live item counts
    pub async fn get_resume_point(&self) -> ProgressResult<Option<ResumePoint>> {
        let mut conn = self.connect().await?;
        let series = sqlx::query(
            r"
            SELECT slug, items_found FROM series_progress
            WHERE status = 'in_progress'
            ORDER BY started_at DESC, slug ASC
            LIMIT 1
            ",
        )
        .fetch_optional(&mut conn)
        .await?;

        let Some(series) = series else {
            conn.close().await?;
            return Ok(None);
        };
        let slug: String = series.try_get("slug")?;
        let items_found: i64 = series.try_get("items_found")?;

        let counts = sqlx::query(
            r"
            SELECT
                COALESCE(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END), 0) AS completed,
                COALESCE(SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END), 0) AS failed,
                MAX(CASE WHEN status = 'completed' THEN external_id END) AS last_completed
            FROM item_progress WHERE series_slug = ?
            ",
        )
        .bind(&slug)
        .fetch_one(&mut conn)
        .await?;
        conn.close().await?;

        Ok(Some(ResumePoint {
            series_slug: slug,
            items_found,
            items_completed: counts.try_get("completed")?,
            items_failed: counts.try_get("failed")?,
            last_completed_external_id: counts.try_get("last_completed")?,
        }))
    }

    /// Catalog entries not yet completed, in catalog order
    pub async fn get_pending_series(
        &self,
        catalog: &[CatalogEntry],
        priority: Option<PriorityTier>,
    ) -> ProgressResult<Vec<CatalogEntry>> {
        let mut conn = self.connect().await?;
        let completed: HashSet<String> =
            sqlx::query_scalar("SELECT slug FROM series_progress WHERE status = 'completed'")
                .fetch_all(&mut conn)
                .await?
                .into_iter()
                .collect();
        conn.close().await?;

        Ok(filter_by_priority(catalog, priority)
            .into_iter()
            .filter(|entry| !completed.contains(&entry.slug))
            .cloned()
            .collect())
    }

    pub async fn get_stats(&self) -> ProgressResult<ProgressStats> {
        let mut conn = self.connect().await?;
        let row = sqlx::query(
            r"
            SELECT
                (SELECT COUNT(*) FROM series_progress WHERE status = 'completed') AS series_completed,
                (SELECT COUNT(*) FROM series_progress WHERE status = 'in_progress') AS series_in_progress,
                (SELECT COUNT(*) FROM item_progress WHERE status = 'completed') AS items_completed,
                (SELECT COUNT(*) FROM item_progress WHERE status = 'failed') AS items_failed,
                (SELECT COUNT(*) FROM scrape_runs) AS total_runs,
                (SELECT MAX(ts) FROM (
                    SELECT attempted_at AS ts FROM item_progress
                    UNION ALL SELECT started_at FROM series_progress
                    UNION ALL SELECT completed_at FROM series_progress
                )) AS last_activity
            ",
        )
        .fetch_one(&mut conn)
        .await?;
        conn.close().await?;

        let last_activity: Option<String> = row.try_get("last_activity")?;
        Ok(ProgressStats {
            series_completed: row.try_get("series_completed")?,
            series_in_progress: row.try_get("series_in_progress")?,
            items_completed: row.try_get("items_completed")?,
            items_failed: row.try_get("items_failed")?,
            total_runs: row.try_get("total_runs")?,
            last_activity: last_activity.as_deref().map(parse_timestamp).transpose()?,
        })
    }

    pub async fn get_progress_summary(&self, catalog: &[CatalogEntry]) -> ProgressResult<ProgressSummary> {
        let stats = self.get_stats().await?;
        let pending = self.get_pending_series(catalog, None).await?;
        let resume_point = self.get_resume_point().await?;
        Ok(ProgressSummary {
            stats,
            catalog_series: catalog.len(),
            pending_series: pending.len(),
            resume_point,
        })
    }

    // ===============================
    // RUN AUDIT LOG
    // ===============================

    pub async fn start_run(&self, filters: &RunFilters) -> ProgressResult<i64> {
        let filters = serde_json::to_string(filters)?;
        let mut conn = self.connect().await?;
        let result = sqlx::query("INSERT INTO scrape_runs (started_at, filters) VALUES (?, ?)")
            .bind(Utc::now())
            .bind(&filters)
            .execute(&mut conn)
            .await?;
        conn.close().await?;

        let run_id = result.last_insert_rowid();
        info!("🚀 Run {} started (filters: {})", run_id, filters);
        Ok(run_id)
    }

    pub async fn complete_run(&self, run_id: i64, items_scraped: i64, items_failed: i64) -> ProgressResult<()> {
        let mut conn = self.connect().await?;
        sqlx::query(
            "UPDATE scrape_runs SET completed_at = ?, items_scraped = ?, items_failed = ? WHERE id = ?",
        )
        .bind(Utc::now())
        .bind(items_scraped)
        .bind(items_failed)
        .bind(run_id)
        .execute(&mut conn)
        .await?;
        conn.close().await?;
        Ok(())
    }

    /// Newest runs first
    pub async fn recent_runs(&self, limit: i64) -> ProgressResult<Vec<RunRecord>> {
        let mut conn = self.connect().await?;
        let rows = sqlx::query(
            r"
            SELECT id, started_at, completed_at, filters, items_scraped, items_failed
            FROM scrape_runs ORDER BY id DESC LIMIT ?
            ",
        )
        .bind(limit)
        .fetch_all(&mut conn)
        .await?;
        conn.close().await?;

        rows.iter()
            .map(|row| -> ProgressResult<RunRecord> {
                let filters: String = row.try_get("filters")?;
                Ok(RunRecord {
                    id: row.try_get("id")?,
                    started_at: row.try_get("started_at")?,
                    completed_at: row.try_get("completed_at")?,
                    filters: serde_json::from_str(&filters)?,
                    items_scraped: row.try_get("items_scraped")?,
                    items_failed: row.try_get("items_failed")?,
                })
            })
            .collect()
    }

    // ===============================
    // RESET
    // ===============================

    /// Forget a series and all of its items
    pub async fn reset_series(&self, slug: &str) -> ProgressResult<()> {
        let mut conn = self.connect().await?;
        let items = sqlx::query("DELETE FROM item_progress WHERE series_slug = ?")
            .bind(slug)
            .execute(&mut conn)
            .await?;
        sqlx::query("DELETE FROM series_progress WHERE slug = ?")
            .bind(slug)
            .execute(&mut conn)
            .await?;
        conn.close().await?;

        warn!("🔄 Reset series {} ({} item rows removed)", slug, items.rows_affected());
        Ok(())
    }

    /// Forget all series and item progress. The run log is kept.
    pub async fn reset_all(&self) -> ProgressResult<()> {
        let mut conn = self.connect().await?;
        sqlx::query("DELETE FROM item_progress").execute(&mut conn).await?;
        sqlx::query("DELETE FROM series_progress").execute(&mut conn).await?;
        conn.close().await?;

        warn!("🔄 All scrape progress reset");
        Ok(())
    }
}

fn series_from_row(row: &SqliteRow) -> ProgressResult<SeriesProgressRecord> {
    Ok(SeriesProgressRecord {
        slug: row.try_get("slug")?,
        status: row.try_get("status")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        items_found: row.try_get("items_found")?,
        items_completed: row.try_get("items_completed")?,
        items_failed: row.try_get("items_failed")?,
    })
}

fn item_from_row(row: &SqliteRow) -> ProgressResult<ItemProgressRecord> {
    Ok(ItemProgressRecord {
        external_id: row.try_get("external_id")?,
        series_slug: row.try_get("series_slug")?,
        status: row.try_get("status")?,
        attempted_at: row.try_get("attempted_at")?,
        completed_at: row.try_get("completed_at")?,
        retry_count: row.try_get("retry_count")?,
        last_error: row.try_get("last_error")?,
    })
}

fn parse_timestamp(value: &str) -> ProgressResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| ProgressError::InvalidTimestamp(format!("{value}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{TempDir, tempdir};

    async fn store() -> (TempDir, ProgressStore) {
        let dir = tempdir().unwrap();
        let store = ProgressStore::open(dir.path().join("progress.db")).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn completed_series_does_not_regress() {
        let (_dir, store) = store().await;
        store.mark_series_started("morgan-dollars", 0).await.unwrap();
        store.mark_series_started("morgan-dollars", 3).await.unwrap();
        let first = store.get_series_status("morgan-dollars").await.unwrap().unwrap();
        assert_eq!(first.status, SeriesStatus::InProgress);
        assert_eq!(first.items_found, 3);

        store.mark_series_complete("morgan-dollars").await.unwrap();
        store.mark_series_started("morgan-dollars", 99).await.unwrap();

        let record = store.get_series_status("morgan-dollars").await.unwrap().unwrap();
        assert_eq!(record.status, SeriesStatus::Completed);
        assert_eq!(record.items_found, 3);
        assert_eq!(record.started_at, first.started_at);
        assert!(store.is_series_complete("morgan-dollars").await.unwrap());
        assert!(!store.is_series_complete("peace-dollars").await.unwrap());
    }

    #[tokio::test]
    async fn restart_keeps_last_known_item_count() {
        let (_dir, store) = store().await;
        store.mark_series_started("morgan-dollars", 0).await.unwrap();
        store.mark_series_started("morgan-dollars", 96).await.unwrap();
        // listing not fetched yet on the next attempt
        store.mark_series_started("morgan-dollars", 0).await.unwrap();

        let point = store.get_resume_point().await.unwrap().unwrap();
        assert_eq!(point.series_slug, "morgan-dollars");
        assert_eq!(point.items_found, 96);

        store.mark_series_started("morgan-dollars", 97).await.unwrap();
        let record = store.get_series_status("morgan-dollars").await.unwrap().unwrap();
        assert_eq!(record.items_found, 97);
    }

    #[tokio::test]
    async fn completed_item_is_frozen() {
        let (_dir, store) = store().await;
        assert!(store.mark_item_failed(101, "s", "timeout").await.unwrap());
        assert!(store.mark_item_complete(101, "s").await.unwrap());
        assert!(!store.mark_item_failed(101, "s", "late failure").await.unwrap());
        assert!(!store.mark_item_complete(101, "s").await.unwrap());

        let item = store.get_item(101).await.unwrap().unwrap();
        assert_eq!(item.status, ItemStatus::Completed);
        assert_eq!(item.retry_count, 2);
        assert_eq!(item.last_error, None);
        assert!(item.completed_at.is_some());
        assert!(store.is_item_complete(101).await.unwrap());
        assert!(!store.is_item_complete(102).await.unwrap());
    }

    #[tokio::test]
    async fn failed_items_respect_retry_ceiling() {
        let (_dir, store) = store().await;
        store.mark_item_failed(1, "a", "e1").await.unwrap();
        store.mark_item_failed(2, "b", "e2").await.unwrap();
        store.mark_item_failed(2, "b", "e2 again").await.unwrap();
        store.mark_item_failed(3, "a", "e3").await.unwrap();
        store.mark_item_complete(3, "a").await.unwrap();

        let all: Vec<ExternalId> = store
            .get_failed_items(None, 3)
            .await
            .unwrap()
            .iter()
            .map(|i| i.external_id)
            .collect();
        assert_eq!(all, vec![1, 2]);

        let under_two = store.get_failed_items(None, 2).await.unwrap();
        assert_eq!(under_two.len(), 1);
        assert_eq!(under_two[0].external_id, 1);

        let in_b = store.get_failed_items(Some("b"), 5).await.unwrap();
        assert_eq!(in_b.len(), 1);
        assert_eq!(in_b[0].last_error.as_deref(), Some("e2 again"));
        assert_eq!(in_b[0].retry_count, 2);
    }

    #[tokio::test]
    async fn series_completion_counts_items() {
        let (_dir, store) = store().await;
        store.mark_series_started("s", 3).await.unwrap();
        store.mark_item_complete(101, "s").await.unwrap();
        store.mark_item_complete(102, "s").await.unwrap();
        store.mark_item_failed(103, "s", "HTTP 500").await.unwrap();

        let resume = store.get_resume_point().await.unwrap().unwrap();
        assert_eq!(resume.series_slug, "s");
        assert_eq!(resume.items_found, 3);
        assert_eq!(resume.items_completed, 2);
        assert_eq!(resume.items_failed, 1);
        assert_eq!(resume.last_completed_external_id, Some(102));

        store.mark_series_complete("s").await.unwrap();
        let record = store.get_series_status("s").await.unwrap().unwrap();
        assert_eq!((record.items_completed, record.items_failed), (2, 1));
        assert!(record.completed_at.is_some());
        assert!(store.get_resume_point().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn pending_series_keep_catalog_order() {
        let (_dir, store) = store().await;
        let catalog = vec![
            CatalogEntry::new("A", "a", 1, PriorityTier::P0, 10),
            CatalogEntry::new("B", "b", 2, PriorityTier::P1, 10),
            CatalogEntry::new("C", "c", 3, PriorityTier::P0, 10),
        ];
        store.mark_series_complete("a").await.unwrap();
        store.mark_series_started("c", 1).await.unwrap();

        let pending: Vec<String> = store
            .get_pending_series(&catalog, None)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.slug)
            .collect();
        assert_eq!(pending, vec!["b", "c"]);

        let p0 = store.get_pending_series(&catalog, Some(PriorityTier::P0)).await.unwrap();
        assert_eq!(p0.len(), 1);
        assert_eq!(p0[0].slug, "c");

        let summary = store.get_progress_summary(&catalog).await.unwrap();
        assert_eq!(summary.catalog_series, 3);
        assert_eq!(summary.pending_series, 2);
        assert_eq!(summary.stats.series_completed, 1);
        assert_eq!(summary.stats.series_in_progress, 1);
        assert!(summary.stats.last_activity.is_some());
    }

    #[tokio::test]
    async fn runs_are_logged_newest_first() {
        let (_dir, store) = store().await;
        let filters = RunFilters {
            priority: Some(PriorityTier::P0),
            series: None,
            resume: true,
        };
        let first = store.start_run(&filters).await.unwrap();
        store.complete_run(first, 10, 2).await.unwrap();
        let second = store.start_run(&RunFilters::default()).await.unwrap();

        let runs = store.recent_runs(5).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].id, second);
        assert!(runs[0].completed_at.is_none());
        assert_eq!(runs[1].filters, filters);
        assert_eq!((runs[1].items_scraped, runs[1].items_failed), (10, 2));
        assert_eq!(store.get_stats().await.unwrap().total_runs, 2);
    }

    #[tokio::test]
    async fn reset_clears_progress_but_keeps_runs() {
        let (_dir, store) = store().await;
        store.start_run(&RunFilters::default()).await.unwrap();
        store.mark_series_complete("a").await.unwrap();
        store.mark_item_complete(1, "a").await.unwrap();
        store.mark_item_complete(2, "b").await.unwrap();

        store.reset_series("a").await.unwrap();
        assert!(store.get_series_status("a").await.unwrap().is_none());
        assert!(!store.is_item_complete(1).await.unwrap());
        assert!(store.is_item_complete(2).await.unwrap());

        store.reset_all().await.unwrap();
        let stats = store.get_stats().await.unwrap();
        assert_eq!(stats.items_completed, 0);
        assert_eq!(stats.total_runs, 1);
    }

    #[tokio::test]
    async fn state_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("progress.db");
        {
            let store = ProgressStore::open(&path).await.unwrap();
            store.mark_item_complete(7, "s").await.unwrap();
        }
        let reopened = ProgressStore::open(&path).await.unwrap();
        assert!(reopened.is_item_complete(7).await.unwrap());
    }
}
