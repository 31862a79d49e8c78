//! Catalog persistence
//!
//! Reference records keyed by external id and price points keyed by
//! (item, grade, date). Both writes are upserts, so re-running a scrape or a
//! price refresh on the same day changes nothing but timestamps.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::domain::item::{ExternalId, GradeCode, ItemDetail, Price};

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Catalog database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid stored data: {0}")]
    InvalidData(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Where a price point came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceSource {
    Scrape,
    Api,
}

impl PriceSource {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scrape => "scrape",
            Self::Api => "api",
        }
    }
}

impl fmt::Display for PriceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted reference record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredItem {
    pub id: String,
    pub external_id: ExternalId,
    pub year: Option<i32>,
    pub mint_mark: Option<String>,
    pub denomination: Option<String>,
    pub series_name: String,
    pub variety: Option<String>,
    pub display_name: String,
    pub mintage: Option<i64>,
    pub cross_reference_id: Option<i64>,
    pub search_tokens: String,
}

/// An item whose newest price is missing or stale
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshCandidate {
    pub item_id: String,
    pub external_id: ExternalId,
    pub series_name: String,
    pub latest_price_date: Option<NaiveDate>,
}

#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Insert or update by external id; returns the row id
    async fn upsert_item(&self, item: &ItemDetail) -> RepositoryResult<String>;

    /// Insert or replace the price for (item, grade, date)
    async fn upsert_price(
        &self,
        item_id: &str,
        grade: &GradeCode,
        price_date: NaiveDate,
        price: Price,
        source: PriceSource,
    ) -> RepositoryResult<()>;

    /// Items with no price dated on or after `stale_before`, oldest first
    async fn refresh_candidates(&self, stale_before: NaiveDate) -> RepositoryResult<Vec<RefreshCandidate>>;

    async fn find_item(&self, external_id: ExternalId) -> RepositoryResult<Option<StoredItem>>;

    async fn price_count(&self, item_id: &str) -> RepositoryResult<i64>;
}

#[derive(Clone)]
pub struct SqliteCatalogRepository {
    pool: Arc<SqlitePool>,
}

impl SqliteCatalogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool: Arc::new(pool) }
    }
}

#[async_trait]
impl CatalogRepository for SqliteCatalogRepository {
    async fn upsert_item(&self, item: &ItemDetail) -> RepositoryResult<String> {
        let now = Utc::now();
        let id: String = sqlx::query_scalar(
            r"
            INSERT INTO coin_reference
                (id, external_id, year, mint_mark, denomination, series, variety, display_name,
                 mintage, cross_reference_id, search_tokens, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(external_id) DO UPDATE SET
                year = COALESCE(excluded.year, coin_reference.year),
                mint_mark = COALESCE(excluded.mint_mark, coin_reference.mint_mark),
                denomination = COALESCE(excluded.denomination, coin_reference.denomination),
                series = excluded.series,
                variety = COALESCE(excluded.variety, coin_reference.variety),
                display_name = excluded.display_name,
                mintage = COALESCE(excluded.mintage, coin_reference.mintage),
                cross_reference_id = COALESCE(excluded.cross_reference_id, coin_reference.cross_reference_id),
                search_tokens = excluded.search_tokens,
                updated_at = excluded.updated_at
            RETURNING id
            ",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(item.external_id)
        .bind(item.year)
        .bind(&item.mint_mark)
        .bind(&item.denomination)
        .bind(&item.series_name)
        .bind(&item.variety)
        .bind(&item.display_name)
        .bind(item.mintage)
        .bind(item.cross_reference_id)
        .bind(item.search_tokens())
        .bind(now)
        .bind(now)
        .fetch_one(&*self.pool)
        .await?;

        debug!("Upserted item #{} as {}", item.external_id, id);
        Ok(id)
    }

    async fn upsert_price(
        &self,
        item_id: &str,
        grade: &GradeCode,
        price_date: NaiveDate,
        price: Price,
        source: PriceSource,
    ) -> RepositoryResult<()> {
        sqlx::query(
            r"
            INSERT INTO coin_price_guide
                (id, coin_reference_id, grade_code, price_date, price_cents, source, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(coin_reference_id, grade_code, price_date) DO UPDATE SET
                price_cents = excluded.price_cents,
                source = excluded.source,
                updated_at = excluded.updated_at
            ",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(item_id)
        .bind(grade.as_str())
        .bind(price_date)
        .bind(price.cents())
        .bind(source.as_str())
        .bind(Utc::now())
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    async fn refresh_candidates(&self, stale_before: NaiveDate) -> RepositoryResult<Vec<RefreshCandidate>> {
        let rows = sqlx::query(
            r"
            SELECT r.id, r.external_id, r.series, MAX(p.price_date) AS latest
            FROM coin_reference r
            LEFT JOIN coin_price_guide p ON p.coin_reference_id = r.id
            GROUP BY r.id, r.external_id, r.series
            HAVING latest IS NULL OR latest < ?
            ORDER BY latest IS NULL, latest ASC, r.external_id ASC
            ",
        )
        .bind(stale_before)
        .fetch_all(&*self.pool)
        .await?;

        rows.iter()
            .map(|row| -> RepositoryResult<RefreshCandidate> {
                let latest: Option<String> = row.try_get("latest")?;
                Ok(RefreshCandidate {
                    item_id: row.try_get("id")?,
                    external_id: row.try_get("external_id")?,
                    series_name: row.try_get("series")?,
                    latest_price_date: latest.as_deref().map(parse_date).transpose()?,
                })
            })
            .collect()
    }

    async fn find_item(&self, external_id: ExternalId) -> RepositoryResult<Option<StoredItem>> {
        let row = sqlx::query(
            r"
            SELECT id, external_id, year, mint_mark, denomination, series, variety, display_name,
                   mintage, cross_reference_id, search_tokens
            FROM coin_reference WHERE external_id = ?
            ",
        )
        .bind(external_id)
        .fetch_optional(&*self.pool)
        .await?;

        row.map(|row| stored_item_from_row(&row)).transpose()
    }

    async fn price_count(&self, item_id: &str) -> RepositoryResult<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM coin_price_guide WHERE coin_reference_id = ?")
            .bind(item_id)
            .fetch_one(&*self.pool)
            .await?;
        Ok(count)
    }
}

fn stored_item_from_row(row: &SqliteRow) -> RepositoryResult<StoredItem> {
    Ok(StoredItem {
        id: row.try_get("id")?,
        external_id: row.try_get("external_id")?,
        year: row.try_get("year")?,
        mint_mark: row.try_get("mint_mark")?,
        denomination: row.try_get("denomination")?,
        series_name: row.try_get("series")?,
        variety: row.try_get("variety")?,
        display_name: row.try_get("display_name")?,
        mintage: row.try_get("mintage")?,
        cross_reference_id: row.try_get("cross_reference_id")?,
        search_tokens: row.try_get("search_tokens")?,
    })
}

fn parse_date(value: &str) -> RepositoryResult<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| RepositoryError::InvalidData(format!("price date '{value}': {e}")))
}
