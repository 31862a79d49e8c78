// Database connection and pool management
// This module handles the catalog SQLite database using sqlx

use anyhow::{Context, Result};
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use std::path::Path;
use tracing::info;

pub struct DatabaseConnection {
    pool: SqlitePool,
}

impl DatabaseConnection {
    pub async fn new(database_url: &str) -> Result<Self> {
        // Create database file directory if it doesn't exist
        let db_path = if database_url.starts_with("sqlite://") {
            database_url.trim_start_matches("sqlite://")
        } else if database_url.starts_with("sqlite:") {
            database_url.trim_start_matches("sqlite:")
        } else {
            database_url
        };
        let db_path = db_path.split('?').next().unwrap_or(db_path);

        if !db_path.contains(":memory:") {
            let path = Path::new(db_path);
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create database directory {}", parent.display()))?;
            }
            if !path.exists() {
                tokio::fs::File::create(path)
                    .await
                    .with_context(|| format!("Failed to create database file {db_path}"))?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .with_context(|| format!("Failed to connect to {database_url}"))?;

        info!("🗄️ Catalog database connected: {}", database_url);
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        let create_reference_sql = r"
            CREATE TABLE IF NOT EXISTS coin_reference (
                id TEXT PRIMARY KEY,
                external_id INTEGER NOT NULL UNIQUE,
                year INTEGER,
                mint_mark TEXT,
                denomination TEXT,
                series TEXT NOT NULL,
                variety TEXT,
                display_name TEXT NOT NULL,
                mintage INTEGER,
                cross_reference_id INTEGER,
                search_tokens TEXT NOT NULL DEFAULT '',
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
        ";

        let create_price_guide_sql = r"
            CREATE TABLE IF NOT EXISTS coin_price_guide (
                id TEXT PRIMARY KEY,
                coin_reference_id TEXT NOT NULL,
                grade_code TEXT NOT NULL,
                price_date TEXT NOT NULL,
                price_cents INTEGER NOT NULL,
                source TEXT NOT NULL,
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE (coin_reference_id, grade_code, price_date),
                FOREIGN KEY (coin_reference_id) REFERENCES coin_reference (id) ON DELETE CASCADE
            )
        ";

        let create_indexes_sql = [
            "CREATE INDEX IF NOT EXISTS idx_coin_reference_series ON coin_reference (series)",
            "CREATE INDEX IF NOT EXISTS idx_price_guide_date ON coin_price_guide (price_date)",
        ];

        sqlx::query(create_reference_sql).execute(&self.pool).await?;
        sqlx::query(create_price_guide_sql).execute(&self.pool).await?;
        for sql in create_indexes_sql {
            sqlx::query(sql).execute(&self.pool).await?;
        }

        Ok(())
    }
}
