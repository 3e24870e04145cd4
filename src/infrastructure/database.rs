// Database - SQLite pool and schema for pages, translations and the closure table

use sqlx::pool::PoolConnection;
use sqlx::sqlite::{Sqlite, SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Transaction;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::error::{AppError, AppResult};

/// Relational store shared by the tree index and the translation store.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect to `url` and create the schema if it is missing.
    pub async fn connect(url: &str) -> AppResult<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| AppError::ConfigurationError(format!("Invalid DATABASE_URL {}: {}", url, e)))?
            .create_if_missing(true);

        // Every connection to an in-memory database is a separate database,
        // so keep exactly one and never recycle it.
        let pool_options = if url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to connect to {}: {}", url, e)))?;

        let db = Self { pool };
        db.initialize().await?;
        info!("Connected to page database at {}", url);
        Ok(db)
    }

    pub async fn new_in_memory() -> AppResult<Self> {
        Self::connect("sqlite::memory:").await
    }

    /// Create page tables and indexes. Safe to run on every start-up.
    pub async fn initialize(&self) -> AppResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS page (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                is_locked BOOLEAN NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                deleted_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to create page table: {}", e)))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS page_translation (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                page_id INTEGER NOT NULL,
                locale TEXT NOT NULL,
                permalink TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT,
                keywords TEXT,
                UNIQUE (page_id, locale)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(format!("Failed to create page_translation table: {}", e))
        })?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS page_closure (
                ancestor_id INTEGER NOT NULL,
                descendant_id INTEGER NOT NULL,
                depth INTEGER NOT NULL,
                PRIMARY KEY (ancestor_id, descendant_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to create page_closure table: {}", e)))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_page_translation_permalink ON page_translation(locale, permalink)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to create permalink index: {}", e)))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_page_closure_descendant ON page_closure(descendant_id, depth)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to create closure index: {}", e)))?;

        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn acquire(&self) -> AppResult<PoolConnection<Sqlite>> {
        self.pool
            .acquire()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to acquire connection: {}", e)))
    }

    pub async fn begin(&self) -> AppResult<Transaction<'static, Sqlite>> {
        self.pool
            .begin()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to begin transaction: {}", e)))
    }

    pub async fn health_check(&self) -> AppResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Database health check failed: {}", e)))?;
        Ok(())
    }
}

pub async fn commit(tx: Transaction<'_, Sqlite>) -> AppResult<()> {
    tx.commit()
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to commit transaction: {}", e)))
}
