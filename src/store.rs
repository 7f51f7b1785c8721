use chrono::{DateTime, Utc};
use futures::stream::{Stream, StreamExt, TryStreamExt};
use rust_decimal::Decimal;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
    SqliteRow,
};
use sqlx::Row;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::models::{generate_id, NewTrackedItem, PriceObservation, TrackedItem};
use crate::{AppError, Result};

/// Append-only ledger of price observations plus the tracked-item table it
/// references. Prices are stored as canonical decimal strings; SQLite has no
/// decimal type and floats would drift.
#[derive(Clone)]
pub struct HistoryStore {
    pool: SqlitePool,
}

impl HistoryStore {
    /// Connect and create the schema idempotently.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        // WAL keeps readers off the writer's lock; the busy timeout makes
        // contending writers queue instead of erroring.
        let options = SqliteConnectOptions::from_str(&config.url)?
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(config.acquire_timeout));

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout))
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        info!(url = %config.url, "history store ready");
        Ok(store)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tracked_items (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                url TEXT NOT NULL UNIQUE,
                target_price TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS price_observations (
                id TEXT PRIMARY KEY,
                item_id TEXT NOT NULL REFERENCES tracked_items(id),
                price TEXT NOT NULL,
                observed_at TIMESTAMP NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_observations_item_time
             ON price_observations(item_id, observed_at)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Start tracking a new item. The source URL must be unique and the
    /// target price positive.
    pub async fn insert_item(&self, new_item: NewTrackedItem) -> Result<TrackedItem> {
        if new_item.name.trim().is_empty() {
            return Err(AppError::Validation("Item name must not be empty".to_string()));
        }
        if url::Url::parse(&new_item.url).is_err() {
            return Err(AppError::Validation(format!("Invalid URL: {}", new_item.url)));
        }
        if new_item.target_price <= Decimal::ZERO {
            return Err(AppError::Validation("Target price must be positive".to_string()));
        }

        let item = TrackedItem::new(new_item);
        let result = sqlx::query(
            "INSERT INTO tracked_items (id, name, url, target_price) VALUES (?, ?, ?, ?)",
        )
        .bind(&item.id)
        .bind(&item.name)
        .bind(&item.url)
        .bind(item.target_price.to_string())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                info!(item = %item.name, url = %item.url, "tracking new item");
                Ok(item)
            }
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Err(
                AppError::Validation(format!("An item with URL '{}' already exists", item.url)),
            ),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_item(&self, item_id: &str) -> Result<Option<TrackedItem>> {
        let row = sqlx::query("SELECT id, name, url, target_price FROM tracked_items WHERE id = ?")
            .bind(item_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(item_from_row).transpose()
    }

    /// All tracked items, the read-only view the scrape cycle consumes.
    pub async fn list_items(&self) -> Result<Vec<TrackedItem>> {
        let rows = sqlx::query("SELECT id, name, url, target_price FROM tracked_items ORDER BY name")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(item_from_row).collect()
    }

    /// Append one observation. Atomic and durable before returning; the
    /// insertion timestamp never moves backwards for a given item, even if
    /// the wall clock does.
    pub async fn append(&self, item_id: &str, price: Decimal) -> Result<String> {
        if price < Decimal::ZERO {
            return Err(AppError::Validation(format!(
                "Observed price must not be negative: {price}"
            )));
        }

        let mut conn = self.pool.acquire().await?;

        // Take the write lock up front. A deferred transaction that reads
        // before inserting cannot upgrade its lock while another writer is
        // active and fails with SQLITE_BUSY instead of queueing.
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        match Self::append_locked(&mut conn, item_id, price).await {
            Ok(id) => {
                sqlx::query("COMMIT").execute(&mut *conn).await?;
                Ok(id)
            }
            Err(err) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                Err(err)
            }
        }
    }

    async fn append_locked(
        conn: &mut SqliteConnection,
        item_id: &str,
        price: Decimal,
    ) -> Result<String> {
        let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM tracked_items WHERE id = ?")
            .bind(item_id)
            .fetch_optional(&mut *conn)
            .await?;
        if exists.is_none() {
            return Err(AppError::UnknownItem {
                item_id: item_id.to_string(),
            });
        }

        let last: Option<DateTime<Utc>> = sqlx::query_scalar(
            "SELECT observed_at FROM price_observations
             WHERE item_id = ? ORDER BY observed_at DESC LIMIT 1",
        )
        .bind(item_id)
        .fetch_optional(&mut *conn)
        .await?;

        let now = Utc::now();
        let observed_at = match last {
            Some(last) => last.max(now),
            None => now,
        };

        let id = generate_id();
        sqlx::query(
            "INSERT INTO price_observations (id, item_id, price, observed_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(item_id)
        .bind(price.to_string())
        .bind(observed_at)
        .execute(&mut *conn)
        .await?;

        Ok(id)
    }

    /// The most recent observation for an item, i.e. its current price.
    pub async fn latest(&self, item_id: &str) -> Result<Option<PriceObservation>> {
        let row = sqlx::query(
            "SELECT id, item_id, price, observed_at FROM price_observations
             WHERE item_id = ? ORDER BY observed_at DESC, rowid DESC LIMIT 1",
        )
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(observation_from_row).transpose()
    }

    /// Full history for an item, newest first, as a lazy restartable stream.
    pub fn history_stream<'a>(
        &'a self,
        item_id: &'a str,
    ) -> impl Stream<Item = Result<PriceObservation>> + 'a {
        sqlx::query(
            "SELECT id, item_id, price, observed_at FROM price_observations
             WHERE item_id = ? ORDER BY observed_at DESC, rowid DESC",
        )
        .bind(item_id)
        .fetch(&self.pool)
        .map(|row| {
            row.map_err(AppError::from)
                .and_then(|r| observation_from_row(&r))
        })
    }

    /// Convenience over [`Self::history_stream`] for callers that want the
    /// whole history at once.
    pub async fn history(&self, item_id: &str) -> Result<Vec<PriceObservation>> {
        self.history_stream(item_id).try_collect().await
    }
}

fn item_from_row(row: &SqliteRow) -> Result<TrackedItem> {
    let target_price: String = row.try_get("target_price")?;
    Ok(TrackedItem {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        url: row.try_get("url")?,
        target_price: Decimal::from_str(&target_price)
            .map_err(|e| AppError::Internal(format!("Corrupt target_price in store: {e}")))?,
    })
}

fn observation_from_row(row: &SqliteRow) -> Result<PriceObservation> {
    let price: String = row.try_get("price")?;
    Ok(PriceObservation {
        id: row.try_get("id")?,
        item_id: row.try_get("item_id")?,
        price: Decimal::from_str(&price)
            .map_err(|e| AppError::Internal(format!("Corrupt price in store: {e}")))?,
        observed_at: row.try_get("observed_at")?,
    })
}
