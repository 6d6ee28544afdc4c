use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::types::Json;
use sqlx::FromRow;
use std::path::Path;
use std::str::FromStr;

use crate::models::{NewSample, PriceSample, SampleMeta};
use crate::utils::error::StorageError;

/// Append-only price history, one row per observation.
#[async_trait]
pub trait SampleStore: Send + Sync {
    /// Persist one observation stamped with the current time.
    async fn append_sample(&self, sample: NewSample) -> Result<PriceSample, StorageError>;

    /// Most recent samples for an item, newest first.
    async fn recent_samples(
        &self,
        item_id: &str,
        limit: usize,
    ) -> Result<Vec<PriceSample>, StorageError>;

    async fn latest_sample(&self, item_id: &str) -> Result<Option<PriceSample>, StorageError> {
        Ok(self.recent_samples(item_id, 1).await?.into_iter().next())
    }

    async fn delete_item_samples(&self, item_id: &str) -> Result<u64, StorageError>;

    async fn ping(&self) -> Result<(), StorageError>;
}

#[derive(FromRow)]
struct SampleRow {
    item_id: String,
    ts: DateTime<Utc>,
    price: f64,
    currency: String,
    meta: Option<Json<SampleMeta>>,
}

impl From<SampleRow> for PriceSample {
    fn from(row: SampleRow) -> Self {
        PriceSample {
            item_id: row.item_id,
            timestamp: row.ts,
            price: row.price,
            currency: row.currency,
            meta: row.meta.map(|m| m.0).unwrap_or_default(),
        }
    }
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database file and apply migrations.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Self::with_pool(pool).await
    }

    /// Private in-memory database. One connection, kept alive for the life of the pool.
    pub async fn in_memory() -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::with_pool(pool).await
    }

    pub async fn with_pool(pool: SqlitePool) -> Result<Self, StorageError> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl SampleStore for SqliteStore {
    async fn append_sample(&self, sample: NewSample) -> Result<PriceSample, StorageError> {
        sample.validate().map_err(StorageError::InvalidSample)?;

        let sample = sample.into_sample(Utc::now());

        sqlx::query(
            r#"
            INSERT INTO prices (item_id, ts, price, currency, meta)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&sample.item_id)
        .bind(sample.timestamp)
        .bind(sample.price)
        .bind(&sample.currency)
        .bind(Json(&sample.meta))
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            "Stored sample for {}: {} {}",
            sample.item_id,
            sample.price,
            sample.currency
        );
        Ok(sample)
    }

    async fn recent_samples(
        &self,
        item_id: &str,
        limit: usize,
    ) -> Result<Vec<PriceSample>, StorageError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, SampleRow>(
            r#"
            SELECT item_id, ts, price, currency, meta
            FROM prices
            WHERE item_id = ?
            ORDER BY ts DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(item_id)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(PriceSample::from).collect())
    }

    async fn delete_item_samples(&self, item_id: &str) -> Result<u64, StorageError> {
        let result = sqlx::query("DELETE FROM prices WHERE item_id = ?")
            .bind(item_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn ping(&self) -> Result<(), StorageError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
