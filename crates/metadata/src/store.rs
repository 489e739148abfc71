//! Tile store trait and the SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::models::{TilePatch, TileRecord, TileStatus};
use async_trait::async_trait;
use mural_core::TileCoord;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use time::OffsetDateTime;

/// Metadata store owning tile records.
///
/// Absent coordinates are logically Empty: `batch_get` synthesizes Empty
/// records for them, and `upsert` merge-creates on first touch.
#[async_trait]
pub trait TileStore: Send + Sync {
    /// Fetch a record, or None if the coordinate has never been touched.
    async fn get(&self, coord: TileCoord) -> MetadataResult<Option<TileRecord>>;

    /// Idempotent merge-create: create an Empty record if absent, then
    /// apply the patch.
    async fn upsert(&self, coord: TileCoord, patch: TilePatch) -> MetadataResult<TileRecord>;

    /// Apply a patch to an existing record; errors NotFound if absent.
    async fn update(&self, coord: TileCoord, patch: TilePatch) -> MetadataResult<TileRecord>;

    /// Fetch many records; absent coordinates come back as synthesized
    /// Empty records (not persisted).
    async fn batch_get(&self, coords: &[TileCoord]) -> MetadataResult<Vec<TileRecord>>;

    /// All records currently Pending. Used at startup to recover tiles
    /// orphaned mid-generation by a crashed process.
    async fn list_pending(&self) -> MetadataResult<Vec<TileRecord>>;

    /// Check store connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS tiles (
    z INTEGER NOT NULL,
    x INTEGER NOT NULL,
    y INTEGER NOT NULL,
    status TEXT NOT NULL DEFAULT 'EMPTY',
    payload_hash TEXT,
    content_hash TEXT,
    seed TEXT,
    content_ver INTEGER NOT NULL DEFAULT 0,
    locked INTEGER NOT NULL DEFAULT 0,
    locked_at TEXT,
    locked_by TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (z, x, y)
);

CREATE INDEX IF NOT EXISTS idx_tiles_status ON tiles (status);
"#;

/// SQLite-based tile store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

/// Raw row shape; statuses are stored as text.
#[derive(FromRow)]
struct TileRow {
    z: i64,
    x: i64,
    y: i64,
    status: String,
    payload_hash: Option<String>,
    content_hash: Option<String>,
    seed: Option<String>,
    content_ver: i64,
    locked: bool,
    locked_at: Option<OffsetDateTime>,
    locked_by: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl TileRow {
    fn into_record(self) -> MetadataResult<TileRecord> {
        let status = TileStatus::parse(&self.status).ok_or_else(|| {
            MetadataError::Internal(format!("unknown tile status in database: {}", self.status))
        })?;
        Ok(TileRecord {
            coord: TileCoord::new(self.z as u8, self.x as u32, self.y as u32),
            status,
            payload_hash: self.payload_hash,
            content_hash: self.content_hash,
            seed: self.seed,
            content_ver: self.content_ver,
            locked: self.locked,
            locked_at: self.locked_at,
            locked_by: self.locked_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl SqliteStore {
    /// Create a new SQLite store, running migrations.
    pub async fn new(path: impl AsRef<Path>) -> MetadataResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))
            .map_err(MetadataError::Database)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // SQLite permits limited write concurrency; a single connection
            // avoids persistent "database is locked" failures under load.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        tracing::debug!(path = %path.display(), "sqlite tile store opened");
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn fetch(
        executor: impl sqlx::SqliteExecutor<'_>,
        coord: TileCoord,
    ) -> MetadataResult<Option<TileRecord>> {
        let row = sqlx::query_as::<_, TileRow>(
            "SELECT * FROM tiles WHERE z = ? AND x = ? AND y = ?",
        )
        .bind(i64::from(coord.z))
        .bind(i64::from(coord.x))
        .bind(i64::from(coord.y))
        .fetch_optional(executor)
        .await?;
        row.map(TileRow::into_record).transpose()
    }

    async fn persist(
        executor: impl sqlx::SqliteExecutor<'_>,
        record: &TileRecord,
    ) -> MetadataResult<()> {
        sqlx::query(
            r#"
            UPDATE tiles SET
                status = ?, payload_hash = ?, content_hash = ?, seed = ?,
                content_ver = ?, locked = ?, locked_at = ?, locked_by = ?,
                updated_at = ?
            WHERE z = ? AND x = ? AND y = ?
            "#,
        )
        .bind(record.status.as_str())
        .bind(&record.payload_hash)
        .bind(&record.content_hash)
        .bind(&record.seed)
        .bind(record.content_ver)
        .bind(record.locked)
        .bind(record.locked_at)
        .bind(&record.locked_by)
        .bind(record.updated_at)
        .bind(i64::from(record.coord.z))
        .bind(i64::from(record.coord.x))
        .bind(i64::from(record.coord.y))
        .execute(executor)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl TileStore for SqliteStore {
    async fn get(&self, coord: TileCoord) -> MetadataResult<Option<TileRecord>> {
        Self::fetch(&self.pool, coord).await
    }

    async fn upsert(&self, coord: TileCoord, patch: TilePatch) -> MetadataResult<TileRecord> {
        let now = OffsetDateTime::now_utc();
        let mut tx = self.pool.begin().await?;

        let mut record = match Self::fetch(&mut *tx, coord).await? {
            Some(record) => record,
            None => {
                let record = TileRecord::new_empty(coord, now);
                sqlx::query(
                    "INSERT INTO tiles (z, x, y, status, content_ver, locked, created_at, updated_at) \
                     VALUES (?, ?, ?, ?, 0, 0, ?, ?)",
                )
                .bind(i64::from(coord.z))
                .bind(i64::from(coord.x))
                .bind(i64::from(coord.y))
                .bind(record.status.as_str())
                .bind(record.created_at)
                .bind(record.updated_at)
                .execute(&mut *tx)
                .await?;
                record
            }
        };

        patch.apply(&mut record, now);
        Self::persist(&mut *tx, &record).await?;
        tx.commit().await?;
        Ok(record)
    }

    async fn update(&self, coord: TileCoord, patch: TilePatch) -> MetadataResult<TileRecord> {
        let now = OffsetDateTime::now_utc();
        let mut tx = self.pool.begin().await?;

        let mut record = Self::fetch(&mut *tx, coord)
            .await?
            .ok_or_else(|| MetadataError::NotFound(format!("tile {coord}")))?;

        patch.apply(&mut record, now);
        Self::persist(&mut *tx, &record).await?;
        tx.commit().await?;
        Ok(record)
    }

    async fn batch_get(&self, coords: &[TileCoord]) -> MetadataResult<Vec<TileRecord>> {
        let now = OffsetDateTime::now_utc();
        let mut records = Vec::with_capacity(coords.len());
        for &coord in coords {
            let record = Self::fetch(&self.pool, coord)
                .await?
                .unwrap_or_else(|| TileRecord::new_empty(coord, now));
            records.push(record);
        }
        Ok(records)
    }

    async fn list_pending(&self) -> MetadataResult<Vec<TileRecord>> {
        let rows = sqlx::query_as::<_, TileRow>("SELECT * FROM tiles WHERE status = 'PENDING'")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TileRow::into_record).collect()
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
