use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use proptree_types::{ETag, MTime, Record, RecordId};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{FromRow, Pool, Sqlite};

use crate::error::{StoreError, StoreResult};
use crate::traits::{check_batch, PathRewrite, RecordStore};

const CREATE_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS records (
    id       TEXT    NOT NULL PRIMARY KEY,
    path     TEXT    NOT NULL,
    checksum TEXT    NOT NULL DEFAULT '',
    etag     TEXT    NOT NULL,
    mtime    INTEGER NOT NULL
)
"#;

const CREATE_PATH_INDEX_SQL: &str =
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_records_path ON records (path)";

// Subtree match as one range over `idx_records_path`: `[prefix, prefix0)`
// holds the path itself, everything under `prefix/`, and siblings such as
// `prefix-x` that sort below `prefix/`; the inner test drops those siblings.
// Binds: prefix, upper bound, prefix, child floor.
const SUBTREE_FILTER: &str = "(path >= ? AND path < ? AND (path = ? OR path >= ?))";

#[derive(Debug, FromRow)]
struct RecordRow {
    id: String,
    path: String,
    checksum: String,
    etag: String,
    mtime: i64,
}

impl TryFrom<RecordRow> for Record {
    type Error = StoreError;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        let corrupt = |reason: String| StoreError::Corrupt {
            path: row.path.clone(),
            reason,
        };
        let id = RecordId::parse(row.id.clone()).map_err(|e| corrupt(e.to_string()))?;
        let mtime = MTime::from_i64(row.mtime).map_err(|e| corrupt(e.to_string()))?;
        Ok(Record::new(
            id,
            row.path,
            row.checksum,
            ETag::from_string(row.etag),
            mtime,
        ))
    }
}

/// Range bounds for the subtree of `prefix`: `(upper, child_floor)`.
///
/// `child_floor` is `prefix/`, the smallest key strictly below `prefix`;
/// `upper` is `prefix0`, since `'0'` is the byte after `'/'`.
fn subtree_bounds(prefix: &str) -> (String, String) {
    let stem = prefix.strip_suffix('/').unwrap_or(prefix);
    (format!("{stem}0"), format!("{stem}/"))
}

fn mtime_column(mtime: MTime) -> StoreResult<i64> {
    mtime.to_i64().map_err(|e| StoreError::InvalidValue(e.to_string()))
}

/// SQLite-backed record store.
///
/// One table, unique on `path`. The pool holds a single connection: SQLite
/// serializes writers anyway, and an in-memory database lives only as long as
/// its connection.
pub struct SqliteRecordStore {
    pool: Pool<Sqlite>,
}

impl SqliteRecordStore {
    /// Open (creating if needed) a database file.
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::connect(&format!("sqlite:{}?mode=rwc", path.display())).await
    }

    /// Connect using an sqlx SQLite URL such as `sqlite::memory:` or
    /// `sqlite:/var/lib/proptree/records.db`.
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let opts = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        tracing::info!(url, "sqlite record store ready");
        Ok(store)
    }

    /// Create the schema if it does not exist yet.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::query(CREATE_TABLE_SQL).execute(&self.pool).await?;
        sqlx::query(CREATE_PATH_INDEX_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn get_by_path(&self, path: &str) -> StoreResult<Option<Record>> {
        let row = sqlx::query_as::<_, RecordRow>(
            "SELECT id, path, checksum, etag, mtime FROM records WHERE path = ?",
        )
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Record::try_from).transpose()
    }

    async fn get_by_prefix(&self, prefix: &str) -> StoreResult<Vec<Record>> {
        let (upper, child_floor) = subtree_bounds(prefix);
        let sql = format!(
            "SELECT id, path, checksum, etag, mtime FROM records WHERE {SUBTREE_FILTER} ORDER BY path"
        );
        let rows = sqlx::query_as::<_, RecordRow>(&sql)
            .bind(prefix)
            .bind(&upper)
            .bind(prefix)
            .bind(&child_floor)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Record::try_from).collect()
    }

    async fn upsert(&self, record: &Record) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO records (id, path, checksum, etag, mtime) VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(path) DO UPDATE SET
                checksum = excluded.checksum,
                etag = excluded.etag,
                mtime = excluded.mtime
            "#,
        )
        .bind(record.id.as_str())
        .bind(&record.path)
        .bind(&record.checksum)
        .bind(record.etag.as_str())
        .bind(mtime_column(record.mtime)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn conditional_update(
        &self,
        path: &str,
        etag: &ETag,
        mtime: MTime,
    ) -> StoreResult<bool> {
        let mtime = mtime_column(mtime)?;
        let result =
            sqlx::query("UPDATE records SET etag = ?, mtime = ? WHERE path = ? AND mtime < ?")
                .bind(etag.as_str())
                .bind(mtime)
                .bind(path)
                .bind(mtime)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_older_than(&self, path: &str, cutoff: MTime) -> StoreResult<u64> {
        let (upper, child_floor) = subtree_bounds(path);
        let sql = format!("DELETE FROM records WHERE {SUBTREE_FILTER} AND mtime < ?");
        let result = sqlx::query(&sql)
            .bind(path)
            .bind(&upper)
            .bind(path)
            .bind(&child_floor)
            .bind(mtime_column(cutoff)?)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn rewrite_paths(&self, rewrites: &[PathRewrite]) -> StoreResult<()> {
        check_batch(rewrites)?;

        // Dropping `tx` on any early return rolls the whole batch back.
        let mut tx = self.pool.begin().await?;
        for rw in rewrites {
            let result = sqlx::query("UPDATE records SET path = ? WHERE path = ?")
                .bind(&rw.to)
                .bind(&rw.from)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    let occupied =
                        matches!(&e, sqlx::Error::Database(db) if db.is_unique_violation());
                    if occupied {
                        StoreError::PathOccupied(rw.to.clone())
                    } else {
                        StoreError::Database(e)
                    }
                })?;
            if result.rows_affected() == 0 {
                return Err(StoreError::SourceMissing(rw.from.clone()));
            }
        }
        tx.commit().await?;
        Ok(())
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

impl std::fmt::Debug for SqliteRecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteRecordStore")
            .field("pool_size", &self.pool.size())
            .finish()
    }
}
