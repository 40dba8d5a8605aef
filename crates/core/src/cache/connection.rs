//! Database connection management with pragma configuration.
//!
//! This module handles opening the SQLite database, applying required pragmas
//! for performance and concurrency (WAL mode), enforcing an optional byte
//! quota, and running migrations.

use super::migrations;
use crate::Error;
use std::path::Path;
use tokio_rusqlite::Connection;

const PRAGMAS: &str = "PRAGMA journal_mode=WAL;
     PRAGMA synchronous=NORMAL;
     PRAGMA temp_store=MEMORY;
     PRAGMA foreign_keys=ON;";

/// Cache database handle.
///
/// Wraps a tokio-rusqlite Connection that runs database operations
/// on a background thread.
#[derive(Clone, Debug)]
pub struct CacheDb {
    pub(crate) conn: Connection,
}

impl CacheDb {
    /// Open a database at the specified path.
    ///
    /// Creates the file if it doesn't exist, applies performance pragmas,
    /// and runs any pending migrations.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let conn = Connection::open(path).await.map_err(|e| Error::Database(e.into()))?;
        Self::init(conn).await
    }

    /// Open a database at the specified path with a storage quota.
    ///
    /// Writes that would grow the database beyond `quota_bytes` fail with
    /// [`Error::StorageQuotaExceeded`].
    pub async fn open_with_quota(path: impl AsRef<Path>, quota_bytes: Option<u64>) -> Result<Self, Error> {
        let db = Self::open(path).await?;
        if let Some(quota) = quota_bytes {
            db.set_quota(quota).await?;
        }
        Ok(db)
    }

    /// Open an in-memory database for testing.
    ///
    /// Creates a temporary in-memory SQLite database with the same
    /// pragma configuration as file-based databases.
    pub async fn open_in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| Error::Database(e.into()))?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, Error> {
        conn.call(|conn| {
            conn.execute_batch(PRAGMAS)?;
            Ok(())
        })
        .await
        .map_err(Error::Database)?;

        migrations::run(&conn).await?;

        Ok(Self { conn })
    }

    /// Cap the database size by limiting its page count.
    pub async fn set_quota(&self, quota_bytes: u64) -> Result<(), Error> {
        let max_pages = self
            .conn
            .call(move |conn| -> Result<i64, Error> {
                let page_size: i64 = conn.query_row("PRAGMA page_size", [], |row| row.get(0))?;
                let max_pages = (i64::try_from(quota_bytes).unwrap_or(i64::MAX) / page_size.max(1)).max(1);
                let applied: i64 =
                    conn.query_row(&format!("PRAGMA max_page_count = {max_pages}"), [], |row| row.get(0))?;
                Ok(applied)
            })
            .await
            .map_err(Error::from)?;

        tracing::debug!(quota_bytes, max_pages, "cache quota applied");
        Ok(())
    }
}
