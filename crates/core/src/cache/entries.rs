//! Bucket and entry operations for the SQLite store.
//!
//! Entries are ordered by a store-wide write sequence so that expiration can
//! evict in insertion order even when several writes share a timestamp.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_rusqlite::{params, rusqlite};

use super::connection::CacheDb;
use super::{CacheEntry, CacheStore, EntryMeta};
use crate::Error;
use crate::response::CachedResponse;

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

#[async_trait]
impl CacheStore for CacheDb {
    async fn open_bucket(&self, bucket: &str) -> Result<(), Error> {
        let bucket = bucket.to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO buckets (name, created_at) VALUES (?1, ?2) ON CONFLICT(name) DO NOTHING",
                    params![bucket, now],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Option<CacheEntry>, Error> {
        let bucket = bucket.to_string();
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<Option<CacheEntry>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT key, url, response_url, status, headers_json, body, stored_at
                     FROM entries WHERE bucket = ?1 AND key = ?2",
                )?;

                let result = stmt.query_row(params![bucket, key], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, u16>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, Vec<u8>>(5)?,
                        row.get::<_, i64>(6)?,
                    ))
                });

                match result {
                    Ok((key, url, response_url, status, headers_json, body, stored_at)) => {
                        let headers: BTreeMap<String, String> = serde_json::from_str(&headers_json)?;
                        Ok(Some(CacheEntry {
                            key,
                            url,
                            response: CachedResponse { url: response_url, status, headers, body },
                            stored_at: from_millis(stored_at),
                        }))
                    }
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    async fn put(&self, bucket: &str, entry: &CacheEntry) -> Result<(), Error> {
        let bucket = bucket.to_string();
        let entry = entry.clone();
        let headers_json = serde_json::to_string(&entry.response.headers)?;
        let now = Utc::now().to_rfc3339();

        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO buckets (name, created_at) VALUES (?1, ?2) ON CONFLICT(name) DO NOTHING",
                    params![&bucket, now],
                )?;
                tx.execute(
                    "INSERT INTO entries (bucket, key, url, response_url, status, headers_json, body, stored_at, seq)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, (SELECT COALESCE(MAX(seq), 0) + 1 FROM entries))
                     ON CONFLICT(bucket, key) DO UPDATE SET
                        url = excluded.url,
                        response_url = excluded.response_url,
                        status = excluded.status,
                        headers_json = excluded.headers_json,
                        body = excluded.body,
                        stored_at = excluded.stored_at,
                        seq = excluded.seq",
                    params![
                        &bucket,
                        &entry.key,
                        &entry.url,
                        &entry.response.url,
                        entry.response.status,
                        headers_json,
                        &entry.response.body,
                        entry.stored_at.timestamp_millis(),
                    ],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<bool, Error> {
        let bucket = bucket.to_string();
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute("DELETE FROM entries WHERE bucket = ?1 AND key = ?2", params![bucket, key])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    async fn entries(&self, bucket: &str) -> Result<Vec<EntryMeta>, Error> {
        let bucket = bucket.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<EntryMeta>, Error> {
                let mut stmt =
                    conn.prepare("SELECT key, url, stored_at FROM entries WHERE bucket = ?1 ORDER BY seq ASC")?;
                let rows = stmt.query_map(params![bucket], |row| {
                    Ok(EntryMeta {
                        key: row.get(0)?,
                        url: row.get(1)?,
                        stored_at: from_millis(row.get(2)?),
                    })
                })?;

                let mut entries = Vec::new();
                for row in rows {
                    entries.push(row?);
                }
                Ok(entries)
            })
            .await
            .map_err(Error::from)
    }

    async fn list_buckets(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM buckets ORDER BY name ASC")?;
                let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

                let mut names = Vec::new();
                for row in rows {
                    names.push(row?);
                }
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<bool, Error> {
        let bucket = bucket.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute("DELETE FROM buckets WHERE name = ?1", params![bucket])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }
}
