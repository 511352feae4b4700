//! Named cache stores.
//!
//! A store maps request identities to captured responses. Stores are created
//! by `open_store`, deleted as a whole by `delete_store`, and their entries are
//! removed with them through the foreign key cascade.

use super::connection::CacheDb;
use super::hash::compute_entry_key;
use crate::Error;
use crate::model::{CachedResponse, RequestKey};
use bytes::Bytes;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::{self, OptionalExtension};
use url::Url;

impl CacheDb {
    /// Open a store, creating it if it doesn't exist.
    pub async fn open_store(&self, name: &str) -> Result<(), Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT OR IGNORE INTO stores (name, created_at) VALUES (?1, ?2)",
                    params![name, chrono::Utc::now().to_rfc3339()],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Check whether a store exists.
    pub async fn has_store(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let exists = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM stores WHERE name = ?1)",
                    params![name],
                    |row| row.get(0),
                )?;
                Ok(exists)
            })
            .await
            .map_err(Error::from)
    }

    /// Names of every existing store, oldest first.
    pub async fn store_names(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM stores ORDER BY created_at, name")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a store and all of its entries.
    ///
    /// Returns false if the store did not exist.
    pub async fn delete_store(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute("DELETE FROM stores WHERE name = ?1", params![name])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Insert or replace the response stored for `key`.
    ///
    /// # Errors
    ///
    /// Returns `Error::StoreMissing` if the store has not been opened.
    pub async fn put(&self, store: &str, key: &RequestKey, response: &CachedResponse) -> Result<(), Error> {
        let store = store.to_string();
        let row = EntryRow::new(key, response)?;

        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                if !store_exists(&tx, &store)? {
                    return Err(Error::StoreMissing(store));
                }
                row.upsert(&tx, &store)?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Insert or replace an entry in a store belonging to `version`.
    ///
    /// A missing store is created only while `version` is the registered
    /// active version, so a write that races an activation can't bring back a
    /// store the activation already reaped. Returns false if the write was
    /// skipped.
    pub async fn put_for_version(
        &self, store: &str, version: &str, key: &RequestKey, response: &CachedResponse,
    ) -> Result<bool, Error> {
        let store = store.to_string();
        let version = version.to_string();
        let row = EntryRow::new(key, response)?;

        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let tx = conn.transaction()?;
                if !store_exists(&tx, &store)? {
                    let active: Option<String> = tx
                        .query_row("SELECT active_version FROM registration WHERE id = 1", [], |row| row.get(0))
                        .optional()?;
                    if active.as_deref() != Some(version.as_str()) {
                        return Ok(false);
                    }
                    tx.execute(
                        "INSERT INTO stores (name, created_at) VALUES (?1, ?2)",
                        params![store, chrono::Utc::now().to_rfc3339()],
                    )?;
                }
                row.upsert(&tx, &store)?;
                tx.commit()?;
                Ok(true)
            })
            .await
            .map_err(Error::from)
    }

    /// Look up the response stored for `key`.
    ///
    /// Returns None if either the store or the entry doesn't exist.
    pub async fn match_request(&self, store: &str, key: &RequestKey) -> Result<Option<CachedResponse>, Error> {
        let store = store.to_string();
        let key_hash = compute_entry_key(key);
        self.conn
            .call(move |conn| -> Result<Option<CachedResponse>, Error> {
                let result = conn.query_row(
                    "SELECT status, status_text, headers_json, body
                    FROM entries WHERE store_name = ?1 AND key_hash = ?2",
                    params![store, key_hash],
                    |row| {
                        Ok((
                            row.get::<_, u16>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, Vec<u8>>(3)?,
                        ))
                    },
                );

                match result {
                    Ok((status, status_text, headers_json, body)) => Ok(Some(CachedResponse {
                        status,
                        status_text,
                        headers: serde_json::from_str(&headers_json)?,
                        body: body.into(),
                    })),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Request identities stored in a store, in insertion order.
    pub async fn keys(&self, store: &str) -> Result<Vec<RequestKey>, Error> {
        let store = store.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<RequestKey>, Error> {
                let mut stmt = conn.prepare("SELECT method, url FROM entries WHERE store_name = ?1 ORDER BY rowid")?;
                let rows = stmt
                    .query_map(params![store], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
                    .collect::<Result<Vec<_>, _>>()?;

                rows.into_iter()
                    .map(|(method, url)| {
                        let url = Url::parse(&url).map_err(|e| Error::CorruptEntry(format!("{url}: {e}")))?;
                        Ok(RequestKey { method, url })
                    })
                    .collect()
            })
            .await
            .map_err(Error::from)
    }

    /// Delete one entry. Returns false if it did not exist.
    pub async fn delete_entry(&self, store: &str, key: &RequestKey) -> Result<bool, Error> {
        let store = store.to_string();
        let key_hash = compute_entry_key(key);
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute(
                    "DELETE FROM entries WHERE store_name = ?1 AND key_hash = ?2",
                    params![store, key_hash],
                )?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Replace the contents of `target` with the entries of `source`, then
    /// delete `source`.
    ///
    /// Runs in one transaction: readers see either the old `target` or the
    /// complete new one. `target` is created if it doesn't exist. Returns the
    /// number of entries copied.
    ///
    /// # Errors
    ///
    /// Returns `Error::StoreMissing` if `source` doesn't exist.
    pub async fn promote_store(&self, source: &str, target: &str) -> Result<usize, Error> {
        let source = source.to_string();
        let target = target.to_string();
        self.conn
            .call(move |conn| -> Result<usize, Error> {
                let tx = conn.transaction()?;
                let exists: bool =
                    tx.query_row("SELECT EXISTS(SELECT 1 FROM stores WHERE name = ?1)", params![source], |row| {
                        row.get(0)
                    })?;
                if !exists {
                    return Err(Error::StoreMissing(source));
                }

                tx.execute(
                    "INSERT OR IGNORE INTO stores (name, created_at) VALUES (?1, ?2)",
                    params![target, chrono::Utc::now().to_rfc3339()],
                )?;
                let cleared = tx.execute("DELETE FROM entries WHERE store_name = ?1", params![target])?;
                let copied = tx.execute(
                    "INSERT INTO entries (
                    store_name, key_hash, method, url, status, status_text, headers_json, body, stored_at
                )
                SELECT ?1, key_hash, method, url, status, status_text, headers_json, body, stored_at
                FROM entries WHERE store_name = ?2 ORDER BY rowid",
                    params![target, source],
                )?;
                tx.execute("DELETE FROM stores WHERE name = ?1", params![source])?;
                tx.commit()?;

                tracing::debug!(source = %source, target = %target, cleared, copied, "promoted store");
                Ok(copied)
            })
            .await
            .map_err(Error::from)
    }

    /// Number of entries in a store.
    pub async fn entry_count(&self, store: &str) -> Result<usize, Error> {
        let store = store.to_string();
        self.conn
            .call(move |conn| -> Result<usize, Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM entries WHERE store_name = ?1", params![store], |row| {
                        row.get(0)
                    })?;
                Ok(count as usize)
            })
            .await
            .map_err(Error::from)
    }
}

fn store_exists(conn: &rusqlite::Connection, name: &str) -> rusqlite::Result<bool> {
    conn.query_row("SELECT EXISTS(SELECT 1 FROM stores WHERE name = ?1)", params![name], |row| row.get(0))
}

/// An entry ready to be written, detached from the caller's borrows.
struct EntryRow {
    key_hash: String,
    method: String,
    url: String,
    status: u16,
    status_text: String,
    headers_json: String,
    body: Bytes,
}

impl EntryRow {
    fn new(key: &RequestKey, response: &CachedResponse) -> Result<Self, Error> {
        Ok(Self {
            key_hash: compute_entry_key(key),
            method: key.method.clone(),
            url: key.url.to_string(),
            status: response.status,
            status_text: response.status_text.clone(),
            headers_json: serde_json::to_string(&response.headers)?,
            body: response.body.clone(),
        })
    }

    fn upsert(&self, conn: &rusqlite::Connection, store: &str) -> rusqlite::Result<()> {
        conn.execute(
            "INSERT INTO entries (
                store_name, key_hash, method, url, status, status_text, headers_json, body, stored_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(store_name, key_hash) DO UPDATE SET
                status = excluded.status,
                status_text = excluded.status_text,
                headers_json = excluded.headers_json,
                body = excluded.body,
                stored_at = excluded.stored_at",
            params![
                store,
                self.key_hash,
                self.method,
                self.url,
                self.status,
                self.status_text,
                self.headers_json,
                self.body.as_ref(),
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}
