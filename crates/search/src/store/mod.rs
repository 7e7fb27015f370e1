//! SQLite store access
//!
//! Provides:
//! - Connection management for the single-file database (busy-wait timeout,
//!   schema bootstrap for the owned embedding-cache table)
//! - Full-text candidate reads (`MATCH` + `bm25(fts)` raw scores)
//! - File-path to file-uid resolution
//! - Batched embedding-cache reads and transactional writes
//!
//! The `files` and `fts` tables are produced by the external indexer; this
//! module only reads them. The `embeddings` table is owned here.

use kbfuse_common::config::StoreConfig;
use kbfuse_common::embeddings::ProviderIdentity;
use kbfuse_common::errors::Result;
use rusqlite::types::Value;
use rusqlite::{params, Connection, OpenFlags};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// One BM25 candidate row from the full-text index.
///
/// `raw_score` is the raw `bm25(fts)` value: lower = more relevant.
#[derive(Debug, Clone)]
pub struct FtsRow {
    pub chunk_id: i64,
    pub text: String,
    pub raw_score: f64,
    pub text_hash: [u8; 16],
}

const CACHE_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS embeddings (
    text_hash BLOB NOT NULL,
    model     TEXT NOT NULL,
    dim       INTEGER NOT NULL,
    version   TEXT NOT NULL,
    vector    BLOB NOT NULL,
    ts        REAL NOT NULL,
    PRIMARY KEY (text_hash, model, dim, version)
)";

/// Store wrapper around the single-file SQLite database.
///
/// The connection is guarded by a mutex; contended access serializes through
/// SQLite's busy handler with the configured timeout.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open the store at the configured path.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let conn = Connection::open_with_flags(
            &config.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(config.busy_timeout())?;
        conn.execute(CACHE_SCHEMA, [])?;
        debug!(path = %config.path, "store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory store (used by tests and fixtures).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute(CACHE_SCHEMA, [])?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run a closure against the raw connection (fixture setup in tests).
    pub fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> Result<T> {
        let conn = self.conn.lock().expect("store lock poisoned");
        Ok(f(&conn)?)
    }

    /// Resolve the file uid for an indexed path, if any.
    pub fn file_uid_for_path(&self, path: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().expect("store lock poisoned");
        let mut stmt = conn.prepare_cached("SELECT file_uid FROM files WHERE path = ?1")?;
        let mut rows = stmt.query(params![path])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    /// Fetch up to `limit` BM25 candidates for a match expression, restricted
    /// to one file, best first.
    pub fn fts_search(&self, match_expr: &str, file_uid: &str, limit: usize) -> Result<Vec<FtsRow>> {
        let conn = self.conn.lock().expect("store lock poisoned");
        let mut stmt = conn.prepare_cached(
            "SELECT rowid, text, bm25(fts) AS r, text_hash \
             FROM fts WHERE fts MATCH ?1 AND file_uid = ?2 ORDER BY r LIMIT ?3",
        )?;
        let mut out = Vec::new();
        let mut rows = stmt.query(params![match_expr, file_uid, limit as i64])?;
        while let Some(row) = rows.next()? {
            let chunk_id: i64 = row.get(0)?;
            let text: String = row.get(1)?;
            let raw_score: f64 = row.get(2)?;
            let hash_blob: Vec<u8> = row.get(3)?;
            let text_hash = match hash_blob.try_into() {
                Ok(hash) => hash,
                // unusable as a cache key; recompute from the body
                Err(_) => content_hash(&text),
            };
            out.push(FtsRow {
                chunk_id,
                text,
                raw_score,
                text_hash,
            });
        }
        Ok(out)
    }

    /// Batched read of cached vectors for a set of content hashes under one
    /// provider identity. Missing hashes are simply absent from the map.
    pub fn load_cached_vectors(
        &self,
        hashes: &[[u8; 16]],
        identity: &ProviderIdentity,
    ) -> Result<HashMap<[u8; 16], Vec<f32>>> {
        let mut found = HashMap::new();
        if hashes.is_empty() {
            return Ok(found);
        }

        let placeholders = vec!["?"; hashes.len()].join(",");
        let sql = format!(
            "SELECT text_hash, vector FROM embeddings \
             WHERE text_hash IN ({placeholders}) AND model = ? AND dim = ? AND version = ?"
        );

        let mut values: Vec<Value> = hashes.iter().map(|h| Value::Blob(h.to_vec())).collect();
        values.push(Value::Text(identity.model.clone()));
        values.push(Value::Integer(identity.dim as i64));
        values.push(Value::Text(identity.version_key.clone()));

        let conn = self.conn.lock().expect("store lock poisoned");
        let mut stmt = conn.prepare_cached(&sql)?;
        let mut rows = stmt.query(rusqlite::params_from_iter(values))?;
        while let Some(row) = rows.next()? {
            let hash_blob: Vec<u8> = row.get(0)?;
            let vector_blob: Vec<u8> = row.get(1)?;
            let Ok(hash) = <[u8; 16]>::try_from(hash_blob) else {
                continue;
            };
            let vector = vector_from_bytes(&vector_blob);
            if vector.len() == identity.dim {
                found.insert(hash, vector);
            }
        }
        Ok(found)
    }

    /// Write freshly embedded vectors in one transaction with
    /// INSERT OR REPLACE semantics.
    pub fn store_vectors(
        &self,
        entries: &[([u8; 16], Vec<f32>)],
        identity: &ProviderIdentity,
    ) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);

        let mut conn = self.conn.lock().expect("store lock poisoned");
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO embeddings (text_hash, model, dim, version, vector, ts) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for (hash, vector) in entries {
                stmt.execute(params![
                    hash.as_slice(),
                    identity.model,
                    identity.dim as i64,
                    identity.version_key,
                    vector_to_bytes(vector),
                    now,
                ])?;
            }
        }
        tx.commit()?;
        debug!(count = entries.len(), "cached new vectors");
        Ok(())
    }
}

/// 128-bit content hash of a UTF-8 text body.
pub fn content_hash(text: &str) -> [u8; 16] {
    md5::compute(text.as_bytes()).0
}

/// Serialize a vector as little-endian f32 bytes.
pub fn vector_to_bytes(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for x in vector {
        bytes.extend_from_slice(&x.to_le_bytes());
    }
    bytes
}

/// Deserialize little-endian f32 bytes back into a vector.
pub fn vector_from_bytes(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> ProviderIdentity {
        ProviderIdentity {
            model: "mock-embedding".to_string(),
            dim: 4,
            version_key: "v1".to_string(),
        }
    }

    fn fixture_store() -> Store {
        let store = Store::open_in_memory().unwrap();
        store
            .with_connection(|conn| {
                conn.execute_batch(
                    "CREATE TABLE files (file_uid TEXT PRIMARY KEY, path TEXT NOT NULL);
                     CREATE VIRTUAL TABLE fts USING fts5(text, file_uid UNINDEXED, text_hash UNINDEXED);",
                )
            })
            .unwrap();
        store
    }

    fn insert_chunk(store: &Store, id: i64, file_uid: &str, text: &str) {
        let hash = content_hash(text);
        store
            .with_connection(|conn| {
                conn.execute(
                    "INSERT INTO fts (rowid, text, file_uid, text_hash) VALUES (?1, ?2, ?3, ?4)",
                    params![id, text, file_uid, hash.as_slice()],
                )
            })
            .unwrap();
    }

    #[test]
    fn test_vector_bytes_roundtrip() {
        let vector = vec![0.25f32, -1.5, 3.0];
        let bytes = vector_to_bytes(&vector);
        assert_eq!(bytes.len(), 12);
        assert_eq!(vector_from_bytes(&bytes), vector);
    }

    #[test]
    fn test_file_uid_lookup() {
        let store = fixture_store();
        store
            .with_connection(|conn| {
                conn.execute(
                    "INSERT INTO files (file_uid, path) VALUES ('u1', '/tmp/doc.txt')",
                    [],
                )
            })
            .unwrap();

        assert_eq!(
            store.file_uid_for_path("/tmp/doc.txt").unwrap(),
            Some("u1".to_string())
        );
        assert_eq!(store.file_uid_for_path("/tmp/other.txt").unwrap(), None);
    }

    #[test]
    fn test_fts_search_filters_by_file() {
        let store = fixture_store();
        insert_chunk(&store, 1, "u1", "the ratification of 1789");
        insert_chunk(&store, 2, "u2", "ratification elsewhere");

        let rows = store.fts_search("\"ratification\"", "u1", 10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].chunk_id, 1);
        assert_eq!(rows[0].text_hash, content_hash("the ratification of 1789"));
    }

    #[test]
    fn test_cache_roundtrip_and_version_isolation() {
        let store = fixture_store();
        let id = identity();
        let hash = content_hash("some text");
        let vector = vec![0.1f32, 0.2, 0.3, 0.4];

        store.store_vectors(&[(hash, vector.clone())], &id).unwrap();

        let found = store.load_cached_vectors(&[hash], &id).unwrap();
        assert_eq!(found.get(&hash), Some(&vector));

        // A different version key must not see the record.
        let other = ProviderIdentity {
            version_key: "v2".to_string(),
            ..id
        };
        let found = store.load_cached_vectors(&[hash], &other).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_cache_write_is_deterministic() {
        let store = fixture_store();
        let id = identity();
        let hash = content_hash("stable text");
        let vector = vec![0.5f32, 0.5, 0.5, 0.5];

        store.store_vectors(&[(hash, vector.clone())], &id).unwrap();
        store.store_vectors(&[(hash, vector.clone())], &id).unwrap();

        let stored: Vec<u8> = store
            .with_connection(|conn| {
                conn.query_row(
                    "SELECT vector FROM embeddings WHERE text_hash = ?1",
                    params![hash.as_slice()],
                    |row| row.get(0),
                )
            })
            .unwrap();
        assert_eq!(stored, vector_to_bytes(&vector));
    }
}
