//! SQLite-based named cache storage with file blob support
//!
//! Each named cache holds at most one response per key. Small bodies are
//! stored inline in SQLite, large ones (>10KB, e.g. images) as files.

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};

use crate::error::CacheError;
use crate::worker::fetch::{Response, ResponseKind};

/// Schema version - increment to trigger nuke-and-rebuild
const SCHEMA_VERSION: i32 = 1;

/// Bodies larger than this are stored as external blobs
const INLINE_THRESHOLD: usize = 10 * 1024; // 10KB

type Result<T> = std::result::Result<T, CacheError>;

/// SQLite-backed storage for named response caches
pub struct CacheStorage {
    conn: Connection,
    blobs_dir: PathBuf,
}

impl CacheStorage {
    /// Open cache storage at a specific directory
    pub fn open_at(cache_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(cache_dir)
            .map_err(|e| CacheError::Io(format!("Failed to create cache dir: {}", e)))?;

        let db_path = cache_dir.join("cache.db");
        let blobs_dir = cache_dir.join("blobs");
        std::fs::create_dir_all(&blobs_dir)
            .map_err(|e| CacheError::Io(format!("Failed to create blobs dir: {}", e)))?;

        let conn = Connection::open(&db_path)?;

        // Check schema version - nuke if mismatched
        let version: i32 = conn
            .pragma_query_value(None, "user_version", |r| r.get(0))
            .unwrap_or(0);

        if version != 0 && version != SCHEMA_VERSION {
            log::info!(
                "Cache schema version mismatch ({} != {}), rebuilding",
                version,
                SCHEMA_VERSION
            );
            drop(conn);
            Self::nuke(&db_path, &blobs_dir)?;
            return Self::open_at(cache_dir);
        }

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS caches (
                name TEXT PRIMARY KEY NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS cache_entries (
                cache_name TEXT NOT NULL,
                cache_key TEXT NOT NULL,
                url TEXT NOT NULL,
                status INTEGER NOT NULL,
                kind TEXT NOT NULL,
                headers TEXT NOT NULL,
                body BLOB,
                blob_path TEXT,
                created_at INTEGER NOT NULL,
                size_bytes INTEGER NOT NULL,
                PRIMARY KEY (cache_name, cache_key)
            );

            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL
            );
            "#,
        )?;

        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;

        Ok(Self { conn, blobs_dir })
    }

    /// Create the named cache if it does not exist yet
    pub fn open_cache(&self, name: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO caches (name, created_at) VALUES (?1, ?2)",
            params![name, Utc::now().timestamp()],
        )?;
        Ok(())
    }

    /// Names of all existing caches, oldest first
    pub fn keys(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM caches ORDER BY created_at, name")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(names)
    }

    /// Delete a whole cache and every entry in it
    pub fn delete_cache(&self, name: &str) -> Result<bool> {
        let blob_paths = self.blob_paths(Some(name))?;
        self.conn
            .execute("DELETE FROM cache_entries WHERE cache_name = ?1", [name])?;
        let deleted = self
            .conn
            .execute("DELETE FROM caches WHERE name = ?1", [name])?;
        self.remove_blobs(&blob_paths);
        Ok(deleted > 0)
    }

    /// Look up a response in one named cache
    pub fn match_in(&self, cache_name: &str, key: &str) -> Result<Option<Response>> {
        let row = self
            .conn
            .query_row(
                "SELECT url, status, kind, headers, body, blob_path FROM cache_entries
                 WHERE cache_name = ?1 AND cache_key = ?2",
                params![cache_name, key],
                Self::read_row,
            )
            .optional()?;

        match row {
            Some(row) => self.load_response(cache_name, key, row),
            None => Ok(None),
        }
    }

    /// Look up a response in any cache, oldest cache first
    pub fn match_any(&self, key: &str) -> Result<Option<Response>> {
        for name in self.keys()? {
            if let Some(response) = self.match_in(&name, key)? {
                return Ok(Some(response));
            }
        }
        Ok(None)
    }

    /// Store a response, replacing any previous entry for the key
    pub fn put(&self, cache_name: &str, key: &str, response: Response) -> Result<()> {
        self.open_cache(cache_name)?;

        let now = Utc::now().timestamp();
        let (status, kind, url, headers, body) = response.into_parts();
        let headers_json = serde_json::to_string(&headers)
            .map_err(|e| CacheError::Io(format!("Failed to encode headers: {}", e)))?;
        let size = body.len();

        // Replacing an entry that had a blob must not leak the old file
        let previous_blob: Option<String> = self
            .conn
            .query_row(
                "SELECT blob_path FROM cache_entries WHERE cache_name = ?1 AND cache_key = ?2",
                params![cache_name, key],
                |r| r.get(0),
            )
            .optional()?
            .flatten();

        if size <= INLINE_THRESHOLD {
            self.conn.execute(
                "INSERT OR REPLACE INTO cache_entries
                 (cache_name, cache_key, url, status, kind, headers, body, blob_path, created_at, size_bytes)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, ?8, ?9)",
                params![
                    cache_name,
                    key,
                    url,
                    status,
                    kind.as_str(),
                    headers_json,
                    body,
                    now,
                    size
                ],
            )?;
            if let Some(old) = previous_blob {
                self.remove_blobs(&[old]);
            }
        } else {
            let blob_path = self.write_blob(cache_name, key, &body)?;
            self.conn.execute(
                "INSERT OR REPLACE INTO cache_entries
                 (cache_name, cache_key, url, status, kind, headers, body, blob_path, created_at, size_bytes)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, ?7, ?8, ?9)",
                params![
                    cache_name,
                    key,
                    url,
                    status,
                    kind.as_str(),
                    headers_json,
                    blob_path,
                    now,
                    size
                ],
            )?;
        }
        Ok(())
    }

    /// Delete one entry from a named cache
    pub fn delete(&self, cache_name: &str, key: &str) -> Result<bool> {
        let blob: Option<String> = self
            .conn
            .query_row(
                "SELECT blob_path FROM cache_entries WHERE cache_name = ?1 AND cache_key = ?2",
                params![cache_name, key],
                |r| r.get(0),
            )
            .optional()?
            .flatten();

        let deleted = self.conn.execute(
            "DELETE FROM cache_entries WHERE cache_name = ?1 AND cache_key = ?2",
            params![cache_name, key],
        )?;
        if let Some(path) = blob {
            self.remove_blobs(&[path]);
        }
        Ok(deleted > 0)
    }

    /// Read a bookkeeping value
    pub fn get_meta(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .conn
            .query_row("SELECT value FROM meta WHERE key = ?1", [key], |r| r.get(0))
            .optional()?)
    }

    /// Write a bookkeeping value
    pub fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    /// Remove every cache and entry
    pub fn clear_all(&self) -> Result<ClearStats> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM cache_entries", [], |r| r.get(0))?;
        let caches: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM caches", [], |r| r.get(0))?;

        self.conn.execute_batch(
            "DELETE FROM cache_entries; DELETE FROM caches; DELETE FROM meta;",
        )?;

        if self.blobs_dir.exists() {
            if let Err(e) = std::fs::remove_dir_all(&self.blobs_dir) {
                log::warn!("Failed to clear blobs directory: {}", e);
            }
            std::fs::create_dir_all(&self.blobs_dir)
                .map_err(|e| CacheError::Io(format!("Failed to recreate blobs dir: {}", e)))?;
        }

        Ok(ClearStats {
            entries_removed: count as usize,
            caches_removed: caches as usize,
        })
    }

    /// Per-cache statistics
    pub fn stats(&self) -> Result<Vec<CacheStats>> {
        let mut stmt = self.conn.prepare(
            "SELECT c.name, COUNT(e.cache_key), COALESCE(SUM(e.size_bytes), 0), MAX(e.created_at)
             FROM caches c LEFT JOIN cache_entries e ON e.cache_name = c.name
             GROUP BY c.name ORDER BY c.created_at, c.name",
        )?;
        let stats = stmt
            .query_map([], |row| {
                Ok(CacheStats {
                    name: row.get(0)?,
                    entries: row.get::<_, i64>(1)? as usize,
                    total_size_bytes: row.get::<_, i64>(2)? as usize,
                    newest_entry: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(stats)
    }

    fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredRow> {
        Ok(StoredRow {
            url: row.get(0)?,
            status: row.get(1)?,
            kind: row.get(2)?,
            headers: row.get(3)?,
            body: row.get(4)?,
            blob_path: row.get(5)?,
        })
    }

    fn load_response(&self, cache_name: &str, key: &str, row: StoredRow) -> Result<Option<Response>> {
        let headers: Vec<(String, String)> = serde_json::from_str(&row.headers).unwrap_or_default();

        let body = match (row.body, row.blob_path) {
            (Some(body), None) => body,
            (None, Some(blob_path)) => {
                let full_path = self.blobs_dir.join(&blob_path);
                match std::fs::read(&full_path) {
                    Ok(data) => data,
                    Err(e) => {
                        log::warn!("Failed to read blob {}: {}", blob_path, e);
                        // Delete stale entry
                        let _ = self.conn.execute(
                            "DELETE FROM cache_entries WHERE cache_name = ?1 AND cache_key = ?2",
                            params![cache_name, key],
                        );
                        return Ok(None);
                    }
                }
            }
            _ => Vec::new(),
        };

        Ok(Some(Response::new(
            row.status,
            ResponseKind::parse(&row.kind),
            row.url,
            headers,
            body,
        )))
    }

    /// Write a blob file, sharded by first 2 chars of key
    fn write_blob(&self, cache_name: &str, key: &str, data: &[u8]) -> Result<String> {
        let shard = &key[..2.min(key.len())];
        let shard_dir = self.blobs_dir.join(shard);
        std::fs::create_dir_all(&shard_dir)
            .map_err(|e| CacheError::Io(format!("Failed to create shard dir: {}", e)))?;

        let filename = format!("{}-{}.bin", cache_name, key);
        let rel_path = format!("{}/{}", shard, filename);
        let full_path = shard_dir.join(&filename);

        std::fs::write(&full_path, data)
            .map_err(|e| CacheError::Io(format!("Failed to write blob: {}", e)))?;

        Ok(rel_path)
    }

    fn blob_paths(&self, cache_name: Option<&str>) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT blob_path FROM cache_entries
             WHERE blob_path IS NOT NULL AND (?1 IS NULL OR cache_name = ?1)",
        )?;
        let paths = stmt
            .query_map([cache_name], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(paths)
    }

    fn remove_blobs(&self, paths: &[String]) {
        for path in paths {
            if let Err(e) = std::fs::remove_file(self.blobs_dir.join(path)) {
                log::warn!("Failed to remove blob {}: {}", path, e);
            }
        }
    }

    /// Nuke the cache (delete DB and all blobs)
    fn nuke(db_path: &Path, blobs_dir: &Path) -> Result<()> {
        if db_path.exists() {
            std::fs::remove_file(db_path)
                .map_err(|e| CacheError::Io(format!("Failed to remove cache DB: {}", e)))?;
        }
        if blobs_dir.exists() {
            std::fs::remove_dir_all(blobs_dir)
                .map_err(|e| CacheError::Io(format!("Failed to remove blobs dir: {}", e)))?;
        }
        Ok(())
    }
}

struct StoredRow {
    url: String,
    status: u16,
    kind: String,
    headers: String,
    body: Option<Vec<u8>>,
    blob_path: Option<String>,
}

/// Statistics about cache clear operation
#[derive(Debug)]
pub struct ClearStats {
    pub entries_removed: usize,
    pub caches_removed: usize,
}

/// Statistics about one named cache
#[derive(Debug)]
pub struct CacheStats {
    pub name: String,
    pub entries: usize,
    pub total_size_bytes: usize,
    pub newest_entry: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_storage() -> (CacheStorage, TempDir) {
        let dir = TempDir::new().unwrap();
        let storage = CacheStorage::open_at(dir.path()).unwrap();
        (storage, dir)
    }

    fn response(body: &[u8]) -> Response {
        Response::new(
            200,
            ResponseKind::Basic,
            "https://example.org/a",
            vec![("content-type".to_string(), "text/plain".to_string())],
            body.to_vec(),
        )
    }

    #[test]
    fn test_put_match_inline() {
        let (storage, _dir) = test_storage();

        storage.put("static-v1", "key1", response(b"small data")).unwrap();

        let result = storage.match_in("static-v1", "key1").unwrap().unwrap();
        assert_eq!(result.status(), 200);
        assert_eq!(result.header("Content-Type"), Some("text/plain"));
        assert_eq!(result.into_body(), b"small data".to_vec());
    }

    #[test]
    fn test_put_match_blob() {
        let (storage, _dir) = test_storage();
        let data = vec![b'x'; 20_000];

        storage.put("static-v1", "key2", response(&data)).unwrap();

        let result = storage.match_in("static-v1", "key2").unwrap().unwrap();
        assert_eq!(result.into_body(), data);
    }

    #[test]
    fn test_put_overwrites_single_entry() {
        let (storage, _dir) = test_storage();

        storage.put("data-v1", "k", response(b"old")).unwrap();
        storage.put("data-v1", "k", response(b"new")).unwrap();

        let stats = storage.stats().unwrap();
        assert_eq!(stats[0].entries, 1);
        let body = storage.match_in("data-v1", "k").unwrap().unwrap().into_body();
        assert_eq!(body, b"new".to_vec());
    }

    #[test]
    fn test_match_is_scoped_to_cache() {
        let (storage, _dir) = test_storage();

        storage.put("static-v1", "k", response(b"a")).unwrap();

        assert!(storage.match_in("data-v1", "k").unwrap().is_none());
        assert!(storage.match_any("k").unwrap().is_some());
    }

    #[test]
    fn test_delete_cache_removes_entries_and_name() {
        let (storage, _dir) = test_storage();

        storage.put("static-v1", "k1", response(b"a")).unwrap();
        storage.put("static-v1", "k2", response(&vec![b'y'; 20_000])).unwrap();
        storage.put("static-v2", "k1", response(b"b")).unwrap();

        assert!(storage.delete_cache("static-v1").unwrap());
        assert!(!storage.delete_cache("static-v1").unwrap());

        assert_eq!(storage.keys().unwrap(), vec!["static-v2".to_string()]);
        assert!(storage.match_in("static-v1", "k2").unwrap().is_none());
        let body = storage.match_any("k1").unwrap().unwrap().into_body();
        assert_eq!(body, b"b".to_vec());
    }

    #[test]
    fn test_open_cache_enumerates_empty_cache() {
        let (storage, _dir) = test_storage();

        storage.open_cache("empty").unwrap();
        storage.open_cache("empty").unwrap();

        assert_eq!(storage.keys().unwrap(), vec!["empty".to_string()]);
    }

    #[test]
    fn test_delete_entry() {
        let (storage, _dir) = test_storage();

        storage.put("static-v1", "k", response(b"a")).unwrap();

        assert!(storage.delete("static-v1", "k").unwrap());
        assert!(!storage.delete("static-v1", "k").unwrap());
        assert!(storage.match_in("static-v1", "k").unwrap().is_none());
    }

    #[test]
    fn test_clear_all() {
        let (storage, _dir) = test_storage();

        storage.put("a", "k1", response(b"d1")).unwrap();
        storage.put("b", "k2", response(b"d2")).unwrap();

        let stats = storage.clear_all().unwrap();
        assert_eq!(stats.entries_removed, 2);
        assert_eq!(stats.caches_removed, 2);
        assert!(storage.keys().unwrap().is_empty());
    }

    #[test]
    fn test_stats() {
        let (storage, _dir) = test_storage();

        storage.put("a", "k1", response(b"data1")).unwrap();
        storage.put("a", "k2", response(b"data2")).unwrap();
        storage.open_cache("b").unwrap();

        let stats = storage.stats().unwrap();
        assert_eq!(stats.len(), 2);
        let a = stats.iter().find(|s| s.name == "a").unwrap();
        assert_eq!(a.entries, 2);
        assert_eq!(a.total_size_bytes, 10);
        let b = stats.iter().find(|s| s.name == "b").unwrap();
        assert_eq!(b.entries, 0);
    }

    #[test]
    fn test_meta_roundtrip() {
        let (storage, _dir) = test_storage();

        assert!(storage.get_meta("installed").unwrap().is_none());
        storage.set_meta("installed", "2").unwrap();
        assert_eq!(storage.get_meta("installed").unwrap().as_deref(), Some("2"));
    }
}
