//! Durable story store
//!
//! A single SQLite file shared by the page and the worker. The connection is
//! opened lazily and exactly once: every consumer awaits the same memoized
//! open instead of racing to create its own handle.
//!
//! Unlike the response cache, this store is never rebuilt on a version
//! change. Upgrades only add structures, so queued stories survive releases.

pub mod queue;
pub mod record;
pub mod trigger;

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension, params};
use tokio::sync::OnceCell;

use crate::error::StoreError;

pub use queue::OfflineQueue;
pub use record::{OfflineStoryRecord, Photo, StoryDraft};
pub use trigger::SyncRegistrations;

/// Structural version of the store
pub const STORE_VERSION: i32 = 2;

/// File name of the store inside the data directory
const STORE_FILE: &str = "stories.db";

type Result<T> = std::result::Result<T, StoreError>;

/// Handle to the durable story store
pub struct StoryDb {
    path: PathBuf,
    conn: OnceCell<Mutex<Connection>>,
}

impl StoryDb {
    /// Store located in `data_dir`; nothing is opened until first use
    pub fn in_dir(data_dir: &Path) -> Self {
        Self::at(data_dir.join(STORE_FILE))
    }

    pub fn at(path: PathBuf) -> Self {
        Self {
            path,
            conn: OnceCell::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn connection(&self) -> Result<&Mutex<Connection>> {
        self.conn
            .get_or_try_init(|| async { open_and_upgrade(&self.path).map(Mutex::new) })
            .await
    }

    /// Run `f` against the open connection
    pub(crate) async fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T>,
    ) -> Result<T> {
        let conn = self.connection().await?;
        let guard = conn
            .lock()
            .map_err(|_| StoreError::Transaction("store lock poisoned".to_string()))?;
        f(&guard)
    }

    /// Insert or replace a record by id
    pub async fn put(&self, record: &OfflineStoryRecord) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO offline_stories
                 (id, description, photo, photo_url, name, lat, lon, created_at, saved_at, synced)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    record.id,
                    record.description,
                    record.photo,
                    record.photo_url,
                    record.name,
                    record.lat,
                    record.lon,
                    record.created_at.to_rfc3339(),
                    record.saved_at.map(|t| t.to_rfc3339()),
                    record.synced,
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn get(&self, id: &str) -> Result<Option<OfflineStoryRecord>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {} FROM offline_stories WHERE id = ?1", COLUMNS),
                    [id],
                    read_record,
                )
                .optional()?;
            row.transpose()
        })
        .await
    }

    /// Every record; order is not part of the contract
    pub async fn get_all(&self) -> Result<Vec<OfflineStoryRecord>> {
        self.select_where("1 = 1").await
    }

    /// Records filtered by sync state
    pub async fn get_by_synced(&self, synced: bool) -> Result<Vec<OfflineStoryRecord>> {
        self.select_where(if synced { "synced = 1" } else { "synced = 0" })
            .await
    }

    async fn select_where(&self, filter: &str) -> Result<Vec<OfflineStoryRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM offline_stories WHERE {}",
                COLUMNS, filter
            ))?;
            let rows = stmt
                .query_map([], read_record)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            // One damaged row must not hide the rest of the queue
            Ok(rows
                .into_iter()
                .filter_map(|row| match row {
                    Ok(record) => Some(record),
                    Err(e) => {
                        log::warn!("Skipping unreadable offline story: {}", e);
                        None
                    }
                })
                .collect())
        })
        .await
    }

    /// Remove a record; absent ids are not an error
    pub async fn delete(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM offline_stories WHERE id = ?1", [id])?;
            Ok(deleted > 0)
        })
        .await
    }

    /// Structural version currently on disk
    pub async fn version(&self) -> Result<i32> {
        self.with_conn(|conn| Ok(conn.pragma_query_value(None, "user_version", |r| r.get(0))?))
            .await
    }
}

const COLUMNS: &str = "id, description, photo, photo_url, name, lat, lon, created_at, saved_at, synced";

/// Map a row; timestamp problems surface as an invalid record, not a panic
fn read_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<OfflineStoryRecord>> {
    let created_at: String = row.get(7)?;
    let saved_at: Option<String> = row.get(8)?;

    let created_at = match parse_timestamp(&created_at) {
        Ok(t) => t,
        Err(e) => return Ok(Err(e)),
    };
    let saved_at = match saved_at.as_deref().map(parse_timestamp).transpose() {
        Ok(t) => t,
        Err(e) => return Ok(Err(e)),
    };

    Ok(Ok(OfflineStoryRecord {
        id: row.get(0)?,
        description: row.get(1)?,
        photo: row.get(2)?,
        photo_url: row.get(3)?,
        name: row.get(4)?,
        lat: row.get(5)?,
        lon: row.get(6)?,
        created_at,
        saved_at,
        synced: row.get(9)?,
    }))
}

fn parse_timestamp(value: &str) -> Result<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&chrono::Utc))
        .map_err(|e| StoreError::InvalidRecord(format!("timestamp {}: {}", value, e)))
}

/// Open the store file and bring its schema up to [`STORE_VERSION`]
fn open_and_upgrade(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| StoreError::Open(format!("{}: {}", parent.display(), e)))?;
    }

    let conn = Connection::open(path).map_err(|e| StoreError::Open(e.to_string()))?;
    let found: i32 = conn.pragma_query_value(None, "user_version", |r| r.get(0))?;

    if found > STORE_VERSION {
        return Err(StoreError::VersionTooNew {
            found,
            supported: STORE_VERSION,
        });
    }
    if found < STORE_VERSION {
        log::info!("Upgrading story store from version {} to {}", found, STORE_VERSION);
        upgrade(&conn, found)?;
    }

    Ok(conn)
}

/// Upgrade hook. Every step is idempotent.
fn upgrade(conn: &Connection, from: i32) -> Result<()> {
    let tx = conn.unchecked_transaction()?;

    if from < 1 {
        tx.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS offline_stories (
                id TEXT PRIMARY KEY NOT NULL,
                description TEXT NOT NULL,
                photo TEXT,
                photo_url TEXT,
                name TEXT,
                lat REAL,
                lon REAL,
                created_at TEXT NOT NULL,
                saved_at TEXT,
                synced INTEGER NOT NULL DEFAULT 0
            );
            "#,
        )?;
    }

    if from < 2 {
        tx.execute_batch(
            r#"
            CREATE INDEX IF NOT EXISTS idx_offline_stories_synced ON offline_stories(synced);

            CREATE TABLE IF NOT EXISTS sync_registrations (
                tag TEXT PRIMARY KEY NOT NULL,
                registered_at TEXT NOT NULL
            );
            "#,
        )?;
    }

    tx.pragma_update(None, "user_version", STORE_VERSION)?;
    tx.commit()?;
    Ok(())
}
