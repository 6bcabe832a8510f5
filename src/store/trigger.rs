//! Persistent background sync registrations
//!
//! The page registers a tag when it queues work; the worker completes the tag
//! once a sync run leaves nothing to retry. Registrations outlive the
//! process so a later run still picks them up.

use std::sync::Arc;

use chrono::Utc;
use rusqlite::params;

use crate::error::StoreError;

use super::StoryDb;

/// Tag used for uploading queued stories
pub const SYNC_TAG: &str = "sync-offline-stories";

#[derive(Clone)]
pub struct SyncRegistrations {
    db: Arc<StoryDb>,
}

impl SyncRegistrations {
    pub fn new(db: Arc<StoryDb>) -> Self {
        Self { db }
    }

    /// Register a tag; registering an existing tag is a no-op
    pub async fn register(&self, tag: &str) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        self.db
            .with_conn(|conn| {
                conn.execute(
                    "INSERT OR IGNORE INTO sync_registrations (tag, registered_at) VALUES (?1, ?2)",
                    params![tag, now],
                )?;
                Ok(())
            })
            .await?;
        log::debug!("Registered sync tag {}", tag);
        Ok(())
    }

    /// Outstanding tags, oldest first
    pub async fn tags(&self) -> Result<Vec<String>, StoreError> {
        self.db
            .with_conn(|conn| {
                let mut stmt = conn
                    .prepare("SELECT tag FROM sync_registrations ORDER BY registered_at, tag")?;
                let tags = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(tags)
            })
            .await
    }

    pub async fn is_registered(&self, tag: &str) -> Result<bool, StoreError> {
        Ok(self.tags().await?.iter().any(|t| t == tag))
    }

    /// Drop a tag after a run that needs no retry
    pub async fn complete(&self, tag: &str) -> Result<(), StoreError> {
        self.db
            .with_conn(|conn| {
                conn.execute("DELETE FROM sync_registrations WHERE tag = ?1", [tag])?;
                Ok(())
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn registrations() -> (SyncRegistrations, TempDir) {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(StoryDb::in_dir(dir.path()));
        (SyncRegistrations::new(db), dir)
    }

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let (regs, _dir) = registrations();

        regs.register(SYNC_TAG).await.unwrap();
        regs.register(SYNC_TAG).await.unwrap();

        assert_eq!(regs.tags().await.unwrap(), vec![SYNC_TAG.to_string()]);
    }

    #[tokio::test]
    async fn test_complete_removes_tag() {
        let (regs, _dir) = registrations();
        regs.register(SYNC_TAG).await.unwrap();

        regs.complete(SYNC_TAG).await.unwrap();

        assert!(!regs.is_registered(SYNC_TAG).await.unwrap());
    }

    #[tokio::test]
    async fn test_complete_unknown_tag_is_noop() {
        let (regs, _dir) = registrations();
        regs.complete("never-registered").await.unwrap();
        assert!(regs.tags().await.unwrap().is_empty());
    }
}
