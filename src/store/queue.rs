//! Offline queue on top of the story store
//!
//! Stories authored offline are queued as unsynced records. Server stories
//! the user saves for offline reading share the same store as synced records.

use std::sync::Arc;

use crate::client::models::Story;
use crate::error::StoreError;

use super::StoryDb;
use super::record::{OfflineStoryRecord, StoryDraft};

type Result<T> = std::result::Result<T, StoreError>;

/// Queue operations used by the page and the sync coordinator
#[derive(Clone)]
pub struct OfflineQueue {
    db: Arc<StoryDb>,
}

impl OfflineQueue {
    pub fn new(db: Arc<StoryDb>) -> Self {
        Self { db }
    }

    /// Persist a draft as an unsynced record and return it
    ///
    /// The record is complete before it is written; a failed write leaves
    /// nothing behind.
    pub async fn enqueue(&self, draft: &StoryDraft) -> Result<OfflineStoryRecord> {
        let record = OfflineStoryRecord::from_draft(draft)?;
        self.db.put(&record).await?;
        log::debug!("Queued offline story {}", record.id);
        Ok(record)
    }

    /// Save a server story for offline reading
    pub async fn save_story(&self, story: &Story) -> Result<OfflineStoryRecord> {
        let record = OfflineStoryRecord::from_story(story);
        self.db.put(&record).await?;
        Ok(record)
    }

    pub async fn is_saved(&self, id: &str) -> Result<bool> {
        Ok(self.db.get(id).await?.is_some())
    }

    /// Records still waiting for upload
    pub async fn pending(&self) -> Result<Vec<OfflineStoryRecord>> {
        let mut records = self.db.get_by_synced(false).await?;
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(records)
    }

    /// Every stored record, newest first
    pub async fn all(&self) -> Result<Vec<OfflineStoryRecord>> {
        let mut records = self.db.get_all().await?;
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    pub async fn get(&self, id: &str) -> Result<Option<OfflineStoryRecord>> {
        self.db.get(id).await
    }

    /// Remove a record; returns whether anything was removed
    pub async fn remove(&self, id: &str) -> Result<bool> {
        self.db.delete(id).await
    }
}
