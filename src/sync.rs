//! Background sync of queued stories
//!
//! A sync run is an idempotent batch checkpointed by deletion: every record
//! the server accepted is removed, every other record stays exactly as it
//! was for the next trigger. No run owns a retry timer.

use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::bridge::{TokenBridge, TokenOutcome};
use crate::client::StoryApi;
use crate::error::StoreError;
use crate::store::{OfflineQueue, OfflineStoryRecord};

/// Where a sync run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Idle,
    Triggered,
    AcquiringCredential,
    /// Uploading the record at this index of the pending list
    Uploading(usize),
}

/// How a sync run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    NothingToSync,
    /// A page answered without a credential
    NoCredential,
    /// No page could be asked for a credential
    NoClient,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub outcome: SyncOutcome,
    pub uploaded: usize,
    pub failed: usize,
}

impl SyncReport {
    fn skipped(outcome: SyncOutcome) -> Self {
        Self {
            outcome,
            uploaded: 0,
            failed: 0,
        }
    }

    /// Whether queued work is left for a later trigger
    pub fn needs_retry(&self) -> bool {
        match self.outcome {
            SyncOutcome::NothingToSync => false,
            SyncOutcome::Completed => self.failed > 0,
            SyncOutcome::NoCredential | SyncOutcome::NoClient => true,
        }
    }
}

/// Uploads pending records once a credential is available
pub struct SyncCoordinator<A: StoryApi> {
    queue: OfflineQueue,
    api: Arc<A>,
    bridge: TokenBridge,
    state: Mutex<SyncState>,
}

impl<A: StoryApi> SyncCoordinator<A> {
    pub fn new(queue: OfflineQueue, api: Arc<A>, bridge: TokenBridge) -> Self {
        Self {
            queue,
            api,
            bridge,
            state: Mutex::new(SyncState::Idle),
        }
    }

    pub fn state(&self) -> SyncState {
        match self.state.lock() {
            Ok(state) => *state,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn transition(&self, next: SyncState) {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        log::debug!("sync: {:?} -> {:?}", *state, next);
        *state = next;
    }

    /// Run one sync attempt
    ///
    /// Only a failure to read the queue is an error; upload failures are
    /// counted in the report and leave their records untouched.
    pub async fn run(&self) -> Result<SyncReport, StoreError> {
        self.transition(SyncState::Triggered);
        let report = self.run_inner().await;
        self.transition(SyncState::Idle);

        if let Ok(report) = &report {
            log::info!(
                "Sync finished: {:?}, {} uploaded, {} failed",
                report.outcome,
                report.uploaded,
                report.failed
            );
        }
        report
    }

    async fn run_inner(&self) -> Result<SyncReport, StoreError> {
        let pending = self.queue.pending().await?;
        if pending.is_empty() {
            return Ok(SyncReport::skipped(SyncOutcome::NothingToSync));
        }

        self.transition(SyncState::AcquiringCredential);
        let token = match self.bridge.request_token().await {
            TokenOutcome::Token(token) => token,
            TokenOutcome::NoCredential => {
                log::info!("No credential available, {} stories stay queued", pending.len());
                return Ok(SyncReport::skipped(SyncOutcome::NoCredential));
            }
            TokenOutcome::NoClient => {
                log::info!("No page to supply a credential, {} stories stay queued", pending.len());
                return Ok(SyncReport::skipped(SyncOutcome::NoClient));
            }
        };

        let mut report = SyncReport::skipped(SyncOutcome::Completed);
        for (index, record) in pending.iter().enumerate() {
            self.transition(SyncState::Uploading(index));
            if self.upload(&token, record).await {
                report.uploaded += 1;
            } else {
                report.failed += 1;
            }
        }
        Ok(report)
    }

    /// Upload one record and delete it on success
    async fn upload(&self, token: &str, record: &OfflineStoryRecord) -> bool {
        let draft = match record.to_draft() {
            Ok(draft) => draft,
            Err(e) => {
                log::warn!("Skipping story {}: {}", record.id, e);
                return false;
            }
        };

        if let Err(e) = self.api.add_story(token, &draft).await {
            log::warn!("Upload of story {} failed: {}", record.id, e);
            return false;
        }

        // The server has it now; a failed delete only means a duplicate later
        if let Err(e) = self.queue.remove(&record.id).await {
            log::warn!("Uploaded story {} could not be removed: {}", record.id, e);
        }
        log::debug!("Uploaded story {}", record.id);
        true
    }
}
