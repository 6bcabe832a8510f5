//! The caching worker
//!
//! Owns the worker side of the application: its lifecycle (install,
//! activate), interception of page requests, background sync, and push
//! handling. Pages reach it only through the [`Clients`] registry and the
//! persistent stores it shares with them.

pub mod fetch;
#[cfg(test)]
pub mod mock;

use std::sync::{Arc, Mutex};

use log::{debug, info, warn};
use serde::Serialize;

use crate::bridge::{ClickAction, Clients};
use crate::cache::strategy::InstallReport;
use crate::cache::{CacheStorage, Intercepted, ResponseSource, StrategyEngine};
use crate::client::StoryApi;
use crate::error::{CacheError, FetchError, StoreError};
use crate::push::{Notification, Notifier};
use crate::store::SyncRegistrations;
use crate::store::trigger::SYNC_TAG;
use crate::sync::{SyncCoordinator, SyncReport};

use fetch::{Fetcher, Request};

/// Cache meta key holding the generation that finished activating
pub const ACTIVE_GENERATION_KEY: &str = "active_generation";

/// Lifecycle of the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    /// Install failed; the previous generation stays in charge
    Redundant,
}

/// What activation did
#[derive(Debug, Clone, Default, Serialize)]
pub struct ActivateReport {
    pub deleted_caches: Vec<String>,
    pub claimed_pages: usize,
}

pub struct ServiceWorker<F: Fetcher + 'static, A: StoryApi> {
    engine: StrategyEngine<F>,
    caches: Arc<Mutex<CacheStorage>>,
    clients: Arc<Clients>,
    registrations: SyncRegistrations,
    sync: SyncCoordinator<A>,
    notifier: Arc<dyn Notifier>,
    app_root: String,
    state: WorkerState,
}

impl<F: Fetcher + 'static, A: StoryApi> ServiceWorker<F, A> {
    pub fn new(
        engine: StrategyEngine<F>,
        caches: Arc<Mutex<CacheStorage>>,
        clients: Arc<Clients>,
        registrations: SyncRegistrations,
        sync: SyncCoordinator<A>,
        notifier: Arc<dyn Notifier>,
        app_root: String,
    ) -> Self {
        Self {
            engine,
            caches,
            clients,
            registrations,
            sync,
            notifier,
            app_root,
            state: WorkerState::Parsed,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn engine(&self) -> &StrategyEngine<F> {
        &self.engine
    }

    fn active_generation(&self) -> Option<String> {
        let caches = match self.caches.lock() {
            Ok(caches) => caches,
            Err(poisoned) => poisoned.into_inner(),
        };
        match caches.get_meta(ACTIVE_GENERATION_KEY) {
            Ok(value) => value,
            Err(e) => {
                warn!("Could not read worker state: {}", e);
                None
            }
        }
    }

    /// Whether the current generation was activated in an earlier run
    pub fn is_current(&self) -> bool {
        self.active_generation().as_deref() == Some(self.engine.scope().generation.static_name.as_str())
    }

    /// Bring the worker up: reuse an activated generation, otherwise
    /// install and activate right away (no waiting for old pages)
    pub async fn start(&mut self) -> Result<(), CacheError> {
        if self.is_current() {
            debug!("Worker generation already active");
            self.state = WorkerState::Activated;
            self.clients.claim();
            return Ok(());
        }

        self.install().await?;
        self.activate()?;
        Ok(())
    }

    /// Precache the manifest into the new generation
    pub async fn install(&mut self) -> Result<InstallReport, CacheError> {
        self.state = WorkerState::Installing;
        match self.engine.install().await {
            Ok(report) => {
                self.state = WorkerState::Installed;
                Ok(report)
            }
            Err(e) => {
                self.state = WorkerState::Redundant;
                Err(e)
            }
        }
    }

    /// Retire old caches and take control of open pages
    pub fn activate(&mut self) -> Result<ActivateReport, CacheError> {
        self.state = WorkerState::Activating;
        let deleted_caches = self.engine.activate()?;

        let generation = self.engine.scope().generation.static_name.clone();
        {
            let caches = self
                .caches
                .lock()
                .map_err(|_| CacheError::Database("cache lock poisoned".to_string()))?;
            caches.set_meta(ACTIVE_GENERATION_KEY, &generation)?;
        }

        let claimed_pages = self.clients.claim();
        self.state = WorkerState::Activated;
        info!(
            "Activated {} ({} old caches removed, {} pages claimed)",
            generation,
            deleted_caches.len(),
            claimed_pages
        );

        Ok(ActivateReport {
            deleted_caches,
            claimed_pages,
        })
    }

    /// Take control of the pages open right now; returns how many
    pub fn claim(&self) -> usize {
        self.clients.claim()
    }

    /// Handle a page request
    ///
    /// Before activation, and for requests the strategies leave alone, the
    /// request goes straight to the network and network failures surface to
    /// the caller.
    pub async fn handle_fetch(&self, request: &Request) -> Result<Intercepted, FetchError> {
        if self.state == WorkerState::Activated
            && let Some(intercepted) = self.engine.intercept(request).await
        {
            debug!("{} {} -> {}", request.method, request.url, intercepted.source);
            return Ok(intercepted);
        }

        let response = self.engine.fetcher().fetch(request).await?;
        Ok(Intercepted::now(response, ResponseSource::Network))
    }

    /// Handle a background sync trigger
    ///
    /// The registration is completed only when the run leaves nothing to
    /// retry. Unknown tags are ignored.
    pub async fn handle_sync(&self, tag: &str) -> Result<Option<SyncReport>, StoreError> {
        if tag != SYNC_TAG {
            debug!("Ignoring sync tag {}", tag);
            return Ok(None);
        }

        let report = self.sync.run().await?;
        if report.needs_retry() {
            info!("Sync {} will be retried on the next trigger", tag);
        } else {
            self.registrations.complete(tag).await?;
        }
        Ok(Some(report))
    }

    /// Fire every outstanding sync registration
    pub async fn fire_sync_triggers(&self) -> Result<Vec<SyncReport>, StoreError> {
        let mut reports = Vec::new();
        for tag in self.registrations.tags().await? {
            if let Some(report) = self.handle_sync(&tag).await? {
                reports.push(report);
            }
        }
        Ok(reports)
    }

    /// Show a notification for an incoming push message
    pub async fn handle_push(&self, data: Option<&[u8]>) -> Notification {
        let notification = Notification::from_payload(data);
        self.notifier.show(&notification).await;
        notification
    }

    /// Focus an open page, or open the application root
    pub async fn handle_notification_click(&self) -> ClickAction {
        self.clients.focus_or_open(&self.app_root).await
    }
}
