//! Command execution context
//!
//! Resolves config and data directory once and wires the page side and the
//! worker side together the same way for every command.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::bridge::{Clients, ConfigCredential, Page, TokenBridge};
use crate::cache::{CacheStorage, Scope, StrategyEngine};
use crate::cli::{GlobalOptions, OutputFormat};
use crate::client::StoryClient;
use crate::config::{self, Config};
use crate::error::Result;
use crate::push::{FilePushPlatform, PushManager, TerminalNotifier};
use crate::store::{OfflineQueue, StoryDb, SyncRegistrations};
use crate::sync::SyncCoordinator;
use crate::worker::ServiceWorker;
use crate::worker::fetch::HttpFetcher;

/// The worker as the CLI runs it
pub type Worker = ServiceWorker<HttpFetcher, StoryClient>;

/// Context for command execution containing config, stores and clients.
pub struct CommandContext {
    /// Loaded configuration with CLI overrides applied
    pub config: Config,
    /// Where the config file lives (the page's credential storage)
    pub config_path: PathBuf,
    pub data_dir: PathBuf,
    /// Output format preference
    pub format: OutputFormat,
    pub api: Arc<StoryClient>,
    pub db: Arc<StoryDb>,
    /// Pages the worker can see
    pub clients: Arc<Clients>,
}

impl CommandContext {
    /// Load config and open the data directory.
    ///
    /// Nothing touches the network here; stores are opened lazily.
    pub fn new(opts: &GlobalOptions) -> Result<Self> {
        let config_path = Config::resolve_path(opts.config_ref())?;
        let mut config = Config::load_from(&config_path)?;
        if let Some(url) = opts.api_url_ref() {
            config.api_base_url = url.to_string();
        }

        let data_dir = config::data_dir(opts.data_dir_ref())?;
        std::fs::create_dir_all(&data_dir)?;

        let api = Arc::new(StoryClient::new(config.api_base())?);
        let db = Arc::new(StoryDb::in_dir(&data_dir));

        Ok(Self {
            config,
            config_path,
            data_dir,
            format: opts.format,
            api,
            db,
            clients: Arc::new(Clients::new()),
        })
    }

    /// Stored session token
    pub fn token(&self) -> Option<&str> {
        self.config.credential()
    }

    pub fn queue(&self) -> OfflineQueue {
        OfflineQueue::new(Arc::clone(&self.db))
    }

    pub fn registrations(&self) -> SyncRegistrations {
        SyncRegistrations::new(Arc::clone(&self.db))
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join("cache")
    }

    pub fn open_caches(&self) -> Result<CacheStorage> {
        Ok(CacheStorage::open_at(&self.cache_dir())?)
    }

    /// Open a page at the application root; it answers token requests
    /// from the config file for as long as it is alive
    pub fn open_page(&self) -> Page {
        let source = Arc::new(ConfigCredential::new(self.config_path.clone()));
        Page::spawn(&self.clients, &self.config.app_root_url(), source)
    }

    /// Build the worker (not started)
    pub fn worker(&self) -> Result<Worker> {
        let caches = Arc::new(Mutex::new(self.open_caches()?));
        let scope = Scope::from_config(&self.config)?;
        let fetcher = Arc::new(HttpFetcher::new(scope.origin.clone())?);
        let engine = StrategyEngine::new(fetcher, Arc::clone(&caches), scope);

        let bridge = TokenBridge::new(
            Arc::clone(&self.clients),
            Duration::from_secs(self.config.token_timeout_secs),
        );
        let sync = SyncCoordinator::new(self.queue(), Arc::clone(&self.api), bridge);

        Ok(ServiceWorker::new(
            engine,
            caches,
            Arc::clone(&self.clients),
            self.registrations(),
            sync,
            Arc::new(TerminalNotifier),
            self.config.app_root_url(),
        ))
    }

    /// Build and start the worker; a failed install leaves it passing
    /// requests straight through
    pub async fn started_worker(&self) -> Result<Worker> {
        let mut worker = self.worker()?;
        if let Err(e) = worker.start().await {
            log::warn!("Worker did not start, requests go to the network: {}", e);
        }
        Ok(worker)
    }

    pub fn push_manager(&self) -> PushManager<StoryClient, FilePushPlatform> {
        let platform = FilePushPlatform::new(
            &self.data_dir,
            self.config_path.clone(),
            self.config.push.service_url.clone(),
        );
        PushManager::new(
            Arc::clone(&self.api),
            Arc::new(platform),
            self.config.push.vapid_public_key.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn opts(dir: &TempDir) -> GlobalOptions {
        GlobalOptions {
            format: OutputFormat::Json,
            config: Some(dir.path().join("config.yaml").display().to_string()),
            data_dir: Some(dir.path().join("data").display().to_string()),
            api_url: Some("http://127.0.0.1:9/v1/".to_string()),
        }
    }

    #[test]
    fn test_context_applies_overrides() {
        let dir = TempDir::new().unwrap();

        let ctx = CommandContext::new(&opts(&dir)).unwrap();

        assert_eq!(ctx.config.api_base(), "http://127.0.0.1:9/v1");
        assert_eq!(ctx.api.base_url(), "http://127.0.0.1:9/v1");
        assert!(ctx.data_dir.is_dir());
        assert_eq!(ctx.cache_dir(), dir.path().join("data").join("cache"));
        assert!(ctx.token().is_none());
    }

    #[tokio::test]
    async fn test_open_page_answers_from_config() {
        let dir = TempDir::new().unwrap();
        let ctx = CommandContext::new(&opts(&dir)).unwrap();
        let config = Config {
            token: Some("page-token".to_string()),
            ..Config::default()
        };
        config.save_to(&ctx.config_path).unwrap();

        let _page = ctx.open_page();
        ctx.clients.claim();
        let bridge = TokenBridge::new(Arc::clone(&ctx.clients), Duration::from_secs(2));

        assert_eq!(
            bridge.request_token().await,
            crate::bridge::TokenOutcome::Token("page-token".to_string())
        );
    }

    #[test]
    fn test_worker_builds_without_network() {
        let dir = TempDir::new().unwrap();
        let ctx = CommandContext::new(&opts(&dir)).unwrap();

        let worker = ctx.worker().unwrap();

        assert!(!worker.is_current());
        assert!(ctx.cache_dir().join("cache.db").exists());
    }
}
