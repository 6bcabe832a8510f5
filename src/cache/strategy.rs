//! Cache strategy engine
//!
//! Decides per intercepted request whether to answer from a cache, from the
//! network, or both:
//! - story listings: stale-while-revalidate against the data cache
//! - everything else: cache first, network fallback, same-origin successes
//!   copied into the static cache
//! - non-GET requests are never intercepted
//!
//! When the network is unreachable and nothing is cached, the cached
//! application shell is served so the page can render its own offline UI.

use std::sync::{Arc, Mutex};

use futures::stream::{self, StreamExt};
use log::{debug, info, warn};
use reqwest::{Method, Url};
use tokio::task::JoinHandle;

use super::{CacheGeneration, CacheStorage, cache_key};
use crate::config::Config;
use crate::error::{CacheError, ConfigError, Result};
use crate::worker::fetch::{Fetcher, Request, Response, ResponseKind};

/// Maximum concurrent fetches while precaching
const MAX_CONCURRENT_PRECACHE: usize = 4;

/// Map widget assets needed for offline first paint
const MAP_ASSETS: [&str; 4] = [
    "https://unpkg.com/leaflet@1.9.4/dist/images/marker-icon.png",
    "https://unpkg.com/leaflet@1.9.4/dist/images/marker-icon-2x.png",
    "https://unpkg.com/leaflet@1.9.4/dist/images/marker-shadow.png",
    "https://unpkg.com/leaflet@1.9.4/dist/leaflet.css",
];

/// Shell and bundle paths relative to the base path
const SHELL_PATHS: [&str; 7] = [
    "/",
    "/index.html",
    "/manifest.json",
    "/bundle.js",
    "/styles.bundle.css",
    "/icons/icon-192.png",
    "/icons/icon-512.png",
];

/// Where the worker lives and what it must precache
#[derive(Debug, Clone)]
pub struct Scope {
    pub origin: Url,
    pub base_path: String,
    pub api_base: String,
    pub generation: CacheGeneration,
    pub manifest: Vec<String>,
}

impl Scope {
    pub fn from_config(config: &Config) -> Result<Self> {
        let origin = Url::parse(&config.origin)
            .map_err(|e| ConfigError::Invalid(format!("origin {}: {}", config.origin, e)))?;
        let prefix = format!("{}{}", config.origin.trim_end_matches('/'), config.base_path());

        let mut manifest: Vec<String> = SHELL_PATHS
            .iter()
            .map(|path| format!("{}{}", prefix, path))
            .collect();
        manifest.extend(MAP_ASSETS.iter().map(|s| s.to_string()));
        for extra in &config.precache {
            if !manifest.contains(extra) {
                manifest.push(extra.clone());
            }
        }

        Ok(Self {
            origin,
            base_path: config.base_path().to_string(),
            api_base: config.api_base().to_string(),
            generation: CacheGeneration::new(config.cache_version),
            manifest,
        })
    }

    /// URL of the cached document served when everything else fails
    pub fn shell_url(&self) -> String {
        format!(
            "{}{}/index.html",
            self.origin.as_str().trim_end_matches('/'),
            self.base_path
        )
    }

    /// Strip the application base path so proxied API URLs match
    fn normalize(&self, url: &str) -> String {
        let origin = self.origin.as_str().trim_end_matches('/');
        let prefixed = format!("{}{}", origin, self.base_path);
        if !self.base_path.is_empty() && url.starts_with(&prefixed) {
            format!("{}{}", origin, &url[prefixed.len()..])
        } else {
            url.to_string()
        }
    }

    /// Story listing requests (but not push subscription endpoints)
    fn is_listing(&self, normalized: &str) -> bool {
        let listing = format!("{}/stories", self.api_base);
        normalized.starts_with(&listing) && !normalized.contains("subscribe")
    }
}

/// Where an intercepted response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Cache,
    Network,
    Shell,
    /// Network down and no shell cached
    Unavailable,
}

impl std::fmt::Display for ResponseSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseSource::Cache => write!(f, "cache"),
            ResponseSource::Network => write!(f, "network"),
            ResponseSource::Shell => write!(f, "offline shell"),
            ResponseSource::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// The answer to an intercepted request
#[derive(Debug)]
pub struct Intercepted {
    pub response: Response,
    pub source: ResponseSource,
    /// Work that outlives the response (cache revalidation)
    pub background: Option<JoinHandle<()>>,
}

impl Intercepted {
    pub(crate) fn now(response: Response, source: ResponseSource) -> Self {
        Self {
            response,
            source,
            background: None,
        }
    }

    /// Wait for background work to finish
    pub async fn settle(&mut self) {
        if let Some(handle) = self.background.take()
            && let Err(e) = handle.await
        {
            warn!("Background cache task failed: {}", e);
        }
    }
}

/// Outcome of precaching the manifest
#[derive(Debug, Default)]
pub struct InstallReport {
    pub cached: Vec<String>,
    pub failed: Vec<(String, String)>,
}

/// Routes intercepted requests to caching strategies
pub struct StrategyEngine<F: Fetcher + 'static> {
    fetcher: Arc<F>,
    caches: Arc<Mutex<CacheStorage>>,
    scope: Scope,
}

impl<F: Fetcher + 'static> StrategyEngine<F> {
    pub fn new(fetcher: Arc<F>, caches: Arc<Mutex<CacheStorage>>, scope: Scope) -> Self {
        Self {
            fetcher,
            caches,
            scope,
        }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn fetcher(&self) -> &Arc<F> {
        &self.fetcher
    }

    /// Populate the static cache from the manifest.
    ///
    /// A failed entry is logged and skipped; only a manifest where every
    /// entry fails is an error.
    pub async fn install(&self) -> std::result::Result<InstallReport, CacheError> {
        let static_name = self.scope.generation.static_name.clone();
        with_caches(&self.caches, |c| c.open_cache(&static_name))?;

        let results: Vec<(String, std::result::Result<(), String>)> =
            stream::iter(self.scope.manifest.iter().cloned())
                .map(|url| async move {
                    let result = self.precache_one(&url).await;
                    (url, result)
                })
                .buffer_unordered(MAX_CONCURRENT_PRECACHE)
                .collect()
                .await;

        let mut report = InstallReport::default();
        for (url, result) in results {
            match result {
                Ok(()) => report.cached.push(url),
                Err(reason) => {
                    warn!("Cache add failed for {}: {}", url, reason);
                    report.failed.push((url, reason));
                }
            }
        }

        if report.cached.is_empty() && !report.failed.is_empty() {
            return Err(CacheError::InstallFailed(report.failed.len()));
        }

        info!(
            "Precached {} of {} entries into {}",
            report.cached.len(),
            self.scope.manifest.len(),
            static_name
        );
        Ok(report)
    }

    async fn precache_one(&self, url: &str) -> std::result::Result<(), String> {
        let request = Request::get(url).map_err(|e| e.to_string())?;
        let response = self
            .fetcher
            .fetch(&request)
            .await
            .map_err(|e| e.to_string())?;
        if !response.is_ok() {
            return Err(format!("status {}", response.status()));
        }

        let key = cache_key(&request.method, request.url.as_str());
        with_caches(&self.caches, |c| {
            c.put(&self.scope.generation.static_name, &key, response)
        })
        .map_err(|e| e.to_string())
    }

    /// Delete every cache that does not belong to the current generation
    pub fn activate(&self) -> std::result::Result<Vec<String>, CacheError> {
        let generation = &self.scope.generation;
        with_caches(&self.caches, |c| {
            let mut deleted = Vec::new();
            for name in c.keys()? {
                if !generation.owns(&name) {
                    info!("Deleting old cache: {}", name);
                    c.delete_cache(&name)?;
                    deleted.push(name);
                }
            }
            Ok(deleted)
        })
    }

    /// Remove the entry for a request from both current caches
    pub fn evict(&self, request: &Request) -> std::result::Result<bool, CacheError> {
        let generation = &self.scope.generation;
        let static_key = cache_key(&request.method, request.url.as_str());
        let data_key = cache_key(&request.method, &self.scope.normalize(request.url.as_str()));
        with_caches(&self.caches, |c| {
            let a = c.delete(&generation.static_name, &static_key)?;
            let b = c.delete(&generation.data_name, &data_key)?;
            Ok(a || b)
        })
    }

    /// Answer an intercepted request; `None` means "not intercepted, go to
    /// the network untouched"
    pub async fn intercept(&self, request: &Request) -> Option<Intercepted> {
        if !request.is_get() {
            return None;
        }

        let normalized = self.scope.normalize(request.url.as_str());
        if self.scope.is_listing(&normalized) {
            Some(self.stale_while_revalidate(request, normalized).await)
        } else {
            Some(self.cache_first(request).await)
        }
    }

    async fn stale_while_revalidate(&self, request: &Request, normalized: String) -> Intercepted {
        let data_name = self.scope.generation.data_name.clone();
        let key = cache_key(&Method::GET, &normalized);

        let mut network_request = request.clone();
        if let Ok(url) = Url::parse(&normalized) {
            network_request.url = url;
        }

        let cached = self.lookup(|c| c.match_in(&data_name, &key));
        if let Some(cached) = cached {
            debug!("Serving from data cache: {}", normalized);
            let handle = tokio::spawn(revalidate(
                Arc::clone(&self.fetcher),
                Arc::clone(&self.caches),
                data_name,
                key,
                network_request,
            ));
            return Intercepted {
                response: cached,
                source: ResponseSource::Cache,
                background: Some(handle),
            };
        }

        match self.fetcher.fetch(&network_request).await {
            Ok(response) => {
                if is_cacheable_data(&response) {
                    store(&self.caches, &data_name, &key, response.clone_response());
                }
                Intercepted::now(response, ResponseSource::Network)
            }
            Err(e) => {
                warn!("Network failed for API: {}", e);
                self.shell_fallback()
            }
        }
    }

    async fn cache_first(&self, request: &Request) -> Intercepted {
        let key = cache_key(&request.method, request.url.as_str());

        if let Some(cached) = self.lookup(|c| c.match_any(&key)) {
            debug!("Cache hit: {}", request.url);
            return Intercepted::now(cached, ResponseSource::Cache);
        }

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if response.status() == 200 && request.is_same_origin(&self.scope.origin) {
                    store(
                        &self.caches,
                        &self.scope.generation.static_name,
                        &key,
                        response.clone_response(),
                    );
                }
                Intercepted::now(response, ResponseSource::Network)
            }
            Err(e) => {
                debug!("Network failed for {}: {}", request.url, e);
                self.shell_fallback()
            }
        }
    }

    fn shell_fallback(&self) -> Intercepted {
        let key = cache_key(&Method::GET, &self.scope.shell_url());
        match self.lookup(|c| c.match_any(&key)) {
            Some(shell) => Intercepted::now(shell, ResponseSource::Shell),
            None => Intercepted::now(Response::network_error(), ResponseSource::Unavailable),
        }
    }

    /// Cache reads never fail a request; errors read as a miss
    fn lookup(
        &self,
        f: impl FnOnce(&CacheStorage) -> std::result::Result<Option<Response>, CacheError>,
    ) -> Option<Response> {
        match with_caches(&self.caches, f) {
            Ok(found) => found,
            Err(e) => {
                warn!("Cache read failed: {}", e);
                None
            }
        }
    }
}

fn is_cacheable_data(response: &Response) -> bool {
    response.status() == 200 || response.kind() == ResponseKind::Opaque
}

fn with_caches<T>(
    caches: &Mutex<CacheStorage>,
    f: impl FnOnce(&CacheStorage) -> std::result::Result<T, CacheError>,
) -> std::result::Result<T, CacheError> {
    let guard = caches
        .lock()
        .map_err(|_| CacheError::Io("cache lock poisoned".to_string()))?;
    f(&guard)
}

/// Best-effort cache write
fn store(caches: &Mutex<CacheStorage>, cache_name: &str, key: &str, response: Response) {
    if let Err(e) = with_caches(caches, |c| c.put(cache_name, key, response)) {
        warn!("Cache write to {} failed: {}", cache_name, e);
    }
}

/// Refresh a data cache entry in the background
async fn revalidate<F: Fetcher>(
    fetcher: Arc<F>,
    caches: Arc<Mutex<CacheStorage>>,
    cache_name: String,
    key: String,
    request: Request,
) {
    match fetcher.fetch(&request).await {
        Ok(response) if is_cacheable_data(&response) => {
            debug!("Revalidated {}", request.url);
            store(&caches, &cache_name, &key, response);
        }
        Ok(response) => debug!(
            "Revalidation of {} returned {}, keeping cached copy",
            request.url,
            response.status()
        ),
        Err(e) => debug!("Revalidation of {} failed: {}", request.url, e),
    }
}
