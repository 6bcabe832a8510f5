//! Scriptable network for worker tests

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::fetch::{Fetcher, Request, Response, ResponseKind};
use crate::error::FetchError;

/// Canned response stored by the mock
#[derive(Debug, Clone)]
struct Canned {
    status: u16,
    kind: ResponseKind,
    body: Vec<u8>,
}

/// Mock network.
///
/// URLs without a canned response answer 404. While offline, every fetch
/// fails with a network error. Calls are counted per URL either way.
#[derive(Default, Clone)]
pub struct MockFetcher {
    routes: Arc<Mutex<HashMap<String, Canned>>>,
    offline: Arc<Mutex<bool>>,
    calls: Arc<Mutex<HashMap<String, usize>>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` with `status` for `url`
    pub async fn route(&self, url: &str, status: u16, body: &[u8]) {
        self.route_kind(url, status, ResponseKind::Basic, body).await;
    }

    pub async fn route_kind(&self, url: &str, status: u16, kind: ResponseKind, body: &[u8]) {
        self.routes.lock().await.insert(
            url.to_string(),
            Canned {
                status,
                kind,
                body: body.to_vec(),
            },
        );
    }

    pub async fn set_offline(&self, offline: bool) {
        *self.offline.lock().await = offline;
    }

    /// Number of fetches attempted for `url`
    pub async fn calls(&self, url: &str) -> usize {
        self.calls.lock().await.get(url).copied().unwrap_or(0)
    }

    pub async fn total_calls(&self) -> usize {
        self.calls.lock().await.values().sum()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let url = request.url.to_string();
        *self.calls.lock().await.entry(url.clone()).or_default() += 1;

        if *self.offline.lock().await {
            return Err(FetchError::Network("offline".to_string()));
        }

        let routes = self.routes.lock().await;
        Ok(match routes.get(&url) {
            Some(canned) => Response::new(
                canned.status,
                canned.kind,
                url,
                Vec::new(),
                canned.body.clone(),
            ),
            None => Response::new(404, ResponseKind::Basic, url, Vec::new(), Vec::new()),
        })
    }
}
