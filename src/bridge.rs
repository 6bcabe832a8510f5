//! Page/worker messaging and the token bridge
//!
//! The worker never reads the credential. When it needs one it broadcasts a
//! `REQUEST_TOKEN` message to every open page it controls over a fresh reply
//! channel and takes the first `TOKEN_RESPONSE` that comes back.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::Config;

/// Messages the worker posts to pages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
    RequestToken,
}

/// Messages pages post back to the worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PageMessage {
    TokenResponse { token: Option<String> },
}

/// Everything a page inbox can receive
#[derive(Debug)]
pub enum PageEvent {
    /// Worker message with the port replies go to
    Worker {
        message: WorkerMessage,
        reply: mpsc::Sender<PageMessage>,
    },
    Focus,
    Navigate(String),
}

/// Where a page reads the credential from
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn credential(&self) -> Option<String>;
}

/// Credential stored in the config file, re-read on every request
pub struct ConfigCredential {
    path: PathBuf,
}

impl ConfigCredential {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl CredentialSource for ConfigCredential {
    async fn credential(&self) -> Option<String> {
        match Config::load_from(&self.path) {
            Ok(config) => config.credential().map(str::to_string),
            Err(e) => {
                log::warn!("Could not read credential: {}", e);
                None
            }
        }
    }
}

/// Fixed credential; `None` models a logged-out page
pub struct StaticCredential(pub Option<String>);

#[async_trait]
impl CredentialSource for StaticCredential {
    async fn credential(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Worker-side view of one open page
#[derive(Debug, Clone)]
pub struct PageHandle {
    pub id: u64,
    pub url: String,
    pub controlled: bool,
    inbox: mpsc::Sender<PageEvent>,
}

impl PageHandle {
    pub fn is_open(&self) -> bool {
        !self.inbox.is_closed()
    }
}

/// What a notification click ended up doing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickAction {
    Focused(u64),
    /// No page was open; a new one should be opened at this URL
    Open(String),
}

/// Registry of open pages, as seen by the worker
#[derive(Default)]
pub struct Clients {
    pages: Mutex<Vec<PageHandle>>,
    next_id: AtomicU64,
}

impl Clients {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, url: &str, inbox: mpsc::Sender<PageEvent>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.with_pages(|pages| {
            pages.push(PageHandle {
                id,
                url: url.to_string(),
                controlled: false,
                inbox,
            })
        });
        id
    }

    fn with_pages<T>(&self, f: impl FnOnce(&mut Vec<PageHandle>) -> T) -> T {
        match self.pages.lock() {
            Ok(mut pages) => f(&mut pages),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    /// Open pages, controlled or not; closed ones are dropped from the registry
    fn open_pages(&self) -> Vec<PageHandle> {
        self.with_pages(|pages| {
            pages.retain(PageHandle::is_open);
            pages.clone()
        })
    }

    /// Open pages this worker controls
    pub fn match_all(&self) -> Vec<PageHandle> {
        self.open_pages()
            .into_iter()
            .filter(|p| p.controlled)
            .collect()
    }

    /// Take control of every open page; returns how many were claimed
    pub fn claim(&self) -> usize {
        self.with_pages(|pages| {
            pages.retain(PageHandle::is_open);
            for page in pages.iter_mut() {
                page.controlled = true;
            }
            pages.len()
        })
    }

    fn remove(&self, id: u64) {
        self.with_pages(|pages| pages.retain(|p| p.id != id));
    }

    /// Focus the first controlled page, or ask for a new one at `url`.
    /// A focused page outside `url` is sent there.
    pub async fn focus_or_open(&self, url: &str) -> ClickAction {
        for page in self.match_all() {
            if page.inbox.send(PageEvent::Focus).await.is_ok() {
                if !page.url.starts_with(url) {
                    self.navigate(page.id, url).await;
                }
                return ClickAction::Focused(page.id);
            }
            self.remove(page.id);
        }
        ClickAction::Open(url.to_string())
    }

    /// Send a page to another URL
    pub async fn navigate(&self, id: u64, url: &str) -> bool {
        let Some(page) = self.open_pages().into_iter().find(|p| p.id == id) else {
            return false;
        };
        page.inbox
            .send(PageEvent::Navigate(url.to_string()))
            .await
            .is_ok()
    }
}

/// Observable state of a page task
#[derive(Debug, Clone, Default)]
pub struct PageState {
    pub url: String,
    pub focused: bool,
    pub token_requests: usize,
}

/// A running page context
pub struct Page {
    id: u64,
    state: Arc<Mutex<PageState>>,
    task: JoinHandle<()>,
}

impl Page {
    /// Open a page at `url` and register it with the worker's clients
    pub fn spawn(clients: &Clients, url: &str, source: Arc<dyn CredentialSource>) -> Self {
        let (tx, rx) = mpsc::channel(16);
        let id = clients.register(url, tx);
        let state = Arc::new(Mutex::new(PageState {
            url: url.to_string(),
            ..PageState::default()
        }));

        let task = tokio::spawn(run_page(id, rx, source, Arc::clone(&state)));
        log::debug!("Page {} opened at {}", id, url);

        Self { id, state, task }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> PageState {
        match self.state.lock() {
            Ok(state) => state.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Close the page; its inbox closes with it
    pub async fn close(self) {
        self.task.abort();
        let _ = self.task.await;
        log::debug!("Page {} closed", self.id);
    }
}

async fn run_page(
    id: u64,
    mut inbox: mpsc::Receiver<PageEvent>,
    source: Arc<dyn CredentialSource>,
    state: Arc<Mutex<PageState>>,
) {
    let update = |f: &dyn Fn(&mut PageState)| match state.lock() {
        Ok(mut s) => f(&mut s),
        Err(poisoned) => f(&mut poisoned.into_inner()),
    };

    while let Some(event) = inbox.recv().await {
        match event {
            PageEvent::Worker {
                message: WorkerMessage::RequestToken,
                reply,
            } => {
                update(&|s| s.token_requests += 1);
                let token = source.credential().await;
                if reply
                    .send(PageMessage::TokenResponse { token })
                    .await
                    .is_err()
                {
                    log::debug!("Page {}: token reply port already closed", id);
                }
            }
            PageEvent::Focus => update(&|s| s.focused = true),
            PageEvent::Navigate(url) => update(&|s| s.url = url.clone()),
        }
    }
}

/// Result of asking the pages for a credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenOutcome {
    Token(String),
    /// A page answered but holds no credential
    NoCredential,
    /// No page answered
    NoClient,
}

/// Worker side of the credential handshake
#[derive(Clone)]
pub struct TokenBridge {
    clients: Arc<Clients>,
    timeout: Duration,
}

impl TokenBridge {
    pub fn new(clients: Arc<Clients>, timeout: Duration) -> Self {
        Self { clients, timeout }
    }

    /// Ask every controlled page for the credential and take the first reply
    pub async fn request_token(&self) -> TokenOutcome {
        let pages = self.clients.match_all();
        if pages.is_empty() {
            log::debug!("No controlled page to ask for a token");
            return TokenOutcome::NoClient;
        }

        let (reply_tx, mut reply_rx) = mpsc::channel(pages.len());
        let mut delivered = 0;
        for page in &pages {
            let event = PageEvent::Worker {
                message: WorkerMessage::RequestToken,
                reply: reply_tx.clone(),
            };
            if page.inbox.send(event).await.is_ok() {
                delivered += 1;
            } else {
                self.clients.remove(page.id);
            }
        }
        drop(reply_tx);

        if delivered == 0 {
            return TokenOutcome::NoClient;
        }

        match tokio::time::timeout(self.timeout, reply_rx.recv()).await {
            Ok(Some(PageMessage::TokenResponse { token: Some(token) }))
                if !token.trim().is_empty() =>
            {
                TokenOutcome::Token(token)
            }
            Ok(Some(PageMessage::TokenResponse { .. })) => TokenOutcome::NoCredential,
            Ok(None) => TokenOutcome::NoClient,
            Err(_) => {
                log::warn!(
                    "No token reply from {} page(s) within {:?}",
                    delivered,
                    self.timeout
                );
                TokenOutcome::NoClient
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const APP: &str = "https://storykeep.github.io/storykeep/";

    fn bridge(clients: &Arc<Clients>) -> TokenBridge {
        TokenBridge::new(Arc::clone(clients), Duration::from_secs(2))
    }

    /// Open a page the worker already controls
    fn controlled_page(clients: &Clients, source: Arc<dyn CredentialSource>) -> Page {
        let page = Page::spawn(clients, APP, source);
        clients.claim();
        page
    }

    struct SlowCredential;

    #[async_trait]
    impl CredentialSource for SlowCredential {
        async fn credential(&self) -> Option<String> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Some("late".to_string())
        }
    }

    #[test]
    fn test_wire_shapes() {
        let request = serde_json::to_value(WorkerMessage::RequestToken).unwrap();
        assert_eq!(request, serde_json::json!({"type": "REQUEST_TOKEN"}));

        let reply = serde_json::to_value(PageMessage::TokenResponse {
            token: Some("abc".to_string()),
        })
        .unwrap();
        assert_eq!(
            reply,
            serde_json::json!({"type": "TOKEN_RESPONSE", "token": "abc"})
        );

        let null: PageMessage =
            serde_json::from_str(r#"{"type":"TOKEN_RESPONSE","token":null}"#).unwrap();
        assert_eq!(null, PageMessage::TokenResponse { token: None });
    }

    #[tokio::test]
    async fn test_token_from_open_page() {
        let clients = Arc::new(Clients::new());
        let page = controlled_page(
            &clients,
            Arc::new(StaticCredential(Some("secret".to_string()))),
        );

        let outcome = bridge(&clients).request_token().await;

        assert_eq!(outcome, TokenOutcome::Token("secret".to_string()));
        assert_eq!(page.state().token_requests, 1);
    }

    #[tokio::test]
    async fn test_null_reply_is_no_credential() {
        let clients = Arc::new(Clients::new());
        let _page = controlled_page(&clients, Arc::new(StaticCredential(None)));

        assert_eq!(
            bridge(&clients).request_token().await,
            TokenOutcome::NoCredential
        );
    }

    #[tokio::test]
    async fn test_no_pages_is_no_client() {
        let clients = Arc::new(Clients::new());
        assert_eq!(bridge(&clients).request_token().await, TokenOutcome::NoClient);
    }

    #[tokio::test]
    async fn test_closed_page_is_pruned() {
        let clients = Arc::new(Clients::new());
        let page = controlled_page(&clients, Arc::new(StaticCredential(Some("t".to_string()))));
        page.close().await;

        assert_eq!(bridge(&clients).request_token().await, TokenOutcome::NoClient);
        assert_eq!(clients.claim(), 0);
    }

    #[tokio::test]
    async fn test_uncontrolled_page_is_not_asked() {
        let clients = Arc::new(Clients::new());
        let page = Page::spawn(
            &clients,
            APP,
            Arc::new(StaticCredential(Some("t".to_string()))),
        );

        assert_eq!(bridge(&clients).request_token().await, TokenOutcome::NoClient);
        assert_eq!(page.state().token_requests, 0);

        clients.claim();
        assert_eq!(
            bridge(&clients).request_token().await,
            TokenOutcome::Token("t".to_string())
        );
    }

    #[tokio::test]
    async fn test_first_reply_wins() {
        let clients = Arc::new(Clients::new());
        let _slow = controlled_page(&clients, Arc::new(SlowCredential));
        let _fast = controlled_page(
            &clients,
            Arc::new(StaticCredential(Some("fast".to_string()))),
        );

        let outcome = bridge(&clients).request_token().await;
        assert_eq!(outcome, TokenOutcome::Token("fast".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_pages_time_out() {
        let clients = Arc::new(Clients::new());
        let _slow = controlled_page(&clients, Arc::new(SlowCredential));

        let outcome = TokenBridge::new(Arc::clone(&clients), Duration::from_millis(50))
            .request_token()
            .await;
        assert_eq!(outcome, TokenOutcome::NoClient);
    }

    #[tokio::test]
    async fn test_claim_marks_pages_controlled() {
        let clients = Clients::new();
        let _a = Page::spawn(&clients, APP, Arc::new(StaticCredential(None)));
        let _b = Page::spawn(&clients, APP, Arc::new(StaticCredential(None)));

        assert!(clients.match_all().is_empty());
        assert_eq!(clients.claim(), 2);
        assert_eq!(clients.match_all().len(), 2);
        assert!(clients.match_all().iter().all(|p| p.controlled));
    }

    #[tokio::test]
    async fn test_focus_or_open() {
        let clients = Clients::new();
        assert_eq!(
            clients.focus_or_open(APP).await,
            ClickAction::Open(APP.to_string())
        );

        let page = Page::spawn(&clients, APP, Arc::new(StaticCredential(None)));
        assert_eq!(
            clients.focus_or_open(APP).await,
            ClickAction::Open(APP.to_string())
        );

        clients.claim();
        assert_eq!(
            clients.focus_or_open(APP).await,
            ClickAction::Focused(page.id())
        );

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(page.state().focused);
    }

    #[tokio::test]
    async fn test_focus_brings_page_back_to_app() {
        let clients = Clients::new();
        let page = Page::spawn(
            &clients,
            "https://elsewhere.example.org/",
            Arc::new(StaticCredential(None)),
        );
        clients.claim();

        assert_eq!(
            clients.focus_or_open(APP).await,
            ClickAction::Focused(page.id())
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
        let state = page.state();
        assert!(state.focused);
        assert_eq!(state.url, APP);
    }

    #[tokio::test]
    async fn test_navigate_updates_page_url() {
        let clients = Clients::new();
        let page = Page::spawn(&clients, APP, Arc::new(StaticCredential(None)));
        let target = format!("{}#/saved", APP);

        assert!(clients.navigate(page.id(), &target).await);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(page.state().url, target);
    }
}
