//! Request/response model seen by the worker, and the network behind it
//!
//! A [`Response`] body can be consumed exactly once: there is no `Clone`
//! impl and the only way to read the bytes is [`Response::into_body`].
//! Anything that must both store and return a response has to call
//! [`Response::clone_response`] first.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client as HttpClient, Method, Url};
use serde::de::DeserializeOwned;

use crate::error::FetchError;

/// An outgoing request from the page
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
}

impl Request {
    /// Build a GET request for an absolute URL
    pub fn get(url: &str) -> Result<Self, FetchError> {
        Self::new(Method::GET, url)
    }

    pub fn new(method: Method, url: &str) -> Result<Self, FetchError> {
        let url = Url::parse(url)
            .map_err(|e| FetchError::InvalidRequest(format!("{}: {}", url, e)))?;
        Ok(Self {
            method,
            url,
            headers: Vec::new(),
        })
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn is_get(&self) -> bool {
        self.method == Method::GET
    }

    /// Whether the request targets the given origin (scheme, host, port)
    pub fn is_same_origin(&self, origin: &Url) -> bool {
        self.url.origin() == origin.origin()
    }
}

/// How the response relates to the requesting origin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// Same-origin response
    Basic,
    /// Cross-origin response with readable status
    Cors,
    /// Cross-origin response with hidden status (status 0)
    Opaque,
    /// Network error placeholder
    Error,
}

impl ResponseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseKind::Basic => "basic",
            ResponseKind::Cors => "cors",
            ResponseKind::Opaque => "opaque",
            ResponseKind::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "basic" => ResponseKind::Basic,
            "cors" => ResponseKind::Cors,
            "opaque" => ResponseKind::Opaque,
            _ => ResponseKind::Error,
        }
    }
}

/// An HTTP response with a single-consumer body
#[derive(Debug)]
pub struct Response {
    status: u16,
    kind: ResponseKind,
    url: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Response {
    pub fn new(
        status: u16,
        kind: ResponseKind,
        url: impl Into<String>,
        headers: Vec<(String, String)>,
        body: Vec<u8>,
    ) -> Self {
        Self {
            status,
            kind,
            url: url.into(),
            headers,
            body,
        }
    }

    /// The response handed back when neither network nor cache can answer
    pub fn network_error() -> Self {
        Self::new(0, ResponseKind::Error, "", Vec::new(), Vec::new())
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn kind(&self) -> ResponseKind {
        self.kind
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Look up a header value case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body_len(&self) -> usize {
        self.body.len()
    }

    /// Status in the 2xx range
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_network_error(&self) -> bool {
        self.kind == ResponseKind::Error
    }

    /// Duplicate the response so two consumers can each read the body
    pub fn clone_response(&self) -> Self {
        Self {
            status: self.status,
            kind: self.kind,
            url: self.url.clone(),
            headers: self.headers.clone(),
            body: self.body.clone(),
        }
    }

    /// Consume the response and return its body
    pub fn into_body(self) -> Vec<u8> {
        self.body
    }

    /// Consume the response and return its body as text
    pub fn text(self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Consume the response and parse its body as JSON
    pub fn json<T: DeserializeOwned>(self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Split into metadata and body, consuming the response
    pub(crate) fn into_parts(self) -> (u16, ResponseKind, String, Vec<(String, String)>, Vec<u8>) {
        (self.status, self.kind, self.url, self.headers, self.body)
    }
}

/// The network as seen from the worker
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Perform the request. `Err` means no response arrived at all; any HTTP
    /// status, including errors, is an `Ok`.
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError>;
}

/// reqwest-backed fetcher
pub struct HttpFetcher {
    http: HttpClient,
    origin: Url,
}

impl HttpFetcher {
    /// Create a fetcher whose same-origin checks use `origin`
    pub fn new(origin: Url) -> Result<Self, FetchError> {
        let http = HttpClient::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;
        Ok(Self { http, origin })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let mut builder = self
            .http
            .request(request.method.clone(), request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let url = response.url().to_string();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
            .collect();
        let body = response.bytes().await?.to_vec();

        let kind = if request.is_same_origin(&self.origin) {
            ResponseKind::Basic
        } else {
            ResponseKind::Cors
        };

        log::debug!("{} {} -> {}", request.method, request.url, status);
        Ok(Response::new(status, kind, url, headers, body))
    }
}
