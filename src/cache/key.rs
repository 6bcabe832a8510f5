//! Cache key generation using SHA-256 hashes

use reqwest::Method;
use sha2::{Digest, Sha256};

/// Generate a deterministic cache key from a request's identity.
///
/// The key is a SHA-256 hash of the method and the URL with its fragment
/// removed, so `#section` links share the cached document.
pub fn cache_key(method: &Method, url: &str) -> String {
    let mut hasher = Sha256::new();

    hasher.update(method.as_str().as_bytes());
    hasher.update(b" ");

    let without_fragment = url.split('#').next().unwrap_or(url);
    hasher.update(without_fragment.as_bytes());

    format!("{:x}", hasher.finalize())
}
