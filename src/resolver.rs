//! Public key resolution with caching.
//!
//! Keys are looked up in a TTL cache first. On a miss a single request is
//! sent to `{directory}/{kid}`; the response body is the key. Failed
//! fetches are neither retried nor cached.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use moka::sync::Cache;
use tracing::{debug, info};
use url::Url;

use crate::config::MAX_CACHE_TTL;
use crate::error::{ConfigError, KeyResolutionError};
use crate::keys::PUBLIC_KEY_PREFIX;

/// Largest key directory response body accepted, in bytes.
pub const MAX_KEY_BODY_BYTES: usize = 4096;

/// Fetches key material from a key directory.
///
/// [`HttpKeyFetcher`] is used by default; tests and offline deployments can
/// supply their own.
#[async_trait]
pub trait KeyFetcher: Send + Sync {
    /// Fetches the body served at `url`.
    ///
    /// # Errors
    ///
    /// Returns `KeyResolutionError` on transport failure, a non-success
    /// status, or a body that is not a plausible key.
    async fn fetch(&self, url: &Url) -> Result<String, KeyResolutionError>;
}

/// [`KeyFetcher`] backed by `reqwest`.
///
/// Redirects are not followed, so keys only come from the configured
/// directory host. Bodies larger than [`MAX_KEY_BODY_BYTES`] are rejected.
#[derive(Debug, Clone)]
pub struct HttpKeyFetcher {
    client: reqwest::Client,
}

impl HttpKeyFetcher {
    /// Creates a fetcher whose requests time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::HttpClient` if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("sip-attestation/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ConfigError::HttpClient {
                reason: e.to_string(),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl KeyFetcher for HttpKeyFetcher {
    async fn fetch(&self, url: &Url) -> Result<String, KeyResolutionError> {
        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| KeyResolutionError::Network {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(KeyResolutionError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        if response
            .content_length()
            .is_some_and(|len| len > MAX_KEY_BODY_BYTES as u64)
        {
            return Err(body_too_large(url));
        }

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| KeyResolutionError::Network {
                url: url.to_string(),
                message: format!("failed to read response body: {e}"),
            })?
        {
            if body.len() + chunk.len() > MAX_KEY_BODY_BYTES {
                return Err(body_too_large(url));
            }
            body.extend_from_slice(&chunk);
        }

        String::from_utf8(body).map_err(|_| KeyResolutionError::InvalidBody {
            url: url.to_string(),
            reason: "response is not UTF-8".to_string(),
        })
    }
}

fn body_too_large(url: &Url) -> KeyResolutionError {
    KeyResolutionError::InvalidBody {
        url: url.to_string(),
        reason: format!("response exceeds {MAX_KEY_BODY_BYTES} bytes"),
    }
}

/// Resolves key identifiers to PASERK public keys.
pub struct KeyResolver {
    cache: Cache<String, String>,
    fetcher: Arc<dyn KeyFetcher>,
    directory: RwLock<Url>,
    development_directory: Url,
}

impl KeyResolver {
    /// Creates a resolver.
    ///
    /// # Arguments
    ///
    /// * `fetcher` - Transport used on cache misses
    /// * `directory` - Key directory base URL
    /// * `development_directory` - Base URL used after [`use_development_directory`](Self::use_development_directory)
    /// * `ttl` - How long resolved or registered keys stay cached, at most
    ///   [`MAX_CACHE_TTL`](crate::MAX_CACHE_TTL)
    /// * `capacity` - Maximum number of cached keys
    #[must_use]
    pub fn new(
        fetcher: Arc<dyn KeyFetcher>,
        directory: Url,
        development_directory: Url,
        ttl: Duration,
        capacity: u64,
    ) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl.min(MAX_CACHE_TTL))
                .build(),
            fetcher,
            directory: RwLock::new(directory),
            development_directory,
        }
    }

    /// Returns the public key for `key_id`, fetching it on a cache miss.
    ///
    /// Concurrent misses for the same `key_id` are not coalesced; each sends
    /// its own request.
    ///
    /// # Errors
    ///
    /// Returns `KeyResolutionError` if the key is not cached and cannot be
    /// fetched, or the directory returns something other than a
    /// `k4.public.*` key.
    pub async fn resolve(&self, key_id: &str) -> Result<String, KeyResolutionError> {
        if let Some(key) = self.cache.get(key_id) {
            debug!(kid = %key_id, "key cache hit");
            return Ok(key);
        }

        let url = self.key_url(key_id)?;
        debug!(kid = %key_id, %url, "key cache miss, fetching from key directory");

        let body = self.fetcher.fetch(&url).await?;
        let key = body.trim();
        if key.is_empty() {
            return Err(KeyResolutionError::InvalidBody {
                url: url.to_string(),
                reason: "empty response".to_string(),
            });
        }
        if !key.starts_with(PUBLIC_KEY_PREFIX) {
            return Err(KeyResolutionError::InvalidBody {
                url: url.to_string(),
                reason: format!("expected a '{PUBLIC_KEY_PREFIX}' key"),
            });
        }

        let key = key.to_string();
        self.cache.insert(key_id.to_string(), key.clone());
        debug!(kid = %key_id, "key resolved and cached");
        Ok(key)
    }

    /// Inserts or replaces a key, bypassing the key directory for `key_id`.
    pub fn register(&self, key_id: impl Into<String>, public_key: impl Into<String>) {
        self.cache.insert(key_id.into(), public_key.into());
    }

    /// Returns true if `key_id` is currently cached.
    #[must_use]
    pub fn contains(&self, key_id: &str) -> bool {
        self.cache.contains_key(key_id)
    }

    /// Points future cache misses at the development key directory.
    ///
    /// Keys already cached are kept.
    pub fn use_development_directory(&self) {
        *self.directory.write().unwrap_or_else(PoisonError::into_inner) =
            self.development_directory.clone();
        info!(directory = %self.development_directory, "switched to development key directory");
    }

    /// Returns the key directory currently used for cache misses.
    #[must_use]
    pub fn directory_url(&self) -> Url {
        self.directory
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Removes every cached key.
    pub fn clear(&self) {
        self.cache.invalidate_all();
    }

    fn key_url(&self, key_id: &str) -> Result<Url, KeyResolutionError> {
        let mut url = self.directory_url();
        let base_url = url.to_string();
        let invalid = || KeyResolutionError::InvalidKeyId {
            key_id: key_id.to_string(),
            base_url: base_url.clone(),
        };
        if matches!(key_id, "." | "..") {
            return Err(invalid());
        }
        match url.path_segments_mut() {
            Ok(mut segments) => {
                segments.pop_if_empty().push(key_id);
            }
            Err(()) => return Err(invalid()),
        }
        Ok(url)
    }
}

impl std::fmt::Debug for KeyResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyResolver")
            .field("directory", &self.directory_url())
            .field("development_directory", &self.development_directory)
            .finish_non_exhaustive()
    }
}
