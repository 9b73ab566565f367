//! Configuration for the attestation decoder.

use std::time::Duration;

use crate::verification::VerifyOptions;

/// Production key directory.
pub const PRODUCTION_KEY_DIRECTORY: &str = "https://sip-keys.authenticvision.com/v4";

/// Development key directory, serving keys for developer tokens.
pub const DEVELOPMENT_KEY_DIRECTORY: &str = "https://api.metaanchor.io/api/v1/attestation/keys/v4";

/// Longest TTL accepted for the key and redemption caches.
pub const MAX_CACHE_TTL: Duration = Duration::from_hours(1000 * 365 * 24);

/// Configuration for [`AttestationDecoder`](crate::AttestationDecoder).
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use sip_attestation::DecoderConfig;
///
/// let config = DecoderConfig::new()
///     .with_key_cache_ttl(Duration::from_secs(600))
///     .with_redemption_ttl(Duration::from_secs(90 * 24 * 3600));
///
/// assert_eq!(config.key_cache_ttl, Duration::from_secs(600));
/// ```
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    /// Key directory used for cache misses.
    ///
    /// Default: [`PRODUCTION_KEY_DIRECTORY`]
    pub key_directory_url: String,

    /// Key directory used after switching to development mode.
    ///
    /// Default: [`DEVELOPMENT_KEY_DIRECTORY`]
    pub development_key_directory_url: String,

    /// How long resolved and registered keys stay cached. At most
    /// [`MAX_CACHE_TTL`].
    ///
    /// Default: 24 hours
    pub key_cache_ttl: Duration,

    /// Maximum number of cached keys.
    ///
    /// When the cache is full, keys can be evicted, or a newly fetched key
    /// may not be admitted at all. Such keys are fetched again on their next
    /// use, in addition to refetches after TTL expiry and cache clears.
    ///
    /// Default: 1024
    pub key_cache_capacity: u64,

    /// How long redemption records are kept, at most [`MAX_CACHE_TTL`].
    /// `None` keeps them until the caches are cleared.
    ///
    /// Default: None
    pub redemption_ttl: Option<Duration>,

    /// Timeout for key directory requests.
    ///
    /// Default: 10 seconds
    pub request_timeout: Duration,

    /// Verification options that per-call overrides are merged over.
    ///
    /// Default: [`VerifyOptions::default`]
    pub verify_options: VerifyOptions,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            key_directory_url: PRODUCTION_KEY_DIRECTORY.to_string(),
            development_key_directory_url: DEVELOPMENT_KEY_DIRECTORY.to_string(),
            key_cache_ttl: Duration::from_hours(24),
            key_cache_capacity: 1024,
            redemption_ttl: None,
            request_timeout: Duration::from_secs(10),
            verify_options: VerifyOptions::default(),
        }
    }
}

impl DecoderConfig {
    /// Creates a new configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the key directory.
    #[must_use]
    pub fn with_key_directory_url(mut self, url: impl Into<String>) -> Self {
        self.key_directory_url = url.into();
        self
    }

    /// Sets the development key directory.
    #[must_use]
    pub fn with_development_key_directory_url(mut self, url: impl Into<String>) -> Self {
        self.development_key_directory_url = url.into();
        self
    }

    /// Sets the key cache TTL.
    #[must_use]
    pub const fn with_key_cache_ttl(mut self, ttl: Duration) -> Self {
        self.key_cache_ttl = ttl;
        self
    }

    /// Sets the key cache capacity.
    #[must_use]
    pub const fn with_key_cache_capacity(mut self, capacity: u64) -> Self {
        self.key_cache_capacity = capacity;
        self
    }

    /// Expires redemption records after `ttl`.
    #[must_use]
    pub const fn with_redemption_ttl(mut self, ttl: Duration) -> Self {
        self.redemption_ttl = Some(ttl);
        self
    }

    /// Sets the key directory request timeout.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the default verification options.
    #[must_use]
    pub fn with_verify_options(mut self, options: VerifyOptions) -> Self {
        self.verify_options = options;
        self
    }
}
