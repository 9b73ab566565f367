//! The attestation decoder: parse, resolve, verify, redeem.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use url::Url;

use crate::attestation::Attestation;
use crate::config::{DecoderConfig, MAX_CACHE_TTL};
use crate::error::{AttestationError, ConfigError, DecodeFailure, VerificationError};
use crate::footer::parse_footer;
use crate::payload::AttestationPayload;
use crate::redemption::RedemptionTracker;
use crate::resolver::{HttpKeyFetcher, KeyFetcher, KeyResolver};
use crate::verification::{VerifyOptions, VerifyOverrides};
use crate::verifier::{PasetoVerifier, TokenVerifier};

/// Per-call decode parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeParams {
    /// Decode without redeeming.
    ///
    /// This does not undo earlier redemptions: a token that is already
    /// redeemed still fails to decode.
    pub suppress_redemption: bool,
}

impl DecodeParams {
    /// Parameters that decode without redeeming the token.
    #[must_use]
    pub const fn without_redemption() -> Self {
        Self {
            suppress_redemption: true,
        }
    }
}

/// Decodes and redeems attestation tokens.
///
/// Redeeming on decode is the default, so each token can be decoded only
/// once; this limits replay and phishing. Use an external mechanism such as
/// a session if the token's contents are needed more than once.
///
/// The decoder is `Send + Sync` and all operations take `&self`; share it
/// behind an `Arc` or a `static` at the application's composition root.
///
/// # Example
///
/// ```
/// use sip_attestation::{AttestationDecoder, AttestationPayload, Issuer};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let issuer = Issuer::generate("k4.pid.dev");
/// let token = issuer
///     .issue(
///         &AttestationPayload::builder()
///             .jti("f8b1d7f73b713af43ad59e33b7c02df5")
///             .slid("Z45JBJR6S9")
///             .result("AUTHENTIC")
///             .build()
///             .unwrap(),
///     )
///     .unwrap();
///
/// let decoder = AttestationDecoder::new().unwrap();
/// decoder.register_key(issuer.key_id(), issuer.public_key().to_paserk());
///
/// let attestation = decoder.decode(&token).await.unwrap();
/// assert!(attestation.is_authenticated());
///
/// // Redeemed on first decode
/// assert!(decoder.decode(&token).await.is_err());
/// # }
/// ```
pub struct AttestationDecoder {
    keys: KeyResolver,
    redemptions: RedemptionTracker,
    verifier: Arc<dyn TokenVerifier>,
    verify_options: VerifyOptions,
}

impl AttestationDecoder {
    /// Creates a decoder with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the HTTP client cannot be created.
    pub fn new() -> Result<Self, ConfigError> {
        Self::builder().build()
    }

    /// Creates a decoder with `config`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a configured URL or cache TTL is invalid, or
    /// the HTTP client cannot be created.
    pub fn with_config(config: DecoderConfig) -> Result<Self, ConfigError> {
        Self::builder().config(config).build()
    }

    /// Returns a builder for a decoder with custom components.
    #[must_use]
    pub fn builder() -> DecoderBuilder {
        DecoderBuilder::default()
    }

    /// Adds a key for token verification.
    ///
    /// Typically not required, as keys are resolved through the key
    /// directory. Registered keys are never fetched.
    ///
    /// # Arguments
    ///
    /// * `key_id` - Key id in the format `k4.pid.*`
    /// * `public_key` - Public key in the format `k4.public.*`
    pub fn register_key(&self, key_id: impl Into<String>, public_key: impl Into<String>) {
        let key_id = key_id.into();
        debug!(kid = %key_id, "registering key");
        self.keys.register(key_id, public_key);
    }

    /// Resolves keys from the development key directory from now on.
    ///
    /// That directory serves keys for developer tokens. Do not use in
    /// production. Keys already cached are kept.
    pub fn use_development_key_directory(&self) {
        warn!("development key directory enabled; do not use in production");
        self.keys.use_development_directory();
    }

    /// Returns the key directory used for unresolved keys.
    #[must_use]
    pub fn key_directory_url(&self) -> Url {
        self.keys.directory_url()
    }

    /// Decodes and redeems `token` with default parameters.
    ///
    /// # Errors
    ///
    /// Returns `AttestationError` if the token is malformed, its key cannot
    /// be resolved, verification fails, or it was already redeemed.
    pub async fn decode(&self, token: &str) -> Result<Attestation, AttestationError> {
        self.decode_with(token, DecodeParams::default(), &VerifyOverrides::default())
            .await
    }

    /// Decodes `token`, redeeming it unless `params` suppresses redemption.
    ///
    /// `overrides` are merged over the configured verification options;
    /// every field set in `overrides` wins.
    ///
    /// A token is redeemed only after its signature and claims have been
    /// verified. A failed decode never returns a partial result.
    ///
    /// # Errors
    ///
    /// Returns `AttestationError` wrapping the [`DecodeFailure`] of the
    /// stage that rejected the token.
    pub async fn decode_with(
        &self,
        token: &str,
        params: DecodeParams,
        overrides: &VerifyOverrides,
    ) -> Result<Attestation, AttestationError> {
        let result = self.run_pipeline(token, params, overrides).await;
        if let Err(failure) = &result {
            debug!(error = %failure, "attestation decoding failed");
        }
        result.map_err(AttestationError::from)
    }

    async fn run_pipeline(
        &self,
        token: &str,
        params: DecodeParams,
        overrides: &VerifyOverrides,
    ) -> Result<Attestation, DecodeFailure> {
        let footer = parse_footer(token)?;
        let key_id = footer.key_id();

        let public_key = self.keys.resolve(key_id).await?;

        let options = overrides.apply_to(&self.verify_options);
        let verified = self.verifier.verify(token, &public_key, &options)?;
        debug!(kid = %key_id, "token signature verified");

        let payload: AttestationPayload =
            serde_json::from_value(verified.payload).map_err(|e| VerificationError::InvalidClaims {
                reason: e.to_string(),
            })?;
        let attestation = Attestation::new(payload, token, verified.metadata);

        self.redemptions
            .check_and_record(attestation.jti(), params.suppress_redemption)?;

        Ok(attestation)
    }

    /// Clears the key and redemption caches.
    ///
    /// Clearing the redemption cache allows every previously redeemed token
    /// to be decoded again, which reopens the window for replay attacks.
    pub fn clear_caches(&self) {
        warn!("clearing key and redemption caches; redeemed tokens become decodable again");
        self.keys.clear();
        self.redemptions.clear();
    }

    /// Returns true if `key_id` is currently cached.
    #[must_use]
    pub fn has_key(&self, key_id: &str) -> bool {
        self.keys.contains(key_id)
    }

    /// Returns when the token with `jti` was redeemed, if it was.
    #[must_use]
    pub fn redeemed_at(&self, jti: &str) -> Option<chrono::DateTime<chrono::Utc>> {
        self.redemptions.redeemed_at(jti)
    }
}

impl std::fmt::Debug for AttestationDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttestationDecoder")
            .field("keys", &self.keys)
            .field("redemptions", &self.redemptions)
            .field("verify_options", &self.verify_options)
            .finish_non_exhaustive()
    }
}

/// Builder for [`AttestationDecoder`].
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use sip_attestation::{AttestationDecoder, DecoderConfig, PasetoVerifier};
///
/// let decoder = AttestationDecoder::builder()
///     .config(DecoderConfig::new().with_request_timeout(Duration::from_secs(3)))
///     .token_verifier(PasetoVerifier)
///     .build()
///     .unwrap();
///
/// assert_eq!(
///     decoder.key_directory_url().as_str(),
///     "https://sip-keys.authenticvision.com/v4"
/// );
/// ```
#[derive(Default)]
pub struct DecoderBuilder {
    config: DecoderConfig,
    fetcher: Option<Arc<dyn KeyFetcher>>,
    verifier: Option<Arc<dyn TokenVerifier>>,
}

impl DecoderBuilder {
    /// Sets the configuration.
    #[must_use]
    pub fn config(mut self, config: DecoderConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the HTTP key fetcher.
    #[must_use]
    pub fn key_fetcher(mut self, fetcher: impl KeyFetcher + 'static) -> Self {
        self.fetcher = Some(Arc::new(fetcher));
        self
    }

    /// Replaces the PASETO verifier.
    #[must_use]
    pub fn token_verifier(mut self, verifier: impl TokenVerifier + 'static) -> Self {
        self.verifier = Some(Arc::new(verifier));
        self
    }

    /// Builds the decoder.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidUrl` if a key directory URL cannot be
    /// parsed, `ConfigError::InvalidTtl` if a cache TTL exceeds
    /// [`MAX_CACHE_TTL`], or `ConfigError::HttpClient` if the HTTP client
    /// cannot be created.
    pub fn build(self) -> Result<AttestationDecoder, ConfigError> {
        let config = self.config;
        check_ttl("key_cache_ttl", config.key_cache_ttl)?;
        if let Some(ttl) = config.redemption_ttl {
            check_ttl("redemption_ttl", ttl)?;
        }
        let directory = parse_url(&config.key_directory_url)?;
        let development_directory = parse_url(&config.development_key_directory_url)?;

        let fetcher = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(HttpKeyFetcher::new(config.request_timeout)?),
        };
        let verifier = self.verifier.unwrap_or_else(|| Arc::new(PasetoVerifier));

        info!(directory = %directory, "attestation decoder ready");

        Ok(AttestationDecoder {
            keys: KeyResolver::new(
                fetcher,
                directory,
                development_directory,
                config.key_cache_ttl,
                config.key_cache_capacity,
            ),
            redemptions: RedemptionTracker::new(config.redemption_ttl),
            verifier,
            verify_options: config.verify_options,
        })
    }
}

impl std::fmt::Debug for DecoderBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoderBuilder")
            .field("config", &self.config)
            .field("custom_fetcher", &self.fetcher.is_some())
            .field("custom_verifier", &self.verifier.is_some())
            .finish()
    }
}

fn check_ttl(setting: &'static str, ttl: Duration) -> Result<(), ConfigError> {
    if ttl > MAX_CACHE_TTL {
        return Err(ConfigError::InvalidTtl { setting, ttl });
    }
    Ok(())
}

fn parse_url(url: &str) -> Result<Url, ConfigError> {
    let parsed = Url::parse(url).map_err(|e| ConfigError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    if parsed.cannot_be_a_base() {
        return Err(ConfigError::InvalidUrl {
            url: url.to_string(),
            reason: "URL cannot have path segments".to_string(),
        });
    }
    Ok(parsed)
}
