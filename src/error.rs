//! Error types for attestation decoding.
//!
//! Every stage of the decode pipeline has its own error type. At the
//! decoder boundary all of them are folded into [`DecodeFailure`] and
//! surfaced to callers as a single [`AttestationError`].

use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Uniform error returned by [`AttestationDecoder`](crate::AttestationDecoder).
///
/// The message is the message of the underlying failure. Use
/// [`failure`](Self::failure) to find out which stage rejected the token.
///
/// # Example
///
/// ```
/// use sip_attestation::{AttestationError, DecodeFailure};
///
/// let err = AttestationError::from(DecodeFailure::MalformedToken {
///     reason: "missing footer".into(),
/// });
///
/// assert_eq!(err.to_string(), "malformed attestation token: missing footer");
/// assert!(matches!(err.failure(), DecodeFailure::MalformedToken { .. }));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(transparent)]
pub struct AttestationError(#[from] DecodeFailure);

impl AttestationError {
    /// Returns the failure that caused decoding to stop.
    #[must_use]
    pub fn failure(&self) -> &DecodeFailure {
        &self.0
    }

    /// Unwraps into the underlying failure.
    #[must_use]
    pub fn into_failure(self) -> DecodeFailure {
        self.0
    }

    /// Returns true if the token was rejected because it was already redeemed.
    #[must_use]
    pub fn is_already_redeemed(&self) -> bool {
        matches!(self.0, DecodeFailure::AlreadyRedeemed { .. })
    }
}

impl From<KeyResolutionError> for AttestationError {
    fn from(err: KeyResolutionError) -> Self {
        Self(DecodeFailure::KeyResolution(err))
    }
}

impl From<VerificationError> for AttestationError {
    fn from(err: VerificationError) -> Self {
        Self(DecodeFailure::Verification(err))
    }
}

/// The stage-specific reason a decode did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeFailure {
    /// The token or its footer could not be parsed.
    #[error("malformed attestation token: {reason}")]
    MalformedToken {
        /// Description of the parse error
        reason: String,
    },
    /// The key referenced by the footer is unknown and could not be fetched.
    #[error(transparent)]
    KeyResolution(#[from] KeyResolutionError),
    /// Signature or claim validation failed.
    #[error(transparent)]
    Verification(#[from] VerificationError),
    /// The token's `jti` has already been consumed.
    #[error("Attestation-Token {jti} already redeemed on {redeemed_at}")]
    AlreadyRedeemed {
        /// The token identifier
        jti: String,
        /// When the token was first redeemed
        redeemed_at: DateTime<Utc>,
    },
}

/// Errors raised while resolving a public key from the key directory.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyResolutionError {
    /// The key identifier cannot be placed into a directory URL.
    #[error("cannot build key directory URL for key '{key_id}' from '{base_url}'")]
    InvalidKeyId {
        /// The key identifier from the token footer
        key_id: String,
        /// The configured key directory
        base_url: String,
    },
    /// The request did not complete.
    #[error("key directory request to {url} failed: {message}")]
    Network {
        /// The requested URL
        url: String,
        /// Transport error message
        message: String,
    },
    /// The key directory answered with a non-success status.
    #[error("key directory returned HTTP {status} for {url}; the key is unknown or the directory is unavailable")]
    Status {
        /// The requested URL
        url: String,
        /// HTTP status code
        status: u16,
    },
    /// The key directory answered with something that is not a public key.
    #[error("key directory returned an invalid key for {url}: {reason}")]
    InvalidBody {
        /// The requested URL
        url: String,
        /// Why the body was rejected
        reason: String,
    },
}

/// Errors raised by a [`TokenVerifier`](crate::TokenVerifier).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationError {
    /// Token signature verification failed.
    #[error("token signature verification failed; token may have been tampered with")]
    InvalidSignature,
    /// Token format is invalid.
    #[error("invalid token format: {reason}")]
    InvalidTokenFormat {
        /// Description of the format error
        reason: String,
    },
    /// The resolved public key is not usable.
    #[error("invalid public key: {reason}")]
    InvalidKey {
        /// Description of the key error
        reason: String,
    },
    /// Claims could not be parsed.
    #[error("failed to parse claims: {reason}")]
    InvalidClaims {
        /// Description of the parsing error
        reason: String,
    },
    /// Token has expired.
    #[error("token expired at {expired_at}; request a new attestation")]
    TokenExpired {
        /// When the token expired
        expired_at: DateTime<Utc>,
    },
    /// Token is not yet valid (`nbf`).
    #[error("token not yet valid; valid from {valid_from}")]
    TokenNotYetValid {
        /// When the token becomes valid
        valid_from: DateTime<Utc>,
    },
    /// Token claims to be issued in the future (`iat`).
    #[error("token issued in the future at {issued_at}; check clock synchronisation")]
    IssuedInFuture {
        /// The `iat` claim
        issued_at: DateTime<Utc>,
    },
    /// Token is older than the allowed maximum age.
    #[error("token issued at {issued_at} exceeds the maximum token age")]
    MaxAgeExceeded {
        /// The `iat` claim
        issued_at: DateTime<Utc>,
    },
    /// Token audience does not match.
    #[error("audience mismatch: token is for {token_audience:?} but expected '{expected}'")]
    AudienceMismatch {
        /// The `aud` claim, if any
        token_audience: Option<String>,
        /// The expected audience
        expected: String,
    },
}

/// Errors raised while building an [`AttestationDecoder`](crate::AttestationDecoder).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A configured URL cannot be parsed.
    #[error("invalid key directory URL '{url}': {reason}")]
    InvalidUrl {
        /// The configured URL
        url: String,
        /// Parse error
        reason: String,
    },
    /// A cache TTL exceeds [`MAX_CACHE_TTL`](crate::MAX_CACHE_TTL).
    #[error("{setting} of {ttl:?} exceeds the maximum cache TTL")]
    InvalidTtl {
        /// Name of the configuration field
        setting: &'static str,
        /// The configured TTL
        ttl: Duration,
    },
    /// The HTTP client could not be created.
    #[error("failed to create HTTP client: {reason}")]
    HttpClient {
        /// Client builder error
        reason: String,
    },
}

/// Errors raised while issuing development tokens.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IssueError {
    /// A required field was not provided.
    #[error("missing required field '{field}' in attestation payload")]
    MissingField {
        /// Name of the missing field
        field: &'static str,
    },
    /// The TTL duration is invalid.
    #[error("TTL duration is invalid or out of range")]
    InvalidTtl,
    /// Token signing failed.
    #[error("failed to sign token: {reason}")]
    Signing {
        /// Description of the signing error
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn wrapped_error_keeps_original_message() {
        let inner = VerificationError::InvalidSignature;
        let err = AttestationError::from(inner.clone());

        assert_eq!(err.to_string(), inner.to_string());
        assert_eq!(err.into_failure(), DecodeFailure::Verification(inner));
    }

    #[test]
    fn already_redeemed_message_names_jti_and_date() {
        let redeemed_at = Utc.with_ymd_and_hms(2024, 4, 18, 6, 55, 12).unwrap();
        let err = AttestationError::from(DecodeFailure::AlreadyRedeemed {
            jti: "f8b1d7f7".into(),
            redeemed_at,
        });

        let message = err.to_string();
        assert!(message.contains("f8b1d7f7"));
        assert!(message.contains("2024-04-18"));
        assert!(err.is_already_redeemed());
    }

    #[test]
    fn key_resolution_error_converts() {
        let err = AttestationError::from(KeyResolutionError::Status {
            url: "https://keys.example/v4/k4.pid.x".into(),
            status: 404,
        });

        assert!(matches!(
            err.failure(),
            DecodeFailure::KeyResolution(KeyResolutionError::Status { status: 404, .. })
        ));
        assert!(!err.is_already_redeemed());
    }
}
