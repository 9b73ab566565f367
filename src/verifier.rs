//! Signature verification of attestation tokens.

use chrono::{DateTime, Utc};
use rusty_paseto::core::{Footer, Key, Paseto, PasetoAsymmetricPublicKey, Public, V4};
use serde_json::{Map, Value};

use crate::error::VerificationError;
use crate::footer::parse_footer;
use crate::keys::PublicKey;
use crate::verification::{
    VerifyOptions, check_audience, check_expiration, check_issued_at, check_max_age,
    check_not_before,
};

/// Token version and purpose of the tokens this crate verifies.
pub const TOKEN_HEADER: &str = "v4.public.";

/// Metadata returned alongside the payload when
/// [`VerifyOptions::complete`] is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMetadata {
    /// PASETO version, always `v4`
    pub version: String,
    /// PASETO purpose, always `public`
    pub purpose: String,
    /// The decoded footer
    pub footer: String,
}

/// Output of a successful verification.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedToken {
    /// The verified claims as JSON
    pub payload: Value,
    /// Token metadata, when requested
    pub metadata: Option<TokenMetadata>,
}

/// Verifies a token's signature and time-based claims.
///
/// The decoder hands every token to a `TokenVerifier` after resolving its
/// key. [`PasetoVerifier`] is the implementation used by default.
pub trait TokenVerifier: Send + Sync {
    /// Verifies `token` against the PASERK-encoded `public_key`.
    ///
    /// # Errors
    ///
    /// Returns `VerificationError` if the key is unusable, the signature is
    /// invalid, or a time-based claim is rejected under `options`.
    fn verify(
        &self,
        token: &str,
        public_key: &str,
        options: &VerifyOptions,
    ) -> Result<VerifiedToken, VerificationError>;
}

/// PASETO v4.public verifier.
///
/// # Example
///
/// ```
/// use sip_attestation::{AttestationPayload, Issuer, PasetoVerifier, TokenVerifier, VerifyOptions};
///
/// let issuer = Issuer::generate("k4.pid.example");
/// let payload = AttestationPayload::builder().jti("abc").build().unwrap();
/// let token = issuer.issue(&payload).unwrap();
///
/// let verified = PasetoVerifier
///     .verify(&token, &issuer.public_key().to_paserk(), &VerifyOptions::default())
///     .unwrap();
///
/// assert_eq!(verified.payload["jti"], "abc");
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct PasetoVerifier;

impl TokenVerifier for PasetoVerifier {
    fn verify(
        &self,
        token: &str,
        public_key: &str,
        options: &VerifyOptions,
    ) -> Result<VerifiedToken, VerificationError> {
        let public_key = PublicKey::from_paserk(public_key)?;
        let footer = parse_footer(token).map_err(|e| VerificationError::InvalidTokenFormat {
            reason: e.to_string(),
        })?;

        let key_bytes = public_key.to_bytes();
        let key_wrapper = Key::<32>::from(&key_bytes);
        let paseto_key = PasetoAsymmetricPublicKey::<V4, Public>::from(&key_wrapper);

        let message =
            Paseto::<V4, Public>::try_verify(token, &paseto_key, Footer::from(footer.raw()), None)
                .map_err(|e| {
                    let err_str = e.to_string();
                    if err_str.to_lowercase().contains("signature") {
                        VerificationError::InvalidSignature
                    } else {
                        VerificationError::InvalidTokenFormat { reason: err_str }
                    }
                })?;

        let payload: Value =
            serde_json::from_str(&message).map_err(|e| VerificationError::InvalidClaims {
                reason: format!("payload is not JSON: {e}"),
            })?;
        let claims = payload
            .as_object()
            .ok_or_else(|| VerificationError::InvalidClaims {
                reason: "payload is not a JSON object".to_string(),
            })?;

        validate_claims(claims, options)?;

        let metadata = options.complete.then(|| TokenMetadata {
            version: "v4".to_string(),
            purpose: "public".to_string(),
            footer: footer.raw().to_string(),
        });

        Ok(VerifiedToken { payload, metadata })
    }
}

/// Applies the time-based and audience checks selected by `options`.
fn validate_claims(
    claims: &Map<String, Value>,
    options: &VerifyOptions,
) -> Result<(), VerificationError> {
    let now = options.effective_now();
    let tolerance = options.clock_tolerance;

    let iat = time_claim(claims, "iat")?;
    let exp = time_claim(claims, "exp")?;
    let nbf = time_claim(claims, "nbf")?;

    if let (false, Some(iat)) = (options.ignore_iat, iat) {
        check_issued_at(iat, now, tolerance)?;
    }
    if let (false, Some(nbf)) = (options.ignore_nbf, nbf) {
        check_not_before(nbf, now, tolerance)?;
    }
    if let (false, Some(exp)) = (options.ignore_exp, exp) {
        check_expiration(exp, now, tolerance)?;
    }
    if let Some(max_age) = options.max_token_age {
        let iat = iat.ok_or_else(|| VerificationError::InvalidClaims {
            reason: "'iat' claim is required when a maximum token age is set".to_string(),
        })?;
        check_max_age(iat, max_age, now, tolerance)?;
    }
    if let Some(expected) = &options.audience {
        let aud = claims.get("aud").and_then(Value::as_str);
        check_audience(aud, expected)?;
    }

    Ok(())
}

/// Reads an optional RFC 3339 timestamp claim.
fn time_claim(
    claims: &Map<String, Value>,
    name: &str,
) -> Result<Option<DateTime<Utc>>, VerificationError> {
    let Some(value) = claims.get(name) else {
        return Ok(None);
    };
    let text = value.as_str().ok_or_else(|| VerificationError::InvalidClaims {
        reason: format!("'{name}' claim must be a string"),
    })?;
    DateTime::parse_from_rfc3339(text)
        .map(|ts| Some(ts.with_timezone(&Utc)))
        .map_err(|e| VerificationError::InvalidClaims {
            reason: format!("invalid {name} format: {e}"),
        })
}
