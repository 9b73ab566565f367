//! Parsing of the unprotected token footer.
//!
//! Attestation tokens have the shape `v4.public.<payload>.<footer>`. The
//! footer is base64url-encoded JSON naming the signing key:
//!
//! ```text
//! {"kid": "k4.pid.2uab3h18sgaYX1PKFW3OIMvGIfAMnuwWBJ6TuCbuwQii"}
//! ```
//!
//! Nothing in the footer is trusted until the signature, which covers it,
//! has been verified.

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use serde::Deserialize;

use crate::error::DecodeFailure;

/// Minimum number of dot-separated segments in an attestation token.
pub const MIN_TOKEN_SEGMENTS: usize = 4;

const FOOTER_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Deserialize)]
struct FooterClaims {
    kid: String,
}

/// The decoded footer of an attestation token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenFooter {
    key_id: String,
    raw: String,
}

impl TokenFooter {
    /// Returns the key identifier (`kid`).
    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Returns the decoded footer text, as covered by the signature.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }
}

/// Extracts the footer from an attestation token.
///
/// # Errors
///
/// Returns `DecodeFailure::MalformedToken` if the token has fewer than four
/// segments, or the footer is not base64url-encoded JSON with a non-empty
/// string `kid`.
///
/// # Example
///
/// ```
/// use sip_attestation::parse_footer;
///
/// let footer = parse_footer(
///     "v4.public.payload.eyJraWQiOiAiazQucGlkLkFBQSJ9"
/// ).unwrap();
///
/// assert_eq!(footer.key_id(), "k4.pid.AAA");
/// ```
pub fn parse_footer(token: &str) -> Result<TokenFooter, DecodeFailure> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() < MIN_TOKEN_SEGMENTS {
        return Err(malformed(format!(
            "expected at least {MIN_TOKEN_SEGMENTS} dot-separated segments, got {}",
            segments.len()
        )));
    }

    let encoded = segments[segments.len() - 1];
    let decoded = FOOTER_ENGINE
        .decode(encoded)
        .map_err(|e| malformed(format!("footer is not base64url: {e}")))?;
    let raw = String::from_utf8(decoded).map_err(|_| malformed("footer is not UTF-8"))?;

    let claims: FooterClaims =
        serde_json::from_str(&raw).map_err(|e| malformed(format!("invalid footer: {e}")))?;
    if claims.kid.is_empty() {
        return Err(malformed("footer 'kid' is empty"));
    }

    Ok(TokenFooter {
        key_id: claims.kid,
        raw,
    })
}

fn malformed(reason: impl Into<String>) -> DecodeFailure {
    DecodeFailure::MalformedToken {
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SERVICE_FOOTER: &str =
        "eyJraWQiOiAiazQucGlkLjJ1YWIzaDE4c2dhWVgxUEtGVzNPSU12R0lmQU1udXdXQko2VHVDYnV3UWlpIn0";

    fn encode(json: &str) -> String {
        FOOTER_ENGINE.encode(json)
    }

    #[test]
    fn parses_service_footer() {
        let footer = parse_footer(&format!("v4.public.abc.{SERVICE_FOOTER}")).unwrap();

        assert_eq!(
            footer.key_id(),
            "k4.pid.2uab3h18sgaYX1PKFW3OIMvGIfAMnuwWBJ6TuCbuwQii"
        );
        assert_eq!(
            footer.raw(),
            r#"{"kid": "k4.pid.2uab3h18sgaYX1PKFW3OIMvGIfAMnuwWBJ6TuCbuwQii"}"#
        );
    }

    #[test]
    fn accepts_padded_footer() {
        let padded = base64::engine::general_purpose::URL_SAFE.encode(r#"{"kid":"k4.pid.A"}"#);
        let footer = parse_footer(&format!("v4.public.abc.{padded}")).unwrap();
        assert_eq!(footer.key_id(), "k4.pid.A");
    }

    #[test]
    fn ignores_extra_footer_fields() {
        let token = format!("v4.public.abc.{}", encode(r#"{"kid":"k4.pid.A","wpk":"x"}"#));
        assert_eq!(parse_footer(&token).unwrap().key_id(), "k4.pid.A");
    }

    #[test]
    fn rejects_token_without_footer() {
        let result = parse_footer("v4.public.abc");
        assert!(matches!(result, Err(DecodeFailure::MalformedToken { .. })));
    }

    #[test]
    fn rejects_empty_token() {
        assert!(parse_footer("").is_err());
    }

    #[test]
    fn rejects_non_base64_footer() {
        assert!(parse_footer("v4.public.abc.%%%").is_err());
    }

    #[test]
    fn rejects_non_json_footer() {
        let token = format!("v4.public.abc.{}", encode("kid=k4.pid.A"));
        assert!(parse_footer(&token).is_err());
    }

    #[test]
    fn rejects_footer_without_kid() {
        let token = format!("v4.public.abc.{}", encode(r#"{"key":"k4.pid.A"}"#));
        assert!(parse_footer(&token).is_err());
    }

    #[test]
    fn rejects_non_string_kid() {
        let token = format!("v4.public.abc.{}", encode(r#"{"kid":42}"#));
        assert!(parse_footer(&token).is_err());
    }

    #[test]
    fn rejects_empty_kid() {
        let token = format!("v4.public.abc.{}", encode(r#"{"kid":""}"#));
        assert!(matches!(
            parse_footer(&token),
            Err(DecodeFailure::MalformedToken { reason }) if reason.contains("empty")
        ));
    }
}
