//! Issuer for development attestation tokens.
//!
//! Production tokens are signed by the authentication service. The
//! [`Issuer`] signs tokens locally, in the same format, so applications can
//! exercise their decode path against keys they control.

use rusty_paseto::core::{Footer, Key, Paseto, PasetoAsymmetricPrivateKey, Payload, Public, V4};

use crate::error::IssueError;
use crate::keys::{PublicKey, SigningKey};
use crate::payload::AttestationPayload;

/// Creates PASETO v4.public attestation tokens with a `kid` footer.
///
/// # Example
///
/// ```
/// use sip_attestation::{AttestationPayload, Issuer};
///
/// let issuer = Issuer::generate("k4.pid.dev");
/// let payload = AttestationPayload::builder()
///     .jti("f8b1d7f73b713af43ad59e33b7c02df5")
///     .slid("Z45JBJR6S9")
///     .result("AUTHENTIC")
///     .build()
///     .unwrap();
///
/// let token = issuer.issue(&payload).unwrap();
/// assert!(token.starts_with("v4.public."));
/// ```
#[derive(Debug, Clone)]
pub struct Issuer {
    key_id: String,
    signing_key: SigningKey,
}

impl Issuer {
    /// Creates a new issuer.
    ///
    /// # Arguments
    ///
    /// * `key_id` - The key identifier written to the footer (e.g. `k4.pid.*`)
    /// * `signing_key` - The Ed25519 signing key
    #[must_use]
    pub fn new(key_id: impl Into<String>, signing_key: SigningKey) -> Self {
        Self {
            key_id: key_id.into(),
            signing_key,
        }
    }

    /// Generates a new issuer with a random signing key.
    #[must_use]
    pub fn generate(key_id: impl Into<String>) -> Self {
        Self::new(key_id, SigningKey::generate())
    }

    /// Returns the key identifier written to each token's footer.
    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Returns the public key to register with a decoder.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        self.signing_key.public_key()
    }

    /// Signs `payload` into a token.
    ///
    /// # Errors
    ///
    /// Returns `IssueError::Signing` if the payload cannot be serialized or
    /// signed.
    pub fn issue(&self, payload: &AttestationPayload) -> Result<String, IssueError> {
        let claims = serde_json::to_string(payload).map_err(|e| IssueError::Signing {
            reason: format!("invalid payload: {e}"),
        })?;
        let footer = serde_json::json!({ "kid": self.key_id }).to_string();

        let key_bytes = self.signing_key.to_keypair_bytes();
        let key_wrapper = Key::<64>::from(&key_bytes);
        let paseto_key = PasetoAsymmetricPrivateKey::<V4, Public>::from(&key_wrapper);

        Paseto::<V4, Public>::builder()
            .set_payload(Payload::from(claims.as_str()))
            .set_footer(Footer::from(footer.as_str()))
            .try_sign(&paseto_key)
            .map_err(|e| IssueError::Signing {
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::footer::parse_footer;

    fn payload() -> AttestationPayload {
        AttestationPayload::builder().jti("abc").build().unwrap()
    }

    #[test]
    fn issue_creates_v4_public_token() {
        let issuer = Issuer::generate("k4.pid.dev");
        let token = issuer.issue(&payload()).unwrap();

        assert!(token.starts_with("v4.public."));
        assert_eq!(token.split('.').count(), 4);
    }

    #[test]
    fn footer_names_key_id() {
        let issuer = Issuer::generate("k4.pid.dev");
        let token = issuer.issue(&payload()).unwrap();

        assert_eq!(parse_footer(&token).unwrap().key_id(), "k4.pid.dev");
    }

    #[test]
    fn generated_issuers_have_unique_keys() {
        let issuer1 = Issuer::generate("k4.pid.a");
        let issuer2 = Issuer::generate("k4.pid.a");

        assert_ne!(issuer1.public_key(), issuer2.public_key());
    }

    #[test]
    fn key_id_accessible() {
        let issuer = Issuer::new("k4.pid.dev", SigningKey::generate());
        assert_eq!(issuer.key_id(), "k4.pid.dev");
    }
}
