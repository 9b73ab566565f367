//! Key types for attestation signing and verification.
//!
//! Public keys travel as PASERK strings (`k4.public.<base64url>`), which is
//! the format served by the key directory and accepted by
//! [`AttestationDecoder::register_key`](crate::AttestationDecoder::register_key).

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use ed25519_dalek::{SigningKey as DalekSigningKey, VerifyingKey as DalekVerifyingKey};

use crate::error::VerificationError;

/// PASERK prefix for v4 public keys.
pub const PUBLIC_KEY_PREFIX: &str = "k4.public.";

/// PASERK prefix for v4 public key identifiers.
pub const KEY_ID_PREFIX: &str = "k4.pid.";

/// A signing key for creating development attestation tokens.
///
/// Wraps an Ed25519 private key used for signing PASETO v4.public tokens.
///
/// # Example
///
/// ```
/// use sip_attestation::SigningKey;
///
/// let signing_key = SigningKey::generate();
/// let paserk = signing_key.public_key().to_paserk();
///
/// assert!(paserk.starts_with("k4.public."));
/// ```
#[derive(Clone)]
pub struct SigningKey {
    inner: DalekSigningKey,
}

impl SigningKey {
    /// Creates a new random signing key.
    #[must_use]
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        Self {
            inner: DalekSigningKey::generate(&mut rng),
        }
    }

    /// Creates a signing key from a raw 32-byte seed.
    #[must_use]
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self {
            inner: DalekSigningKey::from_bytes(bytes),
        }
    }

    /// Returns the raw seed bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 32] {
        self.inner.to_bytes()
    }

    /// Returns the corresponding public key.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            inner: self.inner.verifying_key(),
        }
    }

    /// Returns seed and public key concatenated, as PASETO expects.
    pub(crate) fn to_keypair_bytes(&self) -> [u8; 64] {
        self.inner.to_keypair_bytes()
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

/// An Ed25519 public key used to verify attestation tokens.
///
/// # Example
///
/// ```
/// use sip_attestation::PublicKey;
///
/// let key = PublicKey::from_paserk("k4.public.f2AxH__c3AQy_abwIYAZvwzLYrLPAUNH5o6cFzPj1_0").unwrap();
/// assert_eq!(key.to_paserk(), "k4.public.f2AxH__c3AQy_abwIYAZvwzLYrLPAUNH5o6cFzPj1_0");
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey {
    inner: DalekVerifyingKey,
}

impl PublicKey {
    /// Parses a PASERK `k4.public.*` string.
    ///
    /// # Errors
    ///
    /// Returns `VerificationError::InvalidKey` if the prefix is wrong, the
    /// encoding is not unpadded base64url, or the bytes are not a valid
    /// Ed25519 point.
    pub fn from_paserk(paserk: &str) -> Result<Self, VerificationError> {
        let encoded = paserk
            .trim()
            .strip_prefix(PUBLIC_KEY_PREFIX)
            .ok_or_else(|| VerificationError::InvalidKey {
                reason: format!("expected '{PUBLIC_KEY_PREFIX}' prefix"),
            })?;

        let decoded = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|e| VerificationError::InvalidKey {
                reason: format!("invalid base64url encoding: {e}"),
            })?;

        let bytes: [u8; 32] =
            decoded
                .as_slice()
                .try_into()
                .map_err(|_| VerificationError::InvalidKey {
                    reason: format!("expected 32 key bytes, got {}", decoded.len()),
                })?;

        Self::from_bytes(&bytes)
    }

    /// Creates a public key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns `VerificationError::InvalidKey` if the bytes are not a valid
    /// Ed25519 public key.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, VerificationError> {
        DalekVerifyingKey::from_bytes(bytes)
            .map(|inner| Self { inner })
            .map_err(|e| VerificationError::InvalidKey {
                reason: e.to_string(),
            })
    }

    /// Returns the raw key bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 32] {
        self.inner.to_bytes()
    }

    /// Formats the key as a PASERK `k4.public.*` string.
    #[must_use]
    pub fn to_paserk(&self) -> String {
        format!("{PUBLIC_KEY_PREFIX}{}", URL_SAFE_NO_PAD.encode(self.to_bytes()))
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // First 4 bytes are enough to tell keys apart in logs
        let bytes = self.to_bytes();
        write!(
            f,
            "PublicKey({:02x}{:02x}{:02x}{:02x}...)",
            bytes[0], bytes[1], bytes[2], bytes[3]
        )
    }
}
