//! Decoded attestation results.

use sha2::{Digest, Sha256};

use crate::payload::{AttestationPayload, ScanResult};
use crate::verifier::TokenMetadata;

/// A verified, redeemed attestation.
///
/// Only produced by [`AttestationDecoder`](crate::AttestationDecoder) after
/// the token's signature and time claims have been checked. The view is
/// read-only.
#[derive(Debug, Clone)]
pub struct Attestation {
    payload: AttestationPayload,
    token: String,
    metadata: Option<TokenMetadata>,
}

impl Attestation {
    pub(crate) fn new(
        payload: AttestationPayload,
        token: impl Into<String>,
        metadata: Option<TokenMetadata>,
    ) -> Self {
        Self {
            payload,
            token: token.into(),
            metadata,
        }
    }

    /// Returns the SLID in Base36 format.
    #[must_use]
    pub fn slid(&self) -> Option<&str> {
        self.payload.slid.as_deref()
    }

    /// Returns the token identifier.
    #[must_use]
    pub fn jti(&self) -> &str {
        &self.payload.jti
    }

    /// Returns the subject (install id of the scanning app), if present.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.payload.sub.as_deref()
    }

    /// Returns the raw scan result. Prefer [`is_authenticated`](Self::is_authenticated)
    /// and [`is_fraud`](Self::is_fraud).
    #[must_use]
    pub fn result(&self) -> Option<&ScanResult> {
        self.payload.result.as_ref()
    }

    /// Returns true if the label has been confirmed authentic.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.payload.result == Some(ScanResult::Authentic)
    }

    /// Returns true if the scan has been flagged as a fraud attempt.
    #[must_use]
    pub fn is_fraud(&self) -> bool {
        self.payload.result == Some(ScanResult::Counterfeit)
    }

    /// Returns true if the label was identified without an authenticity verdict.
    #[must_use]
    pub fn is_identified(&self) -> bool {
        self.payload.result == Some(ScanResult::Identified)
    }

    /// Returns the lowercase hex SHA-256 of the raw token.
    ///
    /// Uniquely identifies the attestation token.
    #[must_use]
    pub fn hash(&self) -> String {
        hex::encode(Sha256::digest(self.token.as_bytes()))
    }

    /// Returns the payload as decoded.
    #[must_use]
    pub fn payload(&self) -> &AttestationPayload {
        &self.payload
    }

    /// Returns the original encoded token.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Returns verification metadata, present when decoded with `complete` set.
    #[must_use]
    pub fn metadata(&self) -> Option<&TokenMetadata> {
        self.metadata.as_ref()
    }
}
