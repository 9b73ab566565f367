//! Decoder for `SecureLabel` attestation tokens.
//!
//! A scanning app that authenticates a `SecureLabel` receives an attestation
//! token: a PASETO v4.public token (Ed25519 signature) whose footer names
//! the signing key. This crate verifies such tokens and redeems each one
//! exactly once.
//!
//! # Overview
//!
//! Decoding a token:
//! - Reads the key id (`kid`) from the token footer
//! - Resolves the key id to a public key, from cache or the key directory
//! - Verifies the signature and time-based claims
//! - Redeems the token's `jti`, so a second decode fails
//!
//! # Example
//!
//! ```rust
//! use sip_attestation::{AttestationDecoder, AttestationPayload, Issuer};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! // Development issuer; production tokens come from the scanning service
//! let issuer = Issuer::generate("k4.pid.dev");
//! let token = issuer
//!     .issue(
//!         &AttestationPayload::builder()
//!             .jti("f8b1d7f73b713af43ad59e33b7c02df5")
//!             .slid("Z45JBJR6S9")
//!             .result("AUTHENTIC")
//!             .build()
//!             .unwrap(),
//!     )
//!     .unwrap();
//!
//! let decoder = AttestationDecoder::new().unwrap();
//! decoder.register_key(issuer.key_id(), issuer.public_key().to_paserk());
//!
//! let attestation = decoder.decode(&token).await.unwrap();
//! assert_eq!(attestation.slid(), Some("Z45JBJR6S9"));
//! assert!(attestation.is_authenticated());
//! # }
//! ```
//!
//! # Sharing a decoder
//!
//! Redemption state lives in the decoder, so an application should use one
//! decoder for all requests. Create it once at the composition root:
//!
//! ```rust,no_run
//! use std::sync::OnceLock;
//! use sip_attestation::AttestationDecoder;
//!
//! fn decoder() -> &'static AttestationDecoder {
//!     static DECODER: OnceLock<AttestationDecoder> = OnceLock::new();
//!     DECODER.get_or_init(|| AttestationDecoder::new().expect("HTTP client"))
//! }
//!
//! # async fn handle(token: &str) {
//! match decoder().decode(token).await {
//!     Ok(attestation) => println!("{:?} {:?}", attestation.slid(), attestation.result()),
//!     Err(err) => eprintln!("{err}"),
//! }
//! # }
//! ```
//!
//! # Token Structure
//!
//! `v4.public.<payload+signature>.<footer>`, where the footer is base64url
//! JSON `{"kid": "k4.pid.*"}`. The payload carries:
//!
//! - `jti`: Unique scan identifier, the redemption key
//! - `slid`: `SecureLabel` ID in Base36
//! - `result`: `AUTHENTIC`, `COUNTERFEIT` or `IDENTIFIED`
//! - `sub`: Installation id of the scanning app
//! - `extrefs`: External references
//! - `iat`, `exp`, `nbf`, `aud`: Standard claims
//!
//! # Security Properties
//!
//! | Property | How Achieved |
//! |----------|--------------|
//! | No algorithm confusion | PASETO v4 is Ed25519-only |
//! | Replay protection | Each `jti` is redeemed once |
//! | Key substitution | Keys come from a fixed directory or explicit registration |
//! | Tamper detection | Ed25519 signature verification |
//! | Clock skew | Time claims checked with a 5 second tolerance |

#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod attestation;
mod config;
mod decoder;
mod error;
mod footer;
mod issuer;
mod keys;
mod payload;
mod redemption;
mod resolver;
mod verification;
mod verifier;

pub use attestation::Attestation;
pub use config::{
    DEVELOPMENT_KEY_DIRECTORY, DecoderConfig, MAX_CACHE_TTL, PRODUCTION_KEY_DIRECTORY,
};
pub use decoder::{AttestationDecoder, DecodeParams, DecoderBuilder};
pub use error::{
    AttestationError, ConfigError, DecodeFailure, IssueError, KeyResolutionError,
    VerificationError,
};
pub use footer::{TokenFooter, parse_footer};
pub use issuer::Issuer;
pub use keys::{KEY_ID_PREFIX, PUBLIC_KEY_PREFIX, PublicKey, SigningKey};
pub use payload::{AttestationPayload, AttestationPayloadBuilder, Location, ScanResult};
pub use redemption::RedemptionTracker;
pub use resolver::{HttpKeyFetcher, KeyFetcher, KeyResolver, MAX_KEY_BODY_BYTES};
pub use verification::{
    DEFAULT_CLOCK_TOLERANCE, VerifyOptions, VerifyOverrides, check_audience, check_expiration,
    check_issued_at, check_max_age, check_not_before,
};
pub use verifier::{PasetoVerifier, TOKEN_HEADER, TokenMetadata, TokenVerifier, VerifiedToken};

/// A prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use sip_attestation::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        Attestation, AttestationDecoder, AttestationError, AttestationPayload, DecodeFailure,
        DecodeParams, DecoderConfig, Issuer, ScanResult, VerifyOptions, VerifyOverrides,
    };
}
