//! Verification options and pure claim-validation functions.
//!
//! The time-based checks here are deterministic: the caller supplies the
//! current time and the tolerance, so every rule can be tested without a
//! clock.
//!
//! | Function | Rejects when |
//! |----------|--------------|
//! | [`check_expiration`] | `exp <= now - tolerance` |
//! | [`check_issued_at`] | `iat > now + tolerance` |
//! | [`check_not_before`] | `nbf > now + tolerance` |
//! | [`check_max_age`] | `iat + max_age < now - tolerance` |
//! | [`check_audience`] | `aud` differs from the expected audience |

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::VerificationError;

/// Default clock tolerance applied to time-based claims.
pub const DEFAULT_CLOCK_TOLERANCE: Duration = Duration::from_secs(5);

/// Fully resolved options handed to a [`TokenVerifier`](crate::TokenVerifier).
///
/// Callers normally do not build this directly; they pass
/// [`VerifyOverrides`] to the decoder, which merges them over the
/// configured defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(
    clippy::struct_excessive_bools,
    reason = "each flag maps to one independent consume option"
)]
pub struct VerifyOptions {
    /// Permitted skew between token timestamps and the verifier's clock.
    ///
    /// Default: 5 seconds
    pub clock_tolerance: Duration,
    /// Return token metadata (version, purpose, footer) alongside the payload.
    ///
    /// Default: true
    pub complete: bool,
    /// Evaluate time-based claims against this instant instead of the clock.
    ///
    /// Default: None
    pub now: Option<DateTime<Utc>>,
    /// Skip the `exp` check.
    ///
    /// Default: false
    pub ignore_exp: bool,
    /// Skip the `iat` check.
    ///
    /// Default: false
    pub ignore_iat: bool,
    /// Skip the `nbf` check.
    ///
    /// Default: false
    pub ignore_nbf: bool,
    /// Reject tokens whose `iat` is older than this.
    ///
    /// Default: None
    pub max_token_age: Option<Duration>,
    /// Require the `aud` claim to equal this value.
    ///
    /// Default: None
    pub audience: Option<String>,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            clock_tolerance: DEFAULT_CLOCK_TOLERANCE,
            complete: true,
            now: None,
            ignore_exp: false,
            ignore_iat: false,
            ignore_nbf: false,
            max_token_age: None,
            audience: None,
        }
    }
}

impl VerifyOptions {
    /// Returns the instant time-based claims are evaluated against.
    #[must_use]
    pub fn effective_now(&self) -> DateTime<Utc> {
        self.now.unwrap_or_else(Utc::now)
    }
}

/// Per-call overrides for [`VerifyOptions`].
///
/// Every field that is `Some` replaces the corresponding default; `None`
/// keeps it.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use sip_attestation::{VerifyOptions, VerifyOverrides};
///
/// let overrides = VerifyOverrides::new()
///     .clock_tolerance(Duration::from_secs(10))
///     .ignore_exp(true);
///
/// let options = overrides.apply_to(&VerifyOptions::default());
///
/// assert_eq!(options.clock_tolerance, Duration::from_secs(10));
/// assert!(options.ignore_exp);
/// assert!(options.complete);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyOverrides {
    /// Overrides [`VerifyOptions::clock_tolerance`].
    pub clock_tolerance: Option<Duration>,
    /// Overrides [`VerifyOptions::complete`].
    pub complete: Option<bool>,
    /// Overrides [`VerifyOptions::now`].
    pub now: Option<DateTime<Utc>>,
    /// Overrides [`VerifyOptions::ignore_exp`].
    pub ignore_exp: Option<bool>,
    /// Overrides [`VerifyOptions::ignore_iat`].
    pub ignore_iat: Option<bool>,
    /// Overrides [`VerifyOptions::ignore_nbf`].
    pub ignore_nbf: Option<bool>,
    /// Overrides [`VerifyOptions::max_token_age`].
    pub max_token_age: Option<Duration>,
    /// Overrides [`VerifyOptions::audience`].
    pub audience: Option<String>,
}

impl VerifyOverrides {
    /// Creates an empty set of overrides.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the clock tolerance.
    #[must_use]
    pub fn clock_tolerance(mut self, tolerance: Duration) -> Self {
        self.clock_tolerance = Some(tolerance);
        self
    }

    /// Sets whether metadata is returned.
    #[must_use]
    pub fn complete(mut self, complete: bool) -> Self {
        self.complete = Some(complete);
        self
    }

    /// Evaluates time-based claims at `now`.
    #[must_use]
    pub fn now(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    /// Enables or disables the `exp` check.
    #[must_use]
    pub fn ignore_exp(mut self, ignore: bool) -> Self {
        self.ignore_exp = Some(ignore);
        self
    }

    /// Enables or disables the `iat` check.
    #[must_use]
    pub fn ignore_iat(mut self, ignore: bool) -> Self {
        self.ignore_iat = Some(ignore);
        self
    }

    /// Enables or disables the `nbf` check.
    #[must_use]
    pub fn ignore_nbf(mut self, ignore: bool) -> Self {
        self.ignore_nbf = Some(ignore);
        self
    }

    /// Sets the maximum token age.
    #[must_use]
    pub fn max_token_age(mut self, age: Duration) -> Self {
        self.max_token_age = Some(age);
        self
    }

    /// Sets the expected audience.
    #[must_use]
    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Merges these overrides over `defaults`.
    #[must_use]
    pub fn apply_to(&self, defaults: &VerifyOptions) -> VerifyOptions {
        VerifyOptions {
            clock_tolerance: self.clock_tolerance.unwrap_or(defaults.clock_tolerance),
            complete: self.complete.unwrap_or(defaults.complete),
            now: self.now.or(defaults.now),
            ignore_exp: self.ignore_exp.unwrap_or(defaults.ignore_exp),
            ignore_iat: self.ignore_iat.unwrap_or(defaults.ignore_iat),
            ignore_nbf: self.ignore_nbf.unwrap_or(defaults.ignore_nbf),
            max_token_age: self.max_token_age.or(defaults.max_token_age),
            audience: self
                .audience
                .clone()
                .or_else(|| defaults.audience.clone()),
        }
    }
}

fn tolerance(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}

/// Checks that a token has not expired at `now`.
///
/// # Errors
///
/// Returns `VerificationError::TokenExpired` if `exp <= now - tolerance`.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use chrono::{TimeZone, Utc};
/// use sip_attestation::check_expiration;
///
/// let exp = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
/// let before = Utc.with_ymd_and_hms(2029, 12, 31, 23, 59, 30).unwrap();
/// let after = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 30).unwrap();
///
/// assert!(check_expiration(exp, before, Duration::from_secs(5)).is_ok());
/// assert!(check_expiration(exp, after, Duration::from_secs(5)).is_err());
/// ```
pub fn check_expiration(
    exp: DateTime<Utc>,
    now: DateTime<Utc>,
    clock_tolerance: Duration,
) -> Result<(), VerificationError> {
    let now = now
        .checked_sub_signed(tolerance(clock_tolerance))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    if exp <= now {
        Err(VerificationError::TokenExpired { expired_at: exp })
    } else {
        Ok(())
    }
}

/// Checks that a token was not issued in the future.
///
/// # Errors
///
/// Returns `VerificationError::IssuedInFuture` if `iat > now + tolerance`.
pub fn check_issued_at(
    iat: DateTime<Utc>,
    now: DateTime<Utc>,
    clock_tolerance: Duration,
) -> Result<(), VerificationError> {
    let latest = now
        .checked_add_signed(tolerance(clock_tolerance))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    if iat > latest {
        Err(VerificationError::IssuedInFuture { issued_at: iat })
    } else {
        Ok(())
    }
}

/// Checks that a token is already active.
///
/// # Errors
///
/// Returns `VerificationError::TokenNotYetValid` if `nbf > now + tolerance`.
pub fn check_not_before(
    nbf: DateTime<Utc>,
    now: DateTime<Utc>,
    clock_tolerance: Duration,
) -> Result<(), VerificationError> {
    let latest = now
        .checked_add_signed(tolerance(clock_tolerance))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    if nbf > latest {
        Err(VerificationError::TokenNotYetValid { valid_from: nbf })
    } else {
        Ok(())
    }
}

/// Checks that a token is not older than `max_age`.
///
/// # Errors
///
/// Returns `VerificationError::MaxAgeExceeded` if `iat + max_age < now - tolerance`.
pub fn check_max_age(
    iat: DateTime<Utc>,
    max_age: Duration,
    now: DateTime<Utc>,
    clock_tolerance: Duration,
) -> Result<(), VerificationError> {
    let Some(deadline) = iat.checked_add_signed(tolerance(max_age)) else {
        return Ok(());
    };
    let now = now
        .checked_sub_signed(tolerance(clock_tolerance))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    if deadline < now {
        Err(VerificationError::MaxAgeExceeded { issued_at: iat })
    } else {
        Ok(())
    }
}

/// Checks that the token's `aud` claim matches `expected`.
///
/// # Errors
///
/// Returns `VerificationError::AudienceMismatch` if the claim is missing or different.
///
/// # Examples
///
/// ```
/// use sip_attestation::check_audience;
///
/// assert!(check_audience(Some("example.com"), "example.com").is_ok());
/// assert!(check_audience(Some("evil.com"), "example.com").is_err());
/// assert!(check_audience(None, "example.com").is_err());
/// ```
pub fn check_audience(token_audience: Option<&str>, expected: &str) -> Result<(), VerificationError> {
    if token_audience == Some(expected) {
        Ok(())
    } else {
        Err(VerificationError::AudienceMismatch {
            token_audience: token_audience.map(String::from),
            expected: expected.to_string(),
        })
    }
}
