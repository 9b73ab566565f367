//! Single-use enforcement for attestation tokens.

use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::sync::Cache;
use tracing::{debug, info, warn};

use crate::config::MAX_CACHE_TTL;
use crate::error::DecodeFailure;

/// Records which token identifiers (`jti`) have been redeemed, and when.
///
/// At most one record exists per `jti`. A record is never updated; it
/// disappears only when it expires or the tracker is cleared.
///
/// # Example
///
/// ```
/// use sip_attestation::RedemptionTracker;
///
/// let tracker = RedemptionTracker::new(None);
///
/// tracker.check_and_record("abc", false).unwrap();
/// assert!(tracker.check_and_record("abc", false).is_err());
/// ```
pub struct RedemptionTracker {
    records: Cache<String, DateTime<Utc>>,
}

impl RedemptionTracker {
    /// Creates a tracker. With `ttl` set, records expire after that long,
    /// capped at [`MAX_CACHE_TTL`](crate::MAX_CACHE_TTL); with `None` they are
    /// kept until [`clear`](Self::clear).
    #[must_use]
    pub fn new(ttl: Option<Duration>) -> Self {
        let mut builder = Cache::builder();
        if let Some(ttl) = ttl {
            builder = builder.time_to_live(ttl.min(MAX_CACHE_TTL));
        }
        Self {
            records: builder.build(),
        }
    }

    /// Rejects `jti` if it was redeemed before; otherwise records it now,
    /// unless `suppress_recording` is set.
    ///
    /// The existence check and the insert happen as one atomic step, so two
    /// concurrent calls for the same `jti` cannot both succeed.
    ///
    /// # Errors
    ///
    /// Returns `DecodeFailure::AlreadyRedeemed` with the original redemption
    /// time if a record exists.
    pub fn check_and_record(&self, jti: &str, suppress_recording: bool) -> Result<(), DecodeFailure> {
        if suppress_recording {
            if let Some(redeemed_at) = self.records.get(jti) {
                return Err(replay(jti, redeemed_at));
            }
            debug!(%jti, "redemption suppressed");
            return Ok(());
        }

        let entry = self
            .records
            .entry(jti.to_string())
            .or_insert_with(Utc::now);
        if entry.is_fresh() {
            info!(%jti, redeemed_at = %entry.value(), "token redeemed");
            Ok(())
        } else {
            Err(replay(jti, entry.into_value()))
        }
    }

    /// Returns when `jti` was redeemed, if it was.
    #[must_use]
    pub fn redeemed_at(&self, jti: &str) -> Option<DateTime<Utc>> {
        self.records.get(jti)
    }

    /// Forgets every redemption.
    ///
    /// Every previously redeemed token becomes decodable again.
    pub fn clear(&self) {
        self.records.invalidate_all();
    }
}

fn replay(jti: &str, redeemed_at: DateTime<Utc>) -> DecodeFailure {
    warn!(%jti, %redeemed_at, "rejected already redeemed token");
    DecodeFailure::AlreadyRedeemed {
        jti: jti.to_string(),
        redeemed_at,
    }
}

impl std::fmt::Debug for RedemptionTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedemptionTracker")
            .field("records", &self.records.entry_count())
            .finish()
    }
}
