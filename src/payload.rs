//! Attestation payload types.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::IssueError;

/// Outcome of a scan as reported by the authentication service.
///
/// The vocabulary is open: values other than the known ones are kept
/// verbatim in [`ScanResult::Other`].
///
/// # Example
///
/// ```
/// use sip_attestation::ScanResult;
///
/// assert_eq!(ScanResult::from("AUTHENTIC"), ScanResult::Authentic);
/// assert_eq!(ScanResult::from("UNSURE").as_str(), "UNSURE");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ScanResult {
    /// The label was confirmed authentic.
    Authentic,
    /// The scan was flagged as a counterfeit attempt.
    Counterfeit,
    /// The label was identified without an authenticity verdict.
    Identified,
    /// Any other result tag.
    Other(String),
}

impl ScanResult {
    /// Returns the wire representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Authentic => "AUTHENTIC",
            Self::Counterfeit => "COUNTERFEIT",
            Self::Identified => "IDENTIFIED",
            Self::Other(other) => other,
        }
    }
}

impl From<&str> for ScanResult {
    fn from(value: &str) -> Self {
        match value {
            "AUTHENTIC" => Self::Authentic,
            "COUNTERFEIT" => Self::Counterfeit,
            "IDENTIFIED" => Self::Identified,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for ScanResult {
    fn from(value: String) -> Self {
        match value.as_str() {
            "AUTHENTIC" => Self::Authentic,
            "COUNTERFEIT" => Self::Counterfeit,
            "IDENTIFIED" => Self::Identified,
            _ => Self::Other(value),
        }
    }
}

impl From<ScanResult> for String {
    fn from(value: ScanResult) -> Self {
        match value {
            ScanResult::Other(other) => other,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for ScanResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Geographic location of a scan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Latitude in degrees
    pub lat: f64,
    /// Longitude in degrees
    pub lon: f64,
}

/// Claims carried by a verified attestation token.
///
/// Instances handed out by the decoder have passed signature verification;
/// their contents, including `extrefs`, can be trusted as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttestationPayload {
    /// The `SecureLabel` ID (SLID) in Base36, uniquely identifying the label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slid: Option<String>,
    /// Installation id of the scanning app; an unreliable user identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Unique identifier of this scan; at most one token exists per `jti`
    pub jti: String,
    /// Authentication result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ScanResult>,
    /// External references provided through the service's infrastructure
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extrefs: Vec<serde_json::Value>,
    /// Intended audience
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
    /// Issuer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// When the token was issued
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<DateTime<Utc>>,
    /// When the token expires
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<DateTime<Utc>>,
    /// When the token becomes valid
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<DateTime<Utc>>,
    /// Where the scan took place
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    /// Global Trade Item Number of the labelled product
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gtin: Option<String>,
}

impl AttestationPayload {
    /// Creates a new builder for attestation payloads.
    #[must_use]
    pub fn builder() -> AttestationPayloadBuilder {
        AttestationPayloadBuilder::new()
    }
}

/// Builder for constructing an [`AttestationPayload`] to sign with an
/// [`Issuer`](crate::Issuer).
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use sip_attestation::{AttestationPayload, ScanResult};
///
/// let payload = AttestationPayload::builder()
///     .jti("f8b1d7f73b713af43ad59e33b7c02df5")
///     .slid("Z45JBJR6S9")
///     .result(ScanResult::Authentic)
///     .ttl(Duration::from_secs(300))
///     .build()
///     .unwrap();
///
/// assert_eq!(payload.slid.as_deref(), Some("Z45JBJR6S9"));
/// assert!(payload.exp.is_some());
/// ```
#[derive(Debug, Clone)]
pub struct AttestationPayloadBuilder {
    jti: Option<String>,
    slid: Option<String>,
    sub: Option<String>,
    result: Option<ScanResult>,
    extrefs: Vec<serde_json::Value>,
    audience: Option<String>,
    issuer: Option<String>,
    issued_at: Option<DateTime<Utc>>,
    ttl: Option<Duration>,
    not_before: Option<DateTime<Utc>>,
    location: Option<Location>,
    gtin: Option<String>,
}

impl AttestationPayloadBuilder {
    /// Creates a new builder with a TTL of 5 minutes.
    #[must_use]
    pub fn new() -> Self {
        Self {
            jti: None,
            slid: None,
            sub: None,
            result: None,
            extrefs: Vec::new(),
            audience: None,
            issuer: None,
            issued_at: None,
            ttl: Some(Duration::from_mins(5)),
            not_before: None,
            location: None,
            gtin: None,
        }
    }

    /// Sets the token identifier.
    #[must_use]
    pub fn jti(mut self, jti: impl Into<String>) -> Self {
        self.jti = Some(jti.into());
        self
    }

    /// Sets the SLID.
    #[must_use]
    pub fn slid(mut self, slid: impl Into<String>) -> Self {
        self.slid = Some(slid.into());
        self
    }

    /// Sets the subject.
    #[must_use]
    pub fn subject(mut self, sub: impl Into<String>) -> Self {
        self.sub = Some(sub.into());
        self
    }

    /// Sets the scan result.
    #[must_use]
    pub fn result(mut self, result: impl Into<ScanResult>) -> Self {
        self.result = Some(result.into());
        self
    }

    /// Appends an external reference.
    #[must_use]
    pub fn add_extref(mut self, extref: serde_json::Value) -> Self {
        self.extrefs.push(extref);
        self
    }

    /// Sets the audience.
    #[must_use]
    pub fn audience(mut self, aud: impl Into<String>) -> Self {
        self.audience = Some(aud.into());
        self
    }

    /// Sets the issuer.
    #[must_use]
    pub fn issuer(mut self, iss: impl Into<String>) -> Self {
        self.issuer = Some(iss.into());
        self
    }

    /// Sets the issued-at time. Defaults to the time of [`build`](Self::build).
    #[must_use]
    pub fn issued_at(mut self, iat: DateTime<Utc>) -> Self {
        self.issued_at = Some(iat);
        self
    }

    /// Sets the time-to-live, counted from the issued-at time.
    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Omits the `exp` claim.
    #[must_use]
    pub fn no_expiry(mut self) -> Self {
        self.ttl = None;
        self
    }

    /// Sets the not-before time.
    #[must_use]
    pub fn not_before(mut self, nbf: DateTime<Utc>) -> Self {
        self.not_before = Some(nbf);
        self
    }

    /// Sets the scan location.
    #[must_use]
    pub fn location(mut self, lat: f64, lon: f64) -> Self {
        self.location = Some(Location { lat, lon });
        self
    }

    /// Sets the GTIN.
    #[must_use]
    pub fn gtin(mut self, gtin: impl Into<String>) -> Self {
        self.gtin = Some(gtin.into());
        self
    }

    /// Builds the payload.
    ///
    /// # Errors
    ///
    /// Returns `IssueError::MissingField` if `jti` is not set, or
    /// `IssueError::InvalidTtl` if the TTL overflows.
    pub fn build(self) -> Result<AttestationPayload, IssueError> {
        let jti = self.jti.ok_or(IssueError::MissingField { field: "jti" })?;

        let iat = self.issued_at.unwrap_or_else(Utc::now);
        let exp = match self.ttl {
            Some(ttl) => {
                let ttl = chrono::Duration::from_std(ttl).map_err(|_| IssueError::InvalidTtl)?;
                Some(iat.checked_add_signed(ttl).ok_or(IssueError::InvalidTtl)?)
            }
            None => None,
        };

        Ok(AttestationPayload {
            slid: self.slid,
            sub: self.sub,
            jti,
            result: self.result,
            extrefs: self.extrefs,
            aud: self.audience,
            iss: self.issuer,
            iat: Some(iat),
            exp,
            nbf: self.not_before,
            location: self.location,
            gtin: self.gtin,
        })
    }
}

impl Default for AttestationPayloadBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    #[test]
    fn deserializes_service_payload() {
        let payload: AttestationPayload = serde_json::from_value(json!({
            "aud": "example.com",
            "exp": "2030-01-01T00:00:00Z",
            "iat": "2023-04-20T16:54:01Z",
            "jti": "f8b1d7f73b713af43ad59e33b7c02df5",
            "result": "AUTHENTIC",
            "slid": "Z45JBJR6S9",
            "location": {"lat": 47.7946, "lon": 12.9864},
            "extrefs": ["foo", {"bar": "baz"}, 123]
        }))
        .unwrap();

        assert_eq!(payload.slid.as_deref(), Some("Z45JBJR6S9"));
        assert_eq!(payload.jti, "f8b1d7f73b713af43ad59e33b7c02df5");
        assert_eq!(payload.result, Some(ScanResult::Authentic));
        assert_eq!(payload.extrefs, vec![json!("foo"), json!({"bar": "baz"}), json!(123)]);
        assert_eq!(
            payload.exp,
            Some(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(payload.location, Some(Location { lat: 47.7946, lon: 12.9864 }));
        assert!(payload.sub.is_none());
    }

    #[test]
    fn fractional_second_timestamps_parse() {
        let payload: AttestationPayload = serde_json::from_value(json!({
            "jti": "x",
            "iat": "2024-04-18T06:55:12.193393Z"
        }))
        .unwrap();

        assert_eq!(payload.iat.unwrap().timestamp_subsec_micros(), 193_393);
    }

    #[test]
    fn missing_jti_is_rejected() {
        let result = serde_json::from_value::<AttestationPayload>(json!({"slid": "Z45JBJR6S9"}));
        assert!(result.is_err());
    }

    #[test]
    fn minimal_payload_defaults_optional_fields() {
        let payload: AttestationPayload = serde_json::from_value(json!({"jti": "abc"})).unwrap();

        assert!(payload.slid.is_none());
        assert!(payload.result.is_none());
        assert!(payload.extrefs.is_empty());
    }

    #[test]
    fn unknown_result_is_preserved() {
        let payload: AttestationPayload =
            serde_json::from_value(json!({"jti": "abc", "result": "UNSURE"})).unwrap();

        assert_eq!(payload.result, Some(ScanResult::Other("UNSURE".into())));
        assert_eq!(serde_json::to_value(&payload).unwrap()["result"], "UNSURE");
    }

    #[test]
    fn builder_requires_jti() {
        let result = AttestationPayloadBuilder::new().slid("Z45JBJR6S9").build();

        assert!(matches!(
            result,
            Err(IssueError::MissingField { field: "jti" })
        ));
    }

    #[test]
    fn builder_derives_expiry_from_ttl() {
        let iat = Utc.with_ymd_and_hms(2024, 4, 18, 12, 0, 0).unwrap();
        let payload = AttestationPayload::builder()
            .jti("abc")
            .issued_at(iat)
            .ttl(Duration::from_mins(1))
            .build()
            .unwrap();

        assert_eq!(payload.iat, Some(iat));
        assert_eq!(payload.exp, Some(iat + chrono::Duration::seconds(60)));
    }

    #[test]
    fn builder_without_expiry() {
        let payload = AttestationPayload::builder()
            .jti("abc")
            .no_expiry()
            .build()
            .unwrap();

        assert!(payload.exp.is_none());
    }

    #[test]
    fn serialized_payload_omits_absent_claims() {
        let payload = AttestationPayload::builder()
            .jti("abc")
            .result("COUNTERFEIT")
            .build()
            .unwrap();

        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["result"], "COUNTERFEIT");
        assert!(value.get("slid").is_none());
        assert!(value.get("extrefs").is_none());
    }
}
