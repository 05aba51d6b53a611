//! Signed session credentials.
//!
//! Registration returns a bearer credential over `{resident_id,
//! passport, kind}` valid for a configurable number of days. The format
//! is two URL-safe base64 segments joined by a dot: the JSON claims and
//! an HMAC-SHA256 tag over the exact claim bytes. Verification is
//! constant-time through [`ring::hmac::verify`]; cryptographic novelty
//! is explicitly not a goal here, integrity is.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use city_types::{ResidentId, ResidentKind};
use ring::hmac;
use serde::{Deserialize, Serialize};

/// Errors produced by credential verification.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// The token was not two base64 segments of valid JSON.
    #[error("malformed credential")]
    Malformed,

    /// The signature did not match the claims.
    #[error("bad credential signature")]
    BadSignature,

    /// The credential has expired.
    #[error("credential expired at {expired_at}")]
    Expired {
        /// When the credential stopped being valid.
        expired_at: DateTime<Utc>,
    },
}

/// The signed claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// The resident this credential controls.
    pub resident_id: ResidentId,
    /// Passport number, for logging and display.
    pub passport: String,
    /// Resident kind.
    pub kind: ResidentKind,
    /// Expiry instant.
    pub expires_at: DateTime<Utc>,
}

/// Issues and verifies session credentials.
pub struct TokenAuthority {
    key: hmac::Key,
    ttl: Duration,
}

impl TokenAuthority {
    /// Build an authority from key material and a validity in days.
    pub fn new(key_material: &str, ttl_days: i64) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, key_material.as_bytes()),
            ttl: Duration::days(ttl_days),
        }
    }

    /// Sign a credential for a freshly registered resident.
    pub fn issue(&self, resident_id: ResidentId, passport: &str, kind: ResidentKind) -> String {
        let claims = Claims {
            resident_id,
            passport: passport.to_owned(),
            kind,
            expires_at: Utc::now() + self.ttl,
        };
        self.sign(&claims)
    }

    /// Sign explicit claims (used by tests to fabricate expiry).
    pub fn sign(&self, claims: &Claims) -> String {
        let payload = serde_json::to_vec(claims).unwrap_or_default();
        let tag = hmac::sign(&self.key, &payload);
        format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&payload),
            URL_SAFE_NO_PAD.encode(tag.as_ref())
        )
    }

    /// Verify a credential and return its claims.
    ///
    /// # Errors
    ///
    /// [`TokenError::Malformed`] for anything that is not two valid
    /// segments, [`TokenError::BadSignature`] for a tag mismatch, and
    /// [`TokenError::Expired`] past the expiry instant.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let (payload_b64, tag_b64) =
            token.split_once('.').ok_or(TokenError::Malformed)?;
        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| TokenError::Malformed)?;
        let tag = URL_SAFE_NO_PAD
            .decode(tag_b64)
            .map_err(|_| TokenError::Malformed)?;

        hmac::verify(&self.key, &payload, &tag).map_err(|_| TokenError::BadSignature)?;

        let claims: Claims =
            serde_json::from_slice(&payload).map_err(|_| TokenError::Malformed)?;
        if claims.expires_at <= Utc::now() {
            return Err(TokenError::Expired {
                expired_at: claims.expires_at,
            });
        }
        Ok(claims)
    }
}

impl std::fmt::Debug for TokenAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material.
        f.debug_struct("TokenAuthority")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn authority() -> TokenAuthority {
        TokenAuthority::new("test-key-material", 30)
    }

    #[test]
    fn issue_then_verify_roundtrips() {
        let authority = authority();
        let resident = ResidentId::new();
        let token = authority.issue(resident, "CITY-AB12C", ResidentKind::Agent);
        let claims = authority.verify(&token).unwrap();
        assert_eq!(claims.resident_id, resident);
        assert_eq!(claims.passport, "CITY-AB12C");
        assert_eq!(claims.kind, ResidentKind::Agent);
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let authority = authority();
        let token = authority.issue(ResidentId::new(), "CITY-AB12C", ResidentKind::Agent);
        let (payload, tag) = token.split_once('.').unwrap();
        // Re-encode a different resident id under the same tag.
        let mut claims: Claims = serde_json::from_slice(
            &URL_SAFE_NO_PAD.decode(payload).unwrap(),
        )
        .unwrap();
        claims.resident_id = ResidentId::new();
        let forged_payload =
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap());
        let forged = format!("{forged_payload}.{tag}");
        assert!(matches!(
            authority.verify(&forged),
            Err(TokenError::BadSignature)
        ));
    }

    #[test]
    fn wrong_key_is_rejected() {
        let token = authority().issue(ResidentId::new(), "CITY-AB12C", ResidentKind::Agent);
        let other = TokenAuthority::new("a-different-key", 30);
        assert!(matches!(
            other.verify(&token),
            Err(TokenError::BadSignature)
        ));
    }

    #[test]
    fn expired_credential_is_rejected() {
        let authority = authority();
        let claims = Claims {
            resident_id: ResidentId::new(),
            passport: String::from("CITY-AB12C"),
            kind: ResidentKind::Agent,
            expires_at: Utc::now() - Duration::hours(1),
        };
        let token = authority.sign(&claims);
        assert!(matches!(
            authority.verify(&token),
            Err(TokenError::Expired { .. })
        ));
    }

    #[test]
    fn garbage_is_malformed() {
        let authority = authority();
        assert!(matches!(
            authority.verify("not-a-token"),
            Err(TokenError::Malformed)
        ));
        assert!(matches!(
            authority.verify("a.b.c"),
            Err(TokenError::Malformed)
        ));
    }
}
