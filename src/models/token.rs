//! Signed token models
//!
//! This module defines the claim set carried inside signed tokens and the
//! response handed back to a caller after issuance.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Claims carried inside a signed token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject the token was issued to
    pub sub: String,

    /// Issued-at, seconds since the Unix epoch
    pub iat: i64,

    /// Expiry, seconds since the Unix epoch
    pub exp: i64,

    /// Random token identifier
    pub jti: String,
}

impl TokenClaims {
    /// Create claims for a subject valid for `ttl_secs` from `issued_at`
    ///
    /// Returns `None` when the expiry does not fit in an `i64` timestamp.
    pub fn new(
        sub: impl Into<String>,
        issued_at: DateTime<Utc>,
        ttl_secs: i64,
        jti: impl Into<String>,
    ) -> Option<Self> {
        let iat = issued_at.timestamp();
        Some(Self {
            sub: sub.into(),
            iat,
            exp: iat.checked_add(ttl_secs)?,
            jti: jti.into(),
        })
    }

    /// Whether the token is still valid at `now` (inclusive of the expiry second)
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() <= self.exp
    }

    /// Expiry as a timestamp
    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// Response when a token is issued
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedToken {
    /// Opaque signed token string
    pub access_token: String,

    /// Always `bearer`
    pub token_type: String,

    /// Seconds until expiry
    pub expires_in: u64,

    /// When the token expires
    pub expires_at: DateTime<Utc>,
}

impl IssuedToken {
    /// Create an issued-token response
    pub fn bearer(access_token: impl Into<String>, claims: &TokenClaims) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: "bearer".to_string(),
            expires_in: (claims.exp - claims.iat).max(0) as u64,
            expires_at: claims.expires_at(),
        }
    }
}
