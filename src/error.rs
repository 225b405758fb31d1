//! Error types for auth-gateway
//!
//! This module defines the rejection taxonomy returned by verifiers and the
//! error types used during startup. All error types use `thiserror`.

use thiserror::Error;

use crate::config::ConfigError;
use crate::models::Refusal;

/// Reason a verification attempt was rejected
///
/// These codes are internal: they go to logs and metrics only. Callers of the
/// transport layer see the coarser [`Refusal`] class instead.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// Password, key or fixed pair did not match
    #[error("Invalid credential")]
    InvalidCredential,

    /// Token could not be parsed
    #[error("Malformed token")]
    Malformed,

    /// Token signature or algorithm did not verify
    #[error("Bad token signature")]
    BadSignature,

    /// Token is past its expiry
    #[error("Token expired")]
    Expired,

    /// Token subject is no longer provisioned
    #[error("Unknown subject")]
    UnknownSubject,

    /// Caller address is not on the allow-list
    #[error("Forbidden network address")]
    ForbiddenNetwork,

    /// No credential, or a scheme the route does not accept
    #[error("Missing credential")]
    MissingCredential,

    /// The secret store did not answer in time or failed
    #[error("Temporarily unavailable")]
    TemporarilyUnavailable,
}

impl RejectReason {
    /// Stable machine-readable code for logs and metric labels
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::InvalidCredential => "invalid_credential",
            RejectReason::Malformed => "malformed",
            RejectReason::BadSignature => "bad_signature",
            RejectReason::Expired => "expired",
            RejectReason::UnknownSubject => "unknown_subject",
            RejectReason::ForbiddenNetwork => "forbidden_network",
            RejectReason::MissingCredential => "missing_credential",
            RejectReason::TemporarilyUnavailable => "temporarily_unavailable",
        }
    }

    /// Externally visible refusal class
    ///
    /// All credential failures collapse to `Unauthorized` so that unknown
    /// subjects cannot be told apart from wrong passwords.
    pub fn refusal(&self) -> Refusal {
        match self {
            RejectReason::ForbiddenNetwork => Refusal::Forbidden,
            RejectReason::TemporarilyUnavailable => Refusal::Unavailable,
            RejectReason::InvalidCredential
            | RejectReason::Malformed
            | RejectReason::BadSignature
            | RejectReason::Expired
            | RejectReason::UnknownSubject
            | RejectReason::MissingCredential => Refusal::Unauthorized,
        }
    }
}

/// Secret store backend errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    /// Backend could not be reached
    #[error("Secret store unavailable: {0}")]
    Unavailable(String),

    /// Backend returned data that could not be interpreted
    #[error("Secret store returned corrupt data: {0}")]
    Corrupt(String),
}

impl From<StoreError> for RejectReason {
    fn from(_: StoreError) -> Self {
        RejectReason::TemporarilyUnavailable
    }
}

/// Token issuance errors
#[derive(Debug, Error)]
pub enum IssueError {
    /// Time-to-live must be positive
    #[error("Token TTL must be greater than zero")]
    InvalidTtl,

    /// Signing the claims failed
    #[error("Failed to sign token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

/// Application-level error type
///
/// Only raised during startup; request handling never produces these.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Secret store error
    #[error("Secret store error: {0}")]
    Store(#[from] StoreError),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reject_reason_messages() {
        assert_eq!(
            RejectReason::InvalidCredential.to_string(),
            "Invalid credential"
        );
        assert_eq!(RejectReason::Malformed.to_string(), "Malformed token");
        assert_eq!(RejectReason::Expired.to_string(), "Token expired");
        assert_eq!(
            RejectReason::MissingCredential.to_string(),
            "Missing credential"
        );
    }

    #[test]
    fn test_credential_reasons_collapse_to_unauthorized() {
        for reason in [
            RejectReason::InvalidCredential,
            RejectReason::Malformed,
            RejectReason::BadSignature,
            RejectReason::Expired,
            RejectReason::UnknownSubject,
            RejectReason::MissingCredential,
        ] {
            assert_eq!(reason.refusal(), Refusal::Unauthorized, "{:?}", reason);
        }
    }

    #[test]
    fn test_network_and_availability_refusals() {
        assert_eq!(
            RejectReason::ForbiddenNetwork.refusal(),
            Refusal::Forbidden
        );
        assert_eq!(
            RejectReason::TemporarilyUnavailable.refusal(),
            Refusal::Unavailable
        );
    }

    #[test]
    fn test_reason_codes_are_distinct() {
        let codes = [
            RejectReason::InvalidCredential,
            RejectReason::Malformed,
            RejectReason::BadSignature,
            RejectReason::Expired,
            RejectReason::UnknownSubject,
            RejectReason::ForbiddenNetwork,
            RejectReason::MissingCredential,
            RejectReason::TemporarilyUnavailable,
        ]
        .map(|r| r.code());

        let unique: std::collections::HashSet<_> = codes.iter().collect();
        assert_eq!(unique.len(), codes.len());
    }

    #[test]
    fn test_store_error_becomes_unavailable() {
        let reason: RejectReason = StoreError::Unavailable("timeout".to_string()).into();
        assert_eq!(reason, RejectReason::TemporarilyUnavailable);
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::Store(StoreError::Corrupt("bad row".to_string()));
        assert_eq!(
            err.to_string(),
            "Secret store error: Secret store returned corrupt data: bad row"
        );

        let err = AppError::Config(ConfigError::InvalidValue("ttl".to_string()));
        assert_eq!(
            err.to_string(),
            "Configuration error: Invalid configuration value: ttl"
        );
    }
}
